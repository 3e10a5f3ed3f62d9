// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! In-flight probe / kill-switch (C8): slope detection over a
//! sliding window of in-flight-count samples, with a `sustainSamples`
//! requirement before tripping, and fail-fast vs. log-only behavior.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

use pipeline_domain::{InFlightSample, InFlightWindow, PipelineError};

/// What the probe does once it has observed `sustainSamples` consecutive
/// runaway windows.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ProbeMode {
    /// Return `KillSwitchTriggered` to the caller, terminating the run.
    FailFast,
    /// Log and keep running; `triggered()` still flips so telemetry and
    /// the Runner can react without hard-failing.
    LogOnly,
}

/// Samples the Runner's global in-flight counter and raises the kill
/// switch once the window is both full and rising for `sustain_samples`
/// consecutive observations (a single runaway window is not
/// sufficient, since a brief burst is expected background noise).
pub struct InFlightProbe {
    window: Mutex<InFlightWindow>,
    threshold: i64,
    sustain_samples: usize,
    consecutive_runaway: AtomicUsize,
    mode: ProbeMode,
    triggered: AtomicBool,
    min_interval: Duration,
    last_sample: Mutex<Option<Instant>>,
}

impl InFlightProbe {
    /// `min_interval` is the fixed sampling tick (`window / sustainSamples`
    /// for a caller driven by `KillSwitchConfig`): admissions arriving
    /// faster than this are ignored rather than recorded, so a burst of
    /// concurrent admissions within less than a window's worth of real
    /// time can never fill the window and trip the switch.
    pub fn new(window_capacity: usize, threshold: i64, sustain_samples: usize, mode: ProbeMode, min_interval: Duration) -> Self {
        Self {
            window: Mutex::new(InFlightWindow::new(window_capacity)),
            threshold,
            sustain_samples: sustain_samples.max(1),
            consecutive_runaway: AtomicUsize::new(0),
            mode,
            triggered: AtomicBool::new(false),
            min_interval,
            last_sample: Mutex::new(None),
        }
    }

    /// Records one in-flight-count observation, unless less than
    /// `min_interval` has elapsed since the last one actually recorded, in
    /// which case this admission is dropped from the window entirely.
    /// Returns `Err` only in `FailFast` mode once the sustain requirement
    /// is met; `LogOnly` mode never returns an error, but `triggered()`
    /// still reports the state.
    pub fn sample(&self, in_flight_count: usize) -> Result<(), PipelineError> {
        {
            let mut last_sample = self.last_sample.lock();
            let now = Instant::now();
            if let Some(previous) = *last_sample {
                if now.duration_since(previous) < self.min_interval {
                    return Ok(());
                }
            }
            *last_sample = Some(now);
        }

        let is_runaway = {
            let mut window = self.window.lock();
            window.push(InFlightSample::now(in_flight_count));
            window.is_runaway(self.threshold)
        };

        if !is_runaway {
            self.consecutive_runaway.store(0, Ordering::SeqCst);
            return Ok(());
        }

        let consecutive = self.consecutive_runaway.fetch_add(1, Ordering::SeqCst) + 1;
        if consecutive < self.sustain_samples {
            return Ok(());
        }

        self.triggered.store(true, Ordering::SeqCst);
        warn!(
            in_flight = in_flight_count,
            consecutive_windows = consecutive,
            mode = ?self.mode,
            "in-flight probe detected sustained runaway concurrency"
        );

        match self.mode {
            ProbeMode::FailFast => Err(PipelineError::KillSwitchTriggered(format!(
                "in-flight count sustained a runaway slope for {consecutive} consecutive windows"
            ))),
            ProbeMode::LogOnly => Ok(()),
        }
    }

    pub fn triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.consecutive_runaway.store(0, Ordering::SeqCst);
        self.triggered.store(false, Ordering::SeqCst);
    }
}
