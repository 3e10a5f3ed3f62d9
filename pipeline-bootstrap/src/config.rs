// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Runtime Configuration
//!
//! Bootstrap-phase configuration covering the `pipeline.*` keys from 
//! platform/transport build-time overrides, cache provider/policy/ttl, and
//! the in-flight kill-switch (`pipeline.kill-switch.retry-amplification.*`).
//!
//! ## Layering
//!
//! [`RuntimeConfig::load`] merges, lowest precedence first: compiled-in
//! defaults, an optional config file (TOML/YAML/JSON, detected by
//! extension), then `PIPELINE__`-prefixed environment variables — the
//! same three-tier precedence the `config` crate documents, e.g.
//! `PIPELINE__CACHE__POLICY=require-cache`.
//!
//! ## Immutability
//!
//! All configuration is immutable after [`RuntimeConfig::load`] returns,
//! so it can be shared across worker tasks without synchronization.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use pipeline_domain::{CachePolicy, PipelineError};
use pipeline_runtime::ProbeMode;

/// Build-time platform target (`pipeline.platform`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlatformTarget {
    #[default]
    Compute,
    Function,
}

/// Build-time transport selection (`pipeline.transport`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Grpc,
    Rest,
    #[default]
    Local,
    Function,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RestNaming {
    strategy: String,
}

impl Default for RestNaming {
    fn default() -> Self {
        Self {
            strategy: "kebab-case".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RestSection {
    naming: RestNaming,
}

impl Default for RestSection {
    fn default() -> Self {
        Self {
            naming: RestNaming::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct CacheSection {
    provider: String,
    policy: String,
    ttl_seconds: Option<u64>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            provider: "in-memory".to_string(),
            policy: "prefer-cache".to_string(),
            ttl_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RetryAmplificationSection {
    enabled: bool,
    window_seconds: u64,
    inflight_slope_threshold: f64,
    sustain_samples: usize,
    mode: String,
}

impl Default for RetryAmplificationSection {
    fn default() -> Self {
        Self {
            enabled: false,
            window_seconds: 30,
            inflight_slope_threshold: 1.0,
            sustain_samples: 3,
            mode: "fail-fast".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct KillSwitchSection {
    #[serde(rename = "retry-amplification")]
    retry_amplification: RetryAmplificationSection,
}

impl Default for KillSwitchSection {
    fn default() -> Self {
        Self {
            retry_amplification: RetryAmplificationSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawPipelineSection {
    platform: PlatformTarget,
    transport: TransportKind,
    rest: RestSection,
    cache: CacheSection,
    #[serde(rename = "kill-switch")]
    kill_switch: KillSwitchSection,
}

impl Default for RawPipelineSection {
    fn default() -> Self {
        Self {
            platform: PlatformTarget::default(),
            transport: TransportKind::default(),
            rest: RestSection::default(),
            cache: CacheSection::default(),
            kill_switch: KillSwitchSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawConfig {
    pipeline: RawPipelineSection,
}

/// Resolved in-flight kill-switch configuration.
#[derive(Debug, Clone, Copy)]
pub struct KillSwitchConfig {
    pub enabled: bool,
    pub window: Duration,
    pub slope_threshold_per_sec: f64,
    pub sustain_samples: usize,
    pub mode: ProbeMode,
}

impl KillSwitchConfig {
    /// Derive the absolute in-flight delta an `InFlightProbe` trips on:
    /// `slopeThreshold * windowSeconds`, matching its "equivalently
    /// `(last − first) / windowSeconds`" slope definition rearranged for
    /// the probe's count-delta-per-window representation.
    pub fn absolute_threshold(&self) -> i64 {
        (self.slope_threshold_per_sec * self.window.as_secs_f64()).round() as i64
    }

    /// Ring-buffer capacity: one sample per `window / sustainSamples`
    /// tick, so the window holds exactly `sustainSamples` samples.
    pub fn window_capacity(&self) -> usize {
        self.sustain_samples.max(1)
    }

    /// The fixed tick an `InFlightProbe` samples on: `window /
    /// sustainSamples`. Admissions arriving faster than this are dropped
    /// rather than recorded, so a full window always spans real elapsed
    /// time.
    pub fn sample_interval(&self) -> Duration {
        self.window / self.sustain_samples.max(1) as u32
    }
}

/// Resolved, immutable application configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    platform: PlatformTarget,
    transport: TransportKind,
    rest_naming_strategy: String,
    cache_provider: String,
    cache_default_policy: CachePolicy,
    cache_ttl: Option<Duration>,
    kill_switch: KillSwitchConfig,
}

impl RuntimeConfig {
    /// Load configuration from compiled-in defaults, an optional config
    /// file, and `PIPELINE__`-prefixed environment variables.
    pub fn load(file_path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&RawConfig::default())
            .map_err(|e| PipelineError::InvalidConfiguration(format!("default config: {e}")))?);

        if let Some(path) = file_path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("PIPELINE")
                .separator("__")
                .try_parsing(true),
        );

        let raw: RawConfig = builder
            .build()
            .map_err(|e| PipelineError::InvalidConfiguration(format!("config load: {e}")))?
            .try_deserialize()
            .map_err(|e| PipelineError::InvalidConfiguration(format!("config deserialize: {e}")))?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, PipelineError> {
        let cache_default_policy = CachePolicy::parse(&raw.pipeline.cache.policy)?;
        let mode = match raw.pipeline.kill_switch.retry_amplification.mode.as_str() {
            "fail-fast" => ProbeMode::FailFast,
            "log-only" => ProbeMode::LogOnly,
            other => {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "unknown kill-switch mode '{other}'"
                )))
            }
        };

        Ok(Self {
            platform: raw.pipeline.platform,
            transport: raw.pipeline.transport,
            rest_naming_strategy: raw.pipeline.rest.naming.strategy,
            cache_provider: raw.pipeline.cache.provider,
            cache_default_policy,
            cache_ttl: raw.pipeline.cache.ttl_seconds.map(Duration::from_secs),
            kill_switch: KillSwitchConfig {
                enabled: raw.pipeline.kill_switch.retry_amplification.enabled,
                window: Duration::from_secs(raw.pipeline.kill_switch.retry_amplification.window_seconds),
                slope_threshold_per_sec: raw.pipeline.kill_switch.retry_amplification.inflight_slope_threshold,
                sustain_samples: raw.pipeline.kill_switch.retry_amplification.sustain_samples,
                mode,
            },
        })
    }

    pub fn platform(&self) -> PlatformTarget {
        self.platform
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn rest_naming_strategy(&self) -> &str {
        &self.rest_naming_strategy
    }

    pub fn cache_provider(&self) -> &str {
        &self.cache_provider
    }

    pub fn cache_default_policy(&self) -> CachePolicy {
        self.cache_default_policy
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl
    }

    pub fn kill_switch(&self) -> KillSwitchConfig {
        self.kill_switch
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_raw(RawConfig::default()).expect("default config is always valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_6() {
        let config = RuntimeConfig::default();
        assert_eq!(config.platform(), PlatformTarget::Compute);
        assert_eq!(config.transport(), TransportKind::Local);
        assert_eq!(config.cache_default_policy(), CachePolicy::PreferCache);
        assert!(!config.kill_switch().enabled);
        assert_eq!(config.kill_switch().sustain_samples, 3);
    }

    #[test]
    fn kill_switch_absolute_threshold_derives_from_rate_and_window() {
        let kill_switch = KillSwitchConfig {
            enabled: true,
            window: Duration::from_secs(30),
            slope_threshold_per_sec: 1.0,
            sustain_samples: 3,
            mode: ProbeMode::FailFast,
        };
        assert_eq!(kill_switch.absolute_threshold(), 30);
        assert_eq!(kill_switch.window_capacity(), 3);
    }

    #[test]
    fn unknown_cache_policy_is_rejected() {
        let mut raw = RawConfig::default();
        raw.pipeline.cache.policy = "always-hit".to_string();
        assert!(RuntimeConfig::from_raw(raw).is_err());
    }

    #[test]
    fn unknown_kill_switch_mode_is_rejected() {
        let mut raw = RawConfig::default();
        raw.pipeline.kill_switch.retry_amplification.mode = "panic".to_string();
        assert!(RuntimeConfig::from_raw(raw).is_err());
    }
}
