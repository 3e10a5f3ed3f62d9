// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Reactive Pipeline Runtime CLI
//!
//! The composition root: parses and validates CLI arguments, wires the
//! concrete cache backend, transport bridge, and side-effect hooks behind
//! the domain's port traits, and drives one pipeline run (or a structural
//! `validate`/`inspect` pass) to completion.
//!
//! This binary's `run` subcommand uses the reference in-memory cache
//! backend and a local transport bridge wired to one demonstration
//! operator per cardinality shape (see [`pipeline_bootstrap::demo_operators`]):
//! it exercises the full engine end to end without requiring a compiled
//! business-logic delegate for every manifest step.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use pipeline_bootstrap::demo_operators::{EchoOperator, ExpandOperator, ReduceOperator, StreamOperator};
use pipeline_bootstrap::{bootstrap_cli, config::RuntimeConfig, platform, signals, ExitCode, ValidatedCommand};

use pipeline_domain::{
    CachePolicy, Carrier, InvocationContext, KeyStrategy, PipelineDescriptor, PipelineError, ReplayMode, RunId, SideEffectHook,
    StepDescriptor, VersionTag,
};
use pipeline_runtime::cache::{CacheReaderPool, CacheWriterPool, InMemoryCacheBackend, KeyArbitrator};
use pipeline_runtime::output_bus::BroadcastOutputBus;
use pipeline_runtime::probe::InFlightProbe;
use pipeline_runtime::retry::ParkingLot;
use pipeline_runtime::side_effects::{InvalidateSideEffect, LineagePersistSideEffect, SideEffectKind};
use pipeline_runtime::transport::{LocalTransportBridge, StepOperator};
use pipeline_runtime::{manifest, Runner, StepInvoker};

/// Resolves a cache key as `"<typeName>:<id>"` off whichever of `id` /
/// `docId` the payload carries. Registered once as a generic (not
/// target-typed) strategy for the `run` subcommand's demonstration
/// wiring, since a compiled manifest has no per-type strategy of its own.
struct GenericIdKeyStrategy;

impl KeyStrategy for GenericIdKeyStrategy {
    fn resolve(&self, item: &serde_json::Value, _ctx: &InvocationContext) -> Result<Option<String>, PipelineError> {
        let id = item
            .get("id")
            .or_else(|| item.get("docId"))
            .and_then(|v| v.as_str());
        Ok(id.map(|id| id.to_string()))
    }

    fn supports_target(&self, _type_name: &str) -> bool {
        true
    }

    fn priority(&self) -> i32 {
        100
    }
}

fn init_tracing(verbose: bool) {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn to_exit_code(code: ExitCode) -> std::process::ExitCode {
    std::process::ExitCode::from(code.as_i32() as u8)
}

fn main() -> std::process::ExitCode {
    let validated_cli = match bootstrap_cli() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("argument error: {e}");
            return to_exit_code(ExitCode::UsageError);
        }
    };

    init_tracing(validated_cli.verbose);

    let config = match RuntimeConfig::load(validated_cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return to_exit_code(ExitCode::Config);
        }
    };

    let host_platform = platform::create_platform();
    let worker_threads = validated_cli.worker_threads.unwrap_or_else(|| host_platform.cpu_count());
    tracing::debug!(platform = host_platform.platform_name(), worker_threads, "bootstrapping reactive pipeline runtime");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads.max(1))
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to start the tokio runtime");
            return to_exit_code(ExitCode::Software);
        }
    };

    runtime.block_on(async move {
        match validated_cli.command {
            ValidatedCommand::Validate { manifest } => run_validate(&manifest),
            ValidatedCommand::Inspect { manifest } => run_inspect(&manifest),
            ValidatedCommand::Run {
                manifest,
                input,
                version_tag,
                replay,
                cache_policy,
            } => run_pipeline(&manifest, &input, version_tag, &replay, &cache_policy, &config).await,
        }
    })
}

fn run_validate(manifest_path: &Path) -> std::process::ExitCode {
    match manifest::load(manifest_path) {
        Ok(loaded) => {
            println!(
                "manifest OK: pipeline '{}' with {} step(s), {} aspect(s)",
                loaded.pipeline.name(),
                loaded.pipeline.steps().len(),
                loaded.aspects.len()
            );
            to_exit_code(ExitCode::Success)
        }
        Err(e) => {
            eprintln!("manifest invalid: {e}");
            to_exit_code(ExitCode::from_pipeline_error(&e))
        }
    }
}

fn run_inspect(manifest_path: &Path) -> std::process::ExitCode {
    let loaded = match manifest::load(manifest_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("manifest invalid: {e}");
            return to_exit_code(ExitCode::from_pipeline_error(&e));
        }
    };

    println!("pipeline: {}", loaded.pipeline.name());
    println!("version tag: {:?}", loaded.pipeline.version_tag().as_str());
    println!("replay mode: {:?}", loaded.pipeline.replay_mode());
    println!("steps:");
    for step in loaded.pipeline.steps() {
        let operator = loaded.operators.get(step.name().as_str()).map(String::as_str).unwrap_or("<none>");
        let output_type = loaded.step_type_names.get(step.name().as_str()).map(String::as_str).unwrap_or("<untyped>");
        println!(
            "  - {} [{:?}] transport={:?} cache={} ordering={:?} operator={} output_type={}",
            step.name(),
            step.cardinality(),
            step.transport(),
            step.cache_policy(),
            step.ordering(),
            operator,
            output_type
        );
    }
    if !loaded.aspects.is_empty() {
        println!("aspects:");
        for spec in &loaded.aspects {
            println!("  - {:?} after '{}'", spec.kind, spec.after_step);
        }
    }
    to_exit_code(ExitCode::Success)
}

async fn run_pipeline(
    manifest_path: &Path,
    input_path: &Path,
    version_tag_override: Option<String>,
    replay: &str,
    cache_policy: &str,
    config: &RuntimeConfig,
) -> std::process::ExitCode {
    let loaded = match manifest::load(manifest_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("manifest invalid: {e}");
            return to_exit_code(ExitCode::from_pipeline_error(&e));
        }
    };

    let input_text = match std::fs::read_to_string(input_path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("cannot read input file '{}': {e}", input_path.display());
            return to_exit_code(ExitCode::NoInput);
        }
    };
    let input_value: serde_json::Value = match serde_json::from_str(&input_text) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("input file is not valid JSON: {e}");
            return to_exit_code(ExitCode::DataError);
        }
    };

    // CLI flags override the manifest's own version tag, replay mode, and
    // every step's cache policy: the run-level context the caller asked
    // for takes precedence over the compiled-in defaults.
    let effective_cache_policy = match CachePolicy::parse(cache_policy) {
        Ok(policy) => policy,
        Err(e) => {
            eprintln!("{e}");
            return to_exit_code(ExitCode::Config);
        }
    };
    let replay_mode = match replay {
        "off" => ReplayMode::Off,
        "dry" => ReplayMode::Dry,
        "live" => ReplayMode::Live,
        other => {
            eprintln!("unknown replay mode '{other}'");
            return to_exit_code(ExitCode::UsageError);
        }
    };
    let version_tag = match version_tag_override {
        Some(tag) => VersionTag::new(tag),
        None => loaded.pipeline.version_tag().clone(),
    };

    let overridden_steps: Vec<StepDescriptor> = loaded
        .pipeline
        .steps()
        .iter()
        .cloned()
        .map(|step| step.with_cache_policy(effective_cache_policy))
        .collect();
    let pipeline = match PipelineDescriptor::new(loaded.pipeline.name(), overridden_steps, version_tag.clone(), replay_mode) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("pipeline reconstruction failed: {e}");
            return to_exit_code(ExitCode::Config);
        }
    };

    let local = LocalTransportBridge::new();
    for step in pipeline.steps() {
        register_demo_operator(&local, step);
    }

    let mut arbitrator = KeyArbitrator::new();
    arbitrator.register(Box::new(GenericIdKeyStrategy));
    let arbitrator = Arc::new(arbitrator);

    let backend = InMemoryCacheBackend::new();
    let mut readers = CacheReaderPool::new();
    readers.register(Arc::new(backend.clone()));
    let readers = Arc::new(readers);
    let mut writers = CacheWriterPool::new();
    writers.register(Arc::new(backend.clone()));
    let writers = Arc::new(writers);

    let invoker = Arc::new(StepInvoker::new(arbitrator.clone(), readers, writers.clone(), Arc::new(local)));

    let side_effect_hooks = match build_side_effect_hooks(&loaded.aspects, &loaded.step_type_names, arbitrator, writers).await {
        Ok(hooks) => hooks,
        Err(e) => {
            eprintln!("failed to wire side effects: {e}");
            return to_exit_code(ExitCode::Software);
        }
    };

    let kill_switch = config.kill_switch();
    let probe = kill_switch.enabled.then(|| {
        Arc::new(InFlightProbe::new(
            kill_switch.window_capacity(),
            kill_switch.absolute_threshold(),
            kill_switch.sustain_samples,
            kill_switch.mode,
            kill_switch.sample_interval(),
        ))
    });

    let runner = Arc::new(Runner::new(
        invoker,
        Arc::new(BroadcastOutputBus::new()),
        side_effect_hooks,
        loaded.step_type_names.clone(),
        probe,
        Arc::new(ParkingLot::new(ParkingLot::DEFAULT_CAPACITY)),
    ));

    let context = InvocationContext::new(RunId::new(), version_tag, replay_mode);
    let carrier = Carrier::unary(input_value);

    let signal_handler = signals::create_signal_handler();
    let cancel_runner = runner.clone();
    let signal_task = tokio::spawn(async move {
        signal_handler
            .wait_for_signal(Box::new(move || {
                tracing::warn!("shutdown signal received, cancelling run");
                cancel_runner.cancel();
            }))
            .await;
    });

    let result = runner.run(&pipeline, &loaded.aspects, carrier, context).await;
    signal_task.abort();

    match result {
        Ok(carrier) => {
            let output = match carrier {
                Carrier::Unary(value) => value,
                Carrier::Stream(_) => {
                    let items = match carrier_into_vec(carrier).await {
                        Ok(items) => items,
                        Err(e) => {
                            eprintln!("run failed while draining terminal stream: {e}");
                            return to_exit_code(ExitCode::from_pipeline_error(&e));
                        }
                    };
                    serde_json::Value::Array(items)
                }
            };
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
            if runner.parking_lot().size() > 0 {
                tracing::warn!(parked = runner.parking_lot().size(), "run completed with parked items");
            }
            to_exit_code(ExitCode::Success)
        }
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind(), "run terminated");
            eprintln!("run failed: {e}");
            to_exit_code(ExitCode::from_pipeline_error(&e))
        }
    }
}

/// `carrier` was already matched as `Carrier::Stream` by the caller; this
/// just centralizes the `collect` call so the match arm above stays terse.
async fn carrier_into_vec(carrier: Carrier<serde_json::Value>) -> Result<Vec<serde_json::Value>, PipelineError> {
    carrier.collect().await
}

/// Registers the demonstration operator matching `step`'s declared
/// cardinality. One operator shape is wired per step, as no manifest
/// delegate is compiled into this binary.
fn register_demo_operator(local: &LocalTransportBridge, step: &StepDescriptor) {
    use pipeline_domain::CardinalityShape;

    let name = step.name().clone();
    let operator: Arc<dyn StepOperator> = match step.cardinality() {
        CardinalityShape::OneToOne => Arc::new(EchoOperator::new(name.as_str())),
        CardinalityShape::OneToMany => Arc::new(ExpandOperator::new(name.as_str())),
        CardinalityShape::ManyToOne => Arc::new(ReduceOperator::new(name.as_str())),
        CardinalityShape::ManyToMany => Arc::new(StreamOperator::new(name.as_str())),
    };
    local.register(&name, operator);
}

/// Builds one `SideEffectHook` per manifest-declared aspect, sharing a
/// single in-memory SQLite pool across every `persist` hook (the
/// demonstration wiring's lineage backend).
async fn build_side_effect_hooks(
    aspects: &[pipeline_runtime::side_effects::SideEffectSpec],
    step_type_names: &HashMap<String, String>,
    arbitrator: Arc<KeyArbitrator>,
    writers: Arc<CacheWriterPool>,
) -> Result<Vec<Arc<dyn SideEffectHook>>, PipelineError> {
    if aspects.is_empty() {
        return Ok(Vec::new());
    }

    let needs_persistence = aspects.iter().any(|spec| spec.kind == SideEffectKind::Persist);
    let pool = if needs_persistence {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(|e| PipelineError::InternalError(format!("failed to open lineage database: {e}")))?;
        LineagePersistSideEffect::ensure_schema(&pool).await?;
        Some(pool)
    } else {
        None
    };

    let mut hooks: Vec<Arc<dyn SideEffectHook>> = Vec::with_capacity(aspects.len());
    for spec in aspects {
        match spec.kind {
            SideEffectKind::Persist => {
                let pool = pool.clone().expect("pool initialized above when any Persist aspect is present");
                hooks.push(Arc::new(LineagePersistSideEffect::new(spec.after_step.clone(), pool)));
            }
            SideEffectKind::Invalidate => {
                let type_name = step_type_names.get(&spec.after_step).cloned().unwrap_or_else(|| spec.after_step.clone());
                hooks.push(Arc::new(InvalidateSideEffect::new(
                    spec.after_step.clone(),
                    type_name,
                    arbitrator.clone(),
                    writers.clone(),
                )));
            }
        }
    }
    Ok(hooks)
}
