// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Manifest Loader
//!
//! Parses a declarative YAML (or JSON, since YAML is a superset) pipeline
//! manifest into a [`PipelineDescriptor`] plus the [`SideEffectSpec`] list
//! the side-effect expander (C7) consumes, and a step name -> output type
//! name table the cache key arbitrator (C2) uses for targeted-strategy
//! matching.
//!
//! ## Layering
//!
//! Mirrors [`crate`]'s sibling `config` module in `pipeline-bootstrap`:
//! deserialize into a permissive `Raw*` tree with `serde`, then validate and
//! convert into the corresponding domain type via its own constructor or
//! `parse()` method, so every manifest-sourced value passes through the same
//! validation a hand-built `StepDescriptor` would.
//!
//! ## What stays out of scope
//!
//! The build-time code generator that reads this same manifest to emit
//! transport adapters, mappers, and proto descriptors is an external
//! collaborator; this loader only produces the static registry the
//! generator's output would otherwise have supplied by hand: step order,
//! cardinality, transport binding, and the aspect table.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use pipeline_domain::{
    BatchingPolicy, CachePolicy, CardinalityShape, IdempotencyPolicy, OrderingRequirement, PipelineDescriptor,
    PipelineError, ReplayMode, RetryPolicy, StepDescriptor, StepName, ThreadSafety, TransportBinding, VersionTag,
};

use crate::side_effects::{SideEffectKind, SideEffectSpec};

#[derive(Debug, Clone, Deserialize)]
struct RawRetry {
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    max_backoff_ms: u64,
    #[serde(default = "default_multiplier")]
    multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    100
}
fn default_max_backoff_ms() -> u64 {
    1_000
}
fn default_multiplier() -> f64 {
    2.0
}

impl From<RawRetry> for RetryPolicy {
    fn from(raw: RawRetry) -> Self {
        RetryPolicy::new(
            raw.max_attempts,
            std::time::Duration::from_millis(raw.initial_backoff_ms),
            std::time::Duration::from_millis(raw.max_backoff_ms),
            raw.multiplier,
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    name: String,
    cardinality: String,
    #[serde(default)]
    operator: Option<String>,
    #[serde(default)]
    expose_rest: bool,
    #[serde(default)]
    expose_grpc: bool,
    #[serde(default)]
    input_type_name: Option<String>,
    #[serde(default)]
    output_type_name: Option<String>,
    /// Per-step transport override; falls back to the manifest's top-level
    /// `transport` when absent.
    #[serde(default)]
    transport: Option<String>,
    /// RPC endpoint or function name, required when `transport` (this
    /// step's or the manifest default) is `rpc` or `function`.
    #[serde(default)]
    transport_target: Option<String>,
    #[serde(default = "default_cache_policy")]
    cache_policy: String,
    #[serde(default)]
    ordering: String,
    #[serde(default)]
    thread_safety: String,
    #[serde(default = "default_batching_window")]
    batching_window: usize,
    #[serde(default)]
    retry: Option<RawRetry>,
    /// Idempotency key strategy: `context-stable` (default) or
    /// `explicit:<key>`.
    #[serde(default)]
    idempotency: Option<String>,
}

fn default_cache_policy() -> String {
    "prefer-cache".to_string()
}
fn default_batching_window() -> usize {
    128
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawAspectScope {
    Global,
    Steps,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAspect {
    enabled: bool,
    #[serde(default = "default_aspect_scope")]
    scope: RawAspectScope,
    /// Step names this aspect applies to when `scope: steps`; ignored (and
    /// may be omitted) when `scope: global`.
    #[serde(default)]
    steps: Vec<String>,
    /// Kept for manifest fidelity; the core only ever inserts synthetic
    /// successors, so `before_step` is rejected at validation time.
    #[serde(default = "default_position")]
    position: String,
    #[serde(default)]
    order: i32,
    #[serde(default)]
    config: serde_json::Value,
}

fn default_aspect_scope() -> RawAspectScope {
    RawAspectScope::Global
}
fn default_position() -> String {
    "after_step".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    app_name: String,
    #[serde(default)]
    base_package: Option<String>,
    transport: String,
    #[serde(default)]
    platform: String,
    steps: Vec<RawStep>,
    #[serde(default)]
    aspects: HashMap<String, RawAspect>,
    #[serde(default)]
    version_tag: Option<String>,
    #[serde(default)]
    replay_mode: Option<String>,
}

/// A loaded manifest: the pipeline descriptor ready to hand to a
/// [`crate::Runner`], the expanded side-effect specs, and the output-type
/// table for targeted cache-key arbitration.
pub struct LoadedManifest {
    pub pipeline: PipelineDescriptor,
    pub aspects: Vec<SideEffectSpec>,
    pub step_type_names: HashMap<String, String>,
    pub operators: HashMap<String, String>,
}

/// Loads and validates a pipeline manifest from `path`.
///
/// # Errors
///
/// Returns `PipelineError::InvalidConfiguration` for a missing/unreadable
/// file or a manifest that fails YAML/JSON parsing, and
/// `PipelineError::ValidationError` for structurally invalid content (e.g.
/// an aspect referencing an undeclared step, or a `before_step` position).
pub fn load(path: &Path) -> Result<LoadedManifest, PipelineError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::InvalidConfiguration(format!("cannot read manifest '{}': {e}", path.display())))?;
    let raw: RawManifest = serde_yaml::from_str(&text)
        .map_err(|e| PipelineError::InvalidConfiguration(format!("cannot parse manifest '{}': {e}", path.display())))?;
    from_raw(raw)
}

/// Parses a manifest already held in memory (used by `Validate`/`Inspect`
/// CLI commands that read the file themselves, and by tests).
pub fn parse(text: &str) -> Result<LoadedManifest, PipelineError> {
    let raw: RawManifest =
        serde_yaml::from_str(text).map_err(|e| PipelineError::InvalidConfiguration(format!("cannot parse manifest: {e}")))?;
    from_raw(raw)
}

/// Maps the manifest's build-time exposition choice (`grpc`, `rest`,
/// `local`, `function`) onto the `TransportBinding` kind a step is actually
/// invoked through. `grpc` and `rest` both mean "reached over the wire", so
/// both resolve to the `rpc` bridge; the exposition style itself (which
/// wire framing serves external callers) is the code generator's concern,
/// out of scope here.
fn transport_binding_kind(manifest_transport: &str) -> &str {
    match manifest_transport {
        "grpc" | "rest" => "rpc",
        other => other,
    }
}

fn from_raw(raw: RawManifest) -> Result<LoadedManifest, PipelineError> {
    if raw.app_name.trim().is_empty() {
        return Err(PipelineError::ValidationError("manifest appName must not be blank".into()));
    }
    let default_transport_kind = transport_binding_kind(&raw.transport).to_string();

    let mut step_type_names = HashMap::new();
    let mut operators = HashMap::new();
    let mut step_names = std::collections::HashSet::new();
    let mut descriptors = Vec::with_capacity(raw.steps.len());

    for raw_step in &raw.steps {
        if !step_names.insert(raw_step.name.clone()) {
            return Err(PipelineError::ValidationError(format!(
                "duplicate step name '{}' in manifest",
                raw_step.name
            )));
        }

        let name = StepName::new(raw_step.name.clone())?;
        let cardinality = CardinalityShape::parse(&raw_step.cardinality)?;
        let transport_kind = raw_step
            .transport
            .as_deref()
            .map(transport_binding_kind)
            .unwrap_or(&default_transport_kind);
        let transport = TransportBinding::parse(transport_kind, raw_step.transport_target.as_deref())?;
        let cache_policy = CachePolicy::parse(&raw_step.cache_policy)?;
        let ordering = parse_ordering(&raw_step.ordering)?;
        let thread_safety = parse_thread_safety(&raw_step.thread_safety)?;
        let batching = BatchingPolicy::new(raw_step.batching_window)?;
        let retry = raw_step.retry.clone().map(RetryPolicy::from).unwrap_or_default();
        let idempotency = parse_idempotency(raw_step.idempotency.as_deref());

        descriptors.push(StepDescriptor::new(
            name, cardinality, transport, cache_policy, ordering, thread_safety, batching, retry, idempotency,
        ));

        if let Some(output_type) = &raw_step.output_type_name {
            step_type_names.insert(raw_step.name.clone(), output_type.clone());
        }
        if let Some(operator) = &raw_step.operator {
            operators.insert(raw_step.name.clone(), operator.clone());
        }
        let _ = (raw_step.expose_rest, raw_step.expose_grpc, &raw_step.input_type_name);
    }

    let version_tag = match &raw.version_tag {
        Some(tag) => VersionTag::new(tag.clone()),
        None => VersionTag::none(),
    };
    let replay_mode = parse_replay_mode(raw.replay_mode.as_deref())?;

    let pipeline = PipelineDescriptor::new(raw.app_name.clone(), descriptors, version_tag, replay_mode)?;

    let mut aspects = Vec::new();
    for (aspect_name, aspect) in &raw.aspects {
        if !aspect.enabled {
            continue;
        }
        if aspect.position != "after_step" {
            return Err(PipelineError::ValidationError(format!(
                "aspect '{aspect_name}': only 'after_step' is supported; synthetic side effects always run after their target"
            )));
        }

        let kind = match aspect_name.as_str() {
            "persistence" => SideEffectKind::Persist,
            "cache-invalidate" | "cache-invalidate-all" => SideEffectKind::Invalidate,
            // the cache write is the invoker's own behavior, not a synthetic step
            "cache" => continue,
            other => {
                return Err(PipelineError::ValidationError(format!("unknown aspect '{other}' in manifest")));
            }
        };

        let targets: Vec<String> = match aspect.scope {
            RawAspectScope::Global => pipeline.steps().iter().map(|s| s.name().as_str().to_string()).collect(),
            RawAspectScope::Steps => {
                for step_name in &aspect.steps {
                    if pipeline.step(step_name).is_none() {
                        return Err(PipelineError::ValidationError(format!(
                            "aspect '{aspect_name}' references undeclared step '{step_name}'"
                        )));
                    }
                }
                aspect.steps.clone()
            }
        };

        for after_step in targets {
            aspects.push(SideEffectSpec { after_step, kind });
        }
        let _ = aspect.order;
        let _ = &aspect.config;
    }

    Ok(LoadedManifest {
        pipeline,
        aspects,
        step_type_names,
        operators,
    })
}

fn parse_ordering(value: &str) -> Result<OrderingRequirement, PipelineError> {
    match value.trim().to_lowercase().as_str() {
        "" | "relaxed" => Ok(OrderingRequirement::Relaxed),
        "strict" => Ok(OrderingRequirement::Strict),
        other => Err(PipelineError::InvalidConfiguration(format!("unknown ordering '{other}'"))),
    }
}

fn parse_thread_safety(value: &str) -> Result<ThreadSafety, PipelineError> {
    match value.trim().to_lowercase().as_str() {
        "" | "safe" => Ok(ThreadSafety::Safe),
        "unsafe" => Ok(ThreadSafety::Unsafe),
        other => Err(PipelineError::InvalidConfiguration(format!("unknown thread-safety '{other}'"))),
    }
}

/// Unknown or legacy idempotency values degrade to `context-stable`,
/// mirroring the function-transport's own degrade-with-warning behavior
/// rather than failing manifest load.
fn parse_idempotency(value: Option<&str>) -> IdempotencyPolicy {
    match value {
        Some(v) if v.starts_with("explicit:") => {
            IdempotencyPolicy::Explicit(v.trim_start_matches("explicit:").to_string())
        }
        _ => IdempotencyPolicy::ContextStable,
    }
}

fn parse_replay_mode(value: Option<&str>) -> Result<ReplayMode, PipelineError> {
    match value.unwrap_or("off").trim().to_lowercase().as_str() {
        "off" => Ok(ReplayMode::Off),
        "dry" => Ok(ReplayMode::Dry),
        "live" => Ok(ReplayMode::Live),
        other => Err(PipelineError::InvalidConfiguration(format!("unknown replay mode '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
appName: demo-pipeline
basePackage: com.example.demo
transport: local
platform: compute
steps:
  - name: fetch
    cardinality: one_to_one
    operator: "demo::fetch"
    outputTypeName: Doc
  - name: tokenize
    cardinality: expansion
    operator: "demo::tokenize"
  - name: index
    cardinality: reduction
    operator: "demo::index"
    outputTypeName: IndexAck
aspects:
  persistence:
    enabled: true
    scope: steps
    steps: ["fetch"]
    position: after_step
    order: 1
  cache-invalidate:
    enabled: false
    scope: global
    position: after_step
    order: 2
"#;

    #[test]
    fn parses_a_complete_manifest() {
        let loaded = parse(MANIFEST).unwrap();
        assert_eq!(loaded.pipeline.name(), "demo-pipeline");
        assert_eq!(loaded.pipeline.steps().len(), 3);
        assert_eq!(loaded.pipeline.step("tokenize").unwrap().cardinality(), CardinalityShape::OneToMany);
        assert_eq!(loaded.pipeline.step("index").unwrap().cardinality(), CardinalityShape::ManyToOne);
        assert_eq!(loaded.step_type_names.get("fetch").unwrap(), "Doc");
        assert_eq!(loaded.operators.get("fetch").unwrap(), "demo::fetch");
    }

    #[test]
    fn disabled_aspects_are_skipped() {
        let loaded = parse(MANIFEST).unwrap();
        assert_eq!(loaded.aspects.len(), 1);
        assert_eq!(loaded.aspects[0].after_step, "fetch");
        assert!(matches!(loaded.aspects[0].kind, SideEffectKind::Persist));
    }

    #[test]
    fn duplicate_step_names_are_rejected() {
        let manifest = MANIFEST.replace("tokenize", "fetch");
        assert!(parse(&manifest).is_err());
    }

    #[test]
    fn aspect_referencing_an_undeclared_step_is_rejected() {
        let manifest = MANIFEST.replace(r#"steps: ["fetch"]"#, r#"steps: ["missing"]"#);
        assert!(parse(&manifest).is_err());
    }

    #[test]
    fn global_scope_applies_to_every_step() {
        let manifest = MANIFEST.replace("enabled: false", "enabled: true").replace(
            r#"cache-invalidate:
    enabled: true
    scope: global"#,
            r#"cache-invalidate:
    enabled: true
    scope: global"#,
        );
        let loaded = parse(&manifest).unwrap();
        let invalidate_count = loaded.aspects.iter().filter(|a| matches!(a.kind, SideEffectKind::Invalidate)).count();
        assert_eq!(invalidate_count, 3);
    }

    #[test]
    fn blank_app_name_is_rejected() {
        let manifest = MANIFEST.replace("demo-pipeline", "");
        assert!(parse(&manifest).is_err());
    }

    #[test]
    fn explicit_idempotency_key_is_parsed() {
        assert_eq!(parse_idempotency(Some("explicit:order-id")), IdempotencyPolicy::Explicit("order-id".into()));
        assert_eq!(parse_idempotency(Some("bogus")), IdempotencyPolicy::ContextStable);
        assert_eq!(parse_idempotency(None), IdempotencyPolicy::ContextStable);
    }
}
