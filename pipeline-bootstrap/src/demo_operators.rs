// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Reference local operators for the `run` subcommand's demonstration
//! transport (design notes: "a thin demonstration surface"). These
//! implement only the structural contract each cardinality shape promises
//! — they carry no business logic of their own, since the manifest's
//! `operator` field names an external delegate this binary does not load.
//!
//! `fetch_operator`/`tokenize_operator`/etc. do not exist here; instead one
//! operator per cardinality shape is registered against every step of that
//! shape, so any manifest runs end to end without a matching compiled
//! delegate.

use async_trait::async_trait;

use pipeline_domain::{Envelope, EnvelopeStream, InvocationContext, PipelineError};
use pipeline_runtime::StepOperator;

/// 1→1: tags the input with the step name that touched it, leaving the
/// rest of the payload untouched.
pub struct EchoOperator {
    step_name: String,
}

impl EchoOperator {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self { step_name: step_name.into() }
    }
}

#[async_trait]
impl StepOperator for EchoOperator {
    async fn call_unary_unary(&self, input: Envelope, _ctx: &InvocationContext) -> Result<Envelope, PipelineError> {
        Ok(tag(input, &self.step_name))
    }
}

/// 1→N: expands an input's `items` array into one envelope per element;
/// an input with no `items` array expands into a single-element sequence
/// so the shape contract (possibly-empty emission, never an error) holds.
pub struct ExpandOperator {
    step_name: String,
}

impl ExpandOperator {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self { step_name: step_name.into() }
    }
}

#[async_trait]
impl StepOperator for ExpandOperator {
    async fn call_unary_many(&self, input: Envelope, _ctx: &InvocationContext) -> Result<EnvelopeStream, PipelineError> {
        let items = match input.get("items").and_then(|v| v.as_array()) {
            Some(array) => array.clone(),
            None => vec![input.clone()],
        };
        let tagged: Vec<Envelope> = items.into_iter().map(|item| tag(item, &self.step_name)).collect();
        Ok(futures::stream::iter(tagged.into_iter().map(Ok)).boxed())
    }
}

/// N→1: folds a correlation-uniform batch into one envelope carrying the
/// batch as its `items` array.
pub struct ReduceOperator {
    step_name: String,
}

impl ReduceOperator {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self { step_name: step_name.into() }
    }
}

#[async_trait]
impl StepOperator for ReduceOperator {
    async fn call_many_unary(&self, inputs: Vec<Envelope>, _ctx: &InvocationContext) -> Result<Envelope, PipelineError> {
        let count = inputs.len();
        let aggregate = serde_json::json!({ "items": inputs, "count": count });
        Ok(tag(aggregate, &self.step_name))
    }
}

/// N→N: tags every item in the batch, preserving element count.
pub struct StreamOperator {
    step_name: String,
}

impl StreamOperator {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self { step_name: step_name.into() }
    }
}

#[async_trait]
impl StepOperator for StreamOperator {
    async fn call_many_many(&self, inputs: Vec<Envelope>, _ctx: &InvocationContext) -> Result<EnvelopeStream, PipelineError> {
        let tagged: Vec<Envelope> = inputs.into_iter().map(|item| tag(item, &self.step_name)).collect();
        Ok(futures::stream::iter(tagged.into_iter().map(Ok)).boxed())
    }
}

fn tag(mut value: Envelope, step_name: &str) -> Envelope {
    if let Some(obj) = value.as_object_mut() {
        obj.insert("processedBy".to_string(), serde_json::json!(step_name));
    } else {
        value = serde_json::json!({ "value": value, "processedBy": step_name });
    }
    value
}

use futures::stream::StreamExt;

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::{ReplayMode, RunId, VersionTag};

    fn ctx() -> InvocationContext {
        InvocationContext::new(RunId::new(), VersionTag::none(), ReplayMode::Off)
    }

    #[tokio::test]
    async fn echo_tags_an_object_payload() {
        let op = EchoOperator::new("fetch");
        let out = op.call_unary_unary(serde_json::json!({"id": 1}), &ctx()).await.unwrap();
        assert_eq!(out["processedBy"], serde_json::json!("fetch"));
        assert_eq!(out["id"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn expand_splits_an_items_array() {
        let op = ExpandOperator::new("tokenize");
        let input = serde_json::json!({"items": ["a", "b", "c"]});
        let stream = op.call_unary_many(input, &ctx()).await.unwrap();
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn expand_without_items_produces_one_element() {
        let op = ExpandOperator::new("tokenize");
        let stream = op.call_unary_many(serde_json::json!({"doc": "x"}), &ctx()).await.unwrap();
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn reduce_folds_a_batch_into_one_envelope() {
        let op = ReduceOperator::new("index");
        let out = op
            .call_many_unary(vec![serde_json::json!(1), serde_json::json!(2)], &ctx())
            .await
            .unwrap();
        assert_eq!(out["count"], serde_json::json!(2));
    }
}
