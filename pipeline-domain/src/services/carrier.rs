// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Carrier abstraction: the shape of data flowing between steps is either
//! a single value or a stream, independent of the step's own declared
//! cardinality (lists the four unary/stream transitions the Runner
//! must bridge).

use futures::stream::{self, BoxStream, StreamExt};

use crate::PipelineError;

/// What the Runner hands to (or receives from) a step invocation: a bare
/// value, or a lazily-produced sequence of values.
pub enum Carrier<T> {
    Unary(T),
    Stream(BoxStream<'static, Result<T, PipelineError>>),
}

impl<T: Send + 'static> Carrier<T> {
    pub fn unary(value: T) -> Self {
        Self::Unary(value)
    }

    pub fn stream(items: BoxStream<'static, Result<T, PipelineError>>) -> Self {
        Self::Stream(items)
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        Self::Stream(stream::iter(items.into_iter().map(Ok)).boxed())
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Collects a stream carrier into a `Vec`, or wraps a unary value as a
    /// single-element vector. Used by the N→1 batching path.
    pub async fn collect(self) -> Result<Vec<T>, PipelineError> {
        match self {
            Self::Unary(value) => Ok(vec![value]),
            Self::Stream(mut items) => {
                let mut out = Vec::new();
                while let Some(item) = items.next().await {
                    out.push(item?);
                }
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unary_collects_into_a_single_element_vec() {
        let carrier = Carrier::unary(42);
        assert_eq!(carrier.collect().await.unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn stream_collects_in_arrival_order() {
        let carrier = Carrier::from_vec(vec![1, 2, 3]);
        assert!(carrier.is_stream());
        let carrier = Carrier::from_vec(vec![1, 2, 3]);
        assert_eq!(carrier.collect().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stream_propagates_the_first_error() {
        let items: Vec<Result<i32, PipelineError>> = vec![
            Ok(1),
            Err(PipelineError::TransientStepError("boom".into())),
        ];
        let carrier: Carrier<i32> = Carrier::Stream(stream::iter(items).boxed());
        assert!(carrier.collect().await.is_err());
    }
}
