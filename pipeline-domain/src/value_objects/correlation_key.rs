// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Correlation key: the value every item in a many-to-one batch must share
//! (data model, N→1 invariant).

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::PipelineError;

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verifies every key in a many-to-one batch agrees, per the
    /// data-model invariant that reductions reject mixed correlation keys
    /// with a `PolicyViolation`.
    pub fn require_uniform<'a, I>(keys: I) -> Result<Option<&'a CorrelationKey>, PipelineError>
    where
        I: IntoIterator<Item = &'a CorrelationKey>,
    {
        let mut iter = keys.into_iter();
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        for other in iter {
            if other != first {
                return Err(PipelineError::PolicyViolation(format!(
                    "many-to-one batch contains mixed correlation keys: '{}' and '{}'",
                    first.as_str(),
                    other.as_str()
                )));
            }
        }
        Ok(Some(first))
    }
}

impl Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
