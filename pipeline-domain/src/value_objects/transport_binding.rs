// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Transport binding: which `TransportBridge` (C4) implementation a step is
//! invoked through.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::PipelineError;

/// How a step's underlying work is reached: in the same process, over a
/// simulated RPC channel, or as a serverless function invocation.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TransportBinding {
    Local,
    Rpc { endpoint: String },
    Function { name: String },
}

impl TransportBinding {
    pub fn parse(kind: &str, target: Option<&str>) -> Result<Self, PipelineError> {
        match kind {
            "local" => Ok(Self::Local),
            "rpc" => {
                let endpoint = target
                    .ok_or_else(|| PipelineError::InvalidConfiguration("rpc transport requires an endpoint".into()))?
                    .to_string();
                Ok(Self::Rpc { endpoint })
            }
            "function" => {
                let name = target
                    .ok_or_else(|| {
                        PipelineError::InvalidConfiguration("function transport requires a function name".into())
                    })?
                    .to_string();
                Ok(Self::Function { name })
            }
            other => Err(PipelineError::InvalidConfiguration(format!(
                "unknown transport binding '{other}'"
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Rpc { .. } => "rpc",
            Self::Function { .. } => "function",
        }
    }
}

impl Display for TransportBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Rpc { endpoint } => write!(f, "rpc:{endpoint}"),
            Self::Function { name } => write!(f, "function:{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_requires_no_target() {
        assert_eq!(TransportBinding::parse("local", None).unwrap(), TransportBinding::Local);
    }

    #[test]
    fn rpc_without_endpoint_is_rejected() {
        assert!(TransportBinding::parse("rpc", None).is_err());
    }

    #[test]
    fn function_binding_carries_its_name() {
        let b = TransportBinding::parse("function", Some("resize-image")).unwrap();
        assert_eq!(b.kind(), "function");
        assert_eq!(b.to_string(), "function:resize-image");
    }
}
