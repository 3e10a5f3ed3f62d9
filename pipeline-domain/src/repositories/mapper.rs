// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `Mapper` port: wire ↔ DTO ↔ domain translation at each step boundary.
//! The core only requires that one exists per step; concrete mappers are
//! out of scope.

use crate::PipelineError;

/// Translates between a step's wire representation and its domain type.
/// Generated or hand-written per step; the runtime only depends on this
/// trait object, never on concrete mapper implementations.
pub trait Mapper<Wire, Domain>: Send + Sync {
    fn to_domain(&self, wire: Wire) -> Result<Domain, PipelineError>;

    fn to_wire(&self, domain: Domain) -> Result<Wire, PipelineError>;
}

/// A JSON-envelope mapper usable wherever the wire format is already the
/// runtime's `serde_json::Value` envelope (e.g. the reference local
/// transport and the demonstration CLI pipeline).
pub struct JsonMapper;

impl Mapper<serde_json::Value, serde_json::Value> for JsonMapper {
    fn to_domain(&self, wire: serde_json::Value) -> Result<serde_json::Value, PipelineError> {
        Ok(wire)
    }

    fn to_wire(&self, domain: serde_json::Value) -> Result<serde_json::Value, PipelineError> {
        Ok(domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_mapper_is_an_identity_transform() {
        let mapper = JsonMapper;
        let value = serde_json::json!({"a": 1});
        assert_eq!(mapper.to_domain(value.clone()).unwrap(), value);
        assert_eq!(mapper.to_wire(value.clone()).unwrap(), value);
    }
}
