// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Cardinality shape value object.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::PipelineError;

/// How many items a step consumes and produces per invocation.
///
/// See the data-model cardinality invariants: a 1→1 step fails or produces
/// exactly one item; 1→N may emit an empty sequence; N→1 requires a shared
/// correlation key across the batch; N→N propagates backpressure end to end.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum CardinalityShape {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl CardinalityShape {
    /// Parses a manifest `cardinality` field, honoring the `expansion` /
    /// `reduction` aliases for `one_to_many` / `many_to_one`.
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        match value {
            "one_to_one" => Ok(Self::OneToOne),
            "one_to_many" | "expansion" => Ok(Self::OneToMany),
            "many_to_one" | "reduction" => Ok(Self::ManyToOne),
            "many_to_many" => Ok(Self::ManyToMany),
            other => Err(PipelineError::InvalidConfiguration(format!(
                "unknown cardinality '{other}'"
            ))),
        }
    }

    /// Whether this shape consumes a stream of correlated items rather
    /// than a single unary value.
    pub fn consumes_stream(&self) -> bool {
        matches!(self, Self::ManyToOne | Self::ManyToMany)
    }

    /// Whether this shape produces a stream rather than a single value.
    pub fn produces_stream(&self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }
}

impl Display for CardinalityShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OneToOne => "one_to_one",
            Self::OneToMany => "one_to_many",
            Self::ManyToOne => "many_to_one",
            Self::ManyToMany => "many_to_many",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_map_to_canonical_shapes() {
        assert_eq!(CardinalityShape::parse("expansion").unwrap(), CardinalityShape::OneToMany);
        assert_eq!(CardinalityShape::parse("reduction").unwrap(), CardinalityShape::ManyToOne);
    }

    #[test]
    fn unknown_cardinality_is_rejected() {
        assert!(CardinalityShape::parse("one_to_seven").is_err());
    }

    #[test]
    fn stream_classification_matches_data_model() {
        assert!(!CardinalityShape::OneToOne.consumes_stream());
        assert!(!CardinalityShape::OneToOne.produces_stream());
        assert!(CardinalityShape::OneToMany.produces_stream());
        assert!(CardinalityShape::ManyToOne.consumes_stream());
        assert!(CardinalityShape::ManyToMany.consumes_stream() && CardinalityShape::ManyToMany.produces_stream());
    }
}
