//! Error taxonomy for the flow pipeline
//!
//! Structural errors (hierarchy, layout, distribution, config) are raised
//! once while a diagram is being built and abort construction. Geometry
//! lookup misses are raised per tick and are recoverable.

use thiserror::Error;

/// Errors raised while building or running a flow diagram
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    /// Malformed, ambiguous or duplicate-named nodes in the input
    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    /// The hierarchy has no leaves, so no layout can be computed
    #[error("hierarchy has no leaves")]
    EmptyHierarchy,

    /// Every count is zero, so no target can be drawn
    #[error("distribution has zero total weight")]
    EmptyDistribution,

    /// A particle position fell outside its route's cached points
    #[error("route '{route}' has {len} cached points, index {index} is out of range")]
    GeometryLookupMiss {
        route: String,
        index: usize,
        len: usize,
    },

    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for flow operations
pub type FlowResult<T> = Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_miss_message_names_route() {
        let err = FlowError::GeometryLookupMiss {
            route: "api".to_string(),
            index: 12,
            len: 10,
        };
        assert_eq!(
            err.to_string(),
            "route 'api' has 10 cached points, index 12 is out of range"
        );
    }

    #[test]
    fn structural_errors_display() {
        assert_eq!(
            FlowError::EmptyHierarchy.to_string(),
            "hierarchy has no leaves"
        );
        assert_eq!(
            FlowError::InvalidHierarchy("duplicate name 'a'".to_string()).to_string(),
            "invalid hierarchy: duplicate name 'a'"
        );
    }
}
