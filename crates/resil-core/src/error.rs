//! Error handling for resilmesh
//!
//! Provides a unified error type and result type for use across all
//! resilmesh components.

/// Result type alias for resilmesh operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for resilmesh
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unacceptable ingress payload
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Topology descriptor could not be loaded or built; fatal at startup
    #[error("Topology load error: {0}")]
    TopologyLoad(String),

    /// No route satisfies the request
    #[error("No path available: {0}")]
    NoPathAvailable(String),

    /// A downstream call exceeded its deadline; surfaces as telemetry
    #[error("Forwarding timed out: {0}")]
    ForwardingTimeout(String),

    /// Rebalance could not produce a usable distribution; current one kept
    #[error("Rebalance infeasible: {0}")]
    RebalanceInfeasible(String),

    /// Referenced node id is not part of the topology
    #[error("Unknown node: {0}")]
    UnknownNode(u32),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    /// Internal controller error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid payload error
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    /// Create a topology load error
    pub fn topology_load(msg: impl Into<String>) -> Self {
        Self::TopologyLoad(msg.into())
    }

    /// Create a no-path-available error
    pub fn no_path(msg: impl Into<String>) -> Self {
        Self::NoPathAvailable(msg.into())
    }

    /// Create a forwarding timeout error
    pub fn forwarding_timeout(msg: impl Into<String>) -> Self {
        Self::ForwardingTimeout(msg.into())
    }

    /// Create a rebalance infeasibility error
    pub fn rebalance_infeasible(msg: impl Into<String>) -> Self {
        Self::RebalanceInfeasible(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error indicates a client-side problem
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidPayload(_) | Error::UnknownNode(_) | Error::Json(_)
        )
    }

    /// Check if this error is transient and expected to clear on its own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ForwardingTimeout(_) | Error::NoPathAvailable(_) | Error::RebalanceInfeasible(_)
        )
    }

    /// Get the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::InvalidPayload(_) => "invalid_payload",
            Error::TopologyLoad(_) => "topology_load",
            Error::NoPathAvailable(_) => "no_path_available",
            Error::ForwardingTimeout(_) => "forwarding_timeout",
            Error::RebalanceInfeasible(_) => "rebalance_infeasible",
            Error::UnknownNode(_) => "unknown_node",
            Error::InvalidConfiguration(_) => "configuration",
            Error::Internal(_) => "internal",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
        }
    }

    /// Convert to HTTP status code (useful for REST APIs)
    pub fn to_http_status(&self) -> u16 {
        match self {
            Error::InvalidPayload(_) | Error::Json(_) => 400, // Bad Request
            Error::UnknownNode(_) => 404,                     // Not Found
            Error::NoPathAvailable(_) => 503,                 // Service Unavailable
            Error::ForwardingTimeout(_) => 504,               // Gateway Timeout
            _ => 500,                                         // Internal Server Error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::invalid_payload("missing events");
        assert!(matches!(err, Error::InvalidPayload(_)));
        assert_eq!(err.to_string(), "Invalid payload: missing events");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::invalid_payload("x").category(), "invalid_payload");
        assert_eq!(Error::no_path("x").category(), "no_path_available");
        assert_eq!(Error::UnknownNode(7).category(), "unknown_node");
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::invalid_payload("bad batch").is_client_error());
        assert!(!Error::invalid_payload("bad batch").is_transient());

        assert!(Error::forwarding_timeout("edge tier").is_transient());
        assert!(!Error::forwarding_timeout("edge tier").is_client_error());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(Error::invalid_payload("x").to_http_status(), 400);
        assert_eq!(Error::UnknownNode(3).to_http_status(), 404);
        assert_eq!(Error::no_path("x").to_http_status(), 503);
        assert_eq!(Error::forwarding_timeout("x").to_http_status(), 504);
        assert_eq!(Error::topology_load("x").to_http_status(), 500);
    }
}
