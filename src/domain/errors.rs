//! Error taxonomy for the balancer subsystem.

/// Errors surfaced to balancer callers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BalancerError {
    /// Registration of an already-active host:port pair. Recoverable;
    /// callers should treat as already-registered.
    #[error("instance {host}:{port} is already registered")]
    DuplicateInstance { host: String, port: u16 },

    /// Routing with an empty healthy set. Propagated as a hard failure,
    /// never retried internally.
    #[error("no healthy instances available")]
    NoHealthyInstances,

    /// Lookup of an id the registry does not know.
    #[error("instance {0} not found")]
    InstanceNotFound(String),

    /// The registry backing store cannot be reached. Fatal for the
    /// health checker and the router; routing halts rather than failing
    /// open to an arbitrary instance.
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),
}

/// Outcome of a single liveness probe. Routine, recorded not raised.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    #[error("probe timeout")]
    Timeout,
    #[error("probe failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BalancerError::DuplicateInstance {
            host: "10.0.0.1".to_string(),
            port: 8080,
        };
        assert_eq!(err.to_string(), "instance 10.0.0.1:8080 is already registered");
        assert_eq!(
            BalancerError::NoHealthyInstances.to_string(),
            "no healthy instances available"
        );
    }

    #[test]
    fn test_probe_error_display() {
        assert_eq!(ProbeError::Timeout.to_string(), "probe timeout");
        assert_eq!(
            ProbeError::Failed("connection refused".to_string()).to_string(),
            "probe failed: connection refused"
        );
    }
}
