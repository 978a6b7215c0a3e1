//! Health Probe Port
//!
//! Defines the interface for issuing a single liveness probe against an
//! instance. Implementations must bound their own latency; the checker
//! additionally wraps every probe in a timeout.

use crate::domain::errors::ProbeError;
use async_trait::async_trait;

/// One-shot liveness probe against a host:port.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe the instance. `Ok(())` means alive; errors are routine and
    /// recorded by the caller, never raised to routing callers.
    async fn probe(&self, host: &str, port: u16) -> Result<(), ProbeError>;
}
