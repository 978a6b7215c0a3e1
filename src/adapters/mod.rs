//! Adapters Layer
//!
//! Inbound (HTTP admin surface) and outbound (storage, probes)
//! implementations of the domain ports.

pub mod inbound;
pub mod outbound;
