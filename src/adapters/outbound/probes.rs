//! Liveness Probes
//!
//! TCP-connect and HTTP GET probe implementations. Both carry their own
//! timeout so no probe can hang past its budget.

use crate::domain::errors::ProbeError;
use crate::domain::ports::HealthProbe;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Simple TCP connection probe: alive means the port accepts.
pub struct TcpHealthProbe {
    timeout: Duration,
}

impl TcpHealthProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl HealthProbe for TcpHealthProbe {
    async fn probe(&self, host: &str, port: u16) -> Result<(), ProbeError> {
        let addr = format!("{}:{}", host, port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(mut stream)) => {
                let _ = stream.shutdown().await;
                Ok(())
            }
            Ok(Err(e)) => Err(ProbeError::Failed(format!("connection failed: {}", e))),
            Err(_) => Err(ProbeError::Timeout),
        }
    }
}

/// HTTP GET probe: alive means a 2xx response on the given path.
pub struct HttpHealthProbe {
    client: reqwest::Client,
    path: String,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration, path: impl Into<String>) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Failed(format!("client error: {}", e)))?;
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Ok(Self { client, path })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, host: &str, port: u16) -> Result<(), ProbeError> {
        let url = format!("http://{}:{}{}", host, port, self.path);

        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(ProbeError::Failed(format!(
                "unhealthy status: {}",
                resp.status()
            ))),
            Err(e) if e.is_timeout() => Err(ProbeError::Timeout),
            Err(e) => Err(ProbeError::Failed(format!("request failed: {}", e))),
        }
    }
}
