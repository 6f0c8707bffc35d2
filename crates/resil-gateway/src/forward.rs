//! Downstream HTTP client
//!
//! Forwards batches to tier servers and polls their health. Every call
//! carries a bounded timeout; a timed-out forward surfaces as an
//! elevated latency sample at the dispatcher, never as a retry here.

use async_trait::async_trait;
use resil_control::NodeHealth;
use resil_core::{Error, EventBatch, Result};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Client seam for downstream tier servers
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Deliver a batch to a tier server's ingest endpoint
    async fn forward_batch(&self, base_url: &str, batch: &EventBatch) -> Result<()>;

    /// Fetch a tier server's health reading
    async fn poll_health(&self, base_url: &str) -> Result<NodeHealth>;
}

/// reqwest-backed forwarder
pub struct HttpForwarder {
    client: reqwest::Client,
    ingress_timeout: Duration,
    health_timeout: Duration,
}

impl HttpForwarder {
    pub fn new(ingress_timeout: Duration, health_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            ingress_timeout,
            health_timeout,
        }
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward_batch(&self, base_url: &str, batch: &EventBatch) -> Result<()> {
        let url = format!("{}/ingest", base_url.trim_end_matches('/'));
        debug!(%url, events = batch.len(), "forwarding batch");

        let send = self.client.post(&url).json(batch).send();
        let response = timeout(self.ingress_timeout, send)
            .await
            .map_err(|_| Error::forwarding_timeout(url.clone()))?
            .map_err(|e| Error::internal(format!("forward to {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::internal(format!(
                "forward to {} returned {}",
                url,
                response.status()
            )));
        }
        Ok(())
    }

    async fn poll_health(&self, base_url: &str) -> Result<NodeHealth> {
        let url = format!("{}/health", base_url.trim_end_matches('/'));

        let send = self.client.get(&url).send();
        let response = timeout(self.health_timeout, send)
            .await
            .map_err(|_| Error::forwarding_timeout(url.clone()))?
            .map_err(|e| Error::internal(format!("health poll {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::internal(format!(
                "health poll {} returned {}",
                url,
                response.status()
            )));
        }
        let health: NodeHealth = response
            .json()
            .await
            .map_err(|e| Error::internal(format!("health poll {}: {}", url, e)))?;
        Ok(health)
    }
}
