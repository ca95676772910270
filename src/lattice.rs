//! The lattice messaging bus boundary.
//!
//! The bus itself (subject-based pub/sub + request/reply, typically backed
//! by NATS) is out of scope for this crate; it is modeled here as a narrow
//! trait so the provider lifecycle subsystem can be exercised against an
//! in-memory double without a real broker.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// A minimal lattice bus client: publish, and request/reply with a timeout.
#[async_trait]
pub trait LatticeClient: Send + Sync + 'static {
    /// Publish `payload` on `subject`. No reply is expected.
    async fn publish(&self, subject: &str, payload: Bytes) -> anyhow::Result<()>;

    /// Send a request on `subject` and wait up to `timeout` for a reply.
    /// The reply body is not interpreted by callers in this crate — only
    /// whether a reply arrived in time.
    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> anyhow::Result<Bytes>;
}

/// An in-memory [`LatticeClient`] double for tests: every publish is
/// recorded, and every request either replies immediately with a canned
/// response or times out, depending on configuration.
#[derive(Clone)]
pub struct TestLatticeClient {
    published: std::sync::Arc<tokio::sync::Mutex<Vec<(String, Bytes)>>>,
    healthy: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl Default for TestLatticeClient {
    fn default() -> Self {
        Self {
            published: Default::default(),
            healthy: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true)),
        }
    }
}

impl TestLatticeClient {
    /// Control whether subsequent `request` calls succeed (`true`) or time
    /// out (`false`).
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy
            .store(healthy, std::sync::atomic::Ordering::SeqCst);
    }

    /// Snapshot of every `(subject, payload)` published so far.
    pub async fn published(&self) -> Vec<(String, Bytes)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl LatticeClient for TestLatticeClient {
    async fn publish(&self, subject: &str, payload: Bytes) -> anyhow::Result<()> {
        self.published
            .lock()
            .await
            .push((subject.to_string(), payload));
        Ok(())
    }

    async fn request(
        &self,
        subject: &str,
        _payload: Bytes,
        _timeout: Duration,
    ) -> anyhow::Result<Bytes> {
        if self.healthy.load(std::sync::atomic::Ordering::SeqCst) {
            Ok(Bytes::from_static(b"ok"))
        } else {
            anyhow::bail!("request to {subject} timed out")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_published_events() {
        let client = TestLatticeClient::default();
        client
            .publish("wasmbus.evt.default", Bytes::from_static(b"{}"))
            .await
            .expect("publish");
        assert_eq!(client.published().await.len(), 1);
    }

    #[tokio::test]
    async fn request_fails_when_unhealthy() {
        let client = TestLatticeClient::default();
        client.set_healthy(false);
        let result = client
            .request("wasmbus.rpc.default.Vxxx.default.health", Bytes::new(), Duration::from_millis(10))
            .await;
        assert!(result.is_err());
    }
}
