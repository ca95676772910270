//! Event encoding and publication: wraps lifecycle payloads in a CloudEvents
//! 1.0 envelope and hands the serialized bytes to a [`crate::lattice::LatticeClient`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cloudevents::{EventBuilder, EventBuilderV10};
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{instrument, warn};
use ulid::Ulid;
use uuid::Uuid;

use crate::claims::ProviderClaims;
use crate::identity::ProviderIdentity;
use crate::lattice::LatticeClient;

/// Publishes lifecycle events onto the lattice.
///
/// The default no-op implementation lets callers exercise the rest of this
/// crate without a real lattice connection; production hosts supply an
/// implementation backed by a [`crate::lattice::LatticeClient`].
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `name` (e.g. `"provider_started"`) with the given JSON body.
    async fn publish_event(&self, name: &str, data: Value) -> anyhow::Result<()>;
}

/// An [`EventPublisher`] that drops every event. Useful in tests and as a
/// safe default before a real publisher is wired up.
#[derive(Debug, Default)]
pub struct DefaultEventPublisher;

#[async_trait]
impl EventPublisher for DefaultEventPublisher {
    async fn publish_event(&self, _name: &str, _data: Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Publishes lattice events as CloudEvents 1.0 envelopes over a
/// [`LatticeClient`], on the `wasmbus.evt.<lattice_prefix>` subject.
pub struct LatticeEventPublisher {
    event_builder: EventBuilderV10,
    lattice_prefix: String,
    client: Arc<dyn LatticeClient>,
}

impl LatticeEventPublisher {
    /// Build a publisher whose envelope `source` is the host's public key.
    pub fn new(host_key: String, lattice_prefix: String, client: Arc<dyn LatticeClient>) -> Self {
        Self {
            event_builder: EventBuilderV10::new().source(host_key),
            lattice_prefix,
            client,
        }
    }
}

#[async_trait]
impl EventPublisher for LatticeEventPublisher {
    #[instrument(level = "debug", skip(self, data))]
    async fn publish_event(&self, name: &str, data: Value) -> anyhow::Result<()> {
        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let id = Uuid::from_u128(Ulid::new().into()).to_string();
        let event = self
            .event_builder
            .clone()
            .ty(format!("com.wasmcloud.lattice.{name}"))
            .id(id)
            .time(now)
            .data("application/json", data)
            .build()?;
        let bytes = serde_json::to_vec(&event)?;
        let subject = format!("wasmbus.evt.{}", self.lattice_prefix);
        if let Err(err) = self.client.publish(&subject, bytes.into()).await {
            warn!(%err, %subject, event = %name, "failed to publish lattice event");
        }
        Ok(())
    }
}

/// `host_started` payload.
pub fn host_started(labels: &HashMap<String, String>, friendly_name: &str) -> Value {
    json!({ "labels": labels, "friendly_name": friendly_name })
}

/// `host_stopped` payload.
pub fn host_stopped(labels: &HashMap<String, String>) -> Value {
    json!({ "labels": labels })
}

/// `provider_started` payload.
pub fn provider_started(
    identity: &ProviderIdentity,
    contract_id: &str,
    instance_id: &str,
    image_ref: &str,
    annotations: &HashMap<String, String>,
    claims: &ProviderClaims,
) -> Value {
    json!({
        "public_key": identity.public_key,
        "link_name": identity.link_name,
        "contract_id": contract_id,
        "instance_id": instance_id,
        "image_ref": image_ref,
        "annotations": annotations,
        "claims": {
            "issuer": claims.issuer,
            "tags": claims.tags,
            "name": claims.name,
            "version": claims.version,
            "not_before_human": claims.not_before_human,
            "expires_human": claims.expires_human,
        },
    })
}

/// `provider_stopped` payload.
pub fn provider_stopped(
    identity: &ProviderIdentity,
    contract_id: &str,
    instance_id: &str,
    reason: &str,
) -> Value {
    json!({
        "public_key": identity.public_key,
        "link_name": identity.link_name,
        "contract_id": contract_id,
        "instance_id": instance_id,
        "reason": reason,
    })
}

/// `health_check_passed` / `health_check_failed` payload.
pub fn health_check(identity: &ProviderIdentity) -> Value {
    json!({ "public_key": identity.public_key, "link_name": identity.link_name })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_started_embeds_claims() {
        let identity = ProviderIdentity::new("Vxxx", "default");
        let claims = ProviderClaims::unsigned("Vxxx", "httpserver");
        let payload = provider_started(
            &identity,
            "wasmcloud:httpserver",
            "inst-1",
            "",
            &HashMap::new(),
            &claims,
        );
        assert_eq!(payload["public_key"], "Vxxx");
        assert_eq!(payload["claims"]["name"], "httpserver");
    }

    #[test]
    fn health_check_payload_has_no_reason_field() {
        let identity = ProviderIdentity::new("Vxxx", "default");
        let payload = health_check(&identity);
        assert!(payload.get("reason").is_none());
    }

    #[tokio::test]
    async fn lattice_event_publisher_builds_a_cloudevents_envelope() {
        use crate::lattice::TestLatticeClient;

        let client = Arc::new(TestLatticeClient::default());
        let publisher =
            LatticeEventPublisher::new("Hxxx".to_string(), "default".to_string(), client.clone());

        publisher
            .publish_event("provider_started", json!({ "public_key": "Vxxx" }))
            .await
            .expect("publish succeeds");

        let published = client.published().await;
        assert_eq!(published.len(), 1);
        let (subject, bytes) = &published[0];
        assert_eq!(subject, "wasmbus.evt.default");

        let envelope: Value = serde_json::from_slice(bytes).expect("envelope is valid json");
        assert_eq!(envelope["specversion"], "1.0");
        assert_eq!(envelope["source"], "Hxxx");
        assert_eq!(envelope["type"], "com.wasmcloud.lattice.provider_started");
        assert_eq!(envelope["datacontenttype"], "application/json");
        assert_eq!(envelope["data"]["public_key"], "Vxxx");

        let id = envelope["id"].as_str().expect("id is a string");
        Uuid::parse_str(id).expect("id is a valid uuid");

        let time = envelope["time"].as_str().expect("time is a string");
        OffsetDateTime::parse(time, &Rfc3339).expect("time parses as rfc3339");
    }
}
