//! The Host Supervisor: process-wide lifecycle, label derivation, friendly
//! name generation, and the `host_started`/`host_stopped` event pair.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use names::{Generator, Name};
use nkeys::KeyPair;
use serde_json::{json, Value};
use sysinfo::System;
use sysinfo::SystemExt;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::config::HostConfig;
use crate::event::{self, EventPublisher};
use crate::lattice::LatticeClient;
use crate::provider::HostContext;
use crate::supervisor::ProviderSupervisor;
use crate::tables::RegistrationTables;

const NAME_ADJECTIVES: &str = "autumn hidden bitter misty silent empty dry dark summer \
icy delicate quiet white cool spring winter patient twilight dawn crimson wispy weathered blue \
billowing broken cold damp falling frosty green long late lingering bold little morning muddy old \
red rough still small sparkling throbbing shy wandering withered wild black young holy solitary \
fragrant aged snowy proud floral restless divine polished ancient purple lively nameless";

const NAME_NOUNS: &str = "waterfall river breeze moon rain wind sea morning \
snow lake sunset pine shadow leaf dawn glitter forest hill cloud meadow sun glade \
bird brook butterfly bush dew dust field fire flower firefly feather grass haze \
mountain night pond darkness snowflake silence sound sky shape surf thunder \
violet water wildflower wave water resonance sun timber mist";

/// Owns a host's lifecycle: its signing key, lattice prefix, derived labels,
/// friendly name, provider supervisor, and shared registration tables.
pub struct Host {
    host_key: KeyPair,
    lattice_prefix: String,
    labels: BTreeMap<String, String>,
    friendly_name: String,
    events: Arc<dyn EventPublisher>,
    lattice: Arc<dyn LatticeClient>,
    rpc_timeout: Duration,
    config_service_enabled: bool,
    provider_delay: Duration,
    tables: Arc<RegistrationTables>,
    providers: ProviderSupervisor,
    supplemental_config: RwLock<Option<Value>>,
}

/// Resolve this host's signing key from configuration: from `host_seed` if
/// one is supplied, otherwise a freshly minted server key pair.
///
/// Split out from [`Host::new`] so a caller can learn the host's public key
/// — and build a [`crate::event::LatticeEventPublisher`] whose envelope
/// `source` matches it — before constructing the `Host` itself.
pub fn resolve_host_key(config: &HostConfig) -> KeyPair {
    config
        .host_seed
        .as_deref()
        .and_then(|seed| KeyPair::from_seed(seed).ok())
        .unwrap_or_else(|| KeyPair::new_server())
}

impl Host {
    /// Construct a new host from configuration, its already-resolved signing
    /// key (see [`resolve_host_key`]), a lattice client, and an event
    /// publisher.
    pub fn new(
        config: &HostConfig,
        host_key: KeyPair,
        lattice: Arc<dyn LatticeClient>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let tables = Arc::new(RegistrationTables::new());
        let labels = derive_labels();
        let friendly_name = generate_friendly_name(&host_key).unwrap_or_else(|| "unnamed-host".into());

        let rpc_timeout = Duration::from_millis(config.rpc_timeout_ms);
        let ctx = HostContext {
            host_id: host_key.public_key(),
            lattice_prefix: config.lattice_prefix.clone(),
            cluster_issuers: config.cluster_issuers.clone(),
            rpc_timeout,
            tables: tables.clone(),
            events: events.clone(),
            lattice: lattice.clone(),
        };

        Self {
            host_key,
            lattice_prefix: config.lattice_prefix.clone(),
            labels,
            friendly_name,
            events,
            lattice,
            rpc_timeout,
            config_service_enabled: config.config_service_enabled,
            provider_delay: Duration::from_millis(config.provider_delay),
            tables,
            providers: ProviderSupervisor::new(ctx),
            supplemental_config: RwLock::new(None),
        }
    }

    /// This host's public signing key.
    pub fn host_id(&self) -> String {
        self.host_key.public_key()
    }

    /// The lattice this host participates in.
    pub fn lattice_prefix(&self) -> &str {
        &self.lattice_prefix
    }

    /// This host's randomly generated, human-readable name.
    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    /// This host's derived labels (platform labels merged with any
    /// `HOST_`-prefixed environment variables).
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// This host's provider supervisor.
    pub fn providers(&self) -> &ProviderSupervisor {
        &self.providers
    }

    /// This host's shared registration tables.
    pub fn tables(&self) -> &Arc<RegistrationTables> {
        &self.tables
    }

    /// Publish `host_started` with this host's labels and friendly name.
    #[instrument(level = "info", skip(self))]
    pub async fn publish_started(&self) {
        let payload = event::host_started(&to_hashmap(&self.labels), &self.friendly_name);
        if let Err(err) = self.events.publish_event("host_started", payload).await {
            warn!(%err, "failed to publish host_started");
        }
    }

    /// This host's most recently fetched supplemental configuration, if the
    /// config service was enabled and a fetch has completed.
    pub async fn supplemental_config(&self) -> Option<Value> {
        self.supplemental_config.read().await.clone()
    }

    /// Request supplemental configuration from the lattice, if
    /// `config_service_enabled` is set. A no-op otherwise. Request failure or
    /// an unparseable reply is logged and leaves the configuration empty —
    /// this never fails host startup, matching the defaulting behavior of
    /// this codebase's own supplemental-config fetch.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_supplemental_config(&self) {
        if !self.config_service_enabled {
            return;
        }
        let subject = format!("wasmbus.cfg.{}", self.lattice_prefix);
        let payload = match serde_json::to_vec(&json!({ "labels": to_hashmap(&self.labels) })) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(%err, "failed to serialize supplemental config request payload");
                return;
            }
        };

        debug!(%subject, "requesting supplemental config");
        match self
            .lattice
            .request(&subject, payload.into(), self.rpc_timeout)
            .await
        {
            Ok(reply) => match serde_json::from_slice::<Value>(&reply) {
                Ok(parsed) => {
                    *self.supplemental_config.write().await = Some(parsed);
                }
                Err(err) => {
                    error!(%err, "failed to deserialize supplemental config, defaulting to empty");
                }
            },
            Err(err) => {
                error!(%err, "failed to request supplemental config, defaulting to empty");
            }
        }
    }

    /// Terminate every running provider. Called during shutdown; the name
    /// mirrors this codebase's existing teardown entry point, even though
    /// this fragment has no actor subsystem left to purge alongside it.
    #[instrument(level = "info", skip(self))]
    pub async fn purge(&self) {
        self.providers.terminate_all().await;
    }

    /// Graceful shutdown: purge all providers, publish `host_stopped`, then
    /// sleep briefly to let the event drain before the caller exits.
    #[instrument(level = "info", skip(self))]
    pub async fn shutdown(&self) {
        self.purge().await;
        let payload = event::host_stopped(&to_hashmap(&self.labels));
        if let Err(err) = self.events.publish_event("host_stopped", payload).await {
            warn!(%err, "failed to publish host_stopped");
        }
        info!(delay_ms = self.provider_delay.as_millis() as u64, "draining before exit");
        tokio::time::sleep(self.provider_delay).await;
    }
}

fn to_hashmap(map: &BTreeMap<String, String>) -> std::collections::HashMap<String, String> {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Merge platform-detected labels with any `HOST_`-prefixed environment
/// variables (lowercased, prefix stripped).
fn derive_labels() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("hostcore.arch".to_string(), std::env::consts::ARCH.to_string());
    labels.insert("hostcore.os".to_string(), std::env::consts::OS.to_string());
    labels.insert("hostcore.osfamily".to_string(), std::env::consts::FAMILY.to_string());

    let mut sys = System::new();
    sys.refresh_system();
    if let Some(hostname) = sys.host_name() {
        labels.insert("hostcore.hostname".to_string(), hostname);
    }
    if let Some(kernel_version) = sys.kernel_version() {
        labels.insert("hostcore.kernel_version".to_string(), kernel_version);
    }
    if let Some(os_version) = sys.os_version() {
        labels.insert("hostcore.os_version".to_string(), os_version);
    }

    for (key, value) in std::env::vars() {
        if let Some(stripped) = key.strip_prefix("HOST_") {
            labels.insert(stripped.to_lowercase(), value);
        }
    }
    labels
}

fn generate_friendly_name(host_key: &KeyPair) -> Option<String> {
    let adjectives: Vec<_> = NAME_ADJECTIVES.split_whitespace().collect();
    let nouns: Vec<_> = NAME_NOUNS.split_whitespace().collect();
    let _ = host_key;
    Generator::new(&adjectives, &nouns, Name::Numbered).next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DefaultEventPublisher;
    use crate::lattice::TestLatticeClient;

    #[test]
    fn derived_labels_include_platform_and_host_prefixed_vars() {
        std::env::set_var("HOST_region", "us-east");
        std::env::set_var("HOST_zone", "a");
        std::env::set_var("OTHER", "x");
        let labels = derive_labels();
        assert_eq!(labels.get("region"), Some(&"us-east".to_string()));
        assert_eq!(labels.get("zone"), Some(&"a".to_string()));
        assert!(labels.contains_key("hostcore.os"));
        assert!(!labels.keys().any(|k| k.starts_with("host_")));
        std::env::remove_var("HOST_region");
        std::env::remove_var("HOST_zone");
        std::env::remove_var("OTHER");
    }

    #[tokio::test]
    async fn shutdown_publishes_host_stopped_after_purge() {
        let mut config = HostConfig::default();
        config.provider_delay = 1;
        let host = Host::new(
            &config,
            resolve_host_key(&config),
            Arc::new(TestLatticeClient::default()),
            Arc::new(DefaultEventPublisher),
        );
        host.shutdown().await;
    }

    #[test]
    fn friendly_name_is_non_empty() {
        let key = KeyPair::new_server();
        let name = generate_friendly_name(&key).expect("generator produces a name");
        assert!(!name.is_empty());
    }

    #[test]
    fn derived_labels_include_sysinfo_platform_details() {
        let labels = derive_labels();
        assert!(labels.contains_key("hostcore.arch"));
        // host_name()/kernel_version()/os_version() may be absent in a
        // sandboxed test runner, so only the always-present trio is asserted.
        assert!(labels.contains_key("hostcore.os"));
        assert!(labels.contains_key("hostcore.osfamily"));
    }

    #[tokio::test]
    async fn supplemental_config_fetch_is_a_no_op_when_disabled() {
        let config = HostConfig::default();
        let host = Host::new(
            &config,
            resolve_host_key(&config),
            Arc::new(TestLatticeClient::default()),
            Arc::new(DefaultEventPublisher),
        );
        host.fetch_supplemental_config().await;
        assert!(host.supplemental_config().await.is_none());
    }

    struct JsonReplyLatticeClient;

    #[async_trait::async_trait]
    impl LatticeClient for JsonReplyLatticeClient {
        async fn publish(&self, _subject: &str, _payload: bytes::Bytes) -> anyhow::Result<()> {
            Ok(())
        }

        async fn request(
            &self,
            _subject: &str,
            _payload: bytes::Bytes,
            _timeout: Duration,
        ) -> anyhow::Result<bytes::Bytes> {
            Ok(bytes::Bytes::from_static(br#"{"registryCredentials":{}}"#))
        }
    }

    #[tokio::test]
    async fn supplemental_config_fetch_stores_parsed_reply_when_enabled() {
        let mut config = HostConfig::default();
        config.config_service_enabled = true;
        let host = Host::new(
            &config,
            resolve_host_key(&config),
            Arc::new(JsonReplyLatticeClient),
            Arc::new(DefaultEventPublisher),
        );
        host.fetch_supplemental_config().await;
        let stored = host.supplemental_config().await.expect("config stored");
        assert!(stored.get("registryCredentials").is_some());
    }
}
