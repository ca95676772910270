//! The host descriptor: the JSON document a starting provider receives,
//! base64-encoded, as a single line on its standard input.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;

/// Link definitions existing at provider-start time that match the
/// provider's identity; carried through opaquely since link content and
/// lookup are out of scope for this subsystem.
pub type LinkDefinition = serde_json::Value;

/// The JSON descriptor written to a provider's stdin immediately after
/// spawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostData {
    /// The host's own public key.
    pub host_id: String,
    /// The lattice this host participates in.
    pub lattice_rpc_prefix: String,
    /// The link name this instance was started under.
    pub link_name: String,
    /// The provider's own public key.
    pub provider_key: String,
    /// A freshly minted identifier for this run of the provider.
    pub instance_id: String,
    /// `host:port` of the lattice RPC endpoint.
    pub lattice_rpc_url: String,
    /// User JWT for the lattice RPC connection.
    pub lattice_rpc_user_jwt: String,
    /// User seed for the lattice RPC connection.
    pub lattice_rpc_user_seed: String,
    /// Whether the lattice RPC connection uses TLS.
    pub lattice_rpc_tls: bool,
    /// Default timeout, in milliseconds, for RPC calls the provider makes.
    pub default_rpc_timeout_ms: u64,
    /// Public keys permitted to issue signed invocations to this provider.
    pub cluster_issuers: Vec<String>,
    /// Seed material used to derive per-invocation keys.
    pub invocation_seed: String,
    /// JetStream domain, if the lattice uses one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js_domain: Option<String>,
    /// Whether the provider should emit structured (JSON) logs.
    pub enable_structured_logging: bool,
    /// Reserved for backward compatibility; always empty.
    #[serde(default)]
    pub env_values: std::collections::HashMap<String, String>,
    /// Opaque provider configuration, serialized as a JSON string.
    #[serde(default)]
    pub config_json: String,
    /// Link definitions already bound to this identity at start time.
    #[serde(default)]
    pub link_definitions: Vec<LinkDefinition>,
}

impl HostData {
    /// Construct a fully-populated descriptor for `provider_key`/`link_name`
    /// under `host_id`/`lattice_rpc_prefix`, applying defaults for fields
    /// not supplied by the caller.
    ///
    /// This always returns every field, including on paths where a caller
    /// only has a handful of values on hand (e.g. no supplemental config or
    /// no pre-existing link definitions): there is no shortened/partial
    /// construction path in this crate.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host_id: String,
        lattice_rpc_prefix: String,
        link_name: String,
        provider_key: String,
        instance_id: String,
        cluster_issuers: Vec<String>,
        config_json: String,
        link_definitions: Vec<LinkDefinition>,
    ) -> Self {
        Self {
            host_id,
            lattice_rpc_prefix,
            link_name,
            provider_key,
            instance_id,
            lattice_rpc_url: String::new(),
            lattice_rpc_user_jwt: String::new(),
            lattice_rpc_user_seed: String::new(),
            lattice_rpc_tls: false,
            default_rpc_timeout_ms: 2000,
            cluster_issuers,
            invocation_seed: String::new(),
            js_domain: None,
            enable_structured_logging: false,
            env_values: std::collections::HashMap::new(),
            config_json,
            link_definitions,
        }
    }

    /// Encode this descriptor as `base64(json(self))`.
    pub fn encode(&self) -> anyhow::Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Write `base64(json(self)) + "\n"` to the child's stdin and shut the
    /// write half down, matching the single-line bootstrap protocol every
    /// provider expects.
    pub async fn write_to(&self, stdin: &mut ChildStdin) -> anyhow::Result<()> {
        let encoded = self.encode()?;
        stdin.write_all(encoded.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_round_trips_through_base64_and_json() {
        let data = HostData::new(
            "Hxxx".into(),
            "default".into(),
            "default".into(),
            "Vxxx".into(),
            "inst-1".into(),
            vec!["Cxxx".into()],
            String::new(),
            vec![],
        );
        let encoded = data.encode().expect("encode");
        let decoded_json = STANDARD.decode(encoded).expect("base64 decode");
        let decoded: HostData = serde_json::from_slice(&decoded_json).expect("json decode");
        assert_eq!(decoded.host_id, data.host_id);
        assert_eq!(decoded.default_rpc_timeout_ms, 2000);
    }

    #[test]
    fn new_always_populates_every_field() {
        let data = HostData::new(
            "Hxxx".into(),
            "default".into(),
            "default".into(),
            "Vxxx".into(),
            "inst-1".into(),
            vec![],
            String::new(),
            vec![],
        );
        assert_eq!(data.lattice_rpc_url, "");
        assert!(data.js_domain.is_none());
        assert_eq!(data.default_rpc_timeout_ms, 2000);
    }
}
