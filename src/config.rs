//! Process-wide host configuration: layered ingestion from environment
//! variables and CLI flags, with defaults matching the rest of this
//! codebase's host configuration struct.

use clap::Parser;

/// Process-wide configuration for a running host.
///
/// Every field has an environment-variable binding of the form
/// `WASMCLOUD_<FIELD_UPPERCASE>` and a matching `--<field-kebab-case>` CLI
/// flag, with CLI taking precedence over the environment and the
/// environment taking precedence over the defaults below.
#[derive(Debug, Clone, Parser)]
#[command(name = "provider-host", about = "Provider lifecycle host", version)]
pub struct HostConfig {
    /// The host's own public key. Generated at startup if not supplied.
    #[arg(long, env = "WASMCLOUD_HOST_KEY")]
    pub host_key: Option<String>,

    /// The lattice namespace this host participates in.
    #[arg(long, env = "WASMCLOUD_LATTICE_PREFIX", default_value = "default")]
    pub lattice_prefix: String,

    /// The cluster's public signing key.
    #[arg(long, env = "WASMCLOUD_CLUSTER_KEY")]
    pub cluster_key: Option<String>,

    /// Additional public keys authorized to sign invocations, comma
    /// separated.
    #[arg(long, env = "WASMCLOUD_CLUSTER_ISSUERS", value_delimiter = ',')]
    pub cluster_issuers: Vec<String>,

    /// Seed for the cluster signing key, if this host mints one.
    #[arg(long, env = "WASMCLOUD_CLUSTER_SEED")]
    pub cluster_seed: Option<String>,

    /// Whether to generate an ad-hoc cluster key if none is configured.
    #[arg(long, env = "WASMCLOUD_CLUSTER_ADHOC", default_value = "false", value_parser = parse_truthy)]
    pub cluster_adhoc: bool,

    /// Seed for this host's own signing key.
    #[arg(long, env = "WASMCLOUD_HOST_SEED")]
    pub host_seed: Option<String>,

    /// Hostname of the lattice RPC endpoint.
    #[arg(long, env = "WASMCLOUD_PROV_RPC_HOST", default_value = "127.0.0.1")]
    pub prov_rpc_host: String,

    /// Port of the lattice RPC endpoint.
    #[arg(long, env = "WASMCLOUD_PROV_RPC_PORT", default_value_t = 4222)]
    pub prov_rpc_port: u16,

    /// User JWT for the lattice RPC connection.
    #[arg(long, env = "WASMCLOUD_PROV_RPC_JWT")]
    pub prov_rpc_jwt: Option<String>,

    /// User seed for the lattice RPC connection.
    #[arg(long, env = "WASMCLOUD_PROV_RPC_SEED")]
    pub prov_rpc_seed: Option<String>,

    /// Whether the lattice RPC connection uses TLS.
    #[arg(long, env = "WASMCLOUD_PROV_RPC_TLS", default_value = "false", value_parser = parse_truthy)]
    pub prov_rpc_tls: bool,

    /// Timeout, in milliseconds, applied to RPC calls this host makes (e.g.
    /// health probes).
    #[arg(long, env = "WASMCLOUD_RPC_TIMEOUT_MS", default_value_t = 2000)]
    pub rpc_timeout_ms: u64,

    /// Delay, in milliseconds, the host waits after publishing
    /// `host_stopped` before exiting, to let the event drain.
    #[arg(long, env = "WASMCLOUD_PROVIDER_DELAY", default_value_t = 300)]
    pub provider_delay: u64,

    /// Whether providers should emit structured (JSON) logs by default.
    #[arg(long, env = "WASMCLOUD_ENABLE_STRUCTURED_LOGGING", default_value = "false", value_parser = parse_truthy)]
    pub enable_structured_logging: bool,

    /// JetStream domain, if the lattice uses one.
    #[arg(long, env = "WASMCLOUD_JS_DOMAIN")]
    pub js_domain: Option<String>,

    /// Whether the host should request supplemental configuration from the
    /// lattice at startup. Recognizes the informal truthy aliases carried
    /// over from the original host implementation (see [`parse_truthy`]).
    #[arg(long, env = "WASMCLOUD_CONFIG_SERVICE_ENABLED", default_value = "false", value_parser = parse_truthy)]
    pub config_service_enabled: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host_key: None,
            lattice_prefix: "default".into(),
            cluster_key: None,
            cluster_issuers: Vec::new(),
            cluster_seed: None,
            cluster_adhoc: false,
            host_seed: None,
            prov_rpc_host: "127.0.0.1".into(),
            prov_rpc_port: 4222,
            prov_rpc_jwt: None,
            prov_rpc_seed: None,
            prov_rpc_tls: false,
            rpc_timeout_ms: 2000,
            provider_delay: 300,
            enable_structured_logging: false,
            js_domain: None,
            config_service_enabled: false,
        }
    }
}

/// Parse a configuration string as a truthy boolean.
///
/// Recognizes, case-insensitively: `true`, `yes`, `y`, `enabled`, and the
/// informal aliases preserved from the original host implementation:
/// `"you betcha"`, `"yuppers"`, `"totes"`. Anything else, including an empty
/// string, is treated as `false` rather than a parse error, matching the
/// permissive style of this codebase's other environment-driven toggles.
pub fn parse_truthy(value: &str) -> Result<bool, std::convert::Infallible> {
    let normalized = value.trim().to_lowercase();
    Ok(matches!(
        normalized.as_str(),
        "true" | "yes" | "y" | "enabled" | "you betcha" | "yuppers" | "totes"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_standard_truthy_tokens() {
        for token in ["true", "YES", "enabled", "Y"] {
            assert_eq!(parse_truthy(token), Ok(true), "token: {token}");
        }
    }

    #[test]
    fn recognizes_informal_aliases() {
        for token in ["YOU BETCHA", "yuppers", "Totes"] {
            assert_eq!(parse_truthy(token), Ok(true), "token: {token}");
        }
    }

    #[test]
    fn rejects_unknown_and_empty_tokens() {
        for token in ["false", "", "maybe"] {
            assert_eq!(parse_truthy(token), Ok(false), "token: {token}");
        }
    }

    #[test]
    fn default_matches_documented_values() {
        let config = HostConfig::default();
        assert_eq!(config.lattice_prefix, "default");
        assert_eq!(config.rpc_timeout_ms, 2000);
        assert_eq!(config.provider_delay, 300);
    }
}
