//! Provider claims: signed identity metadata carried alongside a provider's
//! public key.
//!
//! This is deliberately a local type rather than a reuse of
//! `wascap::jwt::CapabilityProvider` — the latter has no `tags` field, while
//! this subsystem's claims model requires one (see `DESIGN.md`).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Signed metadata describing a provider's identity and attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderClaims {
    /// The provider's signed public key.
    pub public_key: String,
    /// The public key of the entity that issued these claims.
    pub issuer: String,
    /// Human-readable provider name.
    pub name: String,
    /// Provider version string.
    pub version: String,
    /// Free-form descriptive tags.
    #[serde(default)]
    pub tags: HashSet<String>,
    /// Human-readable "not before" timestamp, or empty if unbounded.
    #[serde(default)]
    pub not_before_human: String,
    /// Human-readable expiry timestamp, or empty if the claims never expire.
    #[serde(default)]
    pub expires_human: String,
}

impl ProviderClaims {
    /// Build claims with no tags and no time bounds, useful for tests and
    /// for ad-hoc/local providers that carry no signed metadata.
    pub fn unsigned(public_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            issuer: String::new(),
            name: name.into(),
            version: String::new(),
            tags: HashSet::new(),
            not_before_human: String::new(),
            expires_human: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_claims_have_empty_tags() {
        let claims = ProviderClaims::unsigned("Vxxx", "httpserver");
        assert!(claims.tags.is_empty());
        assert_eq!(claims.name, "httpserver");
    }

    #[test]
    fn round_trips_through_json() {
        let mut claims = ProviderClaims::unsigned("Vxxx", "httpserver");
        claims.tags.insert("network".into());
        let encoded = serde_json::to_string(&claims).expect("serialize");
        let decoded: ProviderClaims = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(claims, decoded);
    }
}
