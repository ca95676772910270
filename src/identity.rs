//! Provider identity: the `(public_key, link_name)` pair that uniquely
//! addresses a provider within a host.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Uniquely addresses a provider instance within a host.
///
/// Two providers with equal `(public_key, link_name)` MUST NOT coexist in
/// the registration tables; see invariant 1 in the lifecycle design.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProviderIdentity {
    /// The provider's signed public key (an opaque ASCII string).
    pub public_key: String,
    /// The link name this provider instance was started under.
    pub link_name: String,
}

impl ProviderIdentity {
    /// Construct a new identity. `link_name` is conventionally `"default"`
    /// when the caller has no more specific link name.
    pub fn new(public_key: impl Into<String>, link_name: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            link_name: link_name.into(),
        }
    }
}

impl fmt::Display for ProviderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.public_key, self.link_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_key_and_link() {
        let id = ProviderIdentity::new("Vxxx", "default");
        assert_eq!(id.to_string(), "Vxxx/default");
    }

    #[test]
    fn equality_is_pairwise() {
        let a = ProviderIdentity::new("Vxxx", "default");
        let b = ProviderIdentity::new("Vxxx", "other");
        let c = ProviderIdentity::new("Vxxx", "default");
        assert_ne!(a, b);
        assert_eq!(a, c);
    }
}
