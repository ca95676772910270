//! Registration tables: process-wide, concurrency-safe indexes keyed by
//! provider identity.
//!
//! Each table guards its map with its own [`tokio::sync::RwLock`], following
//! the `DefaultStore` pattern used elsewhere in this codebase, so readers
//! never block other readers and writes are serialized per table rather
//! than across the whole registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::instrument;

use crate::claims::ProviderClaims;
use crate::error::TableError;
use crate::identity::ProviderIdentity;

/// A live provider handle, as recorded in the Provider Handle Registry.
/// Opaque to the tables themselves; the supervisor attaches the actual
/// running state.
#[derive(Debug, Clone)]
pub struct ProviderHandle {
    /// The capability contract this provider satisfies.
    pub contract_id: String,
    /// The instance id minted for the current run of this provider.
    pub instance_id: String,
}

/// The Provider Handle Registry, Provider Triple Table, Claims Store and
/// Refmaps Store, bundled as one process-wide value owned by the host.
#[derive(Default)]
pub struct RegistrationTables {
    handles: RwLock<HashMap<ProviderIdentity, ProviderHandle>>,
    triples: RwLock<HashMap<(String, String, String), ()>>,
    claims: RwLock<HashMap<String, ProviderClaims>>,
    refmaps: RwLock<HashMap<String, String>>,
}

impl RegistrationTables {
    /// Construct empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new provider identity with its handle. Fails with
    /// [`TableError::AlreadyRegistered`] if the identity is already present.
    #[instrument(level = "debug", skip(self, handle))]
    pub async fn register(
        &self,
        identity: ProviderIdentity,
        handle: ProviderHandle,
    ) -> Result<(), TableError> {
        let mut handles = self.handles.write().await;
        if handles.contains_key(&identity) {
            return Err(TableError::AlreadyRegistered(identity));
        }
        let triple = (
            identity.public_key.clone(),
            identity.link_name.clone(),
            handle.contract_id.clone(),
        );
        handles.insert(identity, handle);
        self.triples.write().await.insert(triple, ());
        Ok(())
    }

    /// Remove a provider's registration. Idempotent: removing an identity
    /// that is not present is not an error.
    #[instrument(level = "debug", skip(self))]
    pub async fn deregister(&self, identity: &ProviderIdentity) {
        let mut handles = self.handles.write().await;
        if let Some(handle) = handles.remove(identity) {
            let triple = (
                identity.public_key.clone(),
                identity.link_name.clone(),
                handle.contract_id,
            );
            self.triples.write().await.remove(&triple);
        }
    }

    /// True if the identity currently has a live registration.
    pub async fn contains(&self, identity: &ProviderIdentity) -> bool {
        self.handles.read().await.contains_key(identity)
    }

    /// Snapshot of every currently registered identity.
    pub async fn list(&self) -> Vec<ProviderIdentity> {
        self.handles.read().await.keys().cloned().collect()
    }

    /// Store the most recently started claims for a provider.
    #[instrument(level = "debug", skip(self, claims))]
    pub async fn put_claims(&self, public_key: &str, claims: ProviderClaims) {
        self.claims
            .write()
            .await
            .insert(public_key.to_string(), claims);
    }

    /// Look up the most recently stored claims for a provider.
    pub async fn get_claims(&self, public_key: &str) -> Option<ProviderClaims> {
        self.claims.read().await.get(public_key).cloned()
    }

    /// Record which public key an image reference most recently resolved
    /// to.
    #[instrument(level = "debug", skip(self))]
    pub async fn put_refmap(&self, image_ref: &str, public_key: &str) {
        if image_ref.is_empty() {
            return;
        }
        self.refmaps
            .write()
            .await
            .insert(image_ref.to_string(), public_key.to_string());
    }

    /// Look up the public key an image reference most recently resolved to.
    pub async fn get_refmap(&self, image_ref: &str) -> Option<String> {
        self.refmaps.read().await.get(image_ref).cloned()
    }
}

/// A shared, cloneable handle to a host's registration tables.
pub type SharedTables = Arc<RegistrationTables>;
