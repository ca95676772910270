//! The Provider Supervisor: a registry of running [`ProviderInstance`]s with
//! start/stop/terminate-all/list operations.
//!
//! Restart policy is transient: if a provider's child process exits
//! unexpectedly, this supervisor does not respawn it — recovery is a new,
//! explicit `start_provider` call from the caller. This is a deliberate
//! divergence from the automatic-restart behavior of the host implementation
//! this crate is grounded on; see `DESIGN.md`.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::instrument;

use crate::error::ProviderStartError;
use crate::identity::ProviderIdentity;
use crate::provider::{HostContext, ProviderInstance, StartRequest};

/// Holds every currently running provider instance for a host.
pub struct ProviderSupervisor {
    ctx: HostContext,
    instances: RwLock<HashMap<ProviderIdentity, ProviderInstance>>,
}

impl ProviderSupervisor {
    /// Build a supervisor bound to the given host context.
    pub fn new(ctx: HostContext) -> Self {
        Self {
            ctx,
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new provider. Fails with [`ProviderStartError::AlreadyRegistered`]
    /// if its `(public_key, link_name)` identity is already running.
    #[instrument(level = "info", skip(self, request))]
    pub async fn start_provider(
        &self,
        request: StartRequest,
    ) -> Result<ProviderIdentity, ProviderStartError> {
        let instance = ProviderInstance::start(self.ctx.clone(), request).await?;
        let identity = instance.identity_tuple().clone();
        self.instances.write().await.insert(identity.clone(), instance);
        Ok(identity)
    }

    /// Stop a running provider by identity. A no-op if the identity is not
    /// currently registered.
    #[instrument(level = "info", skip(self))]
    pub async fn stop(&self, identity: &ProviderIdentity) {
        let instance = self.instances.write().await.remove(identity);
        if let Some(mut instance) = instance {
            instance.halt().await;
        }
    }

    /// Halt every running provider. Used during host shutdown.
    #[instrument(level = "info", skip(self))]
    pub async fn terminate_all(&self) {
        let mut instances: Vec<ProviderInstance> =
            self.instances.write().await.drain().map(|(_, v)| v).collect();
        for instance in &mut instances {
            instance.halt().await;
        }
    }

    /// List the identities of every currently running provider.
    pub async fn list(&self) -> Vec<ProviderIdentity> {
        self.instances.read().await.keys().cloned().collect()
    }
}
