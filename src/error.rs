//! Typed errors for the provider lifecycle subsystem.
//!
//! These enums cover the enumerable failure modes named in the lifecycle
//! design; anything with an open-ended failure surface (host bootstrap,
//! supplemental configuration fetch, descriptor serialization at the
//! integration boundary) returns [`anyhow::Result`] instead, per the rest of
//! this codebase's error layering.

use crate::identity::ProviderIdentity;

/// Failure modes for [`crate::supervisor::ProviderSupervisor::start_provider`].
#[derive(Debug, thiserror::Error)]
pub enum ProviderStartError {
    /// A provider with this identity is already registered.
    #[error("provider {0} is already registered")]
    AlreadyRegistered(ProviderIdentity),

    /// The child process could not be spawned, or its stdin pipe could not
    /// be established.
    #[error("failed to spawn provider process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// The host descriptor could not be written to the child's stdin.
    #[error("failed to write host descriptor to provider stdin: {0}")]
    DescriptorWriteFailed(#[source] std::io::Error),
}

/// Failure modes for table operations.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// Attempted to insert an identity that is already present.
    #[error("identity {0} is already registered")]
    AlreadyRegistered(ProviderIdentity),
}

/// Why a provider instance stopped running.
///
/// Not an [`std::error::Error`] impl: a crashed provider is a normal,
/// expected outcome reported as data (via `provider_stopped`'s `reason`
/// field), not a propagated error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Halted voluntarily by a caller.
    Normal,
    /// The child process exited with the given status description.
    Crashed(String),
}

impl StopReason {
    /// The string placed in the `provider_stopped` event's `reason` field.
    pub fn as_str(&self) -> &str {
        match self {
            StopReason::Normal => "normal",
            StopReason::Crashed(detail) => detail,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
