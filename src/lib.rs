//! Provider lifecycle subsystem for a lattice host.
//!
//! This crate launches, identifies, health-checks, and tears down
//! out-of-process capability providers, publishing their lifecycle as
//! CloudEvents on the lattice message bus. See `DESIGN.md` for the
//! grounding of each module and `SPEC_FULL.md` for the full design.
#![warn(missing_docs)]
#![forbid(clippy::unwrap_used)]

/// Process-wide configuration ingestion (env + CLI) and truthy-token parsing.
pub mod config;

/// Provider claims: signed identity metadata carried alongside a public key.
pub mod claims;

/// Typed errors for the lifecycle subsystem's fallible operations.
pub mod error;

/// Event encoding (CloudEvents 1.0) and publication.
pub mod event;

/// The Host Supervisor: process lifecycle, labels, friendly name.
pub mod host;

/// The JSON-over-stdin host descriptor handed to a starting provider.
pub mod host_data;

/// Provider identity: the `(public_key, link_name)` addressing pair.
pub mod identity;

/// The lattice bus boundary trait and an in-memory test double.
pub mod lattice;

/// The Provider Instance: child process ownership, health probing, exit
/// monitoring, and halt.
pub mod provider;

/// The Provider Supervisor: registry of running provider instances.
pub mod supervisor;

/// Registration tables: the Provider Handle Registry, Triple Table, Claims
/// Store and Refmaps Store.
pub mod tables;
