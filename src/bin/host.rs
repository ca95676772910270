//! Provider lifecycle host CLI entrypoint.

use std::sync::Arc;

use clap::Parser;
use provider_host::config::HostConfig;
use provider_host::event::LatticeEventPublisher;
use provider_host::host::{resolve_host_key, Host};
use provider_host::lattice::TestLatticeClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = HostConfig::parse();
    let host_key = resolve_host_key(&config);

    // The real lattice transport (NATS) is out of scope for this subsystem;
    // a production deployment supplies a `LatticeClient` backed by
    // `async_nats::Client` in its place.
    let lattice = Arc::new(TestLatticeClient::default());
    let events: Arc<dyn provider_host::event::EventPublisher> = Arc::new(LatticeEventPublisher::new(
        host_key.public_key(),
        config.lattice_prefix.clone(),
        lattice.clone(),
    ));

    let host = Host::new(&config, host_key, lattice, events);
    tracing::info!(
        host_id = %host.host_id(),
        lattice_prefix = %host.lattice_prefix(),
        friendly_name = %host.friendly_name(),
        "host starting"
    );
    host.publish_started().await;
    host.fetch_supplemental_config().await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    host.shutdown().await;

    Ok(())
}
