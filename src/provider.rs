//! The Provider Instance: owns a single provider's child process, runs its
//! health probe and exit monitor, and emits its lifecycle events.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_stream::wrappers::IntervalStream;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::claims::ProviderClaims;
use crate::error::{ProviderStartError, StopReason};
use crate::event::{self, EventPublisher};
use crate::host_data::{HostData, LinkDefinition};
use crate::identity::ProviderIdentity;
use crate::lattice::LatticeClient;
use crate::tables::{ProviderHandle, SharedTables};

/// Environment variables passed through to every spawned provider,
/// regardless of whether they are set in the host's own environment.
const ENV_ALLOWLIST: &[&str] = &["OTEL_TRACES_EXPORTER", "OTEL_EXPORTER_OTLP_ENDPOINT"];

#[derive(Serialize)]
struct HealthRequest {
    placeholder: bool,
}

/// Parameters for starting a new provider instance.
pub struct StartRequest {
    /// Path to the provider's executable.
    pub executable_path: PathBuf,
    /// Signed identity metadata for the provider.
    pub claims: ProviderClaims,
    /// Link name this instance is started under.
    pub link_name: String,
    /// Capability contract this provider satisfies.
    pub contract_id: String,
    /// OCI or bindle reference the executable was resolved from, if any.
    pub image_ref: String,
    /// Opaque provider configuration, already serialized as JSON.
    pub config_json: String,
    /// Free-form annotations attached to this instance.
    pub annotations: HashMap<String, String>,
    /// Link definitions already bound to this identity.
    pub link_definitions: Vec<LinkDefinition>,
}

/// Host-wide context a [`ProviderInstance`] needs in order to start: shared
/// tables, the event publisher, the lattice client, and a config snapshot.
#[derive(Clone)]
pub struct HostContext {
    /// The host's own public key, used as `host_id` in descriptors.
    pub host_id: String,
    /// The lattice this host participates in.
    pub lattice_prefix: String,
    /// Public keys authorized to issue signed invocations.
    pub cluster_issuers: Vec<String>,
    /// Timeout applied to health probe requests.
    pub rpc_timeout: Duration,
    /// Shared registration tables.
    pub tables: SharedTables,
    /// Where lifecycle events are published.
    pub events: Arc<dyn EventPublisher>,
    /// The lattice bus client used for health probes.
    pub lattice: Arc<dyn LatticeClient>,
}

/// A running (or just-stopped) provider, supervised by its own background
/// tasks for health checking and child-exit monitoring.
pub struct ProviderInstance {
    identity: ProviderIdentity,
    contract_id: String,
    instance_id: String,
    executable_path: PathBuf,
    image_ref: String,
    annotations: HashMap<String, String>,
    os_pid: Option<u32>,
    shutdown: Arc<AtomicBool>,
    halt_signal: Arc<Notify>,
    tasks: JoinSet<()>,
}

impl ProviderInstance {
    /// Run the start protocol: mint an instance id, register identity,
    /// spawn the child with a filtered environment, stream it the host
    /// descriptor, persist claims, publish `provider_started`, record the
    /// image ref, and schedule health probing.
    #[instrument(level = "info", skip(ctx, request), fields(public_key = %request.claims.public_key, link_name = %request.link_name))]
    pub async fn start(
        ctx: HostContext,
        request: StartRequest,
    ) -> Result<Self, ProviderStartError> {
        let identity = ProviderIdentity::new(request.claims.public_key.clone(), request.link_name.clone());
        let instance_id = Uuid::new_v4().to_string();

        ctx.tables
            .register(
                identity.clone(),
                ProviderHandle {
                    contract_id: request.contract_id.clone(),
                    instance_id: instance_id.clone(),
                },
            )
            .await
            .map_err(|_| ProviderStartError::AlreadyRegistered(identity.clone()))?;

        let (mut child, os_pid) = match Self::spawn_child(&request).await {
            Ok(spawned) => spawned,
            Err(err) => {
                ctx.tables.deregister(&identity).await;
                return Err(err);
            }
        };

        if let Err(err) =
            Self::write_descriptor(&ctx, &request, &identity, &instance_id, &mut child).await
        {
            // The child has already been spawned at this point, so the spec's
            // "any step after a successful spawn fails, the instance must
            // still emit provider_stopped during teardown" applies even
            // though the instance never finished starting.
            let _ = child.start_kill();
            let _ = child.wait().await;
            emit_provider_stopped(
                &ctx,
                &identity,
                &request.contract_id,
                &instance_id,
                StopReason::Crashed(err.to_string()).as_str(),
            )
            .await;
            return Err(err);
        }

        ctx.tables
            .put_claims(&request.claims.public_key, request.claims.clone())
            .await;
        if !request.image_ref.is_empty() {
            ctx.tables
                .put_refmap(&request.image_ref, &request.claims.public_key)
                .await;
        }

        let payload = event::provider_started(
            &identity,
            &request.contract_id,
            &instance_id,
            &request.image_ref,
            &request.annotations,
            &request.claims,
        );
        if let Err(err) = ctx.events.publish_event("provider_started", payload).await {
            warn!(%err, "failed to publish provider_started");
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let halt_signal = Arc::new(Notify::new());
        let mut tasks = JoinSet::new();

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        if let Some(stdout) = stdout {
            tasks.spawn(stream_log_lines(stdout, identity.clone(), request.contract_id.clone(), false));
        }
        if let Some(stderr) = stderr {
            tasks.spawn(stream_log_lines(stderr, identity.clone(), request.contract_id.clone(), true));
        }

        tasks.spawn(watch_child_exit(
            child,
            ctx.clone(),
            identity.clone(),
            request.contract_id.clone(),
            instance_id.clone(),
            shutdown.clone(),
            halt_signal.clone(),
        ));

        tasks.spawn(health_probe_loop(
            ctx.clone(),
            identity.clone(),
            shutdown.clone(),
        ));

        Ok(Self {
            identity,
            contract_id: request.contract_id,
            instance_id,
            executable_path: request.executable_path,
            image_ref: request.image_ref,
            annotations: request.annotations,
            os_pid,
            shutdown,
            halt_signal,
            tasks,
        })
    }

    /// Spawn the child process with a filtered environment. Only fails with
    /// [`ProviderStartError::SpawnFailed`] — if this returns `Err`, no child
    /// process exists and no teardown is owed.
    async fn spawn_child(request: &StartRequest) -> Result<(Child, Option<u32>), ProviderStartError> {
        let mut command = Command::new(&request.executable_path);
        command.env_clear();
        for key in ENV_ALLOWLIST {
            if let Ok(value) = std::env::var(key) {
                if !value.is_empty() {
                    command.env(key, value);
                }
            }
        }
        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            command.env("RUST_LOG", rust_log);
        }
        command
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(ProviderStartError::SpawnFailed)?;
        let os_pid = child.id();
        Ok((child, os_pid))
    }

    /// Build and write the host descriptor to an already-spawned child's
    /// stdin. The child is owned by the caller throughout: on
    /// [`ProviderStartError::DescriptorWriteFailed`] the caller still holds
    /// the live child and is responsible for tearing it down.
    async fn write_descriptor(
        ctx: &HostContext,
        request: &StartRequest,
        identity: &ProviderIdentity,
        instance_id: &str,
        child: &mut Child,
    ) -> Result<(), ProviderStartError> {
        let descriptor = HostData::new(
            ctx.host_id.clone(),
            ctx.lattice_prefix.clone(),
            identity.link_name.clone(),
            identity.public_key.clone(),
            instance_id.to_string(),
            ctx.cluster_issuers.clone(),
            request.config_json.clone(),
            request.link_definitions.clone(),
        );

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProviderStartError::DescriptorWriteFailed(std::io::Error::other("no stdin")))?;
        descriptor
            .write_to(&mut stdin)
            .await
            .map_err(|err| ProviderStartError::DescriptorWriteFailed(std::io::Error::other(err.to_string())))
    }

    /// This instance's `(public_key, link_name)` pair. Identity is stable for
    /// the life of the value regardless of whether the underlying child is
    /// still running.
    pub fn identity_tuple(&self) -> &ProviderIdentity {
        &self.identity
    }

    /// True once this instance's child has exited or been halted. A dead
    /// instance may still be held by a caller (e.g. in a stale supervisor
    /// listing); its other accessors return sentinels rather than stale data.
    pub fn is_dead(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// The instance id minted for this run, or `"n/a"` if the instance is
    /// dead.
    pub fn instance_id(&self) -> &str {
        if self.is_dead() {
            "n/a"
        } else {
            &self.instance_id
        }
    }

    /// The annotations this instance was started with, or empty if the
    /// instance is dead.
    pub fn annotations(&self) -> std::borrow::Cow<'_, HashMap<String, String>> {
        if self.is_dead() {
            std::borrow::Cow::Owned(HashMap::new())
        } else {
            std::borrow::Cow::Borrowed(&self.annotations)
        }
    }

    /// The OCI/bindle reference this instance was resolved from, or empty if
    /// none was given or the instance is dead.
    pub fn ociref(&self) -> &str {
        if self.is_dead() {
            ""
        } else {
            &self.image_ref
        }
    }

    /// The executable path backing this instance, or empty if the instance is
    /// dead.
    pub fn path(&self) -> &Path {
        if self.is_dead() {
            Path::new("")
        } else {
            &self.executable_path
        }
    }

    /// Halt this provider: signal its child-exit watcher to SIGKILL the
    /// child and report a clean stop. Idempotent — a second call on an
    /// already-halted instance is a no-op.
    ///
    /// The child is force-killed even though it may not have had a chance
    /// to shut down cleanly; `provider_stopped` is still published with
    /// `reason = "normal"`, matching the host's existing halt behavior.
    #[instrument(level = "info", skip(self), fields(identity = %self.identity))]
    pub async fn halt(&mut self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        self.halt_signal.notify_one();
        while let Some(_finished) = self.tasks.join_next().await {}
    }
}

async fn stream_log_lines<R>(
    reader: R,
    identity: ProviderIdentity,
    contract_id: String,
    is_stderr: bool,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if is_stderr {
                    warn!(public_key = %identity.public_key, link_name = %identity.link_name, contract_id = %contract_id, "{line}");
                } else {
                    info!(public_key = %identity.public_key, link_name = %identity.link_name, contract_id = %contract_id, "{line}");
                }
            }
            Ok(None) => break,
            Err(_) => break,
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn watch_child_exit(
    mut child: Child,
    ctx: HostContext,
    identity: ProviderIdentity,
    contract_id: String,
    instance_id: String,
    shutdown: Arc<AtomicBool>,
    halt_signal: Arc<Notify>,
) {
    let reason = tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) if status.success() => StopReason::Normal,
                Ok(status) => StopReason::Crashed(status.to_string()),
                Err(err) => StopReason::Crashed(err.to_string()),
            }
        }
        _ = halt_signal.notified() => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            StopReason::Normal
        }
    };

    if !shutdown.swap(true, Ordering::SeqCst) {
        info!(identity = %identity, reason = %reason, "provider stopped");
    }

    emit_provider_stopped(&ctx, &identity, &contract_id, &instance_id, reason.as_str()).await;
}

/// Deregister `identity` and publish `provider_stopped` for it. Shared by
/// the child-exit/halt teardown path and the post-spawn bootstrap-failure
/// path in [`ProviderInstance::start`], so every child that actually gets
/// spawned is guaranteed exactly one `provider_stopped`.
async fn emit_provider_stopped(
    ctx: &HostContext,
    identity: &ProviderIdentity,
    contract_id: &str,
    instance_id: &str,
    reason: &str,
) {
    ctx.tables.deregister(identity).await;
    let payload = event::provider_stopped(identity, contract_id, instance_id, reason);
    if let Err(err) = ctx.events.publish_event("provider_stopped", payload).await {
        warn!(%err, "failed to publish provider_stopped");
    }
}

async fn health_probe_loop(ctx: HostContext, identity: ProviderIdentity, shutdown: Arc<AtomicBool>) {
    let first_probe_at = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut ticks = IntervalStream::new(tokio::time::interval_at(first_probe_at, Duration::from_secs(30)));
    let mut healthy = false;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        if ticks.next().await.is_none() {
            return;
        }
        if shutdown.load(Ordering::SeqCst) {
            return;
        }

        let subject = format!(
            "wasmbus.rpc.{}.{}.{}.health",
            ctx.lattice_prefix, identity.public_key, identity.link_name
        );
        let payload = rmp_serde::to_vec(&HealthRequest { placeholder: true }).unwrap_or_default();
        let outcome = ctx
            .lattice
            .request(&subject, Bytes::from(payload), ctx.rpc_timeout)
            .await;

        match (outcome.is_ok(), healthy) {
            (true, false) => {
                healthy = true;
                let payload = event::health_check(&identity);
                if let Err(err) = ctx.events.publish_event("health_check_passed", payload).await {
                    warn!(%err, "failed to publish health_check_passed");
                }
            }
            (false, true) => {
                healthy = false;
                let payload = event::health_check(&identity);
                if let Err(err) = ctx.events.publish_event("health_check_failed", payload).await {
                    warn!(%err, "failed to publish health_check_failed");
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DefaultEventPublisher;
    use crate::lattice::TestLatticeClient;
    use crate::tables::RegistrationTables;

    fn test_ctx(lattice: TestLatticeClient) -> HostContext {
        HostContext {
            host_id: "Hxxx".into(),
            lattice_prefix: "default".into(),
            cluster_issuers: vec![],
            rpc_timeout: Duration::from_millis(50),
            tables: Arc::new(RegistrationTables::new()),
            events: Arc::new(DefaultEventPublisher),
            lattice: Arc::new(lattice),
        }
    }

    fn echo_request(public_key: &str) -> StartRequest {
        StartRequest {
            executable_path: PathBuf::from("/bin/cat"),
            claims: ProviderClaims::unsigned(public_key, "test-provider"),
            link_name: "default".into(),
            contract_id: "wasmcloud:test".into(),
            image_ref: String::new(),
            config_json: String::new(),
            annotations: HashMap::new(),
            link_definitions: vec![],
        }
    }

    #[tokio::test]
    async fn duplicate_identity_is_rejected() {
        let ctx = test_ctx(TestLatticeClient::default());
        let first = ProviderInstance::start(ctx.clone(), echo_request("Vdup")).await;
        assert!(first.is_ok());
        let second = ProviderInstance::start(ctx.clone(), echo_request("Vdup")).await;
        assert!(matches!(second, Err(ProviderStartError::AlreadyRegistered(_))));
        if let Ok(mut instance) = first {
            instance.halt().await;
        }
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn halt_deregisters_identity() {
        let ctx = test_ctx(TestLatticeClient::default());
        let mut instance = ProviderInstance::start(ctx.clone(), echo_request("Vhalt"))
            .await
            .expect("start succeeds");
        let identity = instance.identity_tuple().clone();
        assert!(ctx.tables.contains(&identity).await);
        instance.halt().await;
        assert!(!ctx.tables.contains(&identity).await);
    }

    #[tokio::test]
    async fn dead_instance_accessors_return_sentinels() {
        let ctx = test_ctx(TestLatticeClient::default());
        let mut instance = ProviderInstance::start(ctx.clone(), echo_request("Vdead"))
            .await
            .expect("start succeeds");
        assert!(!instance.is_dead());
        assert_ne!(instance.instance_id(), "n/a");

        instance.halt().await;

        assert!(instance.is_dead());
        assert_eq!(instance.instance_id(), "n/a");
        assert_eq!(instance.ociref(), "");
        assert!(instance.annotations().is_empty());
        assert_eq!(instance.path(), Path::new(""));
    }

    /// Force the descriptor-write step to fail *after* the child has
    /// genuinely been spawned (by waiting for it to exit, which closes the
    /// pipe's read end, before writing to it) and confirm the same teardown
    /// `start()` invokes on this path — deregister plus a single
    /// `provider_stopped` — actually runs.
    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn descriptor_write_failure_after_spawn_emits_provider_stopped() {
        let ctx = test_ctx(TestLatticeClient::default());
        let identity = ProviderIdentity::new("Vwriteerr", "default");
        ctx.tables
            .register(
                identity.clone(),
                ProviderHandle {
                    contract_id: "wasmcloud:test".into(),
                    instance_id: "inst-1".into(),
                },
            )
            .await
            .expect("register succeeds");

        let mut request = echo_request("Vwriteerr");
        request.executable_path = PathBuf::from("/bin/true");

        let (mut child, _os_pid) = ProviderInstance::spawn_child(&request)
            .await
            .expect("spawn succeeds");
        child.wait().await.expect("child exits");

        let err = ProviderInstance::write_descriptor(&ctx, &request, &identity, "inst-1", &mut child)
            .await
            .expect_err("writing to a closed pipe must fail");
        assert!(matches!(err, ProviderStartError::DescriptorWriteFailed(_)));

        emit_provider_stopped(
            &ctx,
            &identity,
            &request.contract_id,
            "inst-1",
            StopReason::Crashed(err.to_string()).as_str(),
        )
        .await;

        assert!(!ctx.tables.contains(&identity).await);
    }
}
