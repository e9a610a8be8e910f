//! Pool facade: the external operation surface, free of protocol encoding.

use std::sync::Arc;

use tracing::info;

use crate::{
    config::PoolConfig,
    error::Result,
    link::{AgentConnector, WsConnector},
    runtime::{ContainerRuntime, DockerCli},
    supervisor::Supervisor,
    types::{LinkEvent, PoolMode, PoolStatus, SessionInfo, Slot, Viewport},
};

/// Owns one pool of browser containers. An explicitly-owned value passed
/// through whatever dependency context the embedder uses; construct as many
/// as you like.
pub struct PoolManager {
    supervisor: Arc<Supervisor>,
}

impl PoolManager {
    /// Production wiring: docker CLI runtime and WebSocket agent links.
    pub fn new(config: PoolConfig, mode: PoolMode) -> Self {
        Self::with_parts(config, mode, Arc::new(DockerCli::from_env()), Arc::new(WsConnector))
    }

    /// Full wiring control, used by tests and embedders with their own
    /// runtime or link transport.
    pub fn with_parts(
        config: PoolConfig,
        mode: PoolMode,
        runtime: Arc<dyn ContainerRuntime>,
        connector: Arc<dyn AgentConnector>,
    ) -> Self {
        info!(
            image = %config.image_name,
            prefix = %config.prefix,
            capacity = config.num_browsers,
            manage_only = mode == PoolMode::ManageOnly,
            "pool manager created"
        );
        Self { supervisor: Supervisor::new(config, mode, runtime, connector) }
    }

    pub fn mode(&self) -> PoolMode {
        self.supervisor.mode()
    }

    /// Sender half of the agent event channel; normally fed by the per-slot
    /// links, exposed for embedders that deliver events from another source.
    pub fn events(&self) -> tokio::sync::mpsc::UnboundedSender<LinkEvent> {
        self.supervisor.events()
    }

    /// Verify the runtime, optionally pull the image, then create (full mode)
    /// or adopt (manage-only) every slot.
    pub async fn init(&self, pull_on_start: bool) -> Result<()> {
        self.supervisor.init(pull_on_start).await
    }

    /// Snapshot of the slot table.
    pub async fn browsers(&self) -> Vec<Slot> {
        self.supervisor.browsers().await
    }

    /// Snapshot plus capacity/usage counts.
    pub async fn status(&self) -> PoolStatus {
        self.supervisor.status().await
    }

    /// Diagnostic view built from `ps` + `inspect`, independent of in-memory
    /// state.
    pub async fn browsers_from_runtime(&self) -> Result<Vec<Slot>> {
        self.supervisor.browsers_from_runtime().await
    }

    pub async fn find_by_id(&self, id: &str) -> Option<Slot> {
        self.supervisor.find_by_id(id).await
    }

    pub async fn find_by_session(&self, session_id: &str) -> Option<Slot> {
        self.supervisor.find_by_session(session_id).await
    }

    /// Lease a Ready slot for `lease_minutes`. `None` means the pool is
    /// saturated.
    pub async fn reserve(&self, lease_minutes: u64) -> Option<Slot> {
        self.supervisor.reserve(lease_minutes).await
    }

    /// Reset a leased slot's expiry timer.
    pub async fn extend(&self, name: &str, lease_minutes: u64) -> Result<()> {
        self.supervisor.extend(name, lease_minutes).await
    }

    /// Explicitly terminate a session and recycle its slot.
    pub async fn release(&self, name: &str) -> Result<()> {
        self.supervisor.release(name).await
    }

    /// Tear the slot down and bring it back with a new display resolution.
    pub async fn reinit_with_resolution(&self, name: &str, resolution: Viewport) -> Result<()> {
        self.supervisor.reinit_with_resolution(name, resolution).await
    }

    /// Replace the slot's session metadata.
    pub async fn set_internals(&self, name: &str, session: SessionInfo) -> Result<()> {
        self.supervisor.set_internals(name, session).await
    }

    pub async fn set_vnc_password(&self, name: &str, password: String) -> Result<()> {
        self.supervisor.set_vnc_password(name, password).await
    }

    pub async fn set_debug(&self, name: &str, debug: bool) -> Result<()> {
        self.supervisor.set_debug(name, debug).await
    }

    pub async fn set_viewport(&self, name: &str, viewport: Viewport) -> Result<()> {
        self.supervisor.set_viewport(name, viewport).await
    }

    pub async fn set_default_viewport(&self, viewport: Viewport) {
        self.supervisor.set_default_viewport(viewport).await
    }

    /// Release every slot and suppress all further container creation.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await
    }
}
