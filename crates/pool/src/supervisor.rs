//! Per-slot lifecycle supervision: creation, leases, replacement, webhooks.
//!
//! The supervisor owns the slot table, the per-slot agent links, and the
//! per-slot lease timers (all keyed by slot name). Slot transitions are
//! event-driven: containers become Ready only when their agent reports in via
//! `node:setState`, and the supervisor is the single consumer of the link
//! event channel.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime},
};

use {
    tokio::{
        sync::{Mutex, RwLock, mpsc},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

use crate::{
    config::PoolConfig,
    error::{Error, Result},
    link::{AgentConnector, agent_url},
    runtime::{ContainerRuntime, parse_ports_line, port_bindings},
    table::SlotTable,
    types::{
        AgentEvent, LinkEvent, PoolMode, PoolStatus, SessionInfo, Slot, SlotState, Viewport,
        WebhookReport,
    },
};

/// Delay before re-creating a slot's container after its agent disconnects.
const RECREATE_DELAY: Duration = Duration::from_secs(2);

/// Wait after `restart` in manage-only release before reopening the link.
const RESTART_WAIT: Duration = Duration::from_secs(2);

/// Resolutions accepted by `reinit_with_resolution`.
const ALLOWED_RESOLUTIONS: &[(u32, u32)] = &[
    (1280, 1024),
    (1920, 1080),
    (1366, 768),
    (1536, 864),
    (1280, 720),
    (1440, 900),
    (1280, 2400),
];

/// Drives every slot of one pool. Constructed once per pool instance and
/// shared behind `Arc`; there is deliberately no process-wide singleton.
pub struct Supervisor {
    config: PoolConfig,
    mode: PoolMode,
    runtime: Arc<dyn ContainerRuntime>,
    connector: Arc<dyn AgentConnector>,
    table: RwLock<SlotTable>,
    links: Mutex<HashMap<String, crate::link::AgentLink>>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    events_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<LinkEvent>>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    shutting_down: AtomicBool,
    default_viewport: RwLock<Viewport>,
    http: reqwest::Client,
}

impl Supervisor {
    pub fn new(
        config: PoolConfig,
        mode: PoolMode,
        runtime: Arc<dyn ContainerRuntime>,
        connector: Arc<dyn AgentConnector>,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let default_viewport = config.resolution;
        Arc::new(Self {
            config,
            mode,
            runtime,
            connector,
            table: RwLock::new(SlotTable::default()),
            links: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            events_tx,
            events_rx: std::sync::Mutex::new(Some(events_rx)),
            event_loop: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
            default_viewport: RwLock::new(default_viewport),
            http: reqwest::Client::new(),
        })
    }

    pub fn mode(&self) -> PoolMode {
        self.mode
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Sender half of the link event channel. The per-slot links feed this;
    /// embedders may use it to deliver events from another source.
    pub fn events(&self) -> mpsc::UnboundedSender<LinkEvent> {
        self.events_tx.clone()
    }

    // ── init ────────────────────────────────────────────────────────────────

    /// Bring the pool up: verify the runtime, optionally pull the image, then
    /// create (full mode) or adopt (manage-only) every slot.
    pub async fn init(self: &Arc<Self>, pull_on_start: bool) -> Result<()> {
        self.runtime.ensure_available().await?;
        if pull_on_start {
            self.runtime.pull_image(&self.config.image_name).await?;
        }
        self.spawn_event_loop().await;
        match self.mode {
            PoolMode::Full => self.init_full().await,
            PoolMode::ManageOnly => self.discover_existing().await,
        }
    }

    async fn spawn_event_loop(self: &Arc<Self>) {
        let mut slot = self.event_loop.lock().await;
        if slot.is_some() {
            return;
        }
        let Some(mut rx) = self.events_rx.lock().expect("events_rx lock").take() else {
            return;
        };
        let sup = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                sup.handle_link_event(event).await;
            }
        }));
    }

    async fn init_full(self: &Arc<Self>) -> Result<()> {
        let n = self.config.num_browsers;
        {
            let viewport = *self.default_viewport.read().await;
            let mut table = self.table.write().await;
            for i in 0..n {
                table.insert(Slot::new(
                    self.config.slot_name(i),
                    i,
                    self.config.ports_for(i),
                    viewport,
                ));
            }
        }

        for i in 0..n {
            let name = self.config.slot_name(i);
            // Clear any leftover container from a previous run.
            if let Err(e) = self.runtime.stop(&name).await {
                debug!(slot = %name, error = %e, "pre-init cleanup");
            }
            match self.create_container(&name).await {
                Ok(()) => {},
                // The operator learns about a broken setup immediately.
                Err(e) if i == 0 => return Err(e),
                Err(e) => {
                    warn!(slot = %name, error = %e, "slot creation failed, leaving empty");
                },
            }
        }
        info!(count = n, prefix = %self.config.prefix, "pool initialized");
        Ok(())
    }

    /// Manage-only init: adopt running containers that match the prefix.
    /// The pool size is bounded by the configured `N`; extras are ignored.
    async fn discover_existing(self: &Arc<Self>) -> Result<()> {
        let n = self.config.num_browsers;
        let names = self.runtime.list_by_prefix(&self.config.prefix).await?;
        let entries = self.runtime.ps_entries(&self.config.prefix).await?;
        let ports_by_name: HashMap<&str, &str> = entries
            .iter()
            .map(|e| (e.name.as_str(), e.ports.as_str()))
            .collect();
        let viewport = *self.default_viewport.read().await;

        let mut taken = vec![false; n];
        let mut adopted = 0usize;
        for (pos, name) in names.iter().enumerate() {
            if adopted >= n {
                info!(extra = names.len() - adopted, "ignoring containers beyond pool size");
                break;
            }
            let index = derive_index(name, self.config.base_browser_port, n)
                .unwrap_or(pos)
                .min(n.saturating_sub(1));
            if taken[index] {
                warn!(slot = %name, index, "duplicate slot index, skipping container");
                continue;
            }
            taken[index] = true;

            let parsed = ports_by_name
                .get(name.as_str())
                .copied()
                .map(parse_ports_line)
                .filter(|p| p.app != 0);
            let ports = parsed.unwrap_or_else(|| self.config.ports_for(index));

            let mut slot = Slot::new(name.clone(), index, ports, viewport);
            slot.state = SlotState::Creating;
            if let Ok(info) = self.runtime.inspect(name).await {
                slot.created_at = info.created;
            }
            self.table.write().await.insert(slot);
            self.open_link(name).await;
            adopted += 1;
        }
        info!(adopted, prefix = %self.config.prefix, "existing containers adopted");
        Ok(())
    }

    // ── container creation ──────────────────────────────────────────────────

    /// Launch the slot's container (with retries) and open its agent link.
    /// The slot stays Creating until `node:setState` arrives.
    async fn create_container(self: &Arc<Self>, name: &str) -> Result<()> {
        let (ports, viewport) = {
            let mut table = self.table.write().await;
            let slot = table
                .get_mut(name)
                .ok_or_else(|| Error::SlotNotFound(name.to_string()))?;
            // At most one outstanding runtime command per slot.
            if slot.state == SlotState::Creating {
                debug!(slot = %name, "creation already in flight");
                return Ok(());
            }
            slot.state = SlotState::Creating;
            slot.clear_identity();
            (slot.ports, slot.viewport)
        };

        let vnc_password = generate_vnc_password();
        let mut envs = self.config.launch_args.clone();
        envs.insert("XVFB_RESOLUTION".into(), viewport.xvfb_resolution());
        envs.insert("VNC_PASSWORD".into(), vnc_password.clone());
        let bindings = port_bindings(&ports);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self
                .runtime
                .run(
                    name,
                    &self.config.image_name,
                    &envs,
                    &bindings,
                    &self.config.additional_docker_args,
                )
                .await
            {
                Ok(()) => break,
                Err(e) if attempt >= self.config.max_retries => {
                    let mut table = self.table.write().await;
                    if let Some(slot) = table.get_mut(name) {
                        slot.state = SlotState::Empty;
                    }
                    return Err(e);
                },
                Err(e) => {
                    debug!(slot = %name, attempt, error = %e, "run failed, retrying");
                    tokio::time::sleep(Duration::from_millis(self.config.kill_wait_time_ms)).await;
                },
            }
        }

        {
            let mut table = self.table.write().await;
            if let Some(slot) = table.get_mut(name) {
                slot.created_at = Some(SystemTime::now());
                slot.vnc_password = Some(vnc_password);
            }
        }
        self.open_link(name).await;
        debug!(slot = %name, "container launched, waiting for agent");
        Ok(())
    }

    /// Open (or replace) the slot's agent link.
    async fn open_link(&self, name: &str) {
        let Some(app_port) = self.table.read().await.get(name).map(|s| s.ports.app) else {
            return;
        };
        let url = agent_url(self.mode, self.config.connection_host.as_deref(), name, app_port);
        let link = self.connector.open(name, &url, self.events_tx.clone());
        // Replacing the entry drops, and thereby aborts, any previous link.
        self.links.lock().await.insert(name.to_string(), link);
    }

    // ── link events ─────────────────────────────────────────────────────────

    async fn handle_link_event(self: &Arc<Self>, event: LinkEvent) {
        match event {
            LinkEvent::Connected { slot } => {
                debug!(slot = %slot, "agent connected");
            },
            LinkEvent::Disconnected { slot } => self.on_disconnect(&slot).await,
            LinkEvent::Agent { slot, event } => self.on_agent_event(&slot, event).await,
        }
    }

    async fn on_agent_event(self: &Arc<Self>, name: &str, event: AgentEvent) {
        match event {
            AgentEvent::SetState { id, ip } => {
                let mut table = self.table.write().await;
                let Some(slot) = table.get_mut(name) else {
                    warn!(slot = %name, "setState for unknown slot, ignoring");
                    return;
                };
                if slot.removing {
                    debug!(slot = %name, "setState while releasing, ignoring");
                    return;
                }
                match slot.state {
                    SlotState::Creating | SlotState::Empty => {
                        slot.labels.insert("id".into(), id);
                        slot.labels.insert("ip".into(), ip);
                        slot.state = SlotState::Ready;
                        info!(slot = %name, "agent reported in, slot ready");
                    },
                    SlotState::Ready => {
                        slot.labels.insert("id".into(), id);
                        slot.labels.insert("ip".into(), ip);
                    },
                    SlotState::Leased | SlotState::Expiring => {
                        debug!(slot = %name, state = ?slot.state, "setState ignored in state");
                    },
                }
            },
            AgentEvent::SetLabel { label_name, label_value } => {
                self.upsert_label(name, label_name, label_value).await;
            },
            AgentEvent::SetParam { param, value } => {
                self.upsert_label(name, param, value).await;
            },
            AgentEvent::Deleted { is_error, message, session_data } => {
                let snapshot = {
                    let table = self.table.read().await;
                    let Some(slot) = table.get(name) else {
                        warn!(slot = %name, "deleted event for unknown slot, ignoring");
                        return;
                    };
                    if slot.agent_id().is_none() {
                        debug!(slot = %name, "deleted event before setState, ignoring");
                        return;
                    }
                    slot.clone()
                };
                info!(slot = %name, is_error, message = %message, "agent reported deletion");
                {
                    let sup = Arc::clone(self);
                    tokio::spawn(async move {
                        sup.dispatch_webhook(&snapshot, is_error, &message, session_data.as_deref())
                            .await;
                    });
                }
                if let Err(e) = self.release(name).await {
                    warn!(slot = %name, error = %e, "release after deletion failed");
                }
            },
        }
    }

    /// Upsert a label; messages arriving before `node:setState` never mutate
    /// state.
    async fn upsert_label(&self, name: &str, key: String, value: String) {
        let mut table = self.table.write().await;
        let Some(slot) = table.get_mut(name) else {
            warn!(slot = %name, "label event for unknown slot, ignoring");
            return;
        };
        if slot.agent_id().is_none() {
            debug!(slot = %name, label = %key, "label event before setState, ignoring");
            return;
        }
        slot.labels.insert(key, value);
    }

    /// Agent link dropped. The lease (if any) dies with the connection; in
    /// full-lifecycle mode the container is replaced after a short delay.
    async fn on_disconnect(self: &Arc<Self>, name: &str) {
        {
            let table = self.table.read().await;
            match table.get(name) {
                None => return,
                // A release in flight owns the slot; it will handle teardown.
                Some(slot) if slot.removing => return,
                Some(_) => {},
            }
        }
        self.cancel_timer(name).await;
        {
            let mut table = self.table.write().await;
            if let Some(slot) = table.get_mut(name) {
                slot.state = SlotState::Empty;
                slot.clear_identity();
            }
        }

        if self.mode == PoolMode::Full && !self.is_shutting_down() {
            let sup = Arc::clone(self);
            let name = name.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(RECREATE_DELAY).await;
                sup.recreate_slot(&name).await;
            });
        }
    }

    /// Replace a slot's container if it is still Empty by the time the
    /// recreate delay elapses.
    async fn recreate_slot(self: &Arc<Self>, name: &str) {
        if self.is_shutting_down() {
            return;
        }
        {
            let table = self.table.read().await;
            match table.get(name) {
                Some(slot) if slot.state == SlotState::Empty && !slot.removing => {},
                // The agent reconnected or another path took over meanwhile.
                _ => return,
            }
        }
        if let Err(e) = self.runtime.stop(name).await {
            debug!(slot = %name, error = %e, "pre-recreate cleanup");
        }
        if let Err(e) = self.create_container(name).await {
            warn!(slot = %name, error = %e, "failed to replace container");
        }
    }

    // ── leases ──────────────────────────────────────────────────────────────

    /// Lease the lowest-index Ready slot for `lease_minutes`. Returns `None`
    /// when the pool has no Ready slot; saturation is not an error.
    pub async fn reserve(self: &Arc<Self>, lease_minutes: u64) -> Option<Slot> {
        let lease = Duration::from_secs(lease_minutes * 60);
        let snapshot = {
            let mut table = self.table.write().await;
            let slot = table.first_available_mut()?;
            let now = SystemTime::now();
            slot.state = SlotState::Leased;
            slot.last_used = Some(now);
            slot.lease_deadline = Some(now + lease);
            slot.clone()
        };
        self.arm_lease_timer(&snapshot.name, lease).await;
        info!(slot = %snapshot.name, minutes = lease_minutes, "slot reserved");
        Some(snapshot)
    }

    /// Reset the lease timer of a Leased slot. A pure timer reset: session
    /// fields are untouched.
    pub async fn extend(self: &Arc<Self>, name: &str, lease_minutes: u64) -> Result<()> {
        let lease = Duration::from_secs(lease_minutes * 60);
        {
            let mut table = self.table.write().await;
            let slot = table
                .get_mut(name)
                .ok_or_else(|| Error::SlotNotFound(name.to_string()))?;
            if slot.state != SlotState::Leased {
                return Err(Error::NotLeased(name.to_string()));
            }
            slot.lease_deadline = Some(SystemTime::now() + lease);
        }
        self.arm_lease_timer(name, lease).await;
        debug!(slot = %name, minutes = lease_minutes, "lease extended");
        Ok(())
    }

    /// Arm the slot's single-shot lease timer, replacing any prior one.
    async fn arm_lease_timer(self: &Arc<Self>, name: &str, lease: Duration) {
        let sup = Arc::clone(self);
        let slot = name.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(lease).await;
            if sup.is_shutting_down() {
                return;
            }
            // Single-shot: take this timer out of the map first, so the
            // release below does not cancel (abort) the very task running it.
            sup.timers.lock().await.remove(&slot);
            info!(slot = %slot, "lease expired");
            if let Err(e) = sup.release(&slot).await {
                warn!(slot = %slot, error = %e, "release on lease expiry failed");
            }
        });
        if let Some(prev) = self.timers.lock().await.insert(name.to_string(), handle) {
            prev.abort();
        }
    }

    /// Cancel the slot's lease timer. Idempotent.
    async fn cancel_timer(&self, name: &str) {
        if let Some(handle) = self.timers.lock().await.remove(name) {
            handle.abort();
        }
    }

    // ── release ─────────────────────────────────────────────────────────────

    /// Tear down a slot's session. Full-lifecycle mode stops and replaces the
    /// container; manage-only mode restarts it in place. A second release of
    /// the same slot is a no-op.
    pub async fn release(self: &Arc<Self>, name: &str) -> Result<()> {
        {
            let mut table = self.table.write().await;
            let slot = table
                .get_mut(name)
                .ok_or_else(|| Error::SlotNotFound(name.to_string()))?;
            // Nothing to release: already torn down, or a fresh container
            // that has not yet reported in.
            if slot.removing || matches!(slot.state, SlotState::Empty | SlotState::Creating) {
                debug!(slot = %name, "release is a no-op");
                return Ok(());
            }
            slot.removing = true;
            slot.state = SlotState::Expiring;
            slot.lease_deadline = None;
        }
        self.cancel_timer(name).await;
        // Disconnect and discard the agent link; manage-only reopens it below.
        self.links.lock().await.remove(name);

        let result = match self.mode {
            PoolMode::Full => self.release_full(name).await,
            PoolMode::ManageOnly => self.release_manage_only(name).await,
        };
        if result.is_err() {
            let mut table = self.table.write().await;
            if let Some(slot) = table.get_mut(name) {
                slot.removing = false;
                slot.state = SlotState::Empty;
                slot.clear_identity();
            }
        }
        result
    }

    async fn release_full(self: &Arc<Self>, name: &str) -> Result<()> {
        self.stop_with_retries(name).await?;
        {
            let mut table = self.table.write().await;
            if let Some(slot) = table.get_mut(name) {
                slot.clear_identity();
                slot.last_used = None;
                slot.vnc_password = None;
                slot.created_at = None;
                slot.state = SlotState::Empty;
                slot.removing = false;
            }
        }
        info!(slot = %name, "slot released");

        // The container is torn down and replaced.
        if !self.is_shutting_down() {
            let sup = Arc::clone(self);
            let name = name.to_string();
            tokio::spawn(async move {
                if let Err(e) = sup.create_container(&name).await {
                    warn!(slot = %name, error = %e, "failed to replace released container");
                }
            });
        }
        Ok(())
    }

    async fn release_manage_only(self: &Arc<Self>, name: &str) -> Result<()> {
        self.restart_with_retries(name).await?;
        tokio::time::sleep(RESTART_WAIT).await;
        {
            let mut table = self.table.write().await;
            if let Some(slot) = table.get_mut(name) {
                // The container survives, so its birth time does too.
                slot.clear_identity();
                slot.state = SlotState::Creating;
                slot.removing = false;
            }
        }
        self.open_link(name).await;
        info!(slot = %name, "slot restarted in place");
        Ok(())
    }

    async fn stop_with_retries(&self, name: &str) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.runtime.stop(name).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_already_gone() => {
                    debug!(slot = %name, "container already gone");
                    return Ok(());
                },
                Err(e) if attempt >= self.config.max_retries => return Err(e),
                Err(e) => {
                    debug!(slot = %name, attempt, error = %e, "stop failed, retrying");
                    tokio::time::sleep(Duration::from_millis(self.config.kill_wait_time_ms)).await;
                },
            }
        }
    }

    async fn restart_with_retries(&self, name: &str) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.runtime.restart(name).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_already_gone() => {
                    debug!(slot = %name, "container already gone");
                    return Ok(());
                },
                Err(e) if attempt >= self.config.max_retries => return Err(e),
                Err(e) => {
                    debug!(slot = %name, attempt, error = %e, "restart failed, retrying");
                    tokio::time::sleep(Duration::from_millis(self.config.kill_wait_time_ms)).await;
                },
            }
        }
    }

    // ── resolution change ───────────────────────────────────────────────────

    /// Atomic release-then-create with a new `XVFB_RESOLUTION`. Only the
    /// whitelisted resolutions are permitted; ports never change.
    pub async fn reinit_with_resolution(
        self: &Arc<Self>,
        name: &str,
        resolution: Viewport,
    ) -> Result<()> {
        if !ALLOWED_RESOLUTIONS.contains(&(resolution.width, resolution.height)) {
            return Err(Error::UnsupportedResolution(resolution.xvfb_resolution()));
        }
        {
            let mut table = self.table.write().await;
            let slot = table
                .get_mut(name)
                .ok_or_else(|| Error::SlotNotFound(name.to_string()))?;
            if slot.removing {
                debug!(slot = %name, "re-init while release in flight, skipping");
                return Ok(());
            }
            slot.removing = true;
            slot.state = SlotState::Expiring;
            slot.lease_deadline = None;
        }
        self.cancel_timer(name).await;
        self.links.lock().await.remove(name);

        let stop_result = self.stop_with_retries(name).await;
        {
            let mut table = self.table.write().await;
            if let Some(slot) = table.get_mut(name) {
                slot.clear_identity();
                slot.last_used = None;
                slot.vnc_password = None;
                slot.created_at = None;
                slot.viewport = resolution;
                slot.state = SlotState::Empty;
                slot.removing = false;
            }
        }
        stop_result?;
        self.create_container(name).await
    }

    // ── webhook ─────────────────────────────────────────────────────────────

    /// Report session completion to the caller-supplied webhook. Best-effort:
    /// the container is dying regardless, so failures are swallowed.
    async fn dispatch_webhook(
        &self,
        slot: &Slot,
        is_error: bool,
        message: &str,
        session_data: Option<&str>,
    ) {
        let eligible = (
            non_empty(slot.session.webhook.as_deref()),
            non_empty(slot.session.report_key.as_deref()),
            non_empty(slot.session.session_uuid.as_deref()),
        );
        let (Some(webhook), Some(report_key), Some(session_uuid)) = eligible else {
            debug!(slot = %slot.name, "deletion not eligible for webhook");
            return;
        };

        // Session data is only forwarded for fingerprinted sessions.
        let session_data = if non_empty(slot.session.fingerprint_id.as_deref()).is_some() {
            session_data.unwrap_or_default().to_string()
        } else {
            String::new()
        };

        let report = WebhookReport {
            client_id: slot.session.client_id.clone().unwrap_or_default(),
            session_uuid: session_uuid.to_string(),
            session_data,
            is_error,
            error: message.to_string(),
            report_key: report_key.to_string(),
        };
        match self.http.post(webhook).json(&report).send().await {
            Ok(response) => {
                debug!(slot = %slot.name, status = %response.status(), "webhook delivered");
            },
            Err(e) => {
                warn!(slot = %slot.name, error = %e, "webhook dispatch failed");
            },
        }
    }

    // ── snapshots & setters ─────────────────────────────────────────────────

    pub async fn browsers(&self) -> Vec<Slot> {
        self.table.read().await.snapshot()
    }

    pub async fn status(&self) -> PoolStatus {
        let slots = self.browsers().await;
        let used = slots.iter().filter(|s| s.state == SlotState::Leased).count();
        PoolStatus { capacity: self.config.num_browsers, used, slots }
    }

    pub async fn find_by_id(&self, id: &str) -> Option<Slot> {
        self.table.read().await.find_by_agent_id(id).cloned()
    }

    pub async fn find_by_session(&self, session_id: &str) -> Option<Slot> {
        self.table.read().await.find_by_session(session_id).cloned()
    }

    /// Construct slot records straight from `ps` + `inspect`, independent of
    /// in-memory state. Read-only and tolerant of stale or partial data.
    pub async fn browsers_from_runtime(&self) -> Result<Vec<Slot>> {
        let entries = self.runtime.ps_entries(&self.config.prefix).await?;
        let viewport = *self.default_viewport.read().await;
        let n = self.config.num_browsers.max(entries.len());

        let mut slots = Vec::new();
        for (pos, entry) in entries.iter().enumerate() {
            let info = match self.runtime.inspect(&entry.name).await {
                Ok(info) => info,
                Err(e) => {
                    warn!(container = %entry.name, error = %e, "inspect failed, skipping");
                    continue;
                },
            };
            let index =
                derive_index(&entry.name, self.config.base_browser_port, n).unwrap_or(pos);
            let mut slot =
                Slot::new(entry.name.clone(), index, parse_ports_line(&entry.ports), viewport);
            slot.labels = info.labels;
            slot.created_at = info.created;
            slot.state = if info.running { SlotState::Ready } else { SlotState::Empty };
            slots.push(slot);
        }
        slots.sort_by_key(|s| s.index);
        Ok(slots)
    }

    /// Replace the slot's session metadata.
    pub async fn set_internals(&self, name: &str, session: SessionInfo) -> Result<()> {
        let mut table = self.table.write().await;
        let slot = table
            .get_mut(name)
            .ok_or_else(|| Error::SlotNotFound(name.to_string()))?;
        slot.session = session;
        Ok(())
    }

    pub async fn set_vnc_password(&self, name: &str, password: String) -> Result<()> {
        let mut table = self.table.write().await;
        let slot = table
            .get_mut(name)
            .ok_or_else(|| Error::SlotNotFound(name.to_string()))?;
        slot.vnc_password = Some(password);
        Ok(())
    }

    pub async fn set_debug(&self, name: &str, debug: bool) -> Result<()> {
        let mut table = self.table.write().await;
        let slot = table
            .get_mut(name)
            .ok_or_else(|| Error::SlotNotFound(name.to_string()))?;
        slot.debug = debug;
        Ok(())
    }

    pub async fn set_viewport(&self, name: &str, viewport: Viewport) -> Result<()> {
        let mut table = self.table.write().await;
        let slot = table
            .get_mut(name)
            .ok_or_else(|| Error::SlotNotFound(name.to_string()))?;
        slot.viewport = viewport;
        Ok(())
    }

    /// Default viewport for containers created from now on.
    pub async fn set_default_viewport(&self, viewport: Viewport) {
        *self.default_viewport.write().await = viewport;
    }

    // ── shutdown ────────────────────────────────────────────────────────────

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Release every slot sequentially. The shutting-down flag is set first so
    /// no disconnect handler or release path re-creates a container.
    pub async fn shutdown(self: &Arc<Self>) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let names = self.table.read().await.names();
        for name in names {
            if let Err(e) = self.release(&name).await {
                warn!(slot = %name, error = %e, "release during shutdown failed");
            }
        }
        for (_, handle) in self.timers.lock().await.drain() {
            handle.abort();
        }
        self.links.lock().await.clear();
        if let Some(handle) = self.event_loop.lock().await.take() {
            handle.abort();
        }
        info!("pool shut down");
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn generate_vnc_password() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let id: u64 = rng.random();
    format!("{id:016x}")
}

/// Slot index from a container name: the trailing numeric suffix is
/// `base + index` (slot names are `prefix-<base + i>`). Out-of-range values
/// fall back to the caller's positional order.
fn derive_index(name: &str, base_port: u16, n: usize) -> Option<usize> {
    let suffix: i64 = name.rsplit('-').next()?.parse().ok()?;
    let index = suffix - base_port as i64;
    (0..n as i64).contains(&index).then_some(index as usize)
}
