//! Slot records, agent event vocabulary, and wire types.

use std::{collections::HashMap, fmt, str::FromStr, time::SystemTime};

use serde::{Deserialize, Serialize};

/// Pool operating mode, fixed at construction.
///
/// Full-lifecycle mode creates, destroys, and re-creates containers.
/// Manage-only mode adopts pre-existing containers and only restarts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    Full,
    ManageOnly,
}

impl PoolMode {
    /// Read the mode from `MANAGE_ONLY` (truthy = `"true"` or `"1"`).
    pub fn from_env() -> Self {
        match std::env::var("MANAGE_ONLY") {
            Ok(v) if v == "true" || v == "1" => Self::ManageOnly,
            _ => Self::Full,
        }
    }
}

/// Slot lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Empty,
    Creating,
    Ready,
    Leased,
    Expiring,
}

/// The three external ports of one slot. Unique across the pool because each
/// is `base + index` on its own stride.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPorts {
    pub app: u16,
    pub debugger: u16,
    pub vnc: u16,
}

impl SlotPorts {
    /// Whether any port of `self` collides with any port of `other`.
    pub fn overlaps(&self, other: &SlotPorts) -> bool {
        let a = [self.app, self.debugger, self.vnc];
        let b = [other.app, other.debugger, other.vnc];
        a.iter().any(|p| b.contains(p))
    }
}

/// Viewport dimensions, also used as the `XVFB_RESOLUTION` for the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn xvfb_resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Viewport {
    type Err = String;

    /// Parse `"1280x720"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("invalid resolution: {s}"))?;
        Ok(Self {
            width: w.parse().map_err(|_| format!("invalid width: {w}"))?,
            height: h.parse().map_err(|_| format!("invalid height: {h}"))?,
        })
    }
}

/// Session metadata attached to a leased slot. All fields are `None` when the
/// slot is not leased.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(rename = "sessionID")]
    pub session_id: Option<String>,
    #[serde(rename = "clientID")]
    pub client_id: Option<String>,
    #[serde(rename = "fingerprintID")]
    pub fingerprint_id: Option<String>,
    pub driver: Option<String>,
    pub webhook: Option<String>,
    #[serde(rename = "reportKey")]
    pub report_key: Option<String>,
    #[serde(rename = "sessionUUID")]
    pub session_uuid: Option<String>,
}

impl SessionInfo {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// One pool position and its current lease and metadata. Runtime-only
/// resources (lease timer, agent link) are held by the supervisor in
/// name-keyed maps, not on this record, so snapshots stay serializable.
#[derive(Debug, Clone, Serialize)]
pub struct Slot {
    pub name: String,
    pub index: usize,
    pub ports: SlotPorts,
    pub state: SlotState,
    pub created_at: Option<SystemTime>,
    pub last_used: Option<SystemTime>,
    pub lease_deadline: Option<SystemTime>,
    pub viewport: Viewport,
    pub labels: HashMap<String, String>,
    pub session: SessionInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vnc_password: Option<String>,
    pub debug: bool,
    /// Set while a release is in flight so concurrent observers skip the slot.
    pub removing: bool,
}

impl Slot {
    pub fn new(name: String, index: usize, ports: SlotPorts, viewport: Viewport) -> Self {
        Self {
            name,
            index,
            ports,
            state: SlotState::Empty,
            created_at: None,
            last_used: None,
            lease_deadline: None,
            viewport,
            labels: HashMap::new(),
            session: SessionInfo::default(),
            vnc_password: None,
            debug: false,
            removing: false,
        }
    }

    /// The agent-assigned id, present once `node:setState` has arrived.
    pub fn agent_id(&self) -> Option<&str> {
        self.labels.get("id").map(String::as_str)
    }

    /// Available for reservation: Ready and not being torn down.
    pub fn is_available(&self) -> bool {
        self.state == SlotState::Ready && !self.removing
    }

    /// Drop the slot's session and agent identity. Required whenever the slot
    /// re-enters Empty or Creating.
    pub fn clear_identity(&mut self) {
        self.session.clear();
        self.labels.clear();
        self.lease_deadline = None;
    }
}

/// Events emitted by the in-container agent on the `browser:container:event`
/// channel. All other event names are ignored at the parse layer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum AgentEvent {
    /// The agent is live; the slot becomes Ready.
    #[serde(rename = "node:setState")]
    SetState { id: String, ip: String },

    #[serde(rename = "node:setLabel")]
    SetLabel {
        #[serde(rename = "labelName")]
        label_name: String,
        #[serde(rename = "labelValue")]
        label_value: String,
    },

    /// Semantically equivalent to `SetLabel`.
    #[serde(rename = "node:setParam")]
    SetParam { param: String, value: String },

    /// Terminal notification; may carry captured session data.
    #[serde(rename = "node:deleted")]
    Deleted {
        #[serde(rename = "isError")]
        is_error: bool,
        message: String,
        #[serde(rename = "sessionData", default)]
        session_data: Option<String>,
    },
}

/// Events sent from a slot's agent link to the supervisor, which is the
/// single consumer.
#[derive(Debug)]
pub enum LinkEvent {
    Connected { slot: String },
    Disconnected { slot: String },
    Agent { slot: String, event: AgentEvent },
}

/// Body POSTed to the caller-supplied webhook on session completion.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookReport {
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "sessionUUID")]
    pub session_uuid: String,
    #[serde(rename = "sessionData")]
    pub session_data: String,
    #[serde(rename = "isError")]
    pub is_error: bool,
    pub error: String,
    #[serde(rename = "reportKey")]
    pub report_key: String,
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub capacity: usize,
    pub used: usize,
    pub slots: Vec<Slot>,
}
