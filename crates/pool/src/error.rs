//! Pool error types.

use thiserror::Error;

/// Errors that can occur while driving the pool or the container runtime.
#[derive(Debug, Error)]
pub enum Error {
    #[error("container runtime unavailable after {attempts} attempts")]
    RuntimeUnavailable { attempts: u32 },

    #[error("image pull failed: {0}")]
    ImagePullFailed(String),

    #[error("container run failed: {0}")]
    RunFailed(String),

    #[error("container stop failed: {0}")]
    StopFailed(String),

    #[error("container restart failed: {0}")]
    RestartFailed(String),

    #[error("no such container: {0}")]
    AlreadyGone(String),

    #[error("unknown slot: {0}")]
    SlotNotFound(String),

    #[error("slot {0} is not leased")]
    NotLeased(String),

    #[error("unsupported resolution: {0}")]
    UnsupportedResolution(String),

    #[error("runtime output parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Substrings in runtime CLI stderr that mean the target container no longer
/// exists. Callers treat these as success for `stop` and `restart`.
const ALREADY_GONE_PATTERNS: &[&str] = &[
    "No such container",
    "no such container",
    "No such object",
    "is not running",
];

impl Error {
    /// Returns `true` when this error means the container was already gone,
    /// which teardown paths treat as success.
    pub fn is_already_gone(&self) -> bool {
        matches!(self, Self::AlreadyGone(_))
    }

    /// Classify a failed `stop` invocation from its stderr.
    pub(crate) fn classify_stop(name: &str, stderr: &str) -> Self {
        if is_gone_message(stderr) {
            Self::AlreadyGone(name.to_string())
        } else {
            Self::StopFailed(format!("{name}: {}", stderr.trim()))
        }
    }

    /// Classify a failed `restart` invocation from its stderr.
    pub(crate) fn classify_restart(name: &str, stderr: &str) -> Self {
        if is_gone_message(stderr) {
            Self::AlreadyGone(name.to_string())
        } else {
            Self::RestartFailed(format!("{name}: {}", stderr.trim()))
        }
    }
}

fn is_gone_message(stderr: &str) -> bool {
    ALREADY_GONE_PATTERNS.iter().any(|p| stderr.contains(p))
}

pub type Result<T> = std::result::Result<T, Error>;
