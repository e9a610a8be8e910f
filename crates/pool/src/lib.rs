//! Fixed-size pool of containerised browser instances with bounded leases.
//!
//! Each pool slot owns one container exposing three external ports (app,
//! debugger, VNC). Clients reserve a slot for a bounded lease, use it, and
//! either release it or let the lease expire; the container is then torn down
//! and replaced (full-lifecycle mode) or restarted in place (manage-only
//! mode). Slot readiness is event-driven: the in-container agent reports in
//! over a per-slot WebSocket link, and the supervisor consumes those events
//! to drive each slot's state machine.
//!
//! # Example
//!
//! ```ignore
//! use berth_pool::{PoolConfig, PoolManager, PoolMode};
//!
//! let manager = PoolManager::new(PoolConfig::from_env(), PoolMode::from_env());
//! manager.init(true).await?;
//!
//! if let Some(slot) = manager.reserve(15).await {
//!     println!("leased {} (vnc {})", slot.name, slot.ports.vnc);
//! }
//! ```

pub mod config;
pub mod error;
pub mod link;
pub mod manager;
pub mod runtime;
pub mod supervisor;
pub mod table;
pub mod types;

pub use {
    config::PoolConfig,
    error::{Error, Result},
    manager::PoolManager,
    runtime::{ContainerRuntime, DockerCli},
    types::{AgentEvent, LinkEvent, PoolMode, Slot, SlotState, Viewport},
};
