//! Contracts for the collaborators the alerting core is wired to.
//!
//! The core never talks to storage, the scheduler, the cluster or the
//! actions subsystem directly; it goes through these traits. In-memory
//! implementations live in [`crate::memory`].

mod actions;
mod cluster;
mod encryption;
mod saved_objects;
mod security;
mod spaces;
mod task_manager;

pub use actions::*;
pub use cluster::*;
pub use encryption::*;
pub use saved_objects::*;
pub use security::*;
pub use spaces::*;
pub use task_manager::*;
