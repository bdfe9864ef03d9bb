//! In-process collaborators.
//!
//! Enough of every collaborator contract in [`crate::services`] to run the
//! plugin without external systems: the command-line runner and the tests
//! use them.

mod actions;
mod cluster;
mod encrypted_store;
mod licensing;
mod router;
mod security;
mod spaces;
mod task_manager;

pub use actions::RecordingActionExecutor;
pub use cluster::{ClusterCall, StaticClusterClient};
pub use encrypted_store::MemoryEncryptedStore;
pub use licensing::LicenseFeed;
pub use router::MemoryRouter;
pub use security::MemoryApiKeys;
pub use spaces::PathSpaces;
pub use task_manager::{MemoryTaskManager, TaskRunOutcome};
