//! Shared-medium synchronization primitives for statelink.
//!
//! Execution contexts ("windows") cannot share memory. The only channel
//! between them is a persistent key-value medium that every context can read
//! and write, plus a change notification that tells the *other* contexts a
//! key was modified.
//!
//! ## Components
//!
//! - **Channel**: the [`SharedChannel`] trait and its change notices
//! - **Mediums**: [`MemoryMedium`] (in-process) and [`SqliteMedium`]
//!   (cross-process, polled)
//! - **Options**: the [`SyncOptions`] descriptor
//! - **Role**: provider/subscriber assignment from a context identity
//! - **Window**: the provider's registry of spawned child contexts
//!
//! # Example
//!
//! ```
//! use statelink_sync::{assign_role, Role, SyncOptions};
//!
//! let options = SyncOptions::new("app-state").with_subscribers(["inspector"]);
//! let assignment = assign_role(Some("inspector"), &options);
//! assert_eq!(assignment.role, Role::Subscriber);
//! ```

mod channel;
mod error;
mod memory;
mod options;
mod role;
mod sqlite;
pub mod window;

pub use channel::{ChangeNotice, ChangeSubscription, ContextId, SharedChannel};
pub use error::{ConfigError, SyncError, SyncResult};
pub use memory::{MemoryChannel, MemoryMedium};
pub use options::SyncOptions;
pub use role::{assign_role, Role, RoleAssignment};
pub use sqlite::{SqliteChannel, SqliteMedium, SqliteMediumConfig};
pub use window::{WindowHandle, WindowHost, WindowParams, WindowRegistry};
