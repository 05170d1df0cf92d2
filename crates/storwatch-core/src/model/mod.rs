/// Data model for the storage registry.
///
/// Re-exports the device identity types and the change messages.
pub mod change;
pub mod storage;

pub use change::{ChangeEvent, ChangeKind, StorageChange};
pub use storage::{Storage, StorageDevice, StorageKey};
