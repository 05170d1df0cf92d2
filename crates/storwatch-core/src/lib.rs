/// StorWatch Core — live storage-device registry and change reconciliation.
///
/// This crate holds all the engine logic with no CLI dependencies. The OS is
/// reached only through the collaborator traits in [`platform`], so the
/// engine runs (and is tested) against an in-memory host as well as the real
/// Windows backend.
///
/// # Modules
///
/// - [`model`] — Storage identity types and change messages.
/// - [`registry`] — Lock-guarded device list with copy-on-read snapshots.
/// - [`queue`] — Unbounded event queue between listener and processor.
/// - [`listener`] — OS notification translation and the listener thread.
/// - [`processor`] — Event handling and drive-number reconciliation.
/// - [`discovery`] — Full enumeration with physical-index probing.
/// - [`notifier`] — Subscriber list for public change notifications.
/// - [`watcher`] — The public `StorageWatcher` API.
/// - [`platform`] — Collaborator traits, in-memory host, Windows backend.
pub mod config;
pub mod discovery;
pub mod error;
pub mod listener;
pub mod model;
pub mod notifier;
pub mod platform;
pub mod processor;
pub mod queue;
pub mod registry;
pub mod watcher;

pub use config::WatchConfig;
pub use error::{Result, WatchError};
pub use model::{ChangeEvent, ChangeKind, Storage, StorageChange, StorageDevice, StorageKey};
pub use watcher::{StorageWatcher, WatcherThreads};
