/// Change messages: the raw events queued by the listener and the public
/// notifications fired by the processor.
use super::storage::Storage;
use serde::Serialize;
use std::fmt;

/// A hardware-change event waiting in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Something changed but the OS did not say what. Triggers a full
    /// reconciliation.
    DevicesChanged,
    /// A volume with this drive letter arrived.
    Added(char),
    /// A volume with this drive letter went away.
    Removed(char),
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DevicesChanged => f.write_str("devices changed"),
            Self::Added(letter) => write!(f, "volume {letter}: added"),
            Self::Removed(letter) => write!(f, "volume {letter}: removed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
}

impl ChangeKind {
    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
        }
    }
}

/// Public notification fired after each registry mutation.
#[derive(Debug, Clone, Serialize)]
pub struct StorageChange {
    pub kind: ChangeKind,
    pub storage: Storage,
    /// Wall-clock time the processor applied the change.
    pub observed_at: chrono::DateTime<chrono::Local>,
}

impl StorageChange {
    pub fn added(storage: Storage) -> Self {
        Self::new(ChangeKind::Added, storage)
    }

    pub fn removed(storage: Storage) -> Self {
        Self::new(ChangeKind::Removed, storage)
    }

    fn new(kind: ChangeKind, storage: Storage) -> Self {
        Self {
            kind,
            storage,
            observed_at: chrono::Local::now(),
        }
    }
}
