/// Drive-number keyed diff between the registry and a fresh enumeration.
///
/// Path strings are not stable across enumeration methods (a controller walk
/// and a direct index probe spell the same disk differently), so the join key
/// is the drive number. Entries without one are left alone here; only a full
/// rescan replaces them.
use crate::model::Storage;
use crate::platform::{ControllerDevices, ResolvedDevice};
use std::collections::BTreeMap;

/// Drive numbers to add and to remove, both in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriveDiff {
    pub added: Vec<u32>,
    pub removed: Vec<u32>,
}

impl DriveDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Registry entries with a known drive number. First entry wins.
pub fn existing_by_drive_number(snapshot: &[Storage]) -> BTreeMap<u32, &Storage> {
    let mut map = BTreeMap::new();
    for storage in snapshot {
        if let Some(n) = storage.drive_number() {
            map.entry(n).or_insert(storage);
        }
    }
    map
}

/// Enumerated devices with a known drive number. First occurrence wins.
pub fn current_by_drive_number(controllers: Vec<ControllerDevices>) -> BTreeMap<u32, ResolvedDevice> {
    let mut map = BTreeMap::new();
    for group in controllers {
        for device in group.devices {
            let Some(n) = device.drive_number else {
                continue;
            };
            map.entry(n).or_insert_with(|| ResolvedDevice {
                controller: group.controller.clone(),
                device,
            });
        }
    }
    map
}

/// Keys only in `current` are added; keys only in `existing` are removed.
/// Keys in both are untouched.
pub fn diff_drive_numbers<A, B>(existing: &BTreeMap<u32, A>, current: &BTreeMap<u32, B>) -> DriveDiff {
    DriveDiff {
        added: current
            .keys()
            .filter(|n| !existing.contains_key(n))
            .copied()
            .collect(),
        removed: existing
            .keys()
            .filter(|n| !current.contains_key(n))
            .copied()
            .collect(),
    }
}
