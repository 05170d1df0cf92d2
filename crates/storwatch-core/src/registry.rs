/// Thread-safe ownership of the current storage list.
///
/// One `parking_lot::Mutex` guards a `Vec<Storage>`. Every operation takes
/// the lock for the data mutation only; callers enumerate, build, and notify
/// outside it. Readers get a copy so they can iterate without the lock.
use crate::model::Storage;
use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Default)]
pub struct StorageRegistry {
    storages: Mutex<Vec<Storage>>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Independent copy of the current list, in registration order.
    pub fn snapshot(&self) -> Vec<Storage> {
        self.storages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.storages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.storages.lock().is_empty()
    }

    /// Swap in a new list wholesale. Entries repeating an earlier identity are
    /// dropped, first one wins.
    pub fn replace_all(&self, storages: Vec<Storage>) {
        let mut seen = HashSet::with_capacity(storages.len());
        let deduped: Vec<Storage> = storages
            .into_iter()
            .filter(|s| {
                let fresh = seen.insert(s.key());
                if !fresh {
                    tracing::debug!("Dropping duplicate {} from rescan", s.key());
                }
                fresh
            })
            .collect();

        *self.storages.lock() = deduped;
    }

    /// Insert `storage` unless an entry with the same identity exists.
    ///
    /// Returns `true` if it was inserted.
    pub fn try_add(&self, storage: Storage) -> bool {
        let mut storages = self.storages.lock();
        if storages.iter().any(|s| s.same_identity(&storage)) {
            return false;
        }
        storages.push(storage);
        true
    }

    /// Remove and return the first entry matching `predicate`.
    pub fn try_remove<F>(&self, predicate: F) -> Option<Storage>
    where
        F: Fn(&Storage) -> bool,
    {
        let mut storages = self.storages.lock();
        let index = storages.iter().position(|s| predicate(s))?;
        Some(storages.remove(index))
    }

    /// Remove the entry with this drive number.
    pub fn remove_drive_number(&self, drive_number: u32) -> Option<Storage> {
        self.try_remove(|s| s.drive_number() == Some(drive_number))
    }

    /// Whether an entry already covers this device: by drive number when
    /// known, otherwise by controller and path.
    pub fn contains_device(&self, controller: &str, path: &str, drive_number: Option<u32>) -> bool {
        let storages = self.storages.lock();
        match drive_number {
            Some(n) => storages.iter().any(|s| s.drive_number() == Some(n)),
            None => storages
                .iter()
                .any(|s| s.controller() == controller && s.path() == path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StorageDevice;
    use std::sync::Arc;

    fn numbered(n: u32) -> Storage {
        Storage::new(
            "SATA",
            StorageDevice::probed(format!(r"\\.\PhysicalDrive{n}"), n),
            true,
        )
    }

    fn unnumbered(controller: &str, path: &str) -> Storage {
        Storage::new(
            controller,
            StorageDevice {
                path: path.into(),
                ..Default::default()
            },
            true,
        )
    }

    #[test]
    fn try_add_suppresses_duplicate_drive_number() {
        let registry = StorageRegistry::new();
        assert!(registry.try_add(numbered(1)));

        let same_disk_other_path = Storage::new(
            "",
            StorageDevice {
                path: r"\\?\scsi#disk".into(),
                drive_number: Some(1),
                ..Default::default()
            },
            true,
        );
        assert!(!registry.try_add(same_disk_other_path));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn try_add_keys_unnumbered_on_controller_and_path() {
        let registry = StorageRegistry::new();
        assert!(registry.try_add(unnumbered("USB", "p")));
        assert!(!registry.try_add(unnumbered("USB", "p")));
        assert!(registry.try_add(unnumbered("SATA", "p")));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn snapshot_is_independent_copy() {
        let registry = StorageRegistry::new();
        registry.try_add(numbered(0));
        let snapshot = registry.snapshot();
        registry.try_add(numbered(1));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn replace_all_collapses_duplicates() {
        let registry = StorageRegistry::new();
        registry.try_add(numbered(9));
        registry.replace_all(vec![numbered(0), numbered(1), numbered(0)]);

        let numbers: Vec<_> = registry
            .snapshot()
            .iter()
            .filter_map(Storage::drive_number)
            .collect();
        assert_eq!(numbers, vec![0, 1]);
    }

    #[test]
    fn try_remove_takes_first_match_only() {
        let registry = StorageRegistry::new();
        registry.try_add(unnumbered("USB", "a"));
        registry.try_add(unnumbered("USB", "b"));

        let removed = registry.try_remove(|s| s.controller() == "USB").unwrap();
        assert_eq!(removed.path(), "a");
        assert_eq!(registry.len(), 1);
        assert!(registry.try_remove(|s| s.path() == "zzz").is_none());
    }

    #[test]
    fn contains_device_uses_identity_rules() {
        let registry = StorageRegistry::new();
        registry.try_add(numbered(3));
        registry.try_add(unnumbered("USB", "p"));

        assert!(registry.contains_device("other", "other", Some(3)));
        assert!(registry.contains_device("USB", "p", None));
        assert!(!registry.contains_device("SATA", "p", None));
        assert!(!registry.contains_device("USB", "q", None));
    }

    #[test]
    fn concurrent_adds_of_same_disk_insert_once() {
        let registry = Arc::new(StorageRegistry::new());
        let inserted: usize = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.try_add(numbered(4)))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();

        assert_eq!(inserted, 1);
        assert_eq!(registry.len(), 1);
    }
}
