/// Full device discovery: controller walk plus physical-index probing.
///
/// The controller walk misses some disks (raw, unpartitioned, or carrying a
/// filesystem the enumerator does not recognise). Those still answer on
/// `\\.\PhysicalDriveN`, so every index in the configured probe range that
/// the walk did not report is opened directly.
use crate::config::WatchConfig;
use crate::model::{Storage, StorageDevice};
use crate::platform::{physical_drive_path, Backend, HandleProber};
use std::collections::HashSet;
use std::ops::Range;
use tracing::{debug, trace};

/// Open `\\.\PhysicalDrive<n>` for each index in `range` not already `known`.
///
/// Handles are closed as soon as the open succeeds. Failed opens mean the
/// disk is absent and are skipped without logging above trace.
pub fn probe_physical_drives<F>(
    prober: &dyn HandleProber,
    range: Range<u32>,
    known: F,
) -> Vec<StorageDevice>
where
    F: Fn(u32) -> bool,
{
    let mut found = Vec::new();
    for index in range {
        if known(index) {
            continue;
        }
        let path = physical_drive_path(index);
        match prober.open_path(&path) {
            Some(handle) => {
                drop(handle);
                debug!("Probe found {path}");
                found.push(StorageDevice::probed(path, index));
            }
            None => trace!("Probe: {path} did not open"),
        }
    }
    found
}

/// Enumerate and build every valid storage on the host.
///
/// Runs on the calling thread and may block on device I/O.
pub fn discover_storages(backend: &Backend, config: &WatchConfig) -> Vec<Storage> {
    let mut storages = Vec::new();
    let mut enumerated: HashSet<u32> = HashSet::new();

    for group in backend.enumerator.list_controllers() {
        for device in group.devices {
            if let Some(n) = device.drive_number {
                enumerated.insert(n);
            }
            let storage = backend.builder.build(&group.controller, device);
            if storage.is_valid() {
                storages.push(storage);
            } else {
                trace!(
                    "Skipping invalid device {} on {}",
                    storage.path(),
                    group.controller
                );
            }
        }
    }

    let probed = probe_physical_drives(backend.prober.as_ref(), config.probe_range(), |n| {
        enumerated.contains(&n)
    });
    for device in probed {
        let storage = backend.builder.build("", device);
        if storage.is_valid() {
            storages.push(storage);
        } else {
            trace!("Skipping invalid probed device {}", storage.path());
        }
    }

    storages
}
