/// In-memory host: a simulated device table implementing every collaborator
/// trait.
///
/// Useful for tests and for embedders that already know their devices. The
/// host models three kinds of presence:
///
/// - devices listed under a controller (seen by `list_controllers`),
/// - volumes mounted at a drive letter (seen by `resolve_by_path` and by
///   opening `\\.\X:`),
/// - probe-only disks that the controller walk misses but that answer on
///   `\\.\PhysicalDriveN`.
use super::{
    parse_physical_drive_path, parse_volume_path, ControllerDevices, DeviceEnumerator,
    DeviceHandle, HandleProber, ResolvedDevice, StorageBuilder,
};
use crate::model::{Storage, StorageDevice};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Default)]
struct HostState {
    controllers: Vec<ControllerDevices>,
    volumes: BTreeMap<char, ResolvedDevice>,
    probe_only: BTreeSet<u32>,
    invalid_paths: HashSet<String>,
    builds: usize,
}

impl HostState {
    fn listed(&self) -> impl Iterator<Item = &StorageDevice> + '_ {
        self.controllers.iter().flat_map(|c| c.devices.iter())
    }

    fn physical_present(&self, index: u32) -> bool {
        self.probe_only.contains(&index) || self.listed().any(|d| d.drive_number == Some(index))
    }
}

#[derive(Default)]
pub struct MemoryHost {
    state: Mutex<HostState>,
}

struct MemoryHandle {
    drive_number: Option<u32>,
}

impl DeviceHandle for MemoryHandle {
    fn drive_number(&self) -> Option<u32> {
        self.drive_number
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// List `device` under `controller`, creating the controller if needed.
    pub fn add_device(&self, controller: &str, device: StorageDevice) {
        let mut state = self.state.lock();
        match state
            .controllers
            .iter()
            .position(|c| c.controller == controller)
        {
            Some(i) => state.controllers[i].devices.push(device),
            None => state.controllers.push(ControllerDevices {
                controller: controller.to_owned(),
                devices: vec![device],
            }),
        }
    }

    /// Mount `device` at `letter`. The device is also listed under
    /// `controller` unless a device with the same path is already listed.
    pub fn attach_volume(&self, letter: char, controller: &str, device: StorageDevice) {
        let already_listed = self.state.lock().listed().any(|d| d.path == device.path);
        if !already_listed {
            self.add_device(controller, device.clone());
        }
        self.state.lock().volumes.insert(
            letter.to_ascii_uppercase(),
            ResolvedDevice {
                controller: controller.to_owned(),
                device,
            },
        );
    }

    /// Unmount `letter`. The device stays listed.
    pub fn detach_volume(&self, letter: char) {
        self.state.lock().volumes.remove(&letter.to_ascii_uppercase());
    }

    /// A disk reachable only by probing `\\.\PhysicalDrive<index>`.
    pub fn add_probe_only(&self, index: u32) {
        self.state.lock().probe_only.insert(index);
    }

    /// Unplug the disk with this drive number: drops it from controllers,
    /// probe-only disks, and every volume on it.
    pub fn remove_drive(&self, index: u32) {
        let mut state = self.state.lock();
        for group in &mut state.controllers {
            group.devices.retain(|d| d.drive_number != Some(index));
        }
        state.controllers.retain(|c| !c.devices.is_empty());
        state.probe_only.remove(&index);
        state
            .volumes
            .retain(|_, v| v.device.drive_number != Some(index));
    }

    /// Unplug a listed device by path.
    pub fn remove_path(&self, path: &str) {
        let mut state = self.state.lock();
        for group in &mut state.controllers {
            group.devices.retain(|d| d.path != path);
        }
        state.controllers.retain(|c| !c.devices.is_empty());
        state.volumes.retain(|_, v| v.device.path != path);
    }

    /// Make the builder reject the device at `path`.
    pub fn mark_invalid(&self, path: &str) {
        self.state.lock().invalid_paths.insert(path.to_owned());
    }

    /// Number of entities built so far.
    pub fn build_count(&self) -> usize {
        self.state.lock().builds
    }
}

impl DeviceEnumerator for MemoryHost {
    fn list_controllers(&self) -> Vec<ControllerDevices> {
        self.state.lock().controllers.clone()
    }

    fn resolve_by_path(&self, path: &str) -> Option<ResolvedDevice> {
        let letter = parse_volume_path(path)?;
        self.state.lock().volumes.get(&letter).cloned()
    }
}

impl StorageBuilder for MemoryHost {
    fn build(&self, controller: &str, device: StorageDevice) -> Storage {
        let mut state = self.state.lock();
        state.builds += 1;
        let valid = !state.invalid_paths.contains(&device.path);
        Storage::new(controller, device, valid)
    }
}

impl HandleProber for MemoryHost {
    fn open_path(&self, path: &str) -> Option<Box<dyn DeviceHandle>> {
        let state = self.state.lock();

        let drive_number = if let Some(letter) = parse_volume_path(path) {
            state.volumes.get(&letter)?.device.drive_number
        } else if let Some(index) = parse_physical_drive_path(path) {
            if !state.physical_present(index) {
                return None;
            }
            Some(index)
        } else {
            state.listed().find(|d| d.path == path)?.drive_number
        };

        Some(Box::new(MemoryHandle { drive_number }))
    }
}
