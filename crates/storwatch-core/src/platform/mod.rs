/// Platform seams — device enumeration, entity building, and handle probing.
///
/// The registry engine never talks to the OS directly. It goes through the
/// three collaborator traits below, bundled in a [`Backend`]:
///
/// - [`DeviceEnumerator`] — walks controllers and resolves volume paths.
/// - [`StorageBuilder`] — turns a [`StorageDevice`] into a [`Storage`] and
///   decides whether it is valid.
/// - [`HandleProber`] — opens raw device paths and asks them for their drive
///   number. Handles close on drop.
///
/// [`memory::MemoryHost`] implements all three in memory. The Windows
/// implementation lives in [`windows`] and is only compiled on Windows.
use crate::model::{Storage, StorageDevice};
use std::sync::Arc;

pub mod memory;
#[cfg(windows)]
pub mod windows;

/// Devices reported under one storage controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerDevices {
    pub controller: String,
    pub devices: Vec<StorageDevice>,
}

/// A device resolved from a volume path, with the controller it sits on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDevice {
    pub controller: String,
    pub device: StorageDevice,
}

pub trait DeviceEnumerator: Send + Sync {
    /// Every controller on the host together with the devices behind it.
    fn list_controllers(&self) -> Vec<ControllerDevices>;

    /// Resolve a volume path such as `\\.\E:` to its physical device.
    fn resolve_by_path(&self, path: &str) -> Option<ResolvedDevice>;
}

pub trait StorageBuilder: Send + Sync {
    /// Build the entity for `device`. Check [`Storage::is_valid`] before
    /// registering the result.
    fn build(&self, controller: &str, device: StorageDevice) -> Storage;
}

/// An open handle to a device path. Dropping it closes the handle.
pub trait DeviceHandle: Send {
    /// Physical disk index behind this handle, if the device reports one.
    fn drive_number(&self) -> Option<u32>;
}

pub trait HandleProber: Send + Sync {
    /// Open `path`. `None` means the device is absent or inaccessible; callers
    /// treat both the same way.
    fn open_path(&self, path: &str) -> Option<Box<dyn DeviceHandle>>;
}

/// The collaborators a watcher needs, shareable across threads.
#[derive(Clone)]
pub struct Backend {
    pub enumerator: Arc<dyn DeviceEnumerator>,
    pub builder: Arc<dyn StorageBuilder>,
    pub prober: Arc<dyn HandleProber>,
}

impl Backend {
    pub fn new(
        enumerator: Arc<dyn DeviceEnumerator>,
        builder: Arc<dyn StorageBuilder>,
        prober: Arc<dyn HandleProber>,
    ) -> Self {
        Self {
            enumerator,
            builder,
            prober,
        }
    }

    /// Use one object for all three roles.
    pub fn from_host<H>(host: Arc<H>) -> Self
    where
        H: DeviceEnumerator + StorageBuilder + HandleProber + 'static,
    {
        Self {
            enumerator: host.clone(),
            builder: host.clone(),
            prober: host,
        }
    }
}

/// Builder that marks a device valid when its path opens and, for numbered
/// devices, the handle reports the same drive number.
pub struct OpenProbeBuilder {
    prober: Arc<dyn HandleProber>,
}

impl OpenProbeBuilder {
    pub fn new(prober: Arc<dyn HandleProber>) -> Self {
        Self { prober }
    }
}

impl StorageBuilder for OpenProbeBuilder {
    fn build(&self, controller: &str, device: StorageDevice) -> Storage {
        let valid = match self.prober.open_path(&device.path) {
            Some(handle) => match device.drive_number {
                Some(expected) => handle.drive_number() == Some(expected),
                None => true,
            },
            None => false,
        };
        Storage::new(controller, device, valid)
    }
}

/// `\\.\PhysicalDrive<n>`.
pub fn physical_drive_path(index: u32) -> String {
    format!(r"\\.\PhysicalDrive{index}")
}

/// `\\.\<letter>:`.
pub fn volume_path(letter: char) -> String {
    format!(r"\\.\{letter}:")
}

/// Inverse of [`physical_drive_path`]. Case-insensitive on the prefix.
pub fn parse_physical_drive_path(path: &str) -> Option<u32> {
    let rest = path.strip_prefix(r"\\.\")?;
    if rest.len() <= "PhysicalDrive".len() || !rest.is_char_boundary("PhysicalDrive".len()) {
        return None;
    }
    let (prefix, digits) = rest.split_at("PhysicalDrive".len());
    if !prefix.eq_ignore_ascii_case("PhysicalDrive") {
        return None;
    }
    digits.parse().ok()
}

/// Inverse of [`volume_path`]. Returns the upper-case letter.
pub fn parse_volume_path(path: &str) -> Option<char> {
    let rest = path.strip_prefix(r"\\.\")?;
    let mut chars = rest.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(letter), Some(':'), None) if letter.is_ascii_alphabetic() => {
            Some(letter.to_ascii_uppercase())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_drive_path_round_trip() {
        assert_eq!(physical_drive_path(0), r"\\.\PhysicalDrive0");
        assert_eq!(parse_physical_drive_path(r"\\.\PhysicalDrive12"), Some(12));
        assert_eq!(parse_physical_drive_path(r"\\.\physicaldrive3"), Some(3));
    }

    #[test]
    fn physical_drive_path_rejects_other_paths() {
        assert_eq!(parse_physical_drive_path(r"\\.\PhysicalDrive"), None);
        assert_eq!(parse_physical_drive_path(r"\\.\C:"), None);
        assert_eq!(parse_physical_drive_path(r"\\.\PhysicalDriveX"), None);
        assert_eq!(parse_physical_drive_path("PhysicalDrive0"), None);
    }

    #[test]
    fn volume_path_round_trip() {
        assert_eq!(volume_path('E'), r"\\.\E:");
        assert_eq!(parse_volume_path(r"\\.\e:"), Some('E'));
        assert_eq!(parse_volume_path(r"\\.\E:\"), None);
        assert_eq!(parse_volume_path(r"\\.\1:"), None);
    }

    #[test]
    fn open_probe_builder_checks_drive_number() {
        let host = Arc::new(memory::MemoryHost::new());
        host.add_probe_only(2);
        let builder = OpenProbeBuilder::new(host);

        let good = builder.build("", StorageDevice::probed(physical_drive_path(2), 2));
        assert!(good.is_valid());

        let mismatched = builder.build("", StorageDevice::probed(physical_drive_path(2), 5));
        assert!(!mismatched.is_valid());

        let absent = builder.build("", StorageDevice::probed(physical_drive_path(7), 7));
        assert!(!absent.is_valid());
    }
}
