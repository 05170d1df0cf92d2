/// Storage device identity and the registry entity built from it.
///
/// A [`StorageDevice`] is what the enumerator reports; a [`Storage`] is what
/// the builder produces from it once the device has been probed. Registry
/// membership is decided by [`StorageKey`], never by path-string equality.
use serde::Serialize;
use std::fmt;

/// Raw identity data for one physical storage device, as reported by a
/// [`DeviceEnumerator`](crate::platform::DeviceEnumerator).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StorageDevice {
    /// OS device identifier. May be empty.
    pub device_id: String,
    /// Hardware identifier. May be empty for devices discovered by probing.
    pub hardware_id: String,
    /// Physical access path, e.g. `\\.\PhysicalDrive0`.
    pub path: String,
    /// OS-assigned physical disk index, if known.
    pub drive_number: Option<u32>,
}

impl StorageDevice {
    /// A device found only by opening `path` directly: no identifiers, just
    /// the path and the probed index.
    pub fn probed(path: impl Into<String>, drive_number: u32) -> Self {
        Self {
            device_id: String::new(),
            hardware_id: String::new(),
            path: path.into(),
            drive_number: Some(drive_number),
        }
    }
}

/// Identity of a [`Storage`] for registry membership.
///
/// Drive numbers are stable across enumeration methods while path spellings
/// are not, so the drive number wins whenever it is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum StorageKey {
    DriveNumber(u32),
    Path { controller: String, path: String },
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DriveNumber(n) => write!(f, "disk #{n}"),
            Self::Path { controller, path } if controller.is_empty() => write!(f, "{path}"),
            Self::Path { controller, path } => write!(f, "{controller}:{path}"),
        }
    }
}

/// A storage device owned by the registry.
///
/// Only a [`StorageBuilder`](crate::platform::StorageBuilder) creates these;
/// the validity flag is fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Storage {
    controller: String,
    device: StorageDevice,
    valid: bool,
}

impl Storage {
    pub fn new(controller: impl Into<String>, device: StorageDevice, valid: bool) -> Self {
        Self {
            controller: controller.into(),
            device,
            valid,
        }
    }

    /// Name of the controller the device was enumerated under. Empty for
    /// probed devices.
    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn device(&self) -> &StorageDevice {
        &self.device
    }

    pub fn path(&self) -> &str {
        &self.device.path
    }

    pub fn drive_number(&self) -> Option<u32> {
        self.device.drive_number
    }

    /// Whether the builder could open and query the device.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn key(&self) -> StorageKey {
        match self.device.drive_number {
            Some(n) => StorageKey::DriveNumber(n),
            None => StorageKey::Path {
                controller: self.controller.clone(),
                path: self.device.path.clone(),
            },
        }
    }

    /// True if `other` refers to the same device: same drive number when this
    /// entry has one, otherwise same controller and path.
    pub fn same_identity(&self, other: &Storage) -> bool {
        self.key() == other.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(path: &str, drive_number: Option<u32>) -> StorageDevice {
        StorageDevice {
            device_id: "ID".into(),
            hardware_id: "HW".into(),
            path: path.into(),
            drive_number,
        }
    }

    #[test]
    fn key_prefers_drive_number() {
        let s = Storage::new("SCSI", device(r"\\.\PhysicalDrive3", Some(3)), true);
        assert_eq!(s.key(), StorageKey::DriveNumber(3));
    }

    #[test]
    fn key_falls_back_to_controller_and_path() {
        let s = Storage::new("USB", device(r"\\?\usbstor#disk", None), true);
        assert_eq!(
            s.key(),
            StorageKey::Path {
                controller: "USB".into(),
                path: r"\\?\usbstor#disk".into()
            }
        );
    }

    #[test]
    fn same_drive_number_is_same_identity_despite_path_spelling() {
        let a = Storage::new("SCSI", device(r"\\?\scsi#disk&ven_x", Some(1)), true);
        let b = Storage::new("", StorageDevice::probed(r"\\.\PhysicalDrive1", 1), true);
        assert!(a.same_identity(&b));
    }

    #[test]
    fn unnumbered_devices_differ_by_controller() {
        let a = Storage::new("USB", device("p", None), true);
        let b = Storage::new("SATA", device("p", None), true);
        assert!(!a.same_identity(&b));
    }

    #[test]
    fn key_display() {
        assert_eq!(StorageKey::DriveNumber(2).to_string(), "disk #2");
        let k = StorageKey::Path {
            controller: "USB".into(),
            path: "p".into(),
        };
        assert_eq!(k.to_string(), "USB:p");
    }
}
