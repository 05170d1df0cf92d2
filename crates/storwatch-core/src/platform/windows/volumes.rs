/// Volume-based device enumeration using the Windows API.
///
/// Walks the logical drive strings, opens each local volume, and asks it for
/// the physical disk it lives on. Disks are grouped into one "controller" per
/// drive type. A disk carrying several volumes is reported once, under its
/// first volume letter.
use super::prober::WindowsProber;
use crate::platform::{
    parse_volume_path, physical_drive_path, volume_path, ControllerDevices, DeviceEnumerator,
    DeviceHandle, ResolvedDevice,
};
use crate::model::StorageDevice;
use std::collections::HashSet;
use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;
use windows::Win32::Storage::FileSystem::{GetDriveTypeW, GetLogicalDriveStringsW};

// Drive type constants from the Windows API.
const DRIVE_REMOVABLE_VAL: u32 = 2;
const DRIVE_FIXED_VAL: u32 = 3;

/// Drive type classification used as the controller name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKind {
    Fixed,
    Removable,
}

impl VolumeKind {
    /// Controller label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Fixed => "Fixed",
            Self::Removable => "Removable",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct VolumeEnumerator;

impl VolumeEnumerator {
    pub fn new() -> Self {
        Self
    }
}

/// Local fixed and removable volume letters. Network, optical, and RAM
/// drives are skipped.
fn local_volumes() -> Vec<(char, VolumeKind)> {
    let mut volumes = Vec::new();

    // GetLogicalDriveStringsW returns null-separated drive root strings.
    let mut buffer = [0u16; 256];
    let len = unsafe { GetLogicalDriveStringsW(Some(&mut buffer)) };
    if len == 0 || len as usize > buffer.len() {
        tracing::warn!("GetLogicalDriveStringsW returned {len}");
        return volumes;
    }

    let full = OsString::from_wide(&buffer[..len as usize]);
    let full_str = full.to_string_lossy();

    for root in full_str.split('\0').filter(|s| !s.is_empty()) {
        let Some(letter) = root.chars().next().filter(char::is_ascii_alphabetic) else {
            continue;
        };
        if let Some(kind) = volume_kind(letter) {
            volumes.push((letter.to_ascii_uppercase(), kind));
        }
    }

    volumes
}

fn volume_kind(letter: char) -> Option<VolumeKind> {
    let root_wide: Vec<u16> = format!("{letter}:\\")
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();
    let raw_type = unsafe { GetDriveTypeW(windows::core::PCWSTR(root_wide.as_ptr())) };
    match raw_type {
        DRIVE_FIXED_VAL => Some(VolumeKind::Fixed),
        DRIVE_REMOVABLE_VAL => Some(VolumeKind::Removable),
        _ => None,
    }
}

/// Physical disk behind the volume at `letter`.
fn resolve_volume(letter: char, kind: VolumeKind) -> Option<ResolvedDevice> {
    let path = volume_path(letter);
    let drive_number = WindowsProber::open(&path)?.drive_number()?;
    Some(ResolvedDevice {
        controller: kind.label().to_owned(),
        device: StorageDevice {
            device_id: format!("{letter}:"),
            hardware_id: String::new(),
            path: physical_drive_path(drive_number),
            drive_number: Some(drive_number),
        },
    })
}

impl DeviceEnumerator for VolumeEnumerator {
    fn list_controllers(&self) -> Vec<ControllerDevices> {
        let mut groups: Vec<ControllerDevices> = Vec::new();
        let mut seen: HashSet<u32> = HashSet::new();

        for (letter, kind) in local_volumes() {
            let Some(resolved) = resolve_volume(letter, kind) else {
                tracing::debug!("Volume {letter}: has no physical disk number");
                continue;
            };
            if let Some(n) = resolved.device.drive_number {
                if !seen.insert(n) {
                    continue;
                }
            }
            match groups
                .iter()
                .position(|g| g.controller == resolved.controller)
            {
                Some(i) => groups[i].devices.push(resolved.device),
                None => groups.push(ControllerDevices {
                    controller: resolved.controller,
                    devices: vec![resolved.device],
                }),
            }
        }

        groups
    }

    fn resolve_by_path(&self, path: &str) -> Option<ResolvedDevice> {
        let letter = parse_volume_path(path)?;
        let kind = volume_kind(letter)?;
        resolve_volume(letter, kind)
    }
}
