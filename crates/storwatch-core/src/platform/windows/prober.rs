/// Raw device handles via `CreateFileW`.
///
/// Handles are opened with zero desired access: enough for
/// `IOCTL_STORAGE_GET_DEVICE_NUMBER` and does not require elevation.
use crate::platform::{DeviceHandle, HandleProber};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows::Win32::System::Ioctl::{IOCTL_STORAGE_GET_DEVICE_NUMBER, STORAGE_DEVICE_NUMBER};
use windows::Win32::System::IO::DeviceIoControl;

#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsProber;

/// Owned Win32 handle, closed on drop.
pub struct Win32Handle(HANDLE);

// SAFETY: a file handle may be used and closed from any thread.
unsafe impl Send for Win32Handle {}

impl Drop for Win32Handle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

impl DeviceHandle for Win32Handle {
    fn drive_number(&self) -> Option<u32> {
        device_number(self.0).map(|n| n.DeviceNumber)
    }
}

impl WindowsProber {
    /// Open `path` without requesting read or write access.
    pub fn open(path: &str) -> Option<Win32Handle> {
        let wide: Vec<u16> = path.encode_utf16().chain(std::iter::once(0)).collect();
        let handle = unsafe {
            CreateFileW(
                PCWSTR(wide.as_ptr()),
                0,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                None,
                OPEN_EXISTING,
                Default::default(),
                None,
            )
        };
        match handle {
            Ok(h) if !h.is_invalid() => Some(Win32Handle(h)),
            Ok(_) => None,
            Err(e) => {
                tracing::trace!("CreateFileW({path}) failed: {e}");
                None
            }
        }
    }
}

impl HandleProber for WindowsProber {
    fn open_path(&self, path: &str) -> Option<Box<dyn DeviceHandle>> {
        Self::open(path).map(|h| Box::new(h) as Box<dyn DeviceHandle>)
    }
}

/// `IOCTL_STORAGE_GET_DEVICE_NUMBER` on an open disk or volume handle.
fn device_number(handle: HANDLE) -> Option<STORAGE_DEVICE_NUMBER> {
    let mut number = STORAGE_DEVICE_NUMBER::default();
    let mut bytes_returned: u32 = 0;
    let ok = unsafe {
        DeviceIoControl(
            handle,
            IOCTL_STORAGE_GET_DEVICE_NUMBER,
            None,
            0,
            Some(&mut number as *mut STORAGE_DEVICE_NUMBER as *mut std::ffi::c_void),
            std::mem::size_of::<STORAGE_DEVICE_NUMBER>() as u32,
            Some(&mut bytes_returned),
            None,
        )
    };
    if ok.is_err() || (bytes_returned as usize) < std::mem::size_of::<STORAGE_DEVICE_NUMBER>() {
        return None;
    }
    Some(number)
}
