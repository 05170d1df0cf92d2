/// Hidden top-level window receiving `WM_DEVICECHANGE`.
///
/// Volume arrival/removal and `DBT_DEVNODES_CHANGED` are broadcast to
/// top-level windows only, so the receiver is a never-shown top-level window
/// rather than a message-only (`HWND_MESSAGE`) one.
///
/// Created, pumped, and destroyed on the listener thread. The window procedure
/// has no user data pointer; it reaches the queue through a thread-local sink
/// installed by [`run`] before the window exists.
use super::{forward, RawDeviceChange, DBT_DEVICEARRIVAL, DBT_DEVICEREMOVECOMPLETE, WM_DEVICECHANGE};
use crate::error::WatchError;
use crate::queue::EventSink;
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, info, warn};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW,
    RegisterClassW, TranslateMessage, UnregisterClassW, MSG, WINDOW_STYLE, WNDCLASSW,
    WS_EX_TOOLWINDOW,
};

thread_local! {
    static SINK: RefCell<Option<EventSink>> = const { RefCell::new(None) };
}

/// `DEV_BROADCAST_HDR` from dbt.h.
#[repr(C)]
#[allow(dead_code)]
struct DevBroadcastHeader {
    size: u32,
    device_type: u32,
    reserved: u32,
}

/// `DEV_BROADCAST_VOLUME` from dbt.h. Trailing padding makes it 20 bytes;
/// only the bytes up to the end of `unit_mask` are read.
#[repr(C)]
#[allow(dead_code)]
struct DevBroadcastVolume {
    header: DevBroadcastHeader,
    unit_mask: u32,
    flags: u16,
}

const _: () = assert!(
    std::mem::offset_of!(DevBroadcastVolume, unit_mask) + std::mem::size_of::<u32>()
        == super::VOLUME_UNIT_MASK_END
);

/// Listener thread body.
pub(super) fn run(class_name: &str, sink: EventSink) {
    SINK.with(|slot| *slot.borrow_mut() = Some(sink));

    let receiver = match MessageReceiver::create(class_name) {
        Ok(r) => r,
        Err(e) => {
            error!("Listener: {e}; live device notifications disabled");
            SINK.with(|slot| slot.borrow_mut().take());
            return;
        }
    };
    info!("Listener: receiving device notifications");

    if catch_unwind(AssertUnwindSafe(|| receiver.pump())).is_err() {
        error!("Listener: message pump panicked; tearing down receiver");
    }

    drop(receiver);
    SINK.with(|slot| slot.borrow_mut().take());
    debug!("Listener: stopped");
}

struct MessageReceiver {
    hwnd: HWND,
    instance: HINSTANCE,
    class: Vec<u16>,
}

impl MessageReceiver {
    fn create(class_name: &str) -> Result<Self, WatchError> {
        let class: Vec<u16> = class_name.encode_utf16().chain(std::iter::once(0)).collect();

        let instance: HINSTANCE = unsafe { GetModuleHandleW(None) }
            .map_err(|e| WatchError::Receiver(format!("GetModuleHandleW failed: {e}")))?
            .into();

        let wc = WNDCLASSW {
            lpfnWndProc: Some(window_proc),
            hInstance: instance,
            lpszClassName: PCWSTR(class.as_ptr()),
            ..Default::default()
        };
        if unsafe { RegisterClassW(&wc) } == 0 {
            return Err(WatchError::Receiver(format!(
                "RegisterClassW({class_name}) failed: {}",
                windows::core::Error::from_win32()
            )));
        }

        let hwnd = unsafe {
            CreateWindowExW(
                WS_EX_TOOLWINDOW,
                PCWSTR(class.as_ptr()),
                PCWSTR(class.as_ptr()),
                WINDOW_STYLE::default(),
                0,
                0,
                0,
                0,
                HWND::default(),
                None,
                instance,
                None,
            )
        };

        match hwnd {
            Ok(hwnd) => Ok(Self {
                hwnd,
                instance,
                class,
            }),
            Err(e) => {
                unsafe {
                    let _ = UnregisterClassW(PCWSTR(class.as_ptr()), instance);
                }
                Err(WatchError::Receiver(format!("CreateWindowExW failed: {e}")))
            }
        }
    }

    /// Dispatch messages until `WM_QUIT` or a `GetMessageW` failure.
    fn pump(&self) {
        let mut msg = MSG::default();
        loop {
            let result = unsafe { GetMessageW(&mut msg, None, 0, 0) };
            match result.0 {
                0 => break,
                -1 => {
                    warn!(
                        "Listener: GetMessageW failed: {}",
                        windows::core::Error::from_win32()
                    );
                    break;
                }
                _ => unsafe {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                },
            }
        }
    }
}

impl Drop for MessageReceiver {
    fn drop(&mut self) {
        unsafe {
            let _ = DestroyWindow(self.hwnd);
            let _ = UnregisterClassW(PCWSTR(self.class.as_ptr()), self.instance);
        }
    }
}

/// Read the broadcast payload of a `WM_DEVICECHANGE`.
///
/// # Safety
///
/// `lparam` must be zero or point at a `DEV_BROADCAST_HDR` supplied by the OS
/// for this message.
unsafe fn decode(wparam: WPARAM, lparam: LPARAM) -> RawDeviceChange {
    let sub_type = wparam.0;
    let mut raw = RawDeviceChange {
        sub_type,
        device_type: None,
        unit_mask: 0,
    };

    let carries_header = sub_type == DBT_DEVICEARRIVAL || sub_type == DBT_DEVICEREMOVECOMPLETE;
    if !carries_header || lparam.0 == 0 {
        return raw;
    }

    let header = &*(lparam.0 as *const DevBroadcastHeader);
    raw.device_type = Some(header.device_type);
    if header.device_type == super::DBT_DEVTYP_VOLUME && super::carries_unit_mask(header.size) {
        let mask = (lparam.0 as *const u8).add(std::mem::offset_of!(DevBroadcastVolume, unit_mask));
        raw.unit_mask = std::ptr::read_unaligned(mask as *const u32);
    }
    raw
}

unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if msg == WM_DEVICECHANGE {
        let raw = decode(wparam, lparam);
        SINK.with(|slot| {
            if let Some(sink) = slot.borrow().as_ref() {
                forward(&raw, sink);
            }
        });
    }
    DefWindowProcW(hwnd, msg, wparam, lparam)
}
