/// Notification listener — turns OS hardware-change messages into queued
/// [`ChangeEvent`]s.
///
/// On Windows a dedicated thread owns a hidden top-level window that receives
/// `WM_DEVICECHANGE`. The window procedure only decodes the message (see
/// [`translate`]) and pushes events into the [`EventSink`]; it never touches
/// the registry. Everything else happens on the processor thread.
///
/// There is no listener on other platforms: [`spawn_listener`] logs a warning
/// and returns `None`, and events can still be injected through an
/// [`EventSink`].
use crate::config::WatchConfig;
use crate::error::Result;
use crate::model::ChangeEvent;
use crate::queue::EventSink;
use std::thread::JoinHandle;

#[cfg(windows)]
mod window;

/// `WM_DEVICECHANGE`.
pub const WM_DEVICECHANGE: u32 = 0x0219;

// `WM_DEVICECHANGE` sub-types (wParam) from dbt.h.
pub const DBT_DEVNODES_CHANGED: usize = 0x0007;
pub const DBT_DEVICEARRIVAL: usize = 0x8000;
pub const DBT_DEVICEREMOVECOMPLETE: usize = 0x8004;

/// `dbch_devicetype` of a volume broadcast.
pub const DBT_DEVTYP_VOLUME: u32 = 0x0002;

/// Offset just past `dbcv_unitmask` in `DEV_BROADCAST_VOLUME`: the three
/// header fields plus the mask.
pub const VOLUME_UNIT_MASK_END: usize = 16;

/// Whether a volume broadcast of `dbch_size` bytes is long enough to hold its
/// unit mask. The struct's trailing `dbcv_flags` and padding are not needed.
pub fn carries_unit_mask(size: u32) -> bool {
    size as usize >= VOLUME_UNIT_MASK_END
}

/// A `WM_DEVICECHANGE` message with its broadcast header already read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDeviceChange {
    /// The wParam sub-type.
    pub sub_type: usize,
    /// `dbch_devicetype` from the lParam header, if one was supplied.
    pub device_type: Option<u32>,
    /// `dbcv_unitmask`, meaningful only for volume broadcasts.
    pub unit_mask: u32,
}

/// Decode a single-bit volume unit mask: shift right until the mask is 1,
/// counting shifts. Bit 0 is `A`.
///
/// Returns `None` for an empty mask or a bit beyond `Z`. With several bits
/// set this yields the highest one; use [`drive_letters_from_unit_mask`] to
/// get all of them.
pub fn drive_letter_from_unit_mask(mut mask: u32) -> Option<char> {
    if mask == 0 {
        return None;
    }
    let mut position = 0u32;
    while mask != 1 {
        mask >>= 1;
        position += 1;
    }
    letter_at(position)
}

/// Every drive letter set in `mask`, `A` first.
pub fn drive_letters_from_unit_mask(mask: u32) -> impl Iterator<Item = char> {
    (0..26u32)
        .filter(move |bit| mask & (1 << *bit) != 0)
        .filter_map(letter_at)
}

fn letter_at(position: u32) -> Option<char> {
    if position < 26 {
        char::from_u32(u32::from(b'A') + position)
    } else {
        None
    }
}

/// Map a raw device-change message to queue events.
///
/// - `DBT_DEVNODES_CHANGED` → one `DevicesChanged`.
/// - Volume arrival / removal → one `Added` / `Removed` per letter in the mask.
/// - Anything else → nothing.
pub fn translate(raw: &RawDeviceChange) -> Vec<ChangeEvent> {
    match raw.sub_type {
        DBT_DEVNODES_CHANGED => vec![ChangeEvent::DevicesChanged],
        DBT_DEVICEARRIVAL | DBT_DEVICEREMOVECOMPLETE
            if raw.device_type == Some(DBT_DEVTYP_VOLUME) =>
        {
            let arrival = raw.sub_type == DBT_DEVICEARRIVAL;
            let events: Vec<ChangeEvent> = drive_letters_from_unit_mask(raw.unit_mask)
                .map(|letter| {
                    if arrival {
                        ChangeEvent::Added(letter)
                    } else {
                        ChangeEvent::Removed(letter)
                    }
                })
                .collect();
            if events.is_empty() {
                tracing::trace!("Volume broadcast with empty unit mask {:#x}", raw.unit_mask);
            }
            events
        }
        _ => {
            tracing::trace!(
                "Ignoring device change {:#06x} (device type {:?})",
                raw.sub_type,
                raw.device_type
            );
            Vec::new()
        }
    }
}

/// Push the translation of `raw` into `sink`. Returns the number of events
/// queued.
pub fn forward(raw: &RawDeviceChange, sink: &EventSink) -> usize {
    let mut queued = 0;
    for event in translate(raw) {
        if sink.push(event) {
            queued += 1;
        }
    }
    queued
}

/// Start the listener thread.
///
/// Receiver registration happens on the new thread; if it fails the thread
/// logs and exits, and the watcher carries on without live notifications.
#[cfg(windows)]
pub fn spawn_listener(config: &WatchConfig, sink: EventSink) -> Result<Option<JoinHandle<()>>> {
    let class_name = config.receiver_class_name.clone();
    let name = config.listener_thread_name.clone();
    std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || window::run(&class_name, sink))
        .map(Some)
        .map_err(|e| crate::error::WatchError::ThreadSpawn { name, source: e })
}

#[cfg(not(windows))]
pub fn spawn_listener(config: &WatchConfig, sink: EventSink) -> Result<Option<JoinHandle<()>>> {
    drop(sink);
    tracing::warn!(
        "No device notification transport on this platform; {} not started",
        config.listener_thread_name
    );
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::change_queue;

    fn volume(sub_type: usize, unit_mask: u32) -> RawDeviceChange {
        RawDeviceChange {
            sub_type,
            device_type: Some(DBT_DEVTYP_VOLUME),
            unit_mask,
        }
    }

    #[test]
    fn unit_mask_decodes_to_letter() {
        assert_eq!(drive_letter_from_unit_mask(0b0000001), Some('A'));
        assert_eq!(drive_letter_from_unit_mask(0b0000100), Some('C'));
        assert_eq!(drive_letter_from_unit_mask(1 << 25), Some('Z'));
    }

    #[test]
    fn unit_mask_out_of_range_is_none() {
        assert_eq!(drive_letter_from_unit_mask(0), None);
        assert_eq!(drive_letter_from_unit_mask(1 << 26), None);
    }

    #[test]
    fn multi_bit_mask_yields_every_letter() {
        let letters: Vec<char> = drive_letters_from_unit_mask((1 << 20) | 0b11000).collect();
        assert_eq!(letters, vec!['D', 'E', 'U']);
    }

    #[test]
    fn short_volume_broadcast_still_carries_mask() {
        assert!(carries_unit_mask(16));
        assert!(carries_unit_mask(18));
        assert!(carries_unit_mask(20));
        assert!(!carries_unit_mask(12));
    }

    #[test]
    fn devnodes_changed_requests_reconcile() {
        let raw = RawDeviceChange {
            sub_type: DBT_DEVNODES_CHANGED,
            device_type: None,
            unit_mask: 0,
        };
        assert_eq!(translate(&raw), vec![ChangeEvent::DevicesChanged]);
    }

    #[test]
    fn volume_arrival_and_removal() {
        assert_eq!(
            translate(&volume(DBT_DEVICEARRIVAL, 0b1000)),
            vec![ChangeEvent::Added('D')]
        );
        assert_eq!(
            translate(&volume(DBT_DEVICEREMOVECOMPLETE, 0b1000)),
            vec![ChangeEvent::Removed('D')]
        );
    }

    #[test]
    fn non_volume_device_type_is_ignored() {
        let raw = RawDeviceChange {
            sub_type: DBT_DEVICEARRIVAL,
            device_type: Some(0x0005),
            unit_mask: 0b1000,
        };
        assert!(translate(&raw).is_empty());
    }

    #[test]
    fn other_sub_types_are_ignored() {
        // DBT_DEVICEQUERYREMOVE
        assert!(translate(&volume(0x8001, 0b1000)).is_empty());
    }

    #[test]
    fn forward_pushes_into_queue() {
        let (sink, source) = change_queue();
        assert_eq!(forward(&volume(DBT_DEVICEARRIVAL, 0b110), &sink), 2);
        assert_eq!(source.try_next(), Some(ChangeEvent::Added('B')));
        assert_eq!(source.try_next(), Some(ChangeEvent::Added('C')));
    }
}
