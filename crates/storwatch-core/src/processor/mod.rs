/// Change processor — applies queued [`ChangeEvent`]s to the registry.
///
/// Runs on its own thread. It sleeps until the listener wakes it, then drains
/// the queue completely before sleeping again, so a burst of arrivals (a hub
/// with several volumes, say) is handled in one pass.
///
/// # Event handling
///
/// - `Added(letter)`: resolve `\\.\<letter>:` to its disk, skip it if the
///   registry already covers that disk, otherwise build and register it.
/// - `Removed(letter)`: open `\\.\<letter>:`, read its drive number, and drop
///   the registry entry with that number.
/// - `DevicesChanged`: full reconciliation; see [`reconcile`].
///
/// Every registry insert or removal made here fires exactly one
/// [`StorageChange`]. Inserts go through add-if-absent and removals through
/// remove-if-present, so a letter event and a reconciliation racing for the
/// same disk produce one notification between them.
pub mod reconcile;

use crate::config::WatchConfig;
use crate::discovery::probe_physical_drives;
use crate::model::{ChangeEvent, Storage, StorageChange};
use crate::notifier::ChangeNotifier;
use crate::platform::{volume_path, Backend, ResolvedDevice};
use crate::queue::EventSource;
use crate::registry::StorageRegistry;
use reconcile::{current_by_drive_number, diff_drive_numbers, existing_by_drive_number};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, trace};

pub struct ChangeProcessor {
    registry: Arc<StorageRegistry>,
    notifier: Arc<ChangeNotifier>,
    backend: Backend,
    config: WatchConfig,
}

impl ChangeProcessor {
    pub fn new(
        registry: Arc<StorageRegistry>,
        notifier: Arc<ChangeNotifier>,
        backend: Backend,
        config: WatchConfig,
    ) -> Self {
        Self {
            registry,
            notifier,
            backend,
            config,
        }
    }

    /// Process events until every sink feeding `source` is dropped.
    pub fn run(&self, source: EventSource) {
        debug!("Processor: started");
        while let Some(first) = source.wait() {
            trace!("Processor: woke with {} more queued", source.pending());
            let handled = 1 + self.drain_from(first, &source);
            trace!("Processor: drained {handled} event(s)");
        }
        debug!("Processor: queue closed, exiting");
    }

    /// Handle everything currently queued without blocking. Returns the
    /// number of events handled.
    pub fn drain(&self, source: &EventSource) -> usize {
        match source.try_next() {
            Some(first) => 1 + self.drain_from(first, source),
            None => 0,
        }
    }

    fn drain_from(&self, first: ChangeEvent, source: &EventSource) -> usize {
        self.handle_guarded(first);
        let mut extra = 0;
        while let Some(event) = source.try_next() {
            self.handle_guarded(event);
            extra += 1;
        }
        extra
    }

    /// A panicking backend call must not take the processor thread down with
    /// it. Subscriber panics are already contained by the notifier.
    fn handle_guarded(&self, event: ChangeEvent) {
        if catch_unwind(AssertUnwindSafe(|| self.handle(event))).is_err() {
            error!("Processor: panic while handling {event}; continuing");
        }
    }

    /// Apply a single event.
    pub fn handle(&self, event: ChangeEvent) {
        debug!("Processor: {event}");
        match event {
            ChangeEvent::Added(letter) => self.volume_added(letter),
            ChangeEvent::Removed(letter) => self.volume_removed(letter),
            ChangeEvent::DevicesChanged => self.reconcile(),
        }
    }

    fn volume_added(&self, letter: char) {
        let path = volume_path(letter);
        let Some(ResolvedDevice { controller, device }) =
            self.backend.enumerator.resolve_by_path(&path)
        else {
            debug!("No device behind {path}; ignoring arrival");
            return;
        };

        if self
            .registry
            .contains_device(&controller, &device.path, device.drive_number)
        {
            debug!("{path} is already registered as {}", device.path);
            return;
        }

        let storage = self.backend.builder.build(&controller, device);
        if !storage.is_valid() {
            trace!("Discarding invalid device {} behind {path}", storage.path());
            return;
        }
        self.register(storage);
    }

    fn volume_removed(&self, letter: char) {
        let path = volume_path(letter);
        let Some(handle) = self.backend.prober.open_path(&path) else {
            debug!("{path} did not open; device already gone");
            return;
        };
        let drive_number = handle.drive_number();
        drop(handle);

        let Some(n) = drive_number else {
            debug!("{path} reports no drive number; ignoring removal");
            return;
        };
        if let Some(storage) = self.registry.remove_drive_number(n) {
            self.announce(StorageChange::removed(storage));
        }
    }

    /// Diff the registry against a fresh enumeration by drive number and
    /// apply the result: additions first, then removals.
    pub fn reconcile(&self) {
        let controllers = self.backend.enumerator.list_controllers();
        let snapshot = self.registry.snapshot();
        let existing = existing_by_drive_number(&snapshot);
        let mut current = current_by_drive_number(controllers);

        let probed = probe_physical_drives(
            self.backend.prober.as_ref(),
            self.config.probe_range(),
            |n| current.contains_key(&n),
        );
        for device in probed {
            if let Some(n) = device.drive_number {
                current.insert(
                    n,
                    ResolvedDevice {
                        controller: String::new(),
                        device,
                    },
                );
            }
        }

        let diff = diff_drive_numbers(&existing, &current);
        if diff.is_empty() {
            trace!("Reconcile: no drive-number changes");
            return;
        }
        debug!(
            "Reconcile: added {:?}, removed {:?}",
            diff.added, diff.removed
        );

        for n in diff.added {
            let Some(ResolvedDevice { controller, device }) = current.remove(&n) else {
                continue;
            };
            let storage = self.backend.builder.build(&controller, device);
            if storage.is_valid() {
                self.register(storage);
            } else {
                trace!("Reconcile: discarding invalid disk #{n}");
            }
        }

        for n in diff.removed {
            if let Some(storage) = self.registry.remove_drive_number(n) {
                self.announce(StorageChange::removed(storage));
            }
        }
    }

    /// Add-if-absent, announcing only a real insert.
    fn register(&self, storage: Storage) {
        if self.registry.try_add(storage.clone()) {
            self.announce(StorageChange::added(storage));
        } else {
            trace!("{} registered concurrently; suppressed", storage.key());
        }
    }

    fn announce(&self, change: StorageChange) {
        info!(
            "Storage {}: {} ({})",
            change.kind.label(),
            change.storage.key(),
            change.storage.path()
        );
        self.notifier.publish(&change);
    }
}
