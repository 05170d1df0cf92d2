/// Public inventory API — the storage watcher.
///
/// A [`StorageWatcher`] owns one registry, one change queue, and one
/// subscriber list. Nothing is global, so independent watchers can coexist
/// (tests create one per case).
///
/// # Usage
///
/// ```ignore
/// let watcher = StorageWatcher::new(platform::windows::backend(), WatchConfig::default());
/// watcher.reload_storages();
/// let (_id, changes) = watcher.subscribe_channel();
/// let _threads = watcher.start()?;
/// for change in changes { /* ... */ }
/// ```
///
/// # Threads
///
/// [`StorageWatcher::start`] spawns the listener (Windows only) and the
/// processor. They run for the life of the process. The processor exits only
/// once every [`EventSink`] is gone, including the watcher's own.
use crate::config::WatchConfig;
use crate::discovery::discover_storages;
use crate::error::{Result, WatchError};
use crate::listener::spawn_listener;
use crate::model::{Storage, StorageChange};
use crate::notifier::{ChangeNotifier, SubscriptionId};
use crate::platform::Backend;
use crate::processor::ChangeProcessor;
use crate::queue::{change_queue, EventSink, EventSource};
use crate::registry::StorageRegistry;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::info;

pub struct StorageWatcher {
    registry: Arc<StorageRegistry>,
    notifier: Arc<ChangeNotifier>,
    backend: Backend,
    config: WatchConfig,
    sink: EventSink,
    /// Taken by the processor thread on `start`.
    source: Mutex<Option<EventSource>>,
}

/// Join handles for the background threads.
pub struct WatcherThreads {
    pub processor: JoinHandle<()>,
    /// `None` when no listener runs on this platform.
    pub listener: Option<JoinHandle<()>>,
}

impl StorageWatcher {
    pub fn new(backend: Backend, config: WatchConfig) -> Self {
        let (sink, source) = change_queue();
        Self {
            registry: Arc::new(StorageRegistry::new()),
            notifier: Arc::new(ChangeNotifier::new()),
            backend,
            config,
            sink,
            source: Mutex::new(Some(source)),
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    fn processor(&self) -> ChangeProcessor {
        ChangeProcessor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.notifier),
            self.backend.clone(),
            self.config.clone(),
        )
    }

    /// Spawn the processor and listener threads.
    pub fn start(&self) -> Result<WatcherThreads> {
        let source = self.source.lock().take().ok_or(WatchError::AlreadyStarted)?;
        let processor = self.processor();

        let name = self.config.processor_thread_name.clone();
        let processor = thread::Builder::new()
            .name(name.clone())
            .spawn(move || processor.run(source))
            .map_err(|e| WatchError::ThreadSpawn { name, source: e })?;

        let listener = if self.config.listen_for_os_notifications {
            spawn_listener(&self.config, self.sink.clone())?
        } else {
            None
        };
        info!(
            "Watcher started ({} listener, {} subscriber(s))",
            if listener.is_some() { "with" } else { "without" },
            self.notifier.subscriber_count()
        );

        Ok(WatcherThreads {
            processor,
            listener,
        })
    }

    /// Whether `start` has handed the queue to a processor thread.
    pub fn is_started(&self) -> bool {
        self.source.lock().is_none()
    }

    /// Handle everything queued so far on the calling thread.
    ///
    /// Only meaningful before `start`; afterwards the processor thread owns
    /// the queue and this returns 0. The queue is checked out for the drain,
    /// so a callback re-entering the watcher sees it as started and a nested
    /// call returns 0.
    pub fn process_pending(&self) -> usize {
        let Some(source) = self.source.lock().take() else {
            return 0;
        };
        let handled = self.processor().drain(&source);
        *self.source.lock() = Some(source);
        handled
    }

    /// Re-enumerate every device and replace the registry wholesale.
    ///
    /// Runs on the calling thread and may block on device I/O. Fires no
    /// change notifications. Returns the number of registered storages.
    pub fn reload_storages(&self) -> usize {
        let storages = discover_storages(&self.backend, &self.config);
        self.registry.replace_all(storages);
        let count = self.registry.len();
        info!("Rescan registered {count} storage device(s)");
        count
    }

    /// Copy of the current inventory.
    pub fn snapshot(&self) -> Vec<Storage> {
        self.registry.snapshot()
    }

    /// Call `callback` for every change.
    ///
    /// Callbacks run on the processor thread, one event at a time. They must
    /// not expect registry changes they make to show up in the event being
    /// handled.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StorageChange) + Send + Sync + 'static,
    {
        self.notifier.subscribe(callback)
    }

    /// Receive changes through a channel.
    pub fn subscribe_channel(&self) -> (SubscriptionId, Receiver<StorageChange>) {
        self.notifier.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// A producer handle for injecting events, e.g. from another notification
    /// source.
    pub fn event_sink(&self) -> EventSink {
        self.sink.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeEvent, ChangeKind, StorageDevice};
    use crate::platform::memory::MemoryHost;

    fn watcher_with(host: &Arc<MemoryHost>) -> StorageWatcher {
        StorageWatcher::new(
            Backend::from_host(Arc::clone(host)),
            WatchConfig {
                physical_drive_probe_count: 8,
                listen_for_os_notifications: false,
                ..Default::default()
            },
        )
    }

    #[test]
    fn reload_fires_no_notifications() {
        let host = Arc::new(MemoryHost::new());
        host.add_device("SATA", StorageDevice::probed(r"\\.\PhysicalDrive0", 0));
        let watcher = watcher_with(&host);
        let (_id, rx) = watcher.subscribe_channel();

        assert_eq!(watcher.reload_storages(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn process_pending_drains_queue_before_start() {
        let host = Arc::new(MemoryHost::new());
        host.attach_volume('E', "USB", StorageDevice::probed(r"\\.\PhysicalDrive3", 3));
        let watcher = watcher_with(&host);
        let (_id, rx) = watcher.subscribe_channel();

        watcher.event_sink().push(ChangeEvent::Added('E'));
        assert_eq!(watcher.process_pending(), 1);
        assert_eq!(rx.try_recv().unwrap().kind, ChangeKind::Added);
    }

    #[test]
    fn callback_may_reenter_process_pending() {
        let host = Arc::new(MemoryHost::new());
        host.attach_volume('E', "USB", StorageDevice::probed(r"\\.\PhysicalDrive3", 3));
        let watcher = Arc::new(watcher_with(&host));
        let nested = Arc::new(Mutex::new(Vec::new()));
        {
            let weak = Arc::downgrade(&watcher);
            let nested = Arc::clone(&nested);
            watcher.subscribe(move |_| {
                if let Some(watcher) = weak.upgrade() {
                    nested.lock().push(watcher.process_pending());
                }
            });
        }

        watcher.event_sink().push(ChangeEvent::Added('E'));
        assert_eq!(watcher.process_pending(), 1);

        assert_eq!(*nested.lock(), vec![0]);
        assert!(!watcher.is_started());
    }

    #[test]
    fn second_start_is_rejected() {
        let host = Arc::new(MemoryHost::new());
        let watcher = watcher_with(&host);
        let _threads = watcher.start().unwrap();

        assert!(watcher.is_started());
        assert!(matches!(watcher.start(), Err(WatchError::AlreadyStarted)));
        assert_eq!(watcher.process_pending(), 0);
    }
}
