/// Subscriber list for public [`StorageChange`] notifications.
///
/// The processor publishes synchronously after each registry mutation.
/// Callbacks run on the processor thread with no lock held: the list is
/// cloned under a read lock and released before anything is invoked, so a
/// callback may read the registry or (un)subscribe. Callbacks should return
/// quickly because the next queued event waits for them.
///
/// A panicking callback is caught and logged; the remaining subscribers still
/// get the change.
use crate::model::StorageChange;
use crossbeam_channel::{unbounded, Receiver};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

/// Token returned by subscribe; pass it to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&StorageChange) + Send + Sync>;

#[derive(Default)]
pub struct ChangeNotifier {
    subscribers: RwLock<Vec<(SubscriptionId, Callback)>>,
    next_id: AtomicU64,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StorageChange) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(callback)));
        id
    }

    /// Subscribe through an unbounded channel instead of a callback.
    ///
    /// The subscription removes itself the first time a send finds the
    /// receiver dropped.
    pub fn subscribe_channel(self: &Arc<Self>) -> (SubscriptionId, Receiver<StorageChange>) {
        let (tx, rx) = unbounded();
        let notifier = Arc::downgrade(self);
        let slot: Arc<AtomicU64> = Arc::new(AtomicU64::new(u64::MAX));
        let own_id = Arc::clone(&slot);

        let id = self.subscribe(move |change| {
            if tx.send(change.clone()).is_err() {
                if let Some(notifier) = notifier.upgrade() {
                    notifier.unsubscribe(SubscriptionId(own_id.load(Ordering::Relaxed)));
                }
            }
        });
        slot.store(id.0, Ordering::Relaxed);
        (id, rx)
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver `change` to every current subscriber.
    pub fn publish(&self, change: &StorageChange) {
        let subscribers: Vec<(SubscriptionId, Callback)> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, cb)| (*id, Arc::clone(cb)))
            .collect();

        for (id, callback) in subscribers {
            if catch_unwind(AssertUnwindSafe(|| callback(change))).is_err() {
                error!(
                    "Subscriber {} panicked on {} of {}",
                    id.0,
                    change.kind.label(),
                    change.storage.key()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeKind, Storage, StorageDevice};
    use std::sync::atomic::AtomicUsize;

    fn change() -> StorageChange {
        StorageChange::added(Storage::new(
            "SATA",
            StorageDevice::probed(r"\\.\PhysicalDrive0", 0),
            true,
        ))
    }

    #[test]
    fn every_subscriber_is_called_once() {
        let notifier = ChangeNotifier::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            notifier.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        notifier.publish(&change());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unsubscribed_callback_is_not_called() {
        let notifier = ChangeNotifier::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = notifier.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.publish(&change());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let notifier = Arc::new(ChangeNotifier::new());
        let weak = Arc::downgrade(&notifier);
        let id_slot = Arc::new(AtomicU64::new(0));
        let slot = Arc::clone(&id_slot);

        let id = notifier.subscribe(move |_| {
            if let Some(n) = weak.upgrade() {
                n.unsubscribe(SubscriptionId(slot.load(Ordering::SeqCst)));
            }
        });
        id_slot.store(id.0, Ordering::SeqCst);

        notifier.publish(&change());
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn panicking_callback_does_not_starve_later_subscribers() {
        let notifier = Arc::new(ChangeNotifier::new());
        notifier.subscribe(|_| panic!("subscriber failure"));
        let (_id, rx) = notifier.subscribe_channel();

        notifier.publish(&change());
        notifier.publish(&change());

        assert_eq!(rx.try_iter().count(), 2);
        assert_eq!(notifier.subscriber_count(), 2);
    }

    #[test]
    fn channel_subscription_receives_changes() {
        let notifier = Arc::new(ChangeNotifier::new());
        let (_id, rx) = notifier.subscribe_channel();

        notifier.publish(&change());
        let received = rx.try_recv().unwrap();
        assert_eq!(received.kind, ChangeKind::Added);
        assert_eq!(received.storage.drive_number(), Some(0));
    }

    #[test]
    fn dropped_channel_subscription_cleans_up() {
        let notifier = Arc::new(ChangeNotifier::new());
        let (_id, rx) = notifier.subscribe_channel();
        drop(rx);

        notifier.publish(&change());
        assert_eq!(notifier.subscriber_count(), 0);
    }
}
