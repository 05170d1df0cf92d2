/// Change event queue — unbounded MPSC hand-off between the listener and the
/// processor.
///
/// Built on an unbounded `crossbeam_channel`. A blocking `recv` is the wake
/// signal: the processor sleeps in [`EventSource::wait`] until the first
/// event of a burst arrives, then drains the rest with
/// [`EventSource::try_next`] before sleeping again.
use crate::model::ChangeEvent;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

/// Producer side. Cheap to clone; any thread may push.
#[derive(Clone)]
pub struct EventSink {
    tx: Sender<ChangeEvent>,
}

/// Consumer side, owned by the processor thread.
pub struct EventSource {
    rx: Receiver<ChangeEvent>,
}

/// Create a connected sink/source pair.
pub fn change_queue() -> (EventSink, EventSource) {
    let (tx, rx) = unbounded();
    (EventSink { tx }, EventSource { rx })
}

impl EventSink {
    /// Enqueue `event` and wake the processor.
    ///
    /// Returns `false` if the processor has gone away.
    pub fn push(&self, event: ChangeEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("Change queue closed; dropping {event}");
                false
            }
        }
    }
}

impl EventSource {
    /// Block until an event is available. `None` once every sink is dropped
    /// and the queue is empty.
    pub fn wait(&self) -> Option<ChangeEvent> {
        self.rx.recv().ok()
    }

    /// Next queued event without blocking.
    pub fn try_next(&self) -> Option<ChangeEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Number of events currently queued.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_come_out_in_push_order() {
        let (sink, source) = change_queue();
        sink.push(ChangeEvent::Added('D'));
        sink.push(ChangeEvent::DevicesChanged);
        sink.push(ChangeEvent::Removed('D'));

        assert_eq!(source.pending(), 3);
        assert_eq!(source.wait(), Some(ChangeEvent::Added('D')));
        assert_eq!(source.try_next(), Some(ChangeEvent::DevicesChanged));
        assert_eq!(source.try_next(), Some(ChangeEvent::Removed('D')));
        assert_eq!(source.try_next(), None);
    }

    #[test]
    fn wait_returns_none_after_all_sinks_drop() {
        let (sink, source) = change_queue();
        let second = sink.clone();
        second.push(ChangeEvent::DevicesChanged);
        drop(sink);
        drop(second);

        assert_eq!(source.wait(), Some(ChangeEvent::DevicesChanged));
        assert_eq!(source.wait(), None);
    }

    #[test]
    fn push_fails_once_source_is_gone() {
        let (sink, source) = change_queue();
        drop(source);
        assert!(!sink.push(ChangeEvent::Added('E')));
    }

    #[test]
    fn wait_wakes_on_push_from_other_thread() {
        let (sink, source) = change_queue();
        let producer = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            sink.push(ChangeEvent::Removed('F'));
        });
        assert_eq!(source.wait(), Some(ChangeEvent::Removed('F')));
        producer.join().unwrap();
    }
}
