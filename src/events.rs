//! Change notifications emitted by a data set.
//!
//! Observers subscribe on one data set; there is no global event bus.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identity of a data set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataSetId(u64);

impl DataSetId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DataSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataSetEvent {
    ThresholdingChanged,
    ScaleFactorChanged,
    ModalityChanged,
    TimeChanged,
    VoxelSizeChanged,
    ColorTableChanged,
    /// Something a redraw depends on changed
    DataSetChanged,
}

pub trait DataSetObserver: Send + Sync {
    fn notify(&self, source: DataSetId, event: DataSetEvent);
}

impl<F> DataSetObserver for F
where
    F: Fn(DataSetId, DataSetEvent) + Send + Sync,
{
    fn notify(&self, source: DataSetId, event: DataSetEvent) {
        self(source, event)
    }
}

/// Returned by [`Observers::subscribe`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subscription(u64);

#[derive(Default)]
pub struct Observers {
    next: u64,
    entries: Vec<(Subscription, Arc<dyn DataSetObserver>)>,
}

impl Observers {
    pub fn subscribe(&mut self, observer: Arc<dyn DataSetObserver>) -> Subscription {
        let subscription = Subscription(self.next);
        self.next += 1;
        self.entries.push((subscription, observer));
        subscription
    }

    /// Returns `false` if the subscription was unknown.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(s, _)| *s != subscription);
        before != self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn emit(&self, source: DataSetId, event: DataSetEvent) {
        for (_, observer) in &self.entries {
            observer.notify(source, event);
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn subscribers_receive_events_until_unsubscribed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut observers = Observers::default();
        let subscription = observers.subscribe(Arc::new(move |_: DataSetId, e: DataSetEvent| {
            sink.lock().unwrap().push(e);
        }));

        let id = DataSetId::next();
        observers.emit(id, DataSetEvent::TimeChanged);
        assert!(observers.unsubscribe(subscription));
        assert!(!observers.unsubscribe(subscription));
        observers.emit(id, DataSetEvent::DataSetChanged);

        assert_eq!(*seen.lock().unwrap(), vec![DataSetEvent::TimeChanged]);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(DataSetId::next(), DataSetId::next());
    }
}
