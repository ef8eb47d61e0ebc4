// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Dirty tracking for surface contents.

Each surface owns a [`DirtySender`].  Operations that change pixel content mark it dirty; a
successful upload marks it clean.  Collaborators that want to know what needs re-uploading hold
[`DirtyReceiver`]s, possibly many aggregated into one [`DirtyAggregateReceiver`].

This differs from a channel as in this programming model, each resource can freely flip
its own signal between clean/dirty, and observers sample it rather than drain it.

Alongside the flag, the sender keeps a uniqueness value: a counter that moves forward every time
the content changes, so observers can also tell *whether* content changed since they last looked.
*/

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug)]
struct SharedDirty {
    //each dirty can be independently set and unset
    dirty: AtomicBool,
    uniqueness: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct DirtySender {
    shared: Arc<SharedDirty>,
}

impl DirtySender {
    pub fn new(dirty: bool) -> Self {
        DirtySender {
            shared: Arc::new(SharedDirty {
                dirty: AtomicBool::new(dirty),
                uniqueness: AtomicU64::new(1),
            }),
        }
    }

    /// Marks content changed.  Marking an already dirty resource only advances the uniqueness value.
    pub fn mark_dirty(&self) {
        self.shared.uniqueness.fetch_add(1, Ordering::Relaxed);
        self.shared.dirty.store(true, Ordering::Release);
    }

    /// Marks content uploaded.  Clearing a clean resource is a no-op.
    pub fn mark_clean(&self) {
        self.shared.dirty.store(false, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.shared.dirty.load(Ordering::Acquire)
    }

    pub fn uniqueness(&self) -> u64 {
        self.shared.uniqueness.load(Ordering::Relaxed)
    }

    /// Advances the uniqueness value without touching the flag.
    pub fn bump_uniqueness(&self) -> u64 {
        self.shared.uniqueness.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn receiver(&self) -> DirtyReceiver {
        DirtyReceiver::new(self)
    }
}

/// A read-only view of one resource's dirty flag.
#[derive(Debug, Clone)]
pub struct DirtyReceiver {
    shared: Arc<SharedDirty>,
}

impl DirtyReceiver {
    pub fn new(sender: &DirtySender) -> DirtyReceiver {
        DirtyReceiver { shared: sender.shared.clone() }
    }
    pub fn is_dirty(&self) -> bool {
        self.shared.dirty.load(Ordering::Acquire)
    }
    pub fn uniqueness(&self) -> u64 {
        self.shared.uniqueness.load(Ordering::Relaxed)
    }
}

impl PartialEq for DirtyReceiver {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}
impl Eq for DirtyReceiver {}

impl Hash for DirtyReceiver {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.shared).hash(state);
    }
}

/// Samples several receivers at once.
#[derive(Debug, Clone, Default)]
pub struct DirtyAggregateReceiver {
    receivers: Vec<DirtyReceiver>,
}

impl DirtyAggregateReceiver {
    pub fn new(receivers: Vec<DirtyReceiver>) -> DirtyAggregateReceiver {
        DirtyAggregateReceiver { receivers }
    }

    pub fn push(&mut self, receiver: DirtyReceiver) {
        if !self.receivers.contains(&receiver) {
            self.receivers.push(receiver);
        }
    }

    pub fn any_dirty(&self) -> bool {
        self.receivers.iter().any(DirtyReceiver::is_dirty)
    }

    pub fn dirty_count(&self) -> usize {
        self.receivers.iter().filter(|r| r.is_dirty()).count()
    }

    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_twice_equals_mark_once() {
        let sender = DirtySender::new(false);
        let receiver = sender.receiver();
        sender.mark_dirty();
        sender.mark_dirty();
        assert!(receiver.is_dirty());
        sender.mark_clean();
        assert!(!receiver.is_dirty());
        //clean when clean
        sender.mark_clean();
        assert!(!receiver.is_dirty());
    }

    #[test]
    fn uniqueness_moves_forward() {
        let sender = DirtySender::new(false);
        let before = sender.uniqueness();
        sender.mark_dirty();
        assert!(sender.uniqueness() > before);
        let bumped = sender.bump_uniqueness();
        assert_eq!(bumped, sender.uniqueness());
    }

    #[test]
    fn aggregate_dedups_and_counts() {
        let a = DirtySender::new(false);
        let b = DirtySender::new(true);
        let mut aggregate = DirtyAggregateReceiver::new(vec![a.receiver()]);
        aggregate.push(a.receiver());
        aggregate.push(b.receiver());
        assert_eq!(aggregate.len(), 2);
        assert_eq!(aggregate.dirty_count(), 1);
        a.mark_dirty();
        assert_eq!(aggregate.dirty_count(), 2);
        b.mark_clean();
        a.mark_clean();
        assert!(!aggregate.any_dirty());
    }
}
