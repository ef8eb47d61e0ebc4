// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Reference counting disciplines.
//!
//! Every wrapper is created with exactly one discipline and keeps it for life:
//!
//! - `Independent`: the wrapper has its own counter.
//! - `DelegatedToParent`: acquire/release go to the wrapper of the resource that created this
//!   one (a scene counts on its context, a back buffer on its front buffer).
//! - `DelegatedToOrigin`: acquire/release go to whichever wrapper this one was resolved from.
//!
//! Delegated counts can chain; the effective counter is the first independent wrapper reached.

use crate::error::{Error, Result};
use crate::wrapper::WrapperId;
use std::sync::atomic::{AtomicU32, Ordering};

/// The refcount discipline of a wrapper, as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefDiscipline {
    Independent,
    DelegatedToParent,
    DelegatedToOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Discipline {
    Independent,
    DelegatedToParent(WrapperId),
    DelegatedToOrigin(WrapperId),
}

impl Discipline {
    /// The wrapper this one's count is forwarded to.
    pub(crate) fn target(&self) -> Option<WrapperId> {
        match self {
            Discipline::Independent => None,
            Discipline::DelegatedToParent(target) | Discipline::DelegatedToOrigin(target) => Some(*target),
        }
    }

    pub(crate) fn kind(&self) -> RefDiscipline {
        match self {
            Discipline::Independent => RefDiscipline::Independent,
            Discipline::DelegatedToParent(_) => RefDiscipline::DelegatedToParent,
            Discipline::DelegatedToOrigin(_) => RefDiscipline::DelegatedToOrigin,
        }
    }
}

/// An atomic reference counter that starts at one.
#[derive(Debug)]
pub(crate) struct RefCount(AtomicU32);

impl RefCount {
    pub(crate) fn new() -> Self {
        RefCount(AtomicU32::new(1))
    }

    pub(crate) fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Returns the count after incrementing.
    pub(crate) fn acquire(&self) -> u32 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the count after decrementing.  Releasing a zero count is an error, not a wrap.
    pub(crate) fn release(&self) -> Result<u32> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1))
            .map(|previous| previous - 1)
            .map_err(|_| Error::InvalidArgument("release without a matching acquire"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_from_one() {
        let count = RefCount::new();
        assert_eq!(count.get(), 1);
        assert_eq!(count.acquire(), 2);
        assert_eq!(count.release().unwrap(), 1);
        assert_eq!(count.release().unwrap(), 0);
    }

    #[test]
    fn underflow_is_rejected() {
        let count = RefCount::new();
        count.release().unwrap();
        assert!(matches!(count.release(), Err(Error::InvalidArgument(_))));
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn discipline_targets() {
        assert_eq!(Discipline::Independent.target(), None);
        assert_eq!(Discipline::Independent.kind(), RefDiscipline::Independent);
    }
}
