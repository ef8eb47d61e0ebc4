// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The attachment set of a surface.

use crate::state::ResourceId;

/// How a parent holds an attached child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Link {
    /// Created together with the parent; lives and dies with it.
    Owned,
    /// Attached explicitly; the parent holds one reference on the child.
    Counted,
    /// Closes a flip ring back to its root; holds nothing.
    BackEdge,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct Attachments {
    entries: Vec<(ResourceId, Link)>,
    depth: Option<ResourceId>,
}

impl Attachments {
    pub(crate) fn push(&mut self, child: ResourceId, link: Link) {
        self.entries.push((child, link));
    }

    pub(crate) fn link_of(&self, child: ResourceId) -> Option<Link> {
        self.entries.iter().find(|(id, _)| *id == child).map(|(_, link)| *link)
    }

    pub(crate) fn remove(&mut self, child: ResourceId) -> Option<Link> {
        let position = self.entries.iter().position(|(id, _)| *id == child)?;
        Some(self.entries.remove(position).1)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (ResourceId, Link)> + '_ {
        self.entries.iter().copied()
    }

    /// Removes every entry for which `detach` holds, returning them in order.
    pub(crate) fn drain_where(&mut self, mut detach: impl FnMut(Link) -> bool) -> Vec<(ResourceId, Link)> {
        let mut drained = Vec::new();
        self.entries.retain(|(id, link)| {
            if detach(*link) {
                drained.push((*id, *link));
                false
            } else {
                true
            }
        });
        drained
    }

    pub(crate) fn take_all(&mut self) -> Vec<(ResourceId, Link)> {
        std::mem::take(&mut self.entries)
    }

    pub(crate) fn depth(&self) -> Option<ResourceId> {
        self.depth
    }

    pub(crate) fn set_depth(&mut self, depth: Option<ResourceId>) -> Option<ResourceId> {
        std::mem::replace(&mut self.depth, depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn drain_keeps_owned_members() {
        let mut ids: SlotMap<ResourceId, ()> = SlotMap::with_key();
        let (a, b, c) = (ids.insert(()), ids.insert(()), ids.insert(()));
        let mut attachments = Attachments::default();
        attachments.push(a, Link::Owned);
        attachments.push(b, Link::Counted);
        attachments.push(c, Link::BackEdge);
        let drained = attachments.drain_where(|link| link != Link::Owned);
        assert_eq!(drained, vec![(b, Link::Counted), (c, Link::BackEdge)]);
        assert_eq!(attachments.iter().count(), 1);
        assert_eq!(attachments.link_of(a), Some(Link::Owned));
        assert_eq!(attachments.remove(b), None);
    }

    #[test]
    fn depth_is_separate() {
        let mut ids: SlotMap<ResourceId, ()> = SlotMap::with_key();
        let z = ids.insert(());
        let mut attachments = Attachments::default();
        assert_eq!(attachments.set_depth(Some(z)), None);
        assert_eq!(attachments.depth(), Some(z));
        assert_eq!(attachments.iter().count(), 0);
        assert_eq!(attachments.set_depth(None), Some(z));
    }
}
