// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Attachment chains and the flip-chain to swapchain mapping.

A chain is found by starting at a root surface and repeatedly following its next attachment of
the right kind, stopping when the walk returns to the root or runs out.  For flip chains the
result is rotated to start at the front buffer, which always takes backend slot 0; the other
members take slots 1, 2, ... in walk order, or all share slot 0 in single-back-buffer mode.

Each context caches the mapping keyed by the members' backend objects.  The cache is never patched:
a walk that finds a different member sequence, or any swapchain reset, throws it away and the
next resolution builds it from scratch with fresh swapchain buffers.
*/

use crate::config::Config;
use crate::error::{Error, Result};
use crate::imp::{Backend, BackendObject};
use crate::registry::Registry;
use crate::state::{ResourceCaps, ResourceId};
use std::collections::{BTreeMap, HashMap};

/// Which attachments a walk follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainKind {
    Flip,
    Mip,
    CubeFaces,
}

impl ChainKind {
    fn member_caps(self) -> ResourceCaps {
        match self {
            ChainKind::Flip => ResourceCaps::FLIP,
            ChainKind::Mip => ResourceCaps::MIP_SUBLEVEL,
            ChainKind::CubeFaces => ResourceCaps::CUBE_FACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainEntry {
    pub resource: ResourceId,
    pub slot: u32,
    pub back_buffer: BackendObject,
}

/// A resolved flip chain.  The first entry is the front buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlipChain {
    pub entries: Vec<ChainEntry>,
    /// The depth surface attached to the front buffer, if any.
    pub depth: Option<ResourceId>,
    /// Cache generation this mapping came from; changes on every rebuild.
    pub generation: u64,
}

impl FlipChain {
    pub fn members(&self) -> Vec<ResourceId> {
        self.entries.iter().map(|e| e.resource).collect()
    }

    pub fn slots(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.slot).collect()
    }
}

#[derive(Debug, Default)]
pub(crate) struct SwapchainCache {
    generation: u64,
    /// Member backend objects in chain order, as of the last resolution.
    members: Vec<BackendObject>,
    slots: HashMap<BackendObject, u32>,
    buffers: BTreeMap<u32, BackendObject>,
}

impl SwapchainCache {
    /// Drops every cached mapping and releases the swapchain buffers.
    pub(crate) fn invalidate(&mut self, backend: &dyn Backend) {
        for buffer in std::mem::take(&mut self.buffers).into_values() {
            backend.release(buffer);
        }
        self.members.clear();
        self.slots.clear();
        self.generation += 1;
        log::debug!("swapchain cache invalidated (generation {})", self.generation);
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

/// The next member of `resource`'s `kind` chain.
pub(crate) fn next_attached(registry: &Registry, resource: ResourceId, kind: ChainKind) -> Result<Option<ResourceId>> {
    let state = registry.state(resource)?;
    for (child, _) in state.attachments.iter() {
        if registry.state(child)?.caps.contains(kind.member_caps()) {
            return Ok(Some(child));
        }
    }
    Ok(None)
}

/// The members of `root`'s `kind` chain, starting with `root`.
pub(crate) fn walk(registry: &Registry, root: ResourceId, kind: ChainKind) -> Result<Vec<ResourceId>> {
    let mut members = vec![root];
    if kind == ChainKind::CubeFaces {
        for (child, _) in registry.state(root)?.attachments.iter() {
            if registry.state(child)?.caps.contains(ResourceCaps::CUBE_FACE) {
                members.push(child);
            }
        }
        return Ok(members);
    }
    let mut current = root;
    while let Some(next) = next_attached(registry, current, kind)? {
        if next == root {
            break;
        }
        if members.contains(&next) {
            return Err(Error::inconsistency("attachment cycle that doesn't pass through its root"));
        }
        members.push(next);
        current = next;
    }
    Ok(members)
}

/// Resolves the flip chain containing `root` onto backend swapchain slots.
pub(crate) fn resolve_flip_chain(
    registry: &mut Registry,
    backend: &dyn Backend,
    config: &Config,
    root: ResourceId,
) -> Result<FlipChain> {
    let mut members = walk(registry, root, ChainKind::Flip)?;
    let front = members
        .iter()
        .position(|m| registry.states.get(*m).is_some_and(|s| s.caps.contains(ResourceCaps::FRONT_BUFFER)))
        .ok_or(Error::InvalidArgument("flip chain has no front buffer"))?;
    members.rotate_left(front);

    let front_state = registry.state(members[0])?;
    let depth = front_state.attachments.depth();
    let surface = front_state.surface()?;
    let (context, extent, format) = (
        surface.context,
        crate::imp::Extent { width: surface.desc.width, height: surface.desc.height },
        surface.backend_format,
    );
    let keys = members
        .iter()
        .map(|m| registry.state(*m)?.backend.ok_or_else(|| Error::inconsistency("surface without a backend object")))
        .collect::<Result<Vec<_>>>()?;
    let context_state = registry.state_mut(context)?;
    let context_object = context_state.backend.ok_or_else(|| Error::inconsistency("context without a backend object"))?;
    let cache = &mut context_state.context_mut()?.swapchain;

    if cache.members != keys {
        if !cache.members.is_empty() {
            log::debug!("flip chain membership changed; rebuilding swapchain mapping");
        }
        cache.invalidate(backend);
    }
    let single = config.single_back_buffer();
    for (position, key) in keys.iter().enumerate() {
        let slot = if position == 0 || single { 0 } else { position as u32 };
        if cache.slots.contains_key(key) {
            continue;
        }
        if !cache.buffers.contains_key(&slot) {
            match backend.create_swapchain_buffer(context_object, slot, extent, format) {
                Ok(buffer) => {
                    cache.buffers.insert(slot, buffer);
                }
                Err(e) => {
                    cache.invalidate(backend);
                    return Err(e.into());
                }
            }
        }
        cache.slots.insert(*key, slot);
    }
    cache.members = keys.clone();

    let mut entries = Vec::with_capacity(members.len());
    for (resource, key) in members.into_iter().zip(keys) {
        let slot = *cache.slots.get(&key).ok_or_else(|| Error::inconsistency("flip member missing from swapchain cache"))?;
        let back_buffer = *cache.buffers.get(&slot).ok_or_else(|| Error::inconsistency("swapchain slot without a buffer"))?;
        entries.push(ChainEntry { resource, slot, back_buffer });
    }
    log::trace!("resolved flip chain of {} members (generation {})", entries.len(), cache.generation);
    Ok(FlipChain { entries, depth, generation: cache.generation })
}
