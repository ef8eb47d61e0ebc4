// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The arena holding every common state and every wrapper of one runtime.

Both live in `slotmap`s, so identities are never reused while anything could still name them.
Cross references between entries are keys; a key that no longer resolves is either a stale client
handle (`InvalidArgument`) or a bug (`InternalInconsistency`), depending on who held it.
*/

use crate::contract::Contract;
use crate::delegate::Delegate;
use crate::error::{Error, Result};
use crate::imp::Backend;
use crate::refcount::{Discipline, RefCount};
use crate::state::{CommonState, ResourceId};
use crate::wrapper::WrapperId;
use slotmap::SlotMap;

/// Longest delegation chain we follow before declaring a cycle.
const MAX_CHAIN: usize = 64;

#[derive(Debug)]
pub(crate) struct WrapperEntry {
    pub(crate) contract: Contract,
    pub(crate) state: ResourceId,
    pub(crate) delegate: Delegate,
    pub(crate) discipline: Discipline,
    pub(crate) count: RefCount,
    /// Wrappers whose counts delegate to this one.
    pub(crate) dependents: Vec<WrapperId>,
}

/// Everything needed to register one wrapper.
#[derive(Debug)]
pub(crate) struct WrapperPlan {
    pub(crate) contract: Contract,
    pub(crate) state: ResourceId,
    pub(crate) delegate: Delegate,
    pub(crate) discipline: Discipline,
    pub(crate) owner: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    pub(crate) states: SlotMap<ResourceId, CommonState>,
    pub(crate) wrappers: SlotMap<WrapperId, WrapperEntry>,
}

impl Registry {
    pub(crate) fn wrapper(&self, id: WrapperId) -> Result<&WrapperEntry> {
        self.wrappers.get(id).ok_or(Error::InvalidArgument("stale wrapper handle"))
    }

    pub(crate) fn state(&self, id: ResourceId) -> Result<&CommonState> {
        self.states.get(id).ok_or_else(|| Error::inconsistency("reference to a destroyed resource"))
    }

    pub(crate) fn state_mut(&mut self, id: ResourceId) -> Result<&mut CommonState> {
        self.states.get_mut(id).ok_or_else(|| Error::inconsistency("reference to a destroyed resource"))
    }

    pub(crate) fn resource_of(&self, wrapper: WrapperId) -> Result<ResourceId> {
        Ok(self.wrapper(wrapper)?.state)
    }

    pub(crate) fn state_of(&self, wrapper: WrapperId) -> Result<&CommonState> {
        let resource = self.resource_of(wrapper)?;
        self.state(resource)
    }

    pub(crate) fn state_of_mut(&mut self, wrapper: WrapperId) -> Result<&mut CommonState> {
        let resource = self.resource_of(wrapper)?;
        self.state_mut(resource)
    }

    pub(crate) fn owner_of(&self, resource: ResourceId) -> Result<WrapperId> {
        self.state(resource)?.owner.ok_or_else(|| Error::inconsistency("resource has no owning wrapper"))
    }

    /// The wrapper whose counter `id`'s acquires and releases land on.
    pub(crate) fn counter_of(&self, id: WrapperId) -> Result<WrapperId> {
        let mut current = id;
        for _ in 0..MAX_CHAIN {
            match self.wrapper(current)?.discipline.target() {
                None => return Ok(current),
                Some(target) => {
                    if !self.wrappers.contains_key(target) {
                        return Err(Error::inconsistency("count delegated to a destroyed wrapper"));
                    }
                    current = target;
                }
            }
        }
        Err(Error::inconsistency("refcount delegation cycle"))
    }

    pub(crate) fn acquire(&self, id: WrapperId) -> Result<u32> {
        let counter = self.counter_of(id)?;
        let count = self.wrapper(counter)?.count.acquire();
        log::trace!("acquire {id:?} (counter {counter:?}) -> {count}");
        Ok(count)
    }

    pub(crate) fn ref_count(&self, id: WrapperId) -> Result<u32> {
        let counter = self.counter_of(id)?;
        Ok(self.wrapper(counter)?.count.get())
    }

    /// Inserts a state, linking it under `creator`.
    pub(crate) fn insert_state(&mut self, mut state: CommonState, creator: Option<ResourceId>) -> Result<ResourceId> {
        if let Some(creator) = creator {
            self.state(creator)?;
        }
        state.creator = creator;
        let id = self.states.insert(state);
        if let Some(creator) = creator.and_then(|c| self.states.get_mut(c)) {
            creator.created.push(id);
        }
        Ok(id)
    }

    /**
    Registers a wrapper into its state's slot, marks ownership, and links it into its count
    target's dependents.

    Every check happens before any mutation.  On failure the plan's delegate is released and
    nothing is registered.
    */
    pub(crate) fn register(&mut self, plan: WrapperPlan, backend: &dyn Backend) -> Result<WrapperId> {
        if let Err(e) = self.check_plan(&plan) {
            plan.delegate.release(backend);
            return Err(e);
        }
        let generation = plan.contract.generation();
        let target = plan.discipline.target();
        let id = self.wrappers.insert(WrapperEntry {
            contract: plan.contract,
            state: plan.state,
            delegate: plan.delegate,
            discipline: plan.discipline,
            count: RefCount::new(),
            dependents: Vec::new(),
        });
        if let Some(state) = self.states.get_mut(plan.state) {
            state.slots.set(generation, id);
            if plan.owner {
                state.owner = Some(id);
            }
        }
        if let Some(target) = target.and_then(|t| self.wrappers.get_mut(t)) {
            target.dependents.push(id);
        }
        log::trace!("registered {id:?} as {} ({:?})", plan.contract, plan.discipline.kind());
        Ok(id)
    }

    fn check_plan(&self, plan: &WrapperPlan) -> Result<()> {
        let state = self.state(plan.state)?;
        if state.family() != plan.contract.family() {
            return Err(Error::inconsistency("wrapper contract doesn't match its resource"));
        }
        if state.slots.get(plan.contract.generation()).is_some() {
            return Err(Error::inconsistency("version slot already occupied"));
        }
        if plan.owner && state.owner.is_some() {
            return Err(Error::inconsistency("resource already has an owner"));
        }
        if let Some(target) = plan.discipline.target() {
            if !self.wrappers.contains_key(target) {
                return Err(Error::inconsistency("count target doesn't exist"));
            }
        }
        if let Delegate::Forward(target) = plan.delegate {
            if !self.wrappers.contains_key(target) {
                return Err(Error::inconsistency("forward target doesn't exist"));
            }
        }
        Ok(())
    }

    pub(crate) fn live_wrappers(&self) -> usize {
        self.wrappers.len()
    }

    pub(crate) fn live_resources(&self) -> usize {
        self.states.len()
    }
}
