// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Construction and teardown.

Construction does every fallible thing first (backend objects, validation) and only then touches
the arena, so a failed creation registers nothing.  Teardown runs exactly once per wrapper and
once per resource:

1. wrappers whose counts delegate to the dying wrapper go first;
2. a non-owning wrapper just unlinks: out of its count target's dependents, out of its slot,
   then its delegate is released;
3. an owning wrapper takes its whole resource down: sibling wrappers, created resources,
   attachments, then every back-reference other resources hold is cleared, and finally the owner
   unlinks and the backend object is released.
*/

use crate::contract::Contract;
use crate::delegate::Delegate;
use crate::error::Result;
use crate::imp::{Backend, DeviceCommand};
use crate::refcount::Discipline;
use crate::registry::{Registry, WrapperPlan};
use crate::state::attachments::Link;
use crate::state::{CommonState, Detail, ResourceId};
use crate::wrapper::WrapperId;

/// Decrements `id`'s effective count, tearing down at zero.
pub(crate) fn release(registry: &mut Registry, backend: &dyn Backend, id: WrapperId) -> Result<u32> {
    let counter = registry.counter_of(id)?;
    let remaining = registry.wrapper(counter)?.count.release()?;
    log::trace!("release {id:?} (counter {counter:?}) -> {remaining}");
    if remaining == 0 {
        destroy_wrapper(registry, backend, counter);
    }
    Ok(remaining)
}

/**
Registers a freshly created resource and its owning wrapper.

`state` must already hold its backend object (if any) and `delegate` its own backend reference.
*/
pub(crate) fn install(
    registry: &mut Registry,
    backend: &dyn Backend,
    state: CommonState,
    creator: Option<ResourceId>,
    contract: Contract,
    delegate: Delegate,
    discipline: Discipline,
) -> Result<(ResourceId, WrapperId)> {
    let debug_name = state.debug_name.clone();
    let object = state.backend;
    let resource = match registry.insert_state(state, creator) {
        Ok(resource) => resource,
        Err(e) => {
            delegate.release(backend);
            if let Some(object) = object {
                backend.release(object);
            }
            return Err(e);
        }
    };
    let plan = WrapperPlan { contract, state: resource, delegate, discipline, owner: true };
    match registry.register(plan, backend) {
        Ok(wrapper) => {
            log::debug!("created {debug_name} as {contract} ({resource:?}, owner {wrapper:?})");
            Ok((resource, wrapper))
        }
        Err(e) => {
            destroy_state(registry, backend, resource);
            Err(e)
        }
    }
}

pub(crate) fn destroy_wrapper(registry: &mut Registry, backend: &dyn Backend, id: WrapperId) {
    let Some(entry) = registry.wrappers.get_mut(id) else {
        return;
    };
    let dependents = std::mem::take(&mut entry.dependents);
    let resource = entry.state;
    for dependent in dependents {
        destroy_wrapper(registry, backend, dependent);
    }
    let is_owner = registry.states.get(resource).is_some_and(|state| state.owner == Some(id));
    if is_owner {
        destroy_state(registry, backend, resource);
    } else {
        unlink_wrapper(registry, backend, id);
    }
}

fn unlink_wrapper(registry: &mut Registry, backend: &dyn Backend, id: WrapperId) {
    let Some(entry) = registry.wrappers.get(id) else {
        return;
    };
    let (contract, resource, target) = (entry.contract, entry.state, entry.discipline.target());
    if let Some(target) = target.and_then(|t| registry.wrappers.get_mut(t)) {
        target.dependents.retain(|d| *d != id);
    }
    if let Some(state) = registry.states.get_mut(resource) {
        state.slots.clear_if(contract.generation(), id);
        if state.owner == Some(id) {
            state.owner = None;
        }
    }
    if let Some(entry) = registry.wrappers.remove(id) {
        for orphan in &entry.dependents {
            log::warn!("wrapper {id:?} unlinked with dependent {orphan:?} still registered");
        }
        entry.delegate.release(backend);
    }
    log::trace!("unlinked {id:?} ({contract})");
}

/// Tears down `resource` through its owner if it has one.
pub(crate) fn destroy_resource(registry: &mut Registry, backend: &dyn Backend, resource: ResourceId) {
    let owner = match registry.states.get(resource) {
        None => return,
        Some(state) if state.tearing_down => return,
        Some(state) => state.owner,
    };
    match owner {
        Some(owner) => destroy_wrapper(registry, backend, owner),
        None => destroy_state(registry, backend, resource),
    }
}

pub(crate) fn destroy_state(registry: &mut Registry, backend: &dyn Backend, resource: ResourceId) {
    let Some(state) = registry.states.get_mut(resource) else {
        return;
    };
    if state.tearing_down {
        return;
    }
    state.tearing_down = true;
    log::debug!("destroying {} ({resource:?})", state.debug_name);
    let owner = state.owner;
    let siblings: Vec<WrapperId> = state.slots.occupied().map(|(_, w)| w).filter(|w| Some(*w) != owner).collect();
    let created = std::mem::take(&mut state.created);

    for sibling in siblings {
        destroy_wrapper(registry, backend, sibling);
    }
    for child in created {
        destroy_resource(registry, backend, child);
    }
    release_attachments(registry, backend, resource);
    notify_destroyed(registry, backend, resource);

    if let Some(owner) = owner {
        let dependents = registry.wrappers.get_mut(owner).map(|e| std::mem::take(&mut e.dependents)).unwrap_or_default();
        for dependent in dependents {
            destroy_wrapper(registry, backend, dependent);
        }
        unlink_wrapper(registry, backend, owner);
    }

    if let Some(state) = registry.states.remove(resource) {
        if let Some(creator) = state.creator.and_then(|c| registry.states.get_mut(c)) {
            creator.created.retain(|c| *c != resource);
        }
        if let Some(object) = state.backend {
            backend.release(object);
        }
    }
}

/// Tears down everything still registered.
pub(crate) fn destroy_all(registry: &mut Registry, backend: &dyn Backend) {
    //roots first so cascades do most of the work
    loop {
        let next = registry
            .states
            .iter()
            .find(|(_, state)| state.creator.is_none())
            .or_else(|| registry.states.iter().next())
            .map(|(id, _)| id);
        let Some(resource) = next else {
            break;
        };
        destroy_resource(registry, backend, resource);
        if let Some(stuck) = registry.states.remove(resource) {
            log::error!("{} survived teardown; dropping it", stuck.debug_name);
        }
    }
}

fn release_attachments(registry: &mut Registry, backend: &dyn Backend, resource: ResourceId) {
    let Some(state) = registry.states.get_mut(resource) else {
        return;
    };
    let attached = state.attachments.take_all();
    let depth = state.attachments.set_depth(None);
    let counted = attached
        .into_iter()
        .filter_map(|(child, link)| match link {
            Link::Owned => {
                destroy_resource(registry, backend, child);
                None
            }
            Link::Counted => Some(child),
            Link::BackEdge => None,
        })
        .collect::<Vec<_>>();
    for child in counted.into_iter().chain(depth) {
        release_attached(registry, backend, child);
    }
}

/// Drops the reference an attachment parent holds on `child`.
pub(crate) fn release_attached(registry: &mut Registry, backend: &dyn Backend, child: ResourceId) {
    let Some(state) = registry.states.get_mut(child) else {
        return;
    };
    if let Ok(surface) = state.surface_mut() {
        surface.parent = None;
    }
    let Some(owner) = state.owner else {
        return;
    };
    if let Err(e) = release(registry, backend, owner) {
        log::warn!("releasing attached surface {child:?}: {e}");
    }
}

fn execute_quietly(registry: &Registry, backend: &dyn Backend, device: ResourceId, command: DeviceCommand) {
    let Some(state) = registry.states.get(device) else {
        return;
    };
    if state.tearing_down {
        return;
    }
    if let Some(object) = state.backend {
        if let Err(e) = backend.execute(object, &command) {
            log::warn!("{command:?} during teardown failed: {e}");
        }
    }
}

/// Clears every back-reference other resources hold on `resource`.
fn notify_destroyed(registry: &mut Registry, backend: &dyn Backend, resource: ResourceId) {
    let Some(state) = registry.states.get_mut(resource) else {
        return;
    };
    match &mut state.detail {
        Detail::Surface(surface) => {
            let parent = surface.parent.take();
            let context = surface.context;
            if let Some(parent) = parent.and_then(|p| registry.states.get_mut(p)) {
                parent.attachments.remove(resource);
            }
            for other in registry.states.values_mut() {
                if other.attachments.link_of(resource).is_some() {
                    other.attachments.remove(resource);
                }
                if other.attachments.depth() == Some(resource) {
                    other.attachments.set_depth(None);
                }
                match &mut other.detail {
                    Detail::Device(device) if device.render_target == Some(resource) => {
                        log::debug!("render target {resource:?} destroyed under a live device");
                        device.render_target = None;
                    }
                    _ => {}
                }
            }
            if let Some(context) = registry.states.get_mut(context).and_then(|c| c.context_mut().ok()) {
                if context.primary == Some(resource) {
                    context.primary = None;
                }
            }
        }
        Detail::Texture(texture) => {
            let surface = texture.surface;
            if let Some(surface) = registry.states.get_mut(surface).and_then(|s| s.surface_mut().ok()) {
                if surface.texture == Some(resource) {
                    surface.texture = None;
                }
            }
        }
        Detail::Scene(scene) => {
            let context = scene.context;
            if let Some(context) = registry.states.get_mut(context).and_then(|c| c.context_mut().ok()) {
                context.scene = None;
            }
        }
        Detail::Context(context) => {
            context.swapchain.invalidate(backend);
        }
        Detail::Device(device) => {
            let viewports = std::mem::take(&mut device.viewports);
            device.current = None;
            for viewport in viewports {
                let Some(viewport) = registry.states.get_mut(viewport).and_then(|v| v.viewport_mut().ok()) else {
                    continue;
                };
                viewport.device = None;
                let lights = viewport.lights.clone();
                for light in lights {
                    if let Some(light) = registry.states.get_mut(light).and_then(|l| l.light_mut().ok()) {
                        if light.active_on == Some(resource) {
                            light.active_on = None;
                        }
                    }
                }
            }
            for other in registry.states.values_mut() {
                match &mut other.detail {
                    Detail::Material(material) => material.handles.retain(|(device, _)| *device != resource),
                    Detail::Texture(texture) => texture.handles.retain(|(device, _)| *device != resource),
                    Detail::Surface(surface) if surface.device == Some(resource) => surface.device = None,
                    _ => {}
                }
            }
        }
        Detail::Viewport(viewport) => {
            let device = viewport.device.take();
            let lights = std::mem::take(&mut viewport.lights);
            let mut was_current = false;
            if let Some(device) = device.and_then(|d| registry.states.get_mut(d)).and_then(|d| d.device_mut().ok()) {
                device.viewports.retain(|v| *v != resource);
                if device.current == Some(resource) {
                    device.current = None;
                    was_current = true;
                }
            }
            for light in lights {
                let Some(light) = registry.states.get_mut(light).and_then(|l| l.light_mut().ok()) else {
                    continue;
                };
                light.viewport = None;
                let index = light.index;
                if let Some(active_on) = light.active_on.take() {
                    execute_quietly(registry, backend, active_on, DeviceCommand::SetLight { index, light: None });
                }
            }
            if let (Some(device), true) = (device, was_current) {
                execute_quietly(registry, backend, device, DeviceCommand::DeactivateViewport);
            }
        }
        Detail::Light(light) => {
            let viewport = light.viewport.take();
            let active_on = light.active_on.take();
            let index = light.index;
            if let Some(viewport) = viewport.and_then(|v| registry.states.get_mut(v)).and_then(|v| v.viewport_mut().ok()) {
                viewport.lights.retain(|l| *l != resource);
            }
            if let Some(device) = active_on {
                execute_quietly(registry, backend, device, DeviceCommand::SetLight { index, light: None });
            }
        }
        Detail::Material(_) => {
            for other in registry.states.values_mut() {
                if let Ok(viewport) = other.viewport_mut() {
                    if viewport.background == Some(resource) {
                        viewport.background = None;
                    }
                }
            }
        }
    }
}
