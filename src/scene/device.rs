// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Rendering devices.

A device renders into one target surface and drives the viewport/light association graph.
Generations 1 and 2 submit [`ExecuteBuffer`]s; generations 2 and later can also draw directly.
A device created thread-safe (or any device under
[`Config::with_force_device_lock`](crate::Config::with_force_device_lock)) serializes its
state-changing calls behind a device lock, always taken before the runtime's arena lock.
*/

use super::DeviceFlags;
use super::viewport::Viewport;
use crate::config::Config;
use crate::contract::{Contract, DeviceVersion, Dispatch};
use crate::delegate::Delegate;
use crate::error::{Error, Result};
use crate::imp::{Backend, BackendObject, DeviceCommand, ObjectKind, PrimitiveType};
use crate::lifecycle;
use crate::refcount::Discipline;
use crate::registry::Registry;
use crate::state::{CommonState, DeviceState, Detail, ResourceCaps, ResourceId};
use crate::surfaces::Surface;
use crate::wrapper::{Wrapper, WrapperId, typed_wrapper};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

typed_wrapper!(
    /// A rendering device, through one of its contract generations.
    Device,
    Device,
    DeviceVersion
);

/// One instruction of an execute buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteInstruction {
    SetRenderState { state: u32, value: u32 },
    Triangles { count: u32 },
    Lines { count: u32 },
    Points { count: u32 },
    /// Stops processing; anything after is ignored.
    Exit,
}

impl ExecuteInstruction {
    fn command(self) -> Result<Option<DeviceCommand>> {
        let draw = |primitive: PrimitiveType, count: u32, per: u32| -> Result<Option<DeviceCommand>> {
            let vertex_count = count.checked_mul(per).ok_or(Error::InvalidArgument("execute buffer vertex count overflows"))?;
            Ok(Some(DeviceCommand::Draw { primitive, vertex_count }))
        };
        match self {
            ExecuteInstruction::SetRenderState { state, value } => Ok(Some(DeviceCommand::SetRenderState { state, value })),
            ExecuteInstruction::Triangles { count } => draw(PrimitiveType::TriangleList, count, 3),
            ExecuteInstruction::Lines { count } => draw(PrimitiveType::LineList, count, 2),
            ExecuteInstruction::Points { count } => draw(PrimitiveType::PointList, count, 1),
            ExecuteInstruction::Exit => Ok(None),
        }
    }
}

/// A recorded batch of instructions for the execute-buffer generations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteBuffer {
    instructions: Vec<ExecuteInstruction>,
}

impl ExecuteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, instruction: ExecuteInstruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    pub fn instructions(&self) -> &[ExecuteInstruction] {
        &self.instructions
    }
}

/**
Creates a device over `target` and installs it.

`creator` is the resource the device is torn down with: the scene for direct creation, the target
surface when the device was obtained by querying the surface.
*/
#[allow(clippy::too_many_arguments)]
pub(crate) fn install(
    registry: &mut Registry,
    backend: &dyn Backend,
    config: &Config,
    target: ResourceId,
    version: DeviceVersion,
    creator: ResourceId,
    discipline: Discipline,
    flags: DeviceFlags,
) -> Result<WrapperId> {
    let target_state = registry.state(target)?;
    if !target_state.caps.contains(ResourceCaps::RENDER_TARGET) {
        return Err(Error::InvalidArgument("device target must be a 3D render target"));
    }
    if target_state.surface()?.device.is_some() {
        return Err(Error::ResourceAlreadyBound("surface already has a device"));
    }
    let target_object = target_state.backend.ok_or_else(|| Error::inconsistency("surface without a backend object"))?;
    let depth_object = match target_state.attachments.depth() {
        Some(depth) => registry.state(depth)?.backend,
        None => None,
    };

    let object = backend.create_object(ObjectKind::Device, "device")?;
    let bound = backend
        .execute(object, &DeviceCommand::SetRenderTarget(target_object))
        .and_then(|_| backend.execute(object, &DeviceCommand::SetDepthTarget(depth_object)));
    if let Err(e) = bound {
        backend.release(object);
        return Err(e.into());
    }
    backend.retain(object);
    let delegate = match Contract::Device(version).dispatch() {
        Dispatch::ExecuteBuffers => Delegate::ExecuteBuffers(object),
        _ => Delegate::Native(object),
    };
    let lock = (flags.contains(DeviceFlags::THREAD_SAFE) || config.force_device_lock()).then(|| Arc::new(Mutex::new(())));
    let state = CommonState::new(
        Detail::Device(DeviceState {
            render_target: Some(target),
            viewports: Vec::new(),
            current: None,
            lock,
            in_scene: false,
            render_states: BTreeMap::new(),
            next_handle: 1,
        }),
        ResourceCaps::empty(),
        Some(object),
        "device",
    );
    let (device, owner) = lifecycle::install(registry, backend, state, Some(creator), Contract::Device(version), delegate, discipline)?;
    registry.state_mut(target)?.surface_mut()?.device = Some(device);
    Ok(owner)
}

/// The device behind a render-target surface, for the surface-to-device query.
pub(crate) fn create_for_surface(
    registry: &mut Registry,
    backend: &dyn Backend,
    config: &Config,
    from: WrapperId,
    surface: ResourceId,
    version: DeviceVersion,
) -> Result<WrapperId> {
    install(registry, backend, config, surface, version, surface, Discipline::DelegatedToOrigin(from), DeviceFlags::empty())
}

/**
Runs `f` under the device lock of whichever device `device` picks out, if it has one.

The lock is looked up under the arena lock, released, then taken before the arena lock is taken
again.
*/
pub(crate) fn locked<R>(
    wrapper: &Wrapper,
    device: impl FnOnce(&Registry) -> Result<Option<ResourceId>>,
    f: impl FnOnce(&mut Registry, &dyn Backend, &Config) -> Result<R>,
) -> Result<R> {
    let lock = wrapper.read(|registry| match device(registry)? {
        Some(device) => Ok(registry.state(device)?.device()?.lock.clone()),
        None => Ok(None),
    })?;
    let _guard = lock.as_ref().map(|lock| lock.lock());
    wrapper.write(f)
}

/// Issues `command` to `device`'s backend object.
pub(crate) fn execute(registry: &Registry, backend: &dyn Backend, device: ResourceId, command: DeviceCommand) -> Result<()> {
    let object = registry.state(device)?.backend.ok_or_else(|| Error::inconsistency("device without a backend object"))?;
    backend.execute(object, &command)?;
    Ok(())
}

/// Tells the backend to stop using `viewport` and its lights on `device`.
pub(crate) fn deactivate(registry: &mut Registry, backend: &dyn Backend, device: ResourceId, viewport: ResourceId) -> Result<()> {
    let lights = registry.state(viewport)?.viewport()?.lights.clone();
    for light in lights {
        let light = registry.state_mut(light)?.light_mut()?;
        if light.active_on == Some(device) {
            light.active_on = None;
            let index = light.index;
            execute(registry, backend, device, DeviceCommand::SetLight { index, light: None })?;
        }
    }
    Ok(())
}

/// Applies `viewport`'s transform and enabled lights to `device`.
pub(crate) fn activate(registry: &mut Registry, backend: &dyn Backend, device: ResourceId, viewport: ResourceId) -> Result<()> {
    let state = registry.state(viewport)?.viewport()?;
    let (params, transform, lights, background) = (state.params, state.transform, state.lights.clone(), state.background);
    if let Some(params) = params {
        let command = DeviceCommand::SetViewport { x: params.x, y: params.y, width: params.width, height: params.height, transform };
        execute(registry, backend, device, command)?;
    }
    if let Some(background) = background {
        let material = registry.state(background)?.backend;
        execute(registry, backend, device, DeviceCommand::SetBackground { material })?;
    }
    for light in lights {
        let state = registry.state_mut(light)?.light_mut()?;
        if !state.params.enabled {
            continue;
        }
        state.active_on = Some(device);
        let (index, params) = (state.index, state.params);
        execute(registry, backend, device, DeviceCommand::SetLight { index, light: Some(params) })?;
    }
    Ok(())
}

/// A per-device handle for a material or texture, allocated on first request.
pub(crate) fn handle_for(registry: &mut Registry, device: ResourceId, resource: ResourceId) -> Result<u32> {
    registry.state(device)?.device()?;
    if let Some((_, handle)) = registry.state(resource)?.handles()?.iter().find(|(d, _)| *d == device) {
        return Ok(*handle);
    }
    let device_state = registry.state_mut(device)?.device_mut()?;
    let handle = device_state.next_handle;
    device_state.next_handle += 1;
    registry.state_mut(resource)?.handles_mut()?.push((device, handle));
    Ok(handle)
}

impl Device {
    fn locked<R>(&self, f: impl FnOnce(&mut Registry, &dyn Backend, ResourceId) -> Result<R>) -> Result<R> {
        let id = self.0.id();
        locked(&self.0, |registry| registry.resource_of(id).map(Some), |registry, backend, _| {
            let device = registry.resource_of(id)?;
            f(registry, backend, device)
        })
    }

    fn device_state<R>(&self, f: impl FnOnce(&DeviceState) -> R) -> Result<R> {
        self.0.read(|registry| Ok(f(registry.state_of(self.0.id())?.device()?)))
    }

    /**
    Binds `viewport` to this device.

    Binding one already bound here is a logged no-op; binding one bound to another device is
    rejected.
    */
    pub fn add_viewport(&self, viewport: &Viewport) -> Result<()> {
        let viewport_id = viewport.id();
        self.locked(|registry, _, device| {
            let viewport = registry.resource_of(viewport_id)?;
            match registry.state(viewport)?.viewport()?.device {
                Some(bound) if bound == device => {
                    log::warn!("viewport {viewport:?} is already bound to this device");
                    return Ok(());
                }
                Some(_) => return Err(Error::ResourceAlreadyBound("viewport is bound to another device")),
                None => {}
            }
            registry.state_mut(viewport)?.viewport_mut()?.device = Some(device);
            registry.state_mut(device)?.device_mut()?.viewports.push(viewport);
            Ok(())
        })
    }

    /// Unbinds `viewport`, deactivating it first if it's current.
    pub fn delete_viewport(&self, viewport: &Viewport) -> Result<()> {
        let viewport_id = viewport.id();
        self.locked(|registry, backend, device| {
            let viewport = registry.resource_of(viewport_id)?;
            if registry.state(viewport)?.viewport()?.device != Some(device) {
                return Err(Error::ResourceHasNoOwner("viewport is not bound to this device"));
            }
            if registry.state(device)?.device()?.current == Some(viewport) {
                deactivate(registry, backend, device, viewport)?;
                registry.state_mut(device)?.device_mut()?.current = None;
                execute(registry, backend, device, DeviceCommand::DeactivateViewport)?;
            }
            registry.state_mut(device)?.device_mut()?.viewports.retain(|v| *v != viewport);
            registry.state_mut(viewport)?.viewport_mut()?.device = None;
            Ok(())
        })
    }

    /// Bound viewports' owning wrappers.  Not acquired.
    pub fn viewports(&self) -> Result<Vec<Viewport>> {
        let owners = self.0.read(|registry| {
            let viewports = &registry.state_of(self.0.id())?.device()?.viewports;
            viewports.iter().map(|v| registry.owner_of(*v)).collect::<Result<Vec<_>>>()
        })?;
        Ok(owners.into_iter().map(|id| Viewport(self.0.sibling_handle(id))).collect())
    }

    /// Makes a bound viewport current, applying its transform and enabled lights.
    pub fn set_current_viewport(&self, viewport: &Viewport) -> Result<()> {
        let viewport_id = viewport.id();
        self.locked(|registry, backend, device| {
            let viewport = registry.resource_of(viewport_id)?;
            if registry.state(viewport)?.viewport()?.device != Some(device) {
                return Err(Error::ResourceHasNoOwner("viewport is not bound to this device"));
            }
            if let Some(previous) = registry.state(device)?.device()?.current {
                if previous != viewport {
                    deactivate(registry, backend, device, previous)?;
                }
            }
            registry.state_mut(device)?.device_mut()?.current = Some(viewport);
            activate(registry, backend, device, viewport)
        })
    }

    pub fn current_viewport(&self) -> Result<Option<Viewport>> {
        let owner = self.0.read(|registry| match registry.state_of(self.0.id())?.device()?.current {
            Some(current) => registry.owner_of(current).map(Some),
            None => Ok(None),
        })?;
        Ok(owner.map(|id| Viewport(self.0.sibling_handle(id))))
    }

    pub fn begin_scene(&self) -> Result<()> {
        self.locked(|registry, backend, device| {
            if registry.state(device)?.device()?.in_scene {
                return Err(Error::InvalidArgument("begin_scene inside a scene"));
            }
            execute(registry, backend, device, DeviceCommand::BeginScene)?;
            registry.state_mut(device)?.device_mut()?.in_scene = true;
            Ok(())
        })
    }

    pub fn end_scene(&self) -> Result<()> {
        self.locked(|registry, backend, device| {
            if !registry.state(device)?.device()?.in_scene {
                return Err(Error::InvalidArgument("end_scene outside a scene"));
            }
            execute(registry, backend, device, DeviceCommand::EndScene)?;
            registry.state_mut(device)?.device_mut()?.in_scene = false;
            Ok(())
        })
    }

    pub fn in_scene(&self) -> Result<bool> {
        self.device_state(|device| device.in_scene)
    }

    pub fn set_render_state(&self, state: u32, value: u32) -> Result<()> {
        self.locked(|registry, backend, device| {
            execute(registry, backend, device, DeviceCommand::SetRenderState { state, value })?;
            registry.state_mut(device)?.device_mut()?.render_states.insert(state, value);
            Ok(())
        })
    }

    pub fn render_state(&self, state: u32) -> Result<Option<u32>> {
        self.device_state(|device| device.render_states.get(&state).copied())
    }

    fn ready_to_draw(registry: &Registry, device: ResourceId) -> Result<()> {
        let state = registry.state(device)?.device()?;
        if !state.in_scene {
            return Err(Error::InvalidArgument("drawing outside begin_scene/end_scene"));
        }
        if state.render_target.is_none() {
            return Err(Error::InvalidArgument("device has no render target"));
        }
        Ok(())
    }

    /// Draws directly.  Generation 2 and later.
    pub fn draw_primitive(&self, primitive: PrimitiveType, vertex_count: u32) -> Result<()> {
        self.0.require(Contract::Device(DeviceVersion::V2))?;
        self.locked(|registry, backend, device| {
            Self::ready_to_draw(registry, device)?;
            execute(registry, backend, device, DeviceCommand::Draw { primitive, vertex_count })
        })
    }

    /**
    Runs an execute buffer.  Generations 1 and 2 only.

    Instructions are translated one by one; processing stops at the first
    [`ExecuteInstruction::Exit`] or error.
    */
    pub fn execute(&self, buffer: &ExecuteBuffer) -> Result<()> {
        self.0.require_one_of(&[Contract::Device(DeviceVersion::V1), Contract::Device(DeviceVersion::V2)])?;
        self.locked(|registry, backend, device| {
            Self::ready_to_draw(registry, device)?;
            for instruction in buffer.instructions() {
                let Some(command) = instruction.command()? else {
                    break;
                };
                if let DeviceCommand::SetRenderState { state, value } = command {
                    registry.state_mut(device)?.device_mut()?.render_states.insert(state, value);
                }
                execute(registry, backend, device, command)?;
            }
            Ok(())
        })
    }

    /// The render target's owning wrapper.  Not acquired.
    pub fn render_target(&self) -> Result<Option<Surface>> {
        let owner = self.0.read(|registry| match registry.state_of(self.0.id())?.device()?.render_target {
            Some(target) => registry.owner_of(target).map(Some),
            None => Ok(None),
        })?;
        Ok(owner.map(|id| Surface(self.0.sibling_handle(id))))
    }

    /// Retargets rendering, depth attachment included.  Generation 2 and later.
    pub fn set_render_target(&self, target: &Surface) -> Result<()> {
        self.0.require(Contract::Device(DeviceVersion::V2))?;
        let target_id = target.id();
        self.locked(|registry, backend, device| {
            let target = registry.resource_of(target_id)?;
            let state = registry.state(target)?;
            if !state.caps.contains(ResourceCaps::RENDER_TARGET) {
                return Err(Error::InvalidArgument("device target must be a 3D render target"));
            }
            match state.surface()?.device {
                Some(other) if other != device => return Err(Error::ResourceAlreadyBound("surface already has a device")),
                _ => {}
            }
            let object: BackendObject = state.backend.ok_or_else(|| Error::inconsistency("surface without a backend object"))?;
            let depth = match state.attachments.depth() {
                Some(depth) => registry.state(depth)?.backend,
                None => None,
            };
            execute(registry, backend, device, DeviceCommand::SetRenderTarget(object))?;
            execute(registry, backend, device, DeviceCommand::SetDepthTarget(depth))?;
            let previous = registry.state_mut(device)?.device_mut()?.render_target.replace(target);
            if let Some(previous) = previous.filter(|p| *p != target) {
                if let Ok(surface) = registry.state_mut(previous).and_then(|s| s.surface_mut()) {
                    surface.device = None;
                }
            }
            registry.state_mut(target)?.surface_mut()?.device = Some(device);
            Ok(())
        })
    }

    /// Whether the device lock is held right now.  Always false for devices without one.
    pub fn is_locked(&self) -> Result<bool> {
        self.device_state(|device| device.lock.as_ref().is_some_and(|lock| lock.is_locked()))
    }

    pub fn is_thread_safe(&self) -> Result<bool> {
        self.device_state(|device| device.lock.is_some())
    }
}
