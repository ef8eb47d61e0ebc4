// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The 3D scene family.

A context has at most one [`Scene`], found (and created on first use) through
[`Context::scene`](crate::Context::scene).  The scene creates devices, viewports, lights and
materials; all of them are torn down with it.

Devices, viewports and lights form an association graph: a device has a set of bound viewports
and at most one current one, a viewport has an ordered list of lights.  Every edge is a weak
reference paired with notification, so destroying either end leaves the other consistent.
*/

pub mod device;
pub mod light;
pub mod material;
pub mod texture;
pub mod viewport;

use crate::context::Context;
use crate::contract::{Contract, ContextVersion, DeviceVersion, LightVersion, MaterialVersion, ViewportVersion};
use crate::delegate::Delegate;
use crate::error::{Error, Result};
use crate::imp::{LightParams, ObjectKind};
use crate::lifecycle;
use crate::refcount::Discipline;
use crate::state::{CommonState, Detail, LightState, MaterialState, ResourceCaps, ViewportState};
use crate::surfaces::Surface;
use crate::wrapper::{WrapperId, typed_wrapper};
use bitflags::bitflags;
use glam::Mat4;

pub use device::{Device, ExecuteBuffer, ExecuteInstruction};
pub use light::Light;
pub use material::{Material, MaterialParams};
pub use texture::Texture;
pub use viewport::{Viewport, ViewportBinding, ViewportParams};

typed_wrapper!(
    /// The 3D scene of a context.
    Scene,
    Scene,
    SceneVersion
);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceFlags: u32 {
        /// Serialize every state-changing call on the device behind a lock.
        const THREAD_SAFE = 1 << 0;
    }
}

impl Scene {
    /// Creates a backend object of `kind` and installs it as a resource created by this scene.
    fn create_child(&self, kind: ObjectKind, detail: Detail, contract: Contract, name: &'static str) -> Result<WrapperId> {
        self.0.write(|registry, backend, _| {
            if !backend.supports(contract) {
                return Err(Error::unsupported(registry.wrapper(self.0.id())?.contract, contract));
            }
            let scene = registry.resource_of(self.0.id())?;
            let object = backend.create_object(kind, name)?;
            backend.retain(object);
            let state = CommonState::new(detail, ResourceCaps::empty(), Some(object), name);
            let (_, id) = lifecycle::install(
                registry,
                backend,
                state,
                Some(scene),
                contract,
                Delegate::Native(object),
                Discipline::Independent,
            )?;
            Ok(id)
        })
    }

    /**
    Creates a device rendering into `target`.

    The target must be a render target without a device.  Generation 1 devices can't be created
    directly; ask a render-target surface for one instead.
    */
    pub fn create_device(&self, target: &Surface, version: DeviceVersion, flags: DeviceFlags) -> Result<device::Device> {
        if version == DeviceVersion::V1 {
            return Err(Error::unsupported(self.0.contract()?, Contract::Device(version)));
        }
        let surface = target.id();
        let id = self.0.write(|registry, backend, config| {
            let contract = Contract::Device(version);
            if !backend.supports(contract) {
                return Err(Error::unsupported(registry.wrapper(self.0.id())?.contract, contract));
            }
            let scene = registry.resource_of(self.0.id())?;
            let target = registry.resource_of(surface)?;
            device::install(registry, backend, config, target, version, scene, Discipline::Independent, flags)
        })?;
        Ok(device::Device(self.0.sibling_handle(id)))
    }

    pub fn create_viewport(&self, version: ViewportVersion) -> Result<Viewport> {
        let detail = Detail::Viewport(ViewportState {
            device: None,
            lights: Vec::new(),
            params: None,
            transform: Mat4::IDENTITY,
            background: None,
        });
        let id = self.create_child(ObjectKind::Viewport, detail, Contract::Viewport(version), "viewport")?;
        Ok(Viewport(self.0.sibling_handle(id)))
    }

    /// Creates a disabled light.  Each light of a scene gets its own backend light index.
    pub fn create_light(&self) -> Result<Light> {
        let index = self.0.write(|registry, _, _| {
            let scene = registry.state_of_mut(self.0.id())?.scene_mut()?;
            let index = scene.next_light_index;
            scene.next_light_index += 1;
            Ok(index)
        })?;
        let detail = Detail::Light(LightState { viewport: None, params: LightParams::default(), index, active_on: None });
        let id = self.create_child(ObjectKind::Light, detail, Contract::Light(LightVersion::V1), "light")?;
        Ok(Light(self.0.sibling_handle(id)))
    }

    pub fn create_material(&self, version: MaterialVersion) -> Result<Material> {
        let detail = Detail::Material(MaterialState { params: MaterialParams::default(), handles: Vec::new() });
        let id = self.create_child(ObjectKind::Material, detail, Contract::Material(version), "material")?;
        Ok(Material(self.0.sibling_handle(id)))
    }

    /// The context this scene belongs to, acquired.
    pub fn context(&self, version: ContextVersion) -> Result<Context> {
        Ok(Context(self.0.query(Contract::Context(version))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Runtime;
    use crate::config::Config;
    use crate::contract::SceneVersion;
    use crate::imp::{RecordKind, SoftwareBackend};
    use crate::surfaces::{SurfaceCaps, SurfaceDesc};
    use std::sync::Arc;

    #[test]
    fn scene_is_shared_between_context_generations() {
        let backend = Arc::new(SoftwareBackend::new());
        let runtime = Runtime::with_backend(Config::default(), backend.clone());
        let context = runtime.create_context(ContextVersion::V7).unwrap();
        let scene = context.scene(SceneVersion::V3).unwrap();
        let old_context = context.as_version(ContextVersion::V1).unwrap();
        let same_scene = old_context.scene(SceneVersion::V3).unwrap();
        assert_eq!(scene, same_scene);
        let other_generation = old_context.scene(SceneVersion::V1).unwrap();
        assert!(scene.same_resource(&other_generation).unwrap());
        assert_eq!(backend.live_objects_of(RecordKind::Object(ObjectKind::Scene)), 1);
    }

    #[test]
    fn scene_children_die_with_the_context() {
        let backend = Arc::new(SoftwareBackend::new());
        let runtime = Runtime::with_backend(Config::default(), backend.clone());
        let context = runtime.create_context(ContextVersion::V7).unwrap();
        let scene = context.scene(SceneVersion::V7).unwrap();
        let viewport = scene.create_viewport(ViewportVersion::V3).unwrap();
        let light = scene.create_light().unwrap();
        let second_light = scene.create_light().unwrap();
        let material = scene.create_material(MaterialVersion::V3).unwrap();
        assert_ne!(light.index().unwrap(), second_light.index().unwrap());
        //the scene's count lives on the context
        assert_eq!(scene.release().unwrap(), 1);
        assert_eq!(context.release().unwrap(), 0);
        for handle in [viewport.wrapper(), light.wrapper(), material.wrapper()] {
            assert!(!handle.is_alive());
        }
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn generation_one_devices_come_from_surfaces() {
        let runtime = Runtime::new(Config::default());
        let context = runtime.create_context(ContextVersion::V7).unwrap();
        let scene = context.scene(SceneVersion::V7).unwrap();
        let target = context
            .create_surface(&SurfaceDesc::new(SurfaceCaps::OFFSCREEN_PLAIN | SurfaceCaps::THREE_D_DEVICE).with_size(8, 8))
            .unwrap();
        assert!(matches!(
            scene.create_device(&target, DeviceVersion::V1, DeviceFlags::empty()),
            Err(Error::UnsupportedCapability { .. })
        ));
        let plain = context.create_surface(&SurfaceDesc::new(SurfaceCaps::OFFSCREEN_PLAIN).with_size(8, 8)).unwrap();
        assert!(matches!(
            scene.create_device(&plain, DeviceVersion::V7, DeviceFlags::empty()),
            Err(Error::InvalidArgument(_))
        ));
        scene.create_device(&target, DeviceVersion::V7, DeviceFlags::empty()).unwrap();
        assert!(matches!(
            scene.create_device(&target, DeviceVersion::V3, DeviceFlags::empty()),
            Err(Error::ResourceAlreadyBound(_))
        ));
    }
}
