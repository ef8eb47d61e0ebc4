// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Drawing contexts.

A context is the root of everything: it creates surfaces, owns the display mode and the
swapchain mapping of its primary flip chain, and has at most one scene.
*/

use crate::chain::SwapchainCache;
use crate::config::DisplayMode;
use crate::contract::{Contract, ContextVersion, Family, SceneVersion};
use crate::delegate::Delegate;
use crate::error::{Error, Result};
use crate::imp::{Backend, ObjectKind};
use crate::lifecycle;
use crate::refcount::Discipline;
use crate::registry::Registry;
use crate::runtime::Runtime;
use crate::scene::Scene;
use crate::state::{CommonState, ContextState, Detail, ResourceCaps, ResourceId, SceneState};
use crate::surfaces::{self, Surface, SurfaceDesc};
use crate::wrapper::{Wrapper, WrapperId, typed_wrapper};
use std::sync::Arc;

typed_wrapper!(
    /// A drawing context, through one of its contract generations.
    Context,
    Context,
    ContextVersion
);

pub(crate) fn create(runtime: &Arc<Runtime>, version: ContextVersion) -> Result<Context> {
    let contract = Contract::Context(version);
    let backend = runtime.backend().as_ref();
    if !backend.supports(contract) {
        return Err(Error::unsupported(Family::Context.native(), contract));
    }
    let display_mode = runtime.config().default_display_mode();
    if !valid_mode(display_mode) {
        return Err(Error::InvalidArgument("default display mode is not a valid mode"));
    }
    let object = backend.create_object(ObjectKind::Context, "context")?;
    backend.retain(object);
    let state = CommonState::new(
        Detail::Context(ContextState {
            display_mode,
            primary: None,
            scene: None,
            swapchain: SwapchainCache::default(),
        }),
        ResourceCaps::empty(),
        Some(object),
        "context",
    );
    let mut registry = runtime.registry();
    let (_, id) = lifecycle::install(&mut registry, backend, state, None, contract, Delegate::Native(object), Discipline::Independent)?;
    Ok(Context(Wrapper::new(runtime.clone(), id)))
}

/// Creates the scene of `context`.  Its count is shared with the context's owner.
pub(crate) fn create_scene(
    registry: &mut Registry,
    backend: &dyn Backend,
    context: ResourceId,
    version: SceneVersion,
) -> Result<WrapperId> {
    let context_owner = registry.owner_of(context)?;
    if registry.state(context)?.context()?.scene.is_some() {
        return Err(Error::inconsistency("context already has a scene"));
    }
    let object = backend.create_object(ObjectKind::Scene, "scene")?;
    backend.retain(object);
    let state = CommonState::new(
        Detail::Scene(SceneState { context, next_light_index: 0 }),
        ResourceCaps::empty(),
        Some(object),
        "scene",
    );
    let (scene, owner) = lifecycle::install(
        registry,
        backend,
        state,
        Some(context),
        Contract::Scene(version),
        Delegate::Native(object),
        Discipline::DelegatedToParent(context_owner),
    )?;
    registry.state_mut(context)?.context_mut()?.scene = Some(scene);
    Ok(owner)
}

fn valid_mode(mode: DisplayMode) -> bool {
    mode.width > 0 && mode.height > 0 && matches!(mode.bits_per_pixel, 8 | 16 | 24 | 32)
}

impl Context {
    fn resource(&self) -> Result<ResourceId> {
        self.0.read(|registry| registry.resource_of(self.0.id()))
    }

    /**
    Creates a surface, or a whole complex structure of them.

    The returned surface speaks the generation matching this context's: contexts 1 and 2 create
    generation-1 surfaces, 4 and 7 their own.
    */
    pub fn create_surface(&self, desc: &SurfaceDesc) -> Result<Surface> {
        let version = surfaces::surface_version_for(self.version()?);
        let id = self.0.write(|registry, backend, config| {
            let contract = Contract::Surface(version);
            if !backend.supports(contract) {
                return Err(Error::unsupported(registry.wrapper(self.0.id())?.contract, contract));
            }
            let context = registry.resource_of(self.0.id())?;
            surfaces::create(registry, backend, config, context, desc, version)
        })?;
        Ok(Surface(self.0.sibling_handle(id)))
    }

    pub fn display_mode(&self) -> Result<DisplayMode> {
        self.0.read(|registry| Ok(registry.state_of(self.0.id())?.context()?.display_mode))
    }

    /**
    Changes the display mode and resets the swapchain.

    A live primary surface pins the resolution: changing width or height while one exists is
    rejected.
    */
    pub fn set_display_mode(&self, mode: DisplayMode) -> Result<()> {
        if !valid_mode(mode) {
            return Err(Error::InvalidArgument("unsupported display mode"));
        }
        self.0.write(|registry, backend, _| {
            let state = registry.state_of_mut(self.0.id())?;
            let context = state.context_mut()?;
            let current = context.display_mode;
            if context.primary.is_some() && (current.width, current.height) != (mode.width, mode.height) {
                return Err(Error::InvalidArgument("can't resize the display under a primary surface"));
            }
            context.display_mode = mode;
            context.swapchain.invalidate(backend);
            log::debug!("display mode {}x{}x{}", mode.width, mode.height, mode.bits_per_pixel);
            Ok(())
        })
    }

    /// Throws away the swapchain mapping; the next flip re-walks every chain with fresh buffers.
    pub fn reset_swapchain(&self) -> Result<()> {
        self.0.write(|registry, backend, _| {
            registry.state_of_mut(self.0.id())?.context_mut()?.swapchain.invalidate(backend);
            Ok(())
        })
    }

    /// The generation of the swapchain mapping; changes on every reset or rebuild.
    pub fn swapchain_generation(&self) -> Result<u64> {
        self.0.read(|registry| Ok(registry.state_of(self.0.id())?.context()?.swapchain.generation()))
    }

    /// Resets the swapchain and marks every surface of this context dirty.  Generation 7.
    pub fn restore_all_surfaces(&self) -> Result<()> {
        self.0.require(Contract::Context(ContextVersion::V7))?;
        self.0.write(|registry, backend, _| {
            let context = registry.resource_of(self.0.id())?;
            registry.state_mut(context)?.context_mut()?.swapchain.invalidate(backend);
            let mut restored = 0;
            for state in registry.states.values() {
                if state.surface().is_ok_and(|s| s.context == context) {
                    state.dirty.mark_dirty();
                    restored += 1;
                }
            }
            log::debug!("restored {restored} surfaces");
            Ok(())
        })
    }

    /// The scene of this context, created on first request.  Acquired.
    pub fn scene(&self, version: SceneVersion) -> Result<Scene> {
        Ok(Scene(self.0.query(Contract::Scene(version))?))
    }

    /// The primary surface's owning wrapper, if there is one.  Does not acquire.
    pub fn primary_surface(&self) -> Result<Option<Surface>> {
        let owner = self.0.read(|registry| {
            let Some(primary) = registry.state_of(self.0.id())?.context()?.primary else {
                return Ok(None);
            };
            registry.owner_of(primary).map(Some)
        })?;
        Ok(owner.map(|id| Surface(self.0.sibling_handle(id))))
    }

    /// Live surfaces created by this context, implicit chain members included.
    pub fn surface_count(&self) -> Result<usize> {
        let context = self.resource()?;
        self.0.read(|registry| {
            Ok(registry.states.values().filter(|state| state.surface().is_ok_and(|s| s.context == context)).count())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::imp::{RecordKind, SoftwareBackend};
    use crate::surfaces::SurfaceCaps;

    fn runtime() -> (Arc<SoftwareBackend>, Arc<Runtime>) {
        let backend = Arc::new(SoftwareBackend::new());
        let runtime = Runtime::with_backend(Config::default(), backend.clone());
        (backend, runtime)
    }

    #[test]
    fn context_owns_one_backend_object() {
        let (backend, runtime) = runtime();
        let context = runtime.create_context(ContextVersion::V4).unwrap();
        assert_eq!(backend.live_objects_of(RecordKind::Object(ObjectKind::Context)), 1);
        assert_eq!(context.ref_count().unwrap(), 1);
        assert_eq!(context.release().unwrap(), 0);
        assert_eq!(backend.live_objects(), 0);
        assert_eq!(runtime.live_resources(), 0);
    }

    #[test]
    fn unsupported_context_generation() {
        let (backend, runtime) = runtime();
        backend.disable_contract(Contract::Context(ContextVersion::V1));
        assert!(matches!(
            runtime.create_context(ContextVersion::V1),
            Err(Error::UnsupportedCapability { .. })
        ));
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn display_mode_is_pinned_by_primary() {
        let (_backend, runtime) = runtime();
        let context = runtime.create_context(ContextVersion::V7).unwrap();
        context.set_display_mode(DisplayMode::new(320, 240, 16)).unwrap();
        let _primary = context.create_surface(&SurfaceDesc::new(SurfaceCaps::PRIMARY_SURFACE)).unwrap();
        assert!(context.set_display_mode(DisplayMode::new(640, 480, 16)).is_err());
        context.set_display_mode(DisplayMode::new(320, 240, 32)).unwrap();
        assert_eq!(context.display_mode().unwrap().bits_per_pixel, 32);
        assert!(context.set_display_mode(DisplayMode::new(320, 240, 12)).is_err());
    }

    #[test]
    fn empty_default_display_mode_is_rejected() {
        let backend = Arc::new(SoftwareBackend::new());
        let config = Config::default().with_default_display_mode(DisplayMode::new(0, 0, 32));
        let runtime = Runtime::with_backend(config, backend.clone());
        assert!(matches!(runtime.create_context(ContextVersion::V7), Err(Error::InvalidArgument(_))));
        assert_eq!(backend.live_objects(), 0);
        assert_eq!(runtime.live_resources(), 0);
    }

    #[test]
    fn restore_requires_generation_seven() {
        let (_backend, runtime) = runtime();
        let context = runtime.create_context(ContextVersion::V2).unwrap();
        assert!(matches!(context.restore_all_surfaces(), Err(Error::UnsupportedCapability { .. })));
    }

    #[test]
    fn surfaces_counted_per_context() {
        let (_backend, runtime) = runtime();
        let first = runtime.create_context(ContextVersion::V7).unwrap();
        let second = runtime.create_context(ContextVersion::V7).unwrap();
        let desc = SurfaceDesc::new(SurfaceCaps::OFFSCREEN_PLAIN).with_size(4, 4);
        first.create_surface(&desc).unwrap();
        first.create_surface(&desc).unwrap();
        second.create_surface(&desc).unwrap();
        assert_eq!(first.surface_count().unwrap(), 2);
        assert_eq!(second.surface_count().unwrap(), 1);
    }
}
