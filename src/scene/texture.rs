// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Textures.

A texture is a view of a texture surface, reached by querying the surface.  It has its own
identity and generations but no backend object of its own: primitives land on the surface's.
Its count is shared with the surface's owner, so the surface outlives every texture view of it.
*/

use super::device::{self, Device};
use crate::contract::{Contract, SurfaceVersion, TextureVersion};
use crate::delegate::Delegate;
use crate::error::{Error, Result};
use crate::imp::Backend;
use crate::lifecycle;
use crate::refcount::Discipline;
use crate::registry::Registry;
use crate::state::{CommonState, Detail, ResourceCaps, ResourceId, TextureState};
use crate::surfaces::Surface;
use crate::wrapper::{WrapperId, typed_wrapper};

typed_wrapper!(
    /// A texture view of a surface, through one of its contract generations.
    Texture,
    Texture,
    TextureVersion
);

pub(crate) fn create_for_surface(
    registry: &mut Registry,
    backend: &dyn Backend,
    surface: ResourceId,
    version: TextureVersion,
) -> Result<WrapperId> {
    let surface_owner = registry.owner_of(surface)?;
    let state = registry.state(surface)?;
    if state.surface()?.texture.is_some() {
        return Err(Error::inconsistency("surface already has a texture"));
    }
    let object = state.backend.ok_or_else(|| Error::inconsistency("surface without a backend object"))?;
    let name = format!("texture of {}", state.debug_name);
    backend.retain(object);
    let state = CommonState::new(
        Detail::Texture(TextureState { surface, handles: Vec::new() }),
        ResourceCaps::empty(),
        None,
        name,
    );
    let (texture, owner) = lifecycle::install(
        registry,
        backend,
        state,
        Some(surface),
        Contract::Texture(version),
        Delegate::Native(object),
        Discipline::DelegatedToParent(surface_owner),
    )?;
    registry.state_mut(surface)?.surface_mut()?.texture = Some(texture);
    Ok(owner)
}

impl Texture {
    fn surface_resource(registry: &Registry, texture: WrapperId) -> Result<ResourceId> {
        Ok(registry.state_of(texture)?.texture()?.surface)
    }

    /// This texture's handle on `device`.  Stable until the device is destroyed.
    pub fn handle(&self, device: &Device) -> Result<u32> {
        let device_id = device.id();
        self.0.write(|registry, _, _| {
            let texture = registry.resource_of(self.0.id())?;
            let device = registry.resource_of(device_id)?;
            device::handle_for(registry, device, texture)
        })
    }

    /// Copies `source`'s pixels into this texture.  Sizes and formats must match.
    pub fn load(&self, source: &Texture) -> Result<()> {
        let source_id = source.id();
        self.0.write(|registry, _, _| {
            let from = Self::surface_resource(registry, source_id)?;
            let to = Self::surface_resource(registry, self.0.id())?;
            if from == to {
                return Ok(());
            }
            let pixels = {
                let source = registry.state(from)?.surface()?;
                let destination = registry.state(to)?.surface()?;
                if (source.desc.width, source.desc.height, source.format)
                    != (destination.desc.width, destination.desc.height, destination.format)
                {
                    return Err(Error::InvalidArgument("texture load between different sizes or formats"));
                }
                if destination.locked.is_some() {
                    return Err(Error::InvalidArgument("texture load into a locked surface"));
                }
                source.pixels.clone()
            };
            let state = registry.state_mut(to)?;
            state.surface_mut()?.pixels = pixels;
            state.dirty.mark_dirty();
            Ok(())
        })
    }

    /// The surface this texture views, acquired.
    pub fn surface(&self, version: SurfaceVersion) -> Result<Surface> {
        Ok(Surface(self.0.query(Contract::Surface(version))?))
    }
}
