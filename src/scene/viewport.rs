// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Viewports: a rectangle of the render target, its transform, its lights and background.

use super::device::{self, Device};
use super::light::Light;
use super::material::Material;
use crate::error::{Error, Result};
use crate::imp::{Backend, DeviceCommand};
use crate::registry::Registry;
use crate::state::{ResourceId, ViewportState};
use crate::wrapper::typed_wrapper;
use glam::{Mat4, Vec3};

typed_wrapper!(
    /// A viewport, through one of its contract generations.
    Viewport,
    Viewport,
    ViewportVersion
);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportParams {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub min_z: f32,
    pub max_z: f32,
}

impl ViewportParams {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        ViewportParams { x, y, width, height, min_z: 0.0, max_z: 1.0 }
    }

    pub fn with_depth_range(mut self, min_z: f32, max_z: f32) -> Self {
        self.min_z = min_z;
        self.max_z = max_z;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidArgument("viewport needs a width and height"));
        }
        if !(0.0..=1.0).contains(&self.min_z) || !(0.0..=1.0).contains(&self.max_z) || self.min_z >= self.max_z {
            return Err(Error::InvalidArgument("viewport depth range must be increasing within 0..=1"));
        }
        Ok(())
    }

    /// The clip-space to window-space transform.  Window y grows downward.
    pub fn transform(&self) -> Mat4 {
        let half_width = self.width as f32 / 2.0;
        let half_height = self.height as f32 / 2.0;
        let translation = Vec3::new(self.x as f32 + half_width, self.y as f32 + half_height, self.min_z);
        let scale = Vec3::new(half_width, -half_height, self.max_z - self.min_z);
        Mat4::from_translation(translation) * Mat4::from_scale(scale)
    }
}

/// Where a viewport stands in the association graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewportBinding {
    Unbound,
    Bound,
    /// Bound and current on its device.
    Current,
}

/// The device `viewport` is current on, if any.
pub(crate) fn current_on(registry: &Registry, viewport: ResourceId) -> Result<Option<ResourceId>> {
    let Some(device) = registry.state(viewport)?.viewport()?.device else {
        return Ok(None);
    };
    let current = registry.state(device)?.device()?.current;
    Ok((current == Some(viewport)).then_some(device))
}

impl Viewport {
    fn locked<R>(&self, f: impl FnOnce(&mut Registry, &dyn Backend, ResourceId) -> Result<R>) -> Result<R> {
        let id = self.0.id();
        device::locked(
            &self.0,
            |registry| Ok(registry.state_of(id)?.viewport()?.device),
            |registry, backend, _| {
                let viewport = registry.resource_of(id)?;
                f(registry, backend, viewport)
            },
        )
    }

    fn viewport_state<R>(&self, f: impl FnOnce(&ViewportState) -> R) -> Result<R> {
        self.0.read(|registry| Ok(f(registry.state_of(self.0.id())?.viewport()?)))
    }

    /// Sets the rectangle and depth range.  Applied at once if the viewport is current.
    pub fn set_viewport(&self, params: ViewportParams) -> Result<()> {
        params.validate()?;
        self.locked(|registry, backend, viewport| {
            let transform = params.transform();
            let state = registry.state_mut(viewport)?.viewport_mut()?;
            state.params = Some(params);
            state.transform = transform;
            if let Some(device) = current_on(registry, viewport)? {
                let command = DeviceCommand::SetViewport {
                    x: params.x,
                    y: params.y,
                    width: params.width,
                    height: params.height,
                    transform,
                };
                device::execute(registry, backend, device, command)?;
            }
            Ok(())
        })
    }

    pub fn viewport(&self) -> Result<Option<ViewportParams>> {
        self.viewport_state(|state| state.params)
    }

    pub fn transform(&self) -> Result<Mat4> {
        self.viewport_state(|state| state.transform)
    }

    /// Appends `light`.  A light can only be in one viewport.
    pub fn add_light(&self, light: &Light) -> Result<()> {
        let light_id = light.id();
        self.locked(|registry, backend, viewport| {
            let light = registry.resource_of(light_id)?;
            let state = registry.state(light)?.light()?;
            if state.viewport.is_some() {
                return Err(Error::ResourceAlreadyBound("light is already in a viewport"));
            }
            let (enabled, index, params) = (state.params.enabled, state.index, state.params);
            registry.state_mut(light)?.light_mut()?.viewport = Some(viewport);
            registry.state_mut(viewport)?.viewport_mut()?.lights.push(light);
            if let (Some(device), true) = (current_on(registry, viewport)?, enabled) {
                registry.state_mut(light)?.light_mut()?.active_on = Some(device);
                device::execute(registry, backend, device, DeviceCommand::SetLight { index, light: Some(params) })?;
            }
            Ok(())
        })
    }

    pub fn delete_light(&self, light: &Light) -> Result<()> {
        let light_id = light.id();
        self.locked(|registry, backend, viewport| {
            let light = registry.resource_of(light_id)?;
            if registry.state(light)?.light()?.viewport != Some(viewport) {
                return Err(Error::InvalidArgument("light is not in this viewport"));
            }
            registry.state_mut(viewport)?.viewport_mut()?.lights.retain(|l| *l != light);
            let state = registry.state_mut(light)?.light_mut()?;
            state.viewport = None;
            let index = state.index;
            if let Some(device) = state.active_on.take() {
                device::execute(registry, backend, device, DeviceCommand::SetLight { index, light: None })?;
            }
            Ok(())
        })
    }

    /// The lights in order.  Not acquired.
    pub fn lights(&self) -> Result<Vec<Light>> {
        let owners = self.0.read(|registry| {
            let lights = &registry.state_of(self.0.id())?.viewport()?.lights;
            lights.iter().map(|l| registry.owner_of(*l)).collect::<Result<Vec<_>>>()
        })?;
        Ok(owners.into_iter().map(|id| Light(self.0.sibling_handle(id))).collect())
    }

    pub fn set_background(&self, material: Option<&Material>) -> Result<()> {
        let material_id = material.map(|m| m.id());
        self.locked(|registry, backend, viewport| {
            let material = material_id.map(|id| registry.resource_of(id)).transpose()?;
            let object = match material {
                Some(material) => {
                    registry.state(material)?.material()?;
                    registry.state(material)?.backend
                }
                None => None,
            };
            registry.state_mut(viewport)?.viewport_mut()?.background = material;
            if let Some(device) = current_on(registry, viewport)? {
                device::execute(registry, backend, device, DeviceCommand::SetBackground { material: object })?;
            }
            Ok(())
        })
    }

    /// The background material's owning wrapper.  Not acquired.
    pub fn background(&self) -> Result<Option<Material>> {
        let owner = self.0.read(|registry| match registry.state_of(self.0.id())?.viewport()?.background {
            Some(material) => registry.owner_of(material).map(Some),
            None => Ok(None),
        })?;
        Ok(owner.map(|id| Material(self.0.sibling_handle(id))))
    }

    /// The device this viewport is bound to.  Not acquired.
    pub fn device(&self) -> Result<Option<Device>> {
        let owner = self.0.read(|registry| match registry.state_of(self.0.id())?.viewport()?.device {
            Some(device) => registry.owner_of(device).map(Some),
            None => Ok(None),
        })?;
        Ok(owner.map(|id| Device(self.0.sibling_handle(id))))
    }

    pub fn binding(&self) -> Result<ViewportBinding> {
        self.0.read(|registry| {
            let viewport = registry.resource_of(self.0.id())?;
            if current_on(registry, viewport)?.is_some() {
                return Ok(ViewportBinding::Current);
            }
            Ok(match registry.state(viewport)?.viewport()?.device {
                Some(_) => ViewportBinding::Bound,
                None => ViewportBinding::Unbound,
            })
        })
    }

    pub fn is_bound(&self) -> Result<bool> {
        Ok(self.binding()? != ViewportBinding::Unbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn transform_maps_clip_corners_to_the_rectangle() {
        let params = ViewportParams::new(10, 20, 100, 50);
        let transform = params.transform();
        let top_left = transform * Vec4::new(-1.0, 1.0, 0.0, 1.0);
        let bottom_right = transform * Vec4::new(1.0, -1.0, 1.0, 1.0);
        assert_eq!((top_left.x, top_left.y, top_left.z), (10.0, 20.0, 0.0));
        assert_eq!((bottom_right.x, bottom_right.y, bottom_right.z), (110.0, 70.0, 1.0));
    }

    #[test]
    fn validation() {
        assert!(ViewportParams::new(0, 0, 0, 10).validate().is_err());
        assert!(ViewportParams::new(0, 0, 10, 10).with_depth_range(0.5, 0.5).validate().is_err());
        assert!(ViewportParams::new(0, 0, 10, 10).with_depth_range(0.0, 2.0).validate().is_err());
        assert!(ViewportParams::new(0, 0, 10, 10).validate().is_ok());
    }
}
