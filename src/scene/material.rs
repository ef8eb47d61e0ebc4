// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Materials.

use super::device::{self, Device};
use crate::error::Result;
use crate::wrapper::typed_wrapper;
use glam::Vec4;

typed_wrapper!(
    /// A material, through one of its contract generations.
    Material,
    Material,
    MaterialVersion
);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialParams {
    pub diffuse: Vec4,
    pub ambient: Vec4,
    pub specular: Vec4,
    pub emissive: Vec4,
    pub power: f32,
}

impl Default for MaterialParams {
    fn default() -> Self {
        MaterialParams {
            diffuse: Vec4::ONE,
            ambient: Vec4::ZERO,
            specular: Vec4::ZERO,
            emissive: Vec4::ZERO,
            power: 0.0,
        }
    }
}

impl Material {
    pub fn set_material(&self, params: MaterialParams) -> Result<()> {
        self.0.write(|registry, _, _| {
            registry.state_of_mut(self.0.id())?.material_mut()?.params = params;
            Ok(())
        })
    }

    pub fn material(&self) -> Result<MaterialParams> {
        self.0.read(|registry| Ok(registry.state_of(self.0.id())?.material()?.params))
    }

    /// This material's handle on `device`.  Stable until the device is destroyed.
    pub fn handle(&self, device: &Device) -> Result<u32> {
        let device_id = device.id();
        self.0.write(|registry, _, _| {
            let material = registry.resource_of(self.0.id())?;
            let device = registry.resource_of(device_id)?;
            device::handle_for(registry, device, material)
        })
    }
}
