// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Lights.

use super::device;
use super::viewport::{self, Viewport};
use crate::error::Result;
use crate::imp::{DeviceCommand, LightParams};
use crate::wrapper::typed_wrapper;

typed_wrapper!(
    /// A light.  There is only one generation.
    Light,
    Light,
    LightVersion
);

impl Light {
    /**
    Replaces the light's parameters.

    If its viewport is current, the change reaches the device at once: an enabled light is set,
    a disabled one switched off.
    */
    pub fn set_light(&self, params: LightParams) -> Result<()> {
        let id = self.0.id();
        device::locked(
            &self.0,
            |registry| match registry.state_of(id)?.light()?.viewport {
                Some(viewport) => Ok(registry.state(viewport)?.viewport()?.device),
                None => Ok(None),
            },
            |registry, backend, _| {
                let light = registry.resource_of(id)?;
                let state = registry.state_mut(light)?.light_mut()?;
                state.params = params;
                let (index, viewport, active_on) = (state.index, state.viewport, state.active_on);
                let current = match viewport {
                    Some(viewport) => viewport::current_on(registry, viewport)?,
                    None => None,
                };
                match (current, params.enabled) {
                    (Some(device), true) => {
                        registry.state_mut(light)?.light_mut()?.active_on = Some(device);
                        device::execute(registry, backend, device, DeviceCommand::SetLight { index, light: Some(params) })
                    }
                    _ => match active_on {
                        Some(device) => {
                            registry.state_mut(light)?.light_mut()?.active_on = None;
                            device::execute(registry, backend, device, DeviceCommand::SetLight { index, light: None })
                        }
                        None => Ok(()),
                    },
                }
            },
        )
    }

    pub fn light(&self) -> Result<LightParams> {
        self.0.read(|registry| Ok(registry.state_of(self.0.id())?.light()?.params))
    }

    /// The backend light slot this light occupies.
    pub fn index(&self) -> Result<u32> {
        self.0.read(|registry| Ok(registry.state_of(self.0.id())?.light()?.index))
    }

    /// Whether the light is currently applied on a device.
    pub fn is_active(&self) -> Result<bool> {
        self.0.read(|registry| Ok(registry.state_of(self.0.id())?.light()?.active_on.is_some()))
    }

    /// The viewport holding this light.  Not acquired.
    pub fn viewport(&self) -> Result<Option<Viewport>> {
        let owner = self.0.read(|registry| match registry.state_of(self.0.id())?.light()?.viewport {
            Some(viewport) => registry.owner_of(viewport).map(Some),
            None => Ok(None),
        })?;
        Ok(owner.map(|id| Viewport(self.0.sibling_handle(id))))
    }
}
