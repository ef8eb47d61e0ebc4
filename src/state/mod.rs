// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The common state store.

One [`CommonState`] exists per logical resource, no matter how many contract generations have
been handed out for it.  Everything a wrapper knows about its resource beyond its own contract
lives here: capability flags, the per-generation wrapper slots, attachments, dirtiness and the
backend handle, plus a per-kind detail record.
*/

pub mod attachments;
pub mod dirty;

use crate::chain::SwapchainCache;
use crate::config::DisplayMode;
use crate::contract::{Family, VersionSlots};
use crate::error::{Error, Result};
use crate::imp::{BackendObject, LightParams};
use crate::pixel_formats::{BackendFormat, LegacyPixelFormat};
use crate::scene::material::MaterialParams;
use crate::scene::viewport::ViewportParams;
use crate::surfaces::SurfaceDesc;
use crate::wrapper::WrapperId;
use attachments::Attachments;
use bitflags::bitflags;
use dirty::DirtySender;
use glam::Mat4;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

slotmap::new_key_type! {
    /// Identity of one logical resource.  Stable for the resource's lifetime and never reused.
    pub struct ResourceId;
}

bitflags! {
    /// Capabilities of a resource, derived once from its creation description.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceCaps: u32 {
        const FRONT_BUFFER = 1 << 0;
        const BACK_BUFFER = 1 << 1;
        const DEPTH_TARGET = 1 << 2;
        const TEXTURE = 1 << 3;
        const CUBE_MAP = 1 << 4;
        const RENDER_TARGET = 1 << 5;
        const MIPMAP = 1 << 6;
        const PRIMARY = 1 << 7;
        /// Member of a flip chain.
        const FLIP = 1 << 8;
        /// A mip level below the top of its chain.
        const MIP_SUBLEVEL = 1 << 9;
        /// One face of a cube map other than the root face.
        const CUBE_FACE = 1 << 10;
    }
}

#[derive(Debug)]
pub(crate) struct SurfaceState {
    pub(crate) desc: SurfaceDesc,
    pub(crate) format: LegacyPixelFormat,
    pub(crate) backend_format: BackendFormat,
    pub(crate) bytes_per_row: u32,
    pub(crate) rows: u32,
    /// System-memory shadow of the pixel content.
    pub(crate) pixels: Vec<u8>,
    pub(crate) context: ResourceId,
    /// The surface this one is attached to, if any.
    pub(crate) parent: Option<ResourceId>,
    pub(crate) texture: Option<ResourceId>,
    /// A device produced by querying this surface.
    pub(crate) device: Option<ResourceId>,
    /// `Some(read_only)` while locked.
    pub(crate) locked: Option<bool>,
    pub(crate) private_data: HashMap<u128, Vec<u8>>,
    pub(crate) priority: u32,
    pub(crate) lod: u32,
    /// Levels in the mip chain this surface heads (1 when not mipmapped).
    pub(crate) mip_levels: u32,
}

#[derive(Debug)]
pub(crate) struct ContextState {
    pub(crate) display_mode: DisplayMode,
    pub(crate) primary: Option<ResourceId>,
    pub(crate) scene: Option<ResourceId>,
    pub(crate) swapchain: SwapchainCache,
}

#[derive(Debug)]
pub(crate) struct SceneState {
    pub(crate) context: ResourceId,
    pub(crate) next_light_index: u32,
}

#[derive(Debug)]
pub(crate) struct DeviceState {
    pub(crate) render_target: Option<ResourceId>,
    pub(crate) viewports: Vec<ResourceId>,
    pub(crate) current: Option<ResourceId>,
    pub(crate) lock: Option<Arc<Mutex<()>>>,
    pub(crate) in_scene: bool,
    pub(crate) render_states: BTreeMap<u32, u32>,
    pub(crate) next_handle: u32,
}

#[derive(Debug)]
pub(crate) struct ViewportState {
    pub(crate) device: Option<ResourceId>,
    pub(crate) lights: Vec<ResourceId>,
    pub(crate) params: Option<ViewportParams>,
    pub(crate) transform: Mat4,
    pub(crate) background: Option<ResourceId>,
}

#[derive(Debug)]
pub(crate) struct LightState {
    pub(crate) viewport: Option<ResourceId>,
    pub(crate) params: LightParams,
    /// Backend light slot, fixed at creation.
    pub(crate) index: u32,
    /// Device on which this light is currently enabled.
    pub(crate) active_on: Option<ResourceId>,
}

#[derive(Debug)]
pub(crate) struct MaterialState {
    pub(crate) params: MaterialParams,
    pub(crate) handles: Vec<(ResourceId, u32)>,
}

#[derive(Debug)]
pub(crate) struct TextureState {
    pub(crate) surface: ResourceId,
    pub(crate) handles: Vec<(ResourceId, u32)>,
}

#[derive(Debug)]
pub(crate) enum Detail {
    Context(ContextState),
    Scene(SceneState),
    Surface(SurfaceState),
    Texture(TextureState),
    Device(DeviceState),
    Viewport(ViewportState),
    Light(LightState),
    Material(MaterialState),
}

impl Detail {
    pub(crate) fn family(&self) -> Family {
        match self {
            Detail::Context(_) => Family::Context,
            Detail::Scene(_) => Family::Scene,
            Detail::Surface(_) => Family::Surface,
            Detail::Texture(_) => Family::Texture,
            Detail::Device(_) => Family::Device,
            Detail::Viewport(_) => Family::Viewport,
            Detail::Light(_) => Family::Light,
            Detail::Material(_) => Family::Material,
        }
    }
}

#[derive(Debug)]
pub(crate) struct CommonState {
    pub(crate) caps: ResourceCaps,
    pub(crate) slots: VersionSlots<WrapperId>,
    /// The wrapper produced by the creation call.
    pub(crate) owner: Option<WrapperId>,
    /// The resource whose creation call produced this one.
    pub(crate) creator: Option<ResourceId>,
    /// Resources this one created; destroyed with it.
    pub(crate) created: Vec<ResourceId>,
    pub(crate) attachments: Attachments,
    pub(crate) dirty: DirtySender,
    pub(crate) backend: Option<BackendObject>,
    pub(crate) debug_name: String,
    pub(crate) tearing_down: bool,
    pub(crate) detail: Detail,
}

macro_rules! detail_accessors {
    ($($variant:ident => $state:ty, $get:ident, $get_mut:ident;)+) => {
        impl CommonState {
            $(
            pub(crate) fn $get(&self) -> Result<&$state> {
                match &self.detail {
                    Detail::$variant(state) => Ok(state),
                    _ => Err(Error::inconsistency(concat!("resource is not a ", stringify!($get)))),
                }
            }
            pub(crate) fn $get_mut(&mut self) -> Result<&mut $state> {
                match &mut self.detail {
                    Detail::$variant(state) => Ok(state),
                    _ => Err(Error::inconsistency(concat!("resource is not a ", stringify!($get)))),
                }
            }
            )+
        }
    };
}

detail_accessors! {
    Context => ContextState, context, context_mut;
    Scene => SceneState, scene, scene_mut;
    Surface => SurfaceState, surface, surface_mut;
    Texture => TextureState, texture, texture_mut;
    Device => DeviceState, device, device_mut;
    Viewport => ViewportState, viewport, viewport_mut;
    Light => LightState, light, light_mut;
    Material => MaterialState, material, material_mut;
}

impl CommonState {
    /// Per-device handles of a material or texture.
    pub(crate) fn handles(&self) -> Result<&[(ResourceId, u32)]> {
        if matches!(self.detail, Detail::Texture(_)) {
            return Ok(self.texture()?.handles.as_slice());
        }
        Ok(self.material()?.handles.as_slice())
    }

    pub(crate) fn handles_mut(&mut self) -> Result<&mut Vec<(ResourceId, u32)>> {
        if matches!(self.detail, Detail::Texture(_)) {
            return Ok(&mut self.texture_mut()?.handles);
        }
        Ok(&mut self.material_mut()?.handles)
    }

    pub(crate) fn new(detail: Detail, caps: ResourceCaps, backend: Option<BackendObject>, debug_name: impl Into<String>) -> Self {
        CommonState {
            caps,
            slots: VersionSlots::new(),
            owner: None,
            creator: None,
            created: Vec::new(),
            attachments: Attachments::default(),
            dirty: DirtySender::new(false),
            backend,
            debug_name: debug_name.into(),
            tearing_down: false,
            detail,
        }
    }

    pub(crate) fn family(&self) -> Family {
        self.detail.family()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_state() -> CommonState {
        let mut contexts: slotmap::SlotMap<ResourceId, ()> = slotmap::SlotMap::with_key();
        let context = contexts.insert(());
        CommonState::new(
            Detail::Scene(SceneState { context, next_light_index: 0 }),
            ResourceCaps::empty(),
            None,
            "scene",
        )
    }

    #[test]
    fn accessors_check_kind() {
        let mut state = scene_state();
        assert_eq!(state.family(), Family::Scene);
        assert!(state.scene().is_ok());
        assert!(matches!(state.device_mut(), Err(Error::InternalInconsistency(_))));
    }

    #[test]
    fn fresh_state_is_clean_and_unowned() {
        let state = scene_state();
        assert!(state.owner.is_none());
        assert!(!state.dirty.is_dirty());
        assert_eq!(state.slots.occupied().count(), 0);
    }
}
