// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The backend seam.

Everything above this module talks about contracts, wrappers and logical resources.  Everything
below it talks about backend objects: opaque, reference-counted handles owned by a [`Backend`].
The software backend is always available; the wgpu backend is behind `backend_wgpu`.
*/

mod software;
pub use software::{RecordKind, SoftwareBackend};

#[cfg(feature = "backend_wgpu")]
mod wgpu;
#[cfg(feature = "backend_wgpu")]
pub use self::wgpu::WgpuBackend;

use crate::contract::Contract;
use crate::pixel_formats::BackendFormat;
use glam::{Mat4, Vec3, Vec4};
use std::fmt::Debug;

/// An opaque handle to something the backend owns.
///
/// Handles are plain identifiers; their lifetime is governed by [`Backend::retain`] and
/// [`Backend::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendObject(u64);

impl BackendObject {
    pub fn from_raw(raw: u64) -> Self {
        BackendObject(raw)
    }
    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("backend is out of memory creating {0}")]
    OutOfMemory(&'static str),
    #[error("backend can't represent format {0:?}")]
    UnsupportedFormat(BackendFormat),
    #[error("no such backend object {0:?}")]
    UnknownObject(BackendObject),
    #[error("upload of {got} bytes doesn't match the expected {expected}")]
    UploadSize { expected: usize, got: usize },
    #[error("backend failure: {0}")]
    Other(String),
}

/// Non-surface objects the backend allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Context,
    Scene,
    Device,
    Viewport,
    Light,
    Material,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

/// Where a surface's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryPool {
    #[default]
    Video,
    System,
    /// Driver-managed: video memory with a system copy, eligible for priority and LOD control.
    Managed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SurfaceUsage {
    pub render_target: bool,
    pub depth: bool,
    pub texture: bool,
    pub scanout: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceCreateInfo {
    pub extent: Extent,
    pub format: BackendFormat,
    pub usage: SurfaceUsage,
    pub pool: MemoryPool,
    pub debug_name: String,
}

/// Byte layout of a shadow buffer handed to [`Backend::upload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLayout {
    pub extent: Extent,
    pub bytes_per_row: u32,
    pub rows: u32,
    pub format: BackendFormat,
}

impl UploadLayout {
    pub fn byte_len(&self) -> usize {
        self.bytes_per_row as usize * self.rows as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Point,
    Spot,
    Directional,
    ParallelPoint,
}

/// Light parameters in backend terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightParams {
    pub kind: LightKind,
    pub color: Vec4,
    pub position: Vec3,
    pub direction: Vec3,
    pub range: f32,
    pub attenuation: Vec3,
    pub enabled: bool,
}

impl Default for LightParams {
    fn default() -> Self {
        LightParams {
            kind: LightKind::Directional,
            color: Vec4::ONE,
            position: Vec3::ZERO,
            direction: Vec3::Z,
            range: f32::MAX,
            attenuation: Vec3::new(1.0, 0.0, 0.0),
            enabled: false,
        }
    }
}

/// One state change or draw, as the backend's modern contract sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    BeginScene,
    EndScene,
    SetRenderTarget(BackendObject),
    SetDepthTarget(Option<BackendObject>),
    SetRenderState { state: u32, value: u32 },
    /// Viewport rectangle plus the clip-to-window transform derived from it.
    SetViewport { x: u32, y: u32, width: u32, height: u32, transform: Mat4 },
    DeactivateViewport,
    /// `None` disables the light in that slot.
    SetLight { index: u32, light: Option<LightParams> },
    SetBackground { material: Option<BackendObject> },
    Draw { primitive: PrimitiveType, vertex_count: u32 },
}

/**
The object factory and collaborator interface every backend provides.

All reference counting on backend objects goes through [`Backend::retain`]/[`Backend::release`];
creation returns an object holding one reference.
*/
pub trait Backend: Send + Sync + Debug {
    fn create_object(&self, kind: ObjectKind, debug_name: &str) -> Result<BackendObject, Error>;
    fn create_surface(&self, info: &SurfaceCreateInfo) -> Result<BackendObject, Error>;
    /// Creates (or looks up) the swapchain buffer backing slot `index` of `context`'s swapchain.
    fn create_swapchain_buffer(
        &self,
        context: BackendObject,
        index: u32,
        extent: Extent,
        format: BackendFormat,
    ) -> Result<BackendObject, Error>;
    fn retain(&self, object: BackendObject);
    fn release(&self, object: BackendObject);
    /// Whether this backend can serve `contract` at all.
    fn supports(&self, contract: Contract) -> bool;
    fn upload(&self, surface: BackendObject, data: &[u8], layout: UploadLayout) -> Result<(), Error>;
    fn execute(&self, device: BackendObject, command: &DeviceCommand) -> Result<(), Error>;
    /// Copies `source` into swapchain buffer `back_buffer` and presents it.
    fn present(&self, back_buffer: BackendObject, source: BackendObject) -> Result<(), Error>;
}
