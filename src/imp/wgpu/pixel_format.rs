// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::pixel_formats::BackendFormat;

impl BackendFormat {
    /// The wgpu texture format for this format, if wgpu has one.
    ///
    /// wgpu has no packed 16-bit color formats.
    pub(crate) const fn wgpu_format(self) -> Option<wgpu::TextureFormat> {
        match self {
            BackendFormat::Bgra8Unorm => Some(wgpu::TextureFormat::Bgra8Unorm),
            BackendFormat::Rgba8Unorm => Some(wgpu::TextureFormat::Rgba8Unorm),
            BackendFormat::R8Unorm => Some(wgpu::TextureFormat::R8Unorm),
            BackendFormat::Bc1RgbaUnorm => Some(wgpu::TextureFormat::Bc1RgbaUnorm),
            BackendFormat::Bc2RgbaUnorm => Some(wgpu::TextureFormat::Bc2RgbaUnorm),
            BackendFormat::Bc3RgbaUnorm => Some(wgpu::TextureFormat::Bc3RgbaUnorm),
            BackendFormat::Depth16Unorm => Some(wgpu::TextureFormat::Depth16Unorm),
            BackendFormat::Depth24Plus => Some(wgpu::TextureFormat::Depth24Plus),
            BackendFormat::Depth32Float => Some(wgpu::TextureFormat::Depth32Float),
            BackendFormat::B5G6R5Unorm | BackendFormat::B5G5R5A1Unorm => None,
        }
    }

    pub(crate) const fn needs_bc_feature(self) -> bool {
        matches!(self, BackendFormat::Bc1RgbaUnorm | BackendFormat::Bc2RgbaUnorm | BackendFormat::Bc3RgbaUnorm)
    }
}
