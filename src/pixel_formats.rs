// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Pixel format descriptions.
//!
//! Legacy surfaces describe their pixels with a [`LegacyPixelFormat`]: a set of flags, a bit
//! count and channel masks (or a four-character code for compressed formats).  Backends speak
//! a closed set of [`BackendFormat`]s.  This module classifies the former into the latter and
//! knows the byte geometry of both.
//!
//! # Examples
//!
//! ```
//! use surfaces_and_scenes::pixel_formats::{BackendFormat, LegacyPixelFormat};
//!
//! let format = LegacyPixelFormat::rgb565();
//! assert_eq!(format.backend_format(), Ok(BackendFormat::B5G6R5Unorm));
//! assert_eq!(format.bytes_per_row(640), 1280);
//! ```

use bitflags::bitflags;

bitflags! {
    /// Flags of a legacy pixel format.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PixelFormatFlags: u32 {
        const ALPHA_PIXELS = 0x0000_0001;
        const FOURCC = 0x0000_0004;
        const PALETTE_INDEXED8 = 0x0000_0020;
        const RGB = 0x0000_0040;
        const ZBUFFER = 0x0000_0400;
        const LUMINANCE = 0x0002_0000;
    }
}

/// Builds a four-character code the way legacy headers did.
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | ((code[1] as u32) << 8) | ((code[2] as u32) << 16) | ((code[3] as u32) << 24)
}

pub const FOURCC_DXT1: u32 = fourcc(b"DXT1");
pub const FOURCC_DXT3: u32 = fourcc(b"DXT3");
pub const FOURCC_DXT5: u32 = fourcc(b"DXT5");

/// A legacy pixel format description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LegacyPixelFormat {
    pub flags: PixelFormatFlags,
    pub fourcc: u32,
    pub bit_count: u32,
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
    pub alpha_mask: u32,
}

/// The closed set of formats a backend can allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendFormat {
    Bgra8Unorm,
    Rgba8Unorm,
    B5G6R5Unorm,
    B5G5R5A1Unorm,
    R8Unorm,
    Bc1RgbaUnorm,
    Bc2RgbaUnorm,
    Bc3RgbaUnorm,
    Depth16Unorm,
    Depth24Plus,
    Depth32Float,
}

/// Why a legacy format could not be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("unknown four-character code {0:#010x}")]
    UnknownFourCC(u32),
    #[error("no backend format for a {0}-bit layout with these masks")]
    UnsupportedLayout(u32),
}

impl LegacyPixelFormat {
    const fn rgb(bit_count: u32, r: u32, g: u32, b: u32, a: u32) -> Self {
        let flags = if a != 0 {
            PixelFormatFlags::RGB.union(PixelFormatFlags::ALPHA_PIXELS)
        } else {
            PixelFormatFlags::RGB
        };
        LegacyPixelFormat { flags, fourcc: 0, bit_count, red_mask: r, green_mask: g, blue_mask: b, alpha_mask: a }
    }

    pub const fn rgb565() -> Self {
        Self::rgb(16, 0xF800, 0x07E0, 0x001F, 0)
    }
    pub const fn argb1555() -> Self {
        Self::rgb(16, 0x7C00, 0x03E0, 0x001F, 0x8000)
    }
    pub const fn rgb888() -> Self {
        Self::rgb(24, 0x00FF_0000, 0x0000_FF00, 0x0000_00FF, 0)
    }
    pub const fn xrgb8888() -> Self {
        Self::rgb(32, 0x00FF_0000, 0x0000_FF00, 0x0000_00FF, 0)
    }
    pub const fn argb8888() -> Self {
        Self::rgb(32, 0x00FF_0000, 0x0000_FF00, 0x0000_00FF, 0xFF00_0000)
    }
    pub const fn abgr8888() -> Self {
        Self::rgb(32, 0x0000_00FF, 0x0000_FF00, 0x00FF_0000, 0xFF00_0000)
    }
    pub const fn palette8() -> Self {
        LegacyPixelFormat { flags: PixelFormatFlags::PALETTE_INDEXED8.union(PixelFormatFlags::RGB), fourcc: 0, bit_count: 8, red_mask: 0, green_mask: 0, blue_mask: 0, alpha_mask: 0 }
    }
    pub const fn luminance8() -> Self {
        LegacyPixelFormat { flags: PixelFormatFlags::LUMINANCE, fourcc: 0, bit_count: 8, red_mask: 0xFF, green_mask: 0, blue_mask: 0, alpha_mask: 0 }
    }
    pub const fn compressed(code: u32) -> Self {
        LegacyPixelFormat { flags: PixelFormatFlags::FOURCC, fourcc: code, bit_count: 0, red_mask: 0, green_mask: 0, blue_mask: 0, alpha_mask: 0 }
    }
    /// A depth format with `bits` of depth.
    pub const fn depth(bits: u32) -> Self {
        let mask = if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 };
        LegacyPixelFormat { flags: PixelFormatFlags::ZBUFFER, fourcc: 0, bit_count: bits, red_mask: mask, green_mask: 0, blue_mask: 0, alpha_mask: 0 }
    }

    /// The format a primary surface takes for a display of `bits_per_pixel`.
    pub fn for_display_depth(bits_per_pixel: u32) -> Self {
        match bits_per_pixel {
            8 => Self::palette8(),
            16 => Self::rgb565(),
            24 => Self::rgb888(),
            _ => Self::xrgb8888(),
        }
    }

    pub fn is_depth(&self) -> bool {
        self.flags.contains(PixelFormatFlags::ZBUFFER)
    }

    pub fn is_block_compressed(&self) -> bool {
        self.flags.contains(PixelFormatFlags::FOURCC)
    }

    /// Classifies this format into the backend's closed set.
    pub fn backend_format(&self) -> Result<BackendFormat, FormatError> {
        if self.flags.contains(PixelFormatFlags::FOURCC) {
            return match self.fourcc {
                FOURCC_DXT1 => Ok(BackendFormat::Bc1RgbaUnorm),
                FOURCC_DXT3 => Ok(BackendFormat::Bc2RgbaUnorm),
                FOURCC_DXT5 => Ok(BackendFormat::Bc3RgbaUnorm),
                other => Err(FormatError::UnknownFourCC(other)),
            };
        }
        if self.is_depth() {
            return match self.bit_count {
                16 => Ok(BackendFormat::Depth16Unorm),
                24 => Ok(BackendFormat::Depth24Plus),
                32 if self.red_mask == 0x00FF_FFFF => Ok(BackendFormat::Depth24Plus),
                32 => Ok(BackendFormat::Depth32Float),
                other => Err(FormatError::UnsupportedLayout(other)),
            };
        }
        if self.flags.intersects(PixelFormatFlags::PALETTE_INDEXED8 | PixelFormatFlags::LUMINANCE) {
            return match self.bit_count {
                8 => Ok(BackendFormat::R8Unorm),
                other => Err(FormatError::UnsupportedLayout(other)),
            };
        }
        match (self.bit_count, self.red_mask, self.green_mask, self.blue_mask) {
            (16, 0xF800, 0x07E0, 0x001F) => Ok(BackendFormat::B5G6R5Unorm),
            (16, 0x7C00, 0x03E0, 0x001F) => Ok(BackendFormat::B5G5R5A1Unorm),
            //24-bit surfaces widen to 32 on upload
            (24, 0x00FF_0000, 0x0000_FF00, 0x0000_00FF) => Ok(BackendFormat::Bgra8Unorm),
            (32, 0x00FF_0000, 0x0000_FF00, 0x0000_00FF) => Ok(BackendFormat::Bgra8Unorm),
            (32, 0x0000_00FF, 0x0000_FF00, 0x00FF_0000) => Ok(BackendFormat::Rgba8Unorm),
            (bits, ..) => Err(FormatError::UnsupportedLayout(bits)),
        }
    }

    /// Bytes in one row of `width` pixels, or one row of 4x4 blocks for compressed formats.
    pub fn bytes_per_row(&self, width: u32) -> u32 {
        if self.is_block_compressed() {
            let block_bytes = if self.fourcc == FOURCC_DXT1 { 8 } else { 16 };
            width.div_ceil(4).max(1) * block_bytes
        } else {
            width * self.bit_count.div_ceil(8)
        }
    }

    /// Rows of storage for `height` pixels.
    pub fn rows(&self, height: u32) -> u32 {
        if self.is_block_compressed() {
            height.div_ceil(4).max(1)
        } else {
            height
        }
    }

    /// Size in bytes of one pixel, for uncompressed formats.
    pub fn bytes_per_pixel(&self) -> Option<u32> {
        (!self.is_block_compressed()).then(|| self.bit_count.div_ceil(8))
    }
}

impl BackendFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, BackendFormat::Depth16Unorm | BackendFormat::Depth24Plus | BackendFormat::Depth32Float)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_layouts() {
        assert_eq!(LegacyPixelFormat::xrgb8888().backend_format(), Ok(BackendFormat::Bgra8Unorm));
        assert_eq!(LegacyPixelFormat::abgr8888().backend_format(), Ok(BackendFormat::Rgba8Unorm));
        assert_eq!(LegacyPixelFormat::argb1555().backend_format(), Ok(BackendFormat::B5G5R5A1Unorm));
        assert_eq!(LegacyPixelFormat::palette8().backend_format(), Ok(BackendFormat::R8Unorm));
        assert_eq!(LegacyPixelFormat::depth(16).backend_format(), Ok(BackendFormat::Depth16Unorm));
        assert_eq!(LegacyPixelFormat::depth(32).backend_format(), Ok(BackendFormat::Depth32Float));
        assert_eq!(
            LegacyPixelFormat::compressed(FOURCC_DXT5).backend_format(),
            Ok(BackendFormat::Bc3RgbaUnorm)
        );
    }

    #[test]
    fn rejects_unknown_layouts() {
        let odd = LegacyPixelFormat::rgb(16, 0x0F00, 0x00F0, 0x000F, 0xF000);
        assert_eq!(odd.backend_format(), Err(FormatError::UnsupportedLayout(16)));
        let code = fourcc(b"YUY2");
        assert_eq!(
            LegacyPixelFormat::compressed(code).backend_format(),
            Err(FormatError::UnknownFourCC(code))
        );
    }

    #[test]
    fn block_geometry() {
        let dxt1 = LegacyPixelFormat::compressed(FOURCC_DXT1);
        assert_eq!(dxt1.bytes_per_row(256), 64 * 8);
        assert_eq!(dxt1.rows(256), 64);
        //partial blocks round up
        assert_eq!(dxt1.bytes_per_row(2), 8);
        assert_eq!(dxt1.rows(1), 1);
        assert_eq!(dxt1.bytes_per_pixel(), None);
    }

    #[test]
    fn display_depths() {
        assert_eq!(LegacyPixelFormat::for_display_depth(16), LegacyPixelFormat::rgb565());
        assert_eq!(LegacyPixelFormat::for_display_depth(32).bytes_per_pixel(), Some(4));
        assert_eq!(LegacyPixelFormat::for_display_depth(24).bytes_per_row(10), 30);
    }
}
