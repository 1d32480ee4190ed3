//! Texture types and descriptors.

use bitflags::bitflags;

/// Pixel format enumeration.
///
/// `Unknown` is a valid value in *definitions*: it means "inherit the format
/// of the reference render target" and is resolved when the texture is
/// created. A created texture never has `Unknown` format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Inherit from the reference target (definitions only).
    #[default]
    Unknown,

    // 8-bit formats
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 8-bit RG channels, unsigned normalized.
    Rg8Unorm,

    // 32-bit colour formats
    /// 8-bit RGBA channels, unsigned normalized.
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 8-bit BGRA channels, sRGB.
    Bgra8UnormSrgb,
    /// 10-bit RGB with 2-bit alpha.
    Rgb10A2Unorm,
    /// 16-bit red channel, float.
    R16Float,
    /// 32-bit red channel, float.
    R32Float,
    /// 32-bit red channel, unsigned integer.
    R32Uint,

    // Wide colour formats
    /// 16-bit RG channels, float.
    Rg16Float,
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 32-bit RGBA channels, float.
    Rgba32Float,

    // Depth/stencil formats
    /// 16-bit depth.
    Depth16Unorm,
    /// 32-bit depth, float.
    Depth32Float,
    /// 24-bit depth with 8-bit stencil.
    Depth24UnormStencil8,
    /// 32-bit depth float with 8-bit stencil.
    Depth32FloatStencil8,
}

impl PixelFormat {
    /// Returns true if this is a depth or depth/stencil format.
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Self::Depth16Unorm
                | Self::Depth32Float
                | Self::Depth24UnormStencil8
                | Self::Depth32FloatStencil8
        )
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::Depth24UnormStencil8 | Self::Depth32FloatStencil8)
    }

    /// Maximum mip count for a surface of the given dimensions (down to 1x1).
    pub fn max_mip_count(width: u32, height: u32, depth: u32) -> u32 {
        let largest = width.max(height).max(depth).max(1);
        32 - largest.leading_zeros()
    }
}

/// Texture dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureKind {
    /// Regular 2D texture.
    #[default]
    D2,
    /// Array of 2D slices.
    D2Array,
    /// Cube map (always 6 slices).
    Cube,
    /// Volume texture.
    D3,
}

bitflags! {
    /// Usage flags for compositor-managed textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be bound as a render target.
        const RENDER_TARGET = 1 << 0;
        /// Texture can be written as an unordered-access view.
        const UAV = 1 << 1;
        /// Texture cannot be sampled in shaders (only valid with `UAV`).
        const NOT_TEXTURE = 1 << 2;
        /// Hardware mipmap generation is allowed on this texture.
        const ALLOW_AUTOMIPMAPS = 1 << 3;
        /// MSAA contents are resolved explicitly (no implicit resolve pair).
        const MSAA_EXPLICIT_RESOLVE = 1 << 4;
        /// Contents need not survive between uses; the first write each
        /// frame may assume undefined previous contents.
        const DISCARDABLE_CONTENT = 1 << 5;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::RENDER_TARGET | Self::DISCARDABLE_CONTENT
    }
}

/// Fully resolved description of a texture, as handed to the backend.
///
/// Unlike a `TextureDefinition`, all dimensions and the format are concrete:
/// fractional sizing and format inheritance have already been applied
/// against the reference target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: String,
    /// Texture dimensionality.
    pub kind: TextureKind,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth for 3D textures, slice count for arrays, 6 for cube maps.
    pub depth_or_slices: u32,
    /// Mip level count (>= 1).
    pub mip_level_count: u32,
    /// MSAA sample count (1 = no multisampling).
    pub sample_count: u32,
    /// Pixel format; never `Unknown` here.
    pub format: PixelFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Create a 2D descriptor with the given size, format and usage.
    pub fn new_2d(width: u32, height: u32, format: PixelFormat, usage: TextureUsage) -> Self {
        Self {
            label: String::new(),
            kind: TextureKind::D2,
            width,
            height,
            depth_or_slices: 1,
            mip_level_count: 1,
            sample_count: 1,
            format,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_depth() {
        assert!(PixelFormat::Depth32Float.is_depth());
        assert!(PixelFormat::Depth24UnormStencil8.is_depth());
        assert!(!PixelFormat::Rgba8Unorm.is_depth());
    }

    #[test]
    fn test_has_stencil() {
        assert!(PixelFormat::Depth24UnormStencil8.has_stencil());
        assert!(!PixelFormat::Depth32Float.has_stencil());
    }

    #[test]
    fn test_max_mip_count() {
        assert_eq!(PixelFormat::max_mip_count(1, 1, 1), 1);
        assert_eq!(PixelFormat::max_mip_count(1024, 1024, 1), 11);
        assert_eq!(PixelFormat::max_mip_count(1920, 1080, 1), 11);
    }

    #[test]
    fn test_default_usage() {
        let usage = TextureUsage::default();
        assert!(usage.contains(TextureUsage::RENDER_TARGET));
        assert!(usage.contains(TextureUsage::DISCARDABLE_CONTENT));
        assert!(!usage.contains(TextureUsage::UAV));
    }
}
