//! Image types, layouts, and barriers.

use bitflags::bitflags;

/// Pixel format of an image.
///
/// Only formats the streaming paths handle are listed; depth/stencil
/// staging is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum PixelFormat {
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 8-bit RG channels, unsigned normalized.
    Rg8Unorm,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 32-bit RGBA channels, float.
    Rgba32Float,
}

impl PixelFormat {
    /// Size in bytes of one pixel.
    pub fn size(&self) -> usize {
        match self {
            Self::R8Unorm => 1,
            Self::Rg8Unorm => 2,
            Self::Rgba8Unorm | Self::Rgba8UnormSrgb | Self::Bgra8Unorm => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }
}

/// Extent of a texture in three dimensions.
///
/// 2D textures use `depth == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth in pixels, or 0 for 2D textures.
    pub depth: u32,
}

impl Extent3d {
    /// Create a 2D extent.
    pub fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 0,
        }
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be copied from.
        const COPY_SRC = 1 << 0;
        /// Texture can be copied to.
        const COPY_DST = 1 << 1;
        /// Texture can be sampled in shaders.
        const SHADER_SAMPLE = 1 << 2;
        /// Texture can be used as a render target.
        const RENDER_TARGET = 1 << 3;
    }
}

/// Layout of an image layer as the driver sees it.
///
/// A layer's tracked layout may additionally be "pending", which is a
/// tracker-level sentinel, not a driver layout; see
/// [`LayoutTracker`](crate::texture::LayoutTracker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    /// Contents undefined; any data in the layer must be assumed lost.
    #[default]
    Undefined,
    /// Optimal as a copy source.
    CopySrc,
    /// Optimal as a copy destination.
    CopyDst,
    /// Optimal for shader sampling.
    ShaderRead,
    /// Optimal as a color render target.
    ColorTarget,
}

impl ImageLayout {
    /// Encode the layout as an integer for atomic storage.
    pub(crate) fn to_raw(self) -> i64 {
        match self {
            Self::Undefined => 0,
            Self::CopySrc => 1,
            Self::CopyDst => 2,
            Self::ShaderRead => 3,
            Self::ColorTarget => 4,
        }
    }

    /// Decode a layout previously encoded with [`to_raw`].
    ///
    /// [`to_raw`]: Self::to_raw
    pub(crate) fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(Self::Undefined),
            1 => Some(Self::CopySrc),
            2 => Some(Self::CopyDst),
            3 => Some(Self::ShaderRead),
            4 => Some(Self::ColorTarget),
            _ => None,
        }
    }
}

bitflags! {
    /// Pipeline stages for barrier scoping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        /// No stage.
        const NONE = 0;
        /// Copy/transfer operations.
        const COPY = 1 << 0;
        /// Vertex shading.
        const VERTEX = 1 << 1;
        /// Fragment shading.
        const FRAGMENT = 1 << 2;
        /// Color attachment output.
        const COLOR_OUTPUT = 1 << 3;
    }
}

bitflags! {
    /// Memory access kinds for barrier scoping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        /// No access.
        const NONE = 0;
        /// Read by a copy operation.
        const COPY_READ = 1 << 0;
        /// Write by a copy operation.
        const COPY_WRITE = 1 << 1;
        /// Read by a shader.
        const SHADER_READ = 1 << 2;
        /// Color attachment write.
        const COLOR_WRITE = 1 << 3;
    }
}

/// Execution/memory dependency scoping for a layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Barrier {
    /// Stages that must complete before the transition.
    pub sync_before: PipelineStages,
    /// Stages that wait on the transition.
    pub sync_after: PipelineStages,
    /// Accesses made available before the transition.
    pub access_before: AccessFlags,
    /// Accesses made visible after the transition.
    pub access_after: AccessFlags,
}

impl Barrier {
    /// Barrier scoping a copy write with no prior dependency.
    pub fn copy_write() -> Self {
        Self {
            sync_before: PipelineStages::NONE,
            sync_after: PipelineStages::COPY,
            access_before: AccessFlags::NONE,
            access_after: AccessFlags::COPY_WRITE,
        }
    }

    /// Barrier scoping a copy read with no prior dependency.
    pub fn copy_read() -> Self {
        Self {
            sync_before: PipelineStages::NONE,
            sync_after: PipelineStages::COPY,
            access_before: AccessFlags::NONE,
            access_after: AccessFlags::COPY_READ,
        }
    }
}

/// Descriptor for creating an image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageDescriptor {
    /// Debug label for the image.
    pub label: Option<String>,
    /// Pixel format.
    pub format: PixelFormat,
    /// Extent of the first mip level.
    pub extent: Extent3d,
    /// Number of array layers.
    pub layers: u32,
    /// Number of mip levels.
    pub levels: u32,
    /// Sample count.
    pub samples: u32,
    /// Usage flags.
    pub usage: TextureUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_sizes() {
        assert_eq!(PixelFormat::R8Unorm.size(), 1);
        assert_eq!(PixelFormat::Rgba8Unorm.size(), 4);
        assert_eq!(PixelFormat::Rgba32Float.size(), 16);
    }

    #[test]
    fn test_layout_raw_roundtrip() {
        for layout in [
            ImageLayout::Undefined,
            ImageLayout::CopySrc,
            ImageLayout::CopyDst,
            ImageLayout::ShaderRead,
            ImageLayout::ColorTarget,
        ] {
            assert_eq!(ImageLayout::from_raw(layout.to_raw()), Some(layout));
        }
        assert_eq!(ImageLayout::from_raw(-1), None);
    }
}
