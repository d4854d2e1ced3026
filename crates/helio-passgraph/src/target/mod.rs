//! Render target descriptions and GPU-side render targets
//!
//! A [`RenderTarget`] owns one GPU image (plus its own framebuffer when used
//! standalone). A [`MultiRenderTarget`] groups several named targets behind a
//! single framebuffer, e.g. a deferred G-buffer.

mod multi;
mod render_target;

pub use multi::MultiRenderTarget;
pub use render_target::RenderTarget;

use crate::device::Attachment;

/// What a render target is used for
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RenderTargetType {
    Color,
    Depth,
    Stencil,
    /// Color image with a companion depth image (standalone targets only)
    ColorDepth,
    /// Color image with a companion depth-stencil image (standalone targets only)
    ColorDepthStencil,
}

impl RenderTargetType {
    pub fn has_color(&self) -> bool {
        matches!(
            self,
            RenderTargetType::Color | RenderTargetType::ColorDepth | RenderTargetType::ColorDepthStencil
        )
    }
}

/// Pixel format of a render target image
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    R8,
    Rg8,
    Rgba8,
    Srgba8,
    R16F,
    Rg16F,
    Rgb16F,
    Rgba16F,
    R32F,
    Rg32F,
    Rgb32F,
    Rgba32F,
    Depth16,
    Depth24,
    Depth32F,
    Depth24Stencil8,
}

impl PixelFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            PixelFormat::Depth16 | PixelFormat::Depth24 | PixelFormat::Depth32F | PixelFormat::Depth24Stencil8
        )
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, PixelFormat::Depth24Stencil8)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::R8 => 1,
            PixelFormat::Rg8 | PixelFormat::R16F | PixelFormat::Depth16 => 2,
            PixelFormat::Rgba8
            | PixelFormat::Srgba8
            | PixelFormat::Rg16F
            | PixelFormat::R32F
            | PixelFormat::Depth24
            | PixelFormat::Depth32F
            | PixelFormat::Depth24Stencil8 => 4,
            PixelFormat::Rgb16F => 6,
            PixelFormat::Rgba16F | PixelFormat::Rg32F => 8,
            PixelFormat::Rgb32F => 12,
            PixelFormat::Rgba32F => 16,
        }
    }

    /// Closest wgpu format. Three-channel formats widen to four channels.
    pub fn to_wgpu(&self) -> wgpu::TextureFormat {
        match self {
            PixelFormat::R8 => wgpu::TextureFormat::R8Unorm,
            PixelFormat::Rg8 => wgpu::TextureFormat::Rg8Unorm,
            PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            PixelFormat::Srgba8 => wgpu::TextureFormat::Rgba8UnormSrgb,
            PixelFormat::R16F => wgpu::TextureFormat::R16Float,
            PixelFormat::Rg16F => wgpu::TextureFormat::Rg16Float,
            PixelFormat::Rgb16F | PixelFormat::Rgba16F => wgpu::TextureFormat::Rgba16Float,
            PixelFormat::R32F => wgpu::TextureFormat::R32Float,
            PixelFormat::Rg32F => wgpu::TextureFormat::Rg32Float,
            PixelFormat::Rgb32F | PixelFormat::Rgba32F => wgpu::TextureFormat::Rgba32Float,
            PixelFormat::Depth16 => wgpu::TextureFormat::Depth16Unorm,
            PixelFormat::Depth24 => wgpu::TextureFormat::Depth24Plus,
            PixelFormat::Depth32F => wgpu::TextureFormat::Depth32Float,
            PixelFormat::Depth24Stencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WrapMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Static description of one GPU image
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDesc {
    /// Unique within the owning `MultiRenderTarget`
    pub name: String,
    pub target_type: RenderTargetType,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub mipmaps: bool,
    pub wrap: WrapMode,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
}

impl RenderTargetDesc {
    pub fn new(name: impl Into<String>, target_type: RenderTargetType, format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            target_type,
            format,
            width,
            height,
            mipmaps: false,
            wrap: WrapMode::ClampToEdge,
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
        }
    }

    pub fn color(name: impl Into<String>, format: PixelFormat, width: u32, height: u32) -> Self {
        Self::new(name, RenderTargetType::Color, format, width, height)
    }

    pub fn depth(name: impl Into<String>, format: PixelFormat, width: u32, height: u32) -> Self {
        Self::new(name, RenderTargetType::Depth, format, width, height)
            .with_filter(FilterMode::Nearest)
    }

    /// Target type implied by a format: depth formats become depth targets
    pub fn for_format(name: impl Into<String>, format: PixelFormat, width: u32, height: u32) -> Self {
        if format.is_depth() {
            Self::depth(name, format, width, height)
        } else {
            Self::color(name, format, width, height)
        }
    }

    pub fn with_mipmaps(mut self, mipmaps: bool) -> Self {
        self.mipmaps = mipmaps;
        self
    }

    pub fn with_wrap(mut self, wrap: WrapMode) -> Self {
        self.wrap = wrap;
        self
    }

    pub fn with_filter(mut self, filter: FilterMode) -> Self {
        self.min_filter = filter;
        self.mag_filter = filter;
        self
    }

    pub fn with_extent(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// True when both descriptions need identical GPU storage.
    /// Sampler state and name are not part of the comparison.
    pub fn same_storage(&self, other: &RenderTargetDesc) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.format == other.format
            && self.target_type == other.target_type
    }

    pub fn mip_level_count(&self) -> u32 {
        if self.mipmaps {
            32 - self.width.max(self.height).max(1).leading_zeros()
        } else {
            1
        }
    }

    /// Framebuffer attachment point for the primary image of this target
    pub fn attachment(&self, color_index: u32) -> Attachment {
        match self.target_type {
            RenderTargetType::Stencil => Attachment::Stencil,
            RenderTargetType::Depth if self.format.has_stencil() => Attachment::DepthStencil,
            RenderTargetType::Depth => Attachment::Depth,
            _ => Attachment::Color(color_index),
        }
    }

    /// Description of the companion depth image of a `ColorDepth*` target
    pub(crate) fn companion_depth(&self) -> Option<RenderTargetDesc> {
        let format = match self.target_type {
            RenderTargetType::ColorDepth => PixelFormat::Depth24,
            RenderTargetType::ColorDepthStencil => PixelFormat::Depth24Stencil8,
            _ => return None,
        };
        Some(RenderTargetDesc::depth(format!("{}_depth", self.name), format, self.width, self.height))
    }
}
