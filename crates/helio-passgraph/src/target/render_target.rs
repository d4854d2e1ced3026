use super::RenderTargetDesc;
use crate::device::{Attachment, FramebufferHandle, FramebufferStatus, GpuDevice, TextureHandle, Viewport};
use crate::{Error, Result};

/// One GPU image, optionally with its own framebuffer
///
/// Standalone targets (`initialize`) own a framebuffer with the image attached,
/// plus a companion depth image for `ColorDepth*` types. Attachment targets
/// (`initialize_attachment`) only own the image; a [`super::MultiRenderTarget`]
/// attaches it to a shared framebuffer.
#[derive(Debug, Default)]
pub struct RenderTarget {
    desc: Option<RenderTargetDesc>,
    texture: Option<TextureHandle>,
    depth_texture: Option<TextureHandle>,
    framebuffer: Option<FramebufferHandle>,
    standalone: bool,
}

impl RenderTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the image and a framebuffer binding it.
    ///
    /// Fails if already initialized or if the framebuffer is incomplete; on
    /// failure nothing stays allocated.
    pub fn initialize(&mut self, device: &mut dyn GpuDevice, desc: &RenderTargetDesc) -> Result<()> {
        self.ensure_uninitialized(desc)?;

        let texture = device.create_texture(desc)?;
        let depth_desc = desc.companion_depth();
        let depth_texture = match &depth_desc {
            Some(depth_desc) => match device.create_texture(depth_desc) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    device.destroy_texture(texture);
                    return Err(e);
                }
            },
            None => None,
        };

        let framebuffer = match device.create_framebuffer(&desc.name) {
            Ok(fb) => fb,
            Err(e) => {
                device.destroy_texture(texture);
                if let Some(depth) = depth_texture {
                    device.destroy_texture(depth);
                }
                return Err(e);
            }
        };
        device.attach_texture(framebuffer, desc.attachment(0), Some(texture));
        if let (Some(depth), Some(depth_desc)) = (depth_texture, &depth_desc) {
            device.attach_texture(framebuffer, depth_desc.attachment(0), Some(depth));
        }
        if desc.target_type.has_color() {
            device.set_draw_buffers(framebuffer, &[0]);
        } else {
            device.set_draw_buffers(framebuffer, &[]);
        }

        let status = device.framebuffer_status(framebuffer);
        if status != FramebufferStatus::Complete {
            log::error!("Render target '{}' framebuffer incomplete: {:?}", desc.name, status);
            device.destroy_framebuffer(framebuffer);
            device.destroy_texture(texture);
            if let Some(depth) = depth_texture {
                device.destroy_texture(depth);
            }
            return Err(Error::IncompleteFramebuffer {
                name: desc.name.clone(),
                status,
            });
        }

        log::debug!(
            "Render target '{}' initialized ({}x{} {:?})",
            desc.name,
            desc.width,
            desc.height,
            desc.format
        );
        self.desc = Some(desc.clone());
        self.texture = Some(texture);
        self.depth_texture = depth_texture;
        self.framebuffer = Some(framebuffer);
        self.standalone = true;
        Ok(())
    }

    /// Allocate only the image, for use as one attachment of a shared framebuffer
    pub fn initialize_attachment(&mut self, device: &mut dyn GpuDevice, desc: &RenderTargetDesc) -> Result<()> {
        self.ensure_uninitialized(desc)?;
        let texture = device.create_texture(desc)?;
        self.desc = Some(desc.clone());
        self.texture = Some(texture);
        self.standalone = false;
        Ok(())
    }

    fn ensure_uninitialized(&self, desc: &RenderTargetDesc) -> Result<()> {
        if self.is_initialized() {
            log::warn!("Render target '{}' initialized twice", desc.name);
            return Err(Error::AlreadyInitialized(desc.name.clone()));
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.texture.is_some()
    }

    /// Attachment targets are complete once allocated; standalone targets ask the device
    pub fn is_complete(&self, device: &dyn GpuDevice) -> bool {
        match (self.texture, self.framebuffer) {
            (Some(_), Some(fb)) => device.framebuffer_status(fb) == FramebufferStatus::Complete,
            (Some(_), None) => !self.standalone,
            (None, _) => false,
        }
    }

    /// Bind the own framebuffer and set a full-size viewport. No-op before initialization.
    pub fn bind(&self, device: &mut dyn GpuDevice) {
        let (Some(fb), Some(desc)) = (self.framebuffer, &self.desc) else {
            return;
        };
        device.bind_framebuffer(Some(fb));
        device.set_viewport(Viewport::new(desc.width, desc.height));
    }

    pub fn unbind(&self, device: &mut dyn GpuDevice) {
        if self.framebuffer.is_some() {
            device.bind_framebuffer(None);
        }
    }

    /// Rebuild for a new description.
    ///
    /// Returns `Ok(false)` without touching the GPU when size, format and type
    /// are unchanged, so calling this every frame is cheap.
    pub fn update(&mut self, device: &mut dyn GpuDevice, desc: &RenderTargetDesc) -> Result<bool> {
        if let Some(current) = &self.desc {
            if current.same_storage(desc) {
                return Ok(false);
            }
        }
        let standalone = self.standalone || !self.is_initialized();
        self.shutdown(device);
        if standalone {
            self.initialize(device, desc)?;
        } else {
            self.initialize_attachment(device, desc)?;
        }
        Ok(true)
    }

    pub fn resize(&mut self, device: &mut dyn GpuDevice, width: u32, height: u32) -> Result<bool> {
        match self.desc.clone() {
            Some(desc) => self.update(device, &desc.with_extent(width, height)),
            None => Ok(false),
        }
    }

    /// Release GPU objects. Safe to call on an uninitialized target.
    pub fn shutdown(&mut self, device: &mut dyn GpuDevice) {
        if let Some(fb) = self.framebuffer.take() {
            device.destroy_framebuffer(fb);
        }
        if let Some(texture) = self.texture.take() {
            device.destroy_texture(texture);
        }
        if let Some(depth) = self.depth_texture.take() {
            device.destroy_texture(depth);
        }
        self.desc = None;
    }

    pub fn desc(&self) -> Option<&RenderTargetDesc> {
        self.desc.as_ref()
    }

    pub fn name(&self) -> &str {
        self.desc.as_ref().map(|d| d.name.as_str()).unwrap_or("")
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub fn depth_texture(&self) -> Option<TextureHandle> {
        self.depth_texture
    }

    pub fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer
    }

    /// Attachment point of the primary image within its framebuffer
    pub fn attachment(&self, color_index: u32) -> Option<Attachment> {
        self.desc.as_ref().map(|d| d.attachment(color_index))
    }
}
