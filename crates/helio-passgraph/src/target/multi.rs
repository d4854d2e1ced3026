use super::{RenderTarget, RenderTargetDesc, RenderTargetType};
use crate::device::{Attachment, FramebufferHandle, FramebufferStatus, GpuDevice, TextureHandle, Viewport};
use crate::{Error, Result};
use std::collections::HashMap;

/// Named render targets sharing one framebuffer
///
/// Color targets are attached in insertion order to consecutive color
/// attachment points; the draw-buffer list follows the same order. Any change
/// to the target set marks the framebuffer dirty and the next [`bind`] rebuilds
/// its attachments.
///
/// [`bind`]: MultiRenderTarget::bind
#[derive(Debug)]
pub struct MultiRenderTarget {
    label: String,
    framebuffer: Option<FramebufferHandle>,
    targets: Vec<RenderTarget>,
    /// Externally owned textures replacing a target's own image (graph mode)
    external: HashMap<String, TextureHandle>,
    attached: Vec<Attachment>,
    width: u32,
    height: u32,
    dirty: bool,
}

impl MultiRenderTarget {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            framebuffer: None,
            targets: Vec::new(),
            external: HashMap::new(),
            attached: Vec::new(),
            width,
            height,
            dirty: true,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn targets(&self) -> &[RenderTarget] {
        &self.targets
    }

    pub fn target(&self, name: &str) -> Option<&RenderTarget> {
        self.targets.iter().find(|t| t.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.target(name).is_some()
    }

    /// Texture currently backing `name`: the external override if set, else the own image
    pub fn texture(&self, name: &str) -> Option<TextureHandle> {
        self.external
            .get(name)
            .copied()
            .or_else(|| self.target(name).and_then(|t| t.texture()))
    }

    /// Allocate a new named attachment image.
    ///
    /// `ColorDepth*` descriptions are split into a color target plus a
    /// `<name>_depth` target. The extent is forced to this framebuffer's size.
    pub fn add_target(&mut self, device: &mut dyn GpuDevice, desc: RenderTargetDesc) -> Result<()> {
        let desc = desc.with_extent(self.width, self.height);
        let companion = desc.companion_depth();
        let primary = match desc.target_type {
            RenderTargetType::ColorDepth | RenderTargetType::ColorDepthStencil => RenderTargetDesc {
                target_type: RenderTargetType::Color,
                ..desc
            },
            _ => desc,
        };

        for name in std::iter::once(&primary.name).chain(companion.as_ref().map(|c| &c.name)) {
            if self.contains(name) {
                log::warn!("Render target '{}' already exists in '{}'", name, self.label);
                return Err(Error::DuplicateTarget(name.clone()));
            }
        }

        if self.framebuffer.is_none() {
            self.framebuffer = Some(device.create_framebuffer(&self.label)?);
        }

        // both images exist before either joins the list
        let mut target = RenderTarget::new();
        target.initialize_attachment(device, &primary)?;
        let depth = match companion {
            Some(companion) => {
                let mut depth = RenderTarget::new();
                if let Err(e) = depth.initialize_attachment(device, &companion) {
                    target.shutdown(device);
                    return Err(e);
                }
                Some(depth)
            }
            None => None,
        };
        self.targets.push(target);
        self.targets.extend(depth);
        self.dirty = true;
        Ok(())
    }

    pub fn remove_target(&mut self, device: &mut dyn GpuDevice, name: &str) -> bool {
        let Some(index) = self.targets.iter().position(|t| t.name() == name) else {
            return false;
        };
        let mut target = self.targets.remove(index);
        target.shutdown(device);
        self.external.remove(name);
        self.dirty = true;
        true
    }

    /// Substitute an externally owned texture for a target's image, `None` restores the own image
    pub fn set_external(&mut self, name: &str, texture: Option<TextureHandle>) {
        let changed = match texture {
            Some(texture) => self.external.insert(name.to_string(), texture) != Some(texture),
            None => self.external.remove(name).is_some(),
        };
        if changed {
            self.dirty = true;
        }
    }

    fn rebuild(&mut self, device: &mut dyn GpuDevice, framebuffer: FramebufferHandle) {
        for attachment in self.attached.drain(..) {
            device.attach_texture(framebuffer, attachment, None);
        }

        let mut draw_buffers = Vec::new();
        for target in &self.targets {
            let Some(desc) = target.desc() else {
                continue;
            };
            let attachment = desc.attachment(draw_buffers.len() as u32);
            if let Attachment::Color(index) = attachment {
                draw_buffers.push(index);
            }
            let texture = self.external.get(&desc.name).copied().or(target.texture());
            device.attach_texture(framebuffer, attachment, texture);
            self.attached.push(attachment);
        }
        device.set_draw_buffers(framebuffer, &draw_buffers);
        self.dirty = false;
        log::trace!(
            "Rebuilt framebuffer '{}' with {} attachments ({} color)",
            self.label,
            self.attached.len(),
            draw_buffers.len()
        );
    }

    pub fn is_complete(&self, device: &dyn GpuDevice) -> bool {
        self.framebuffer
            .map(|fb| device.framebuffer_status(fb) == FramebufferStatus::Complete)
            .unwrap_or(false)
    }

    /// Bind for drawing, rebuilding attachments first if the target set changed.
    /// No-op when no target was ever added.
    pub fn bind(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        let Some(framebuffer) = self.framebuffer else {
            return Ok(());
        };
        if self.dirty {
            self.rebuild(device, framebuffer);
            let status = device.framebuffer_status(framebuffer);
            if status != FramebufferStatus::Complete {
                log::error!("Framebuffer '{}' incomplete after rebuild: {:?}", self.label, status);
                return Err(Error::IncompleteFramebuffer {
                    name: self.label.clone(),
                    status,
                });
            }
        }
        device.bind_framebuffer(Some(framebuffer));
        device.set_viewport(Viewport::new(self.width, self.height));
        Ok(())
    }

    pub fn unbind(&self, device: &mut dyn GpuDevice) {
        if self.framebuffer.is_some() {
            device.bind_framebuffer(None);
        }
    }

    /// Resize every target, then replace the framebuffer object.
    /// Attachments are rebound on the next `bind`.
    pub fn resize(&mut self, device: &mut dyn GpuDevice, width: u32, height: u32) -> Result<()> {
        self.width = width;
        self.height = height;
        for target in &mut self.targets {
            target.resize(device, width, height)?;
        }
        if let Some(old) = self.framebuffer.take() {
            device.destroy_framebuffer(old);
            self.framebuffer = Some(device.create_framebuffer(&self.label)?);
        }
        self.attached.clear();
        self.dirty = true;
        Ok(())
    }

    pub fn shutdown(&mut self, device: &mut dyn GpuDevice) {
        for target in &mut self.targets {
            target.shutdown(device);
        }
        self.targets.clear();
        self.external.clear();
        self.attached.clear();
        if let Some(fb) = self.framebuffer.take() {
            device.destroy_framebuffer(fb);
        }
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;
    use crate::target::PixelFormat;

    fn gbuffer(device: &mut HeadlessDevice) -> MultiRenderTarget {
        let mut mrt = MultiRenderTarget::new("gbuffer", 32, 32);
        mrt.add_target(device, RenderTargetDesc::color("albedo", PixelFormat::Rgba8, 0, 0)).unwrap();
        mrt.add_target(device, RenderTargetDesc::color("normal", PixelFormat::Rgba16F, 0, 0)).unwrap();
        mrt.add_target(device, RenderTargetDesc::depth("depth", PixelFormat::Depth24, 0, 0)).unwrap();
        mrt
    }

    #[test]
    fn bind_attaches_colors_in_order() {
        let mut device = HeadlessDevice::new();
        let mut mrt = gbuffer(&mut device);
        mrt.bind(&mut device).unwrap();

        let fb = mrt.framebuffer().unwrap();
        assert_eq!(device.attachment(fb, Attachment::Color(0)), mrt.texture("albedo"));
        assert_eq!(device.attachment(fb, Attachment::Color(1)), mrt.texture("normal"));
        assert_eq!(device.attachment(fb, Attachment::Depth), mrt.texture("depth"));
        assert_eq!(device.draw_buffers(fb), Some(&[0, 1][..]));
        assert!(mrt.is_complete(&device));
    }

    #[test]
    fn duplicate_target_name_is_rejected() {
        let mut device = HeadlessDevice::new();
        let mut mrt = gbuffer(&mut device);
        let before = device.live_texture_count();
        let err = mrt.add_target(&mut device, RenderTargetDesc::color("albedo", PixelFormat::R8, 0, 0));
        assert!(matches!(err, Err(Error::DuplicateTarget(name)) if name == "albedo"));
        assert_eq!(device.live_texture_count(), before);
        assert_eq!(mrt.len(), 3);
    }

    #[test]
    fn failed_companion_depth_leaves_target_unchanged() {
        let mut device = HeadlessDevice::new();
        let mut mrt = gbuffer(&mut device);
        let before = device.live_texture_count();
        // room for the color image only
        device.set_texture_limit(Some(before + 1));

        let desc = RenderTargetDesc::new("lit", RenderTargetType::ColorDepth, PixelFormat::Rgba16F, 0, 0);
        assert!(matches!(mrt.add_target(&mut device, desc.clone()), Err(Error::Device(_))));
        assert_eq!(device.live_texture_count(), before);
        assert_eq!(mrt.len(), 3);
        assert!(!mrt.contains("lit"));
        assert!(!mrt.contains("lit_depth"));

        device.set_texture_limit(None);
        mrt.add_target(&mut device, desc).unwrap();
        assert_eq!(mrt.len(), 5);
        assert!(mrt.texture("lit").is_some());
        assert!(mrt.texture("lit_depth").is_some());
    }

    #[test]
    fn resize_recreates_framebuffer_and_rebinds() {
        let mut device = HeadlessDevice::new();
        let mut mrt = gbuffer(&mut device);
        mrt.bind(&mut device).unwrap();
        let old_fb = mrt.framebuffer().unwrap();

        mrt.resize(&mut device, 64, 16).unwrap();
        let new_fb = mrt.framebuffer().unwrap();
        assert_ne!(old_fb, new_fb);
        assert_eq!(device.attachment(new_fb, Attachment::Color(0)), None);

        mrt.bind(&mut device).unwrap();
        let albedo = mrt.texture("albedo").unwrap();
        assert_eq!(device.attachment(new_fb, Attachment::Color(0)), Some(albedo));
        assert_eq!(device.texture_desc(albedo).unwrap().width, 64);
    }

    #[test]
    fn external_texture_overrides_own_image() {
        let mut device = HeadlessDevice::new();
        let mut mrt = gbuffer(&mut device);
        let shared = device
            .create_texture(&RenderTargetDesc::color("shared", PixelFormat::Rgba8, 32, 32))
            .unwrap();
        mrt.set_external("albedo", Some(shared));
        mrt.bind(&mut device).unwrap();
        assert_eq!(device.attachment(mrt.framebuffer().unwrap(), Attachment::Color(0)), Some(shared));
    }
}
