//! In-memory device that validates handles and records every call

use super::{
    Attachment, BarrierKind, ClearFlags, ClearValues, FramebufferHandle, FramebufferStatus, GpuDevice,
    ProgramHandle, RenderState, TextureHandle, Viewport,
};
use crate::command::{RenderMode, Vertex};
use crate::target::RenderTargetDesc;
use crate::{Error, Result};
use glam::Mat4;
use std::collections::{BTreeMap, HashMap};

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    CreateTexture { texture: TextureHandle, name: String },
    DestroyTexture(TextureHandle),
    CreateFramebuffer(FramebufferHandle),
    DestroyFramebuffer(FramebufferHandle),
    Attach { framebuffer: FramebufferHandle, attachment: Attachment, texture: Option<TextureHandle> },
    DrawBuffers { framebuffer: FramebufferHandle, buffers: Vec<u32> },
    BindFramebuffer(Option<FramebufferHandle>),
    Viewport(Viewport),
    Clear(ClearFlags),
    BindTexture { unit: u32, texture: Option<TextureHandle> },
    SetState(RenderState),
    Barrier(BarrierKind),
    UseProgram(ProgramHandle),
    Uniform(String),
    Draw { framebuffer: Option<FramebufferHandle>, index_count: usize, mode: RenderMode },
    FullscreenQuad { framebuffer: Option<FramebufferHandle> },
}

/// Running counters, never reset by the device itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub textures_created: u64,
    pub textures_destroyed: u64,
    pub framebuffers_created: u64,
    pub framebuffers_destroyed: u64,
    pub draws: u64,
    pub clears: u64,
    pub barriers: u64,
}

#[derive(Debug, Default)]
struct HeadlessFramebuffer {
    attachments: BTreeMap<Attachment, TextureHandle>,
    draw_buffers: Vec<u32>,
}

/// Device without a GPU
///
/// Behaves like a strict immediate-mode driver: unknown handles are reported,
/// framebuffer completeness is computed from the real attachment set, and
/// every call lands in [`HeadlessDevice::commands`].
pub struct HeadlessDevice {
    next_id: u64,
    textures: HashMap<TextureHandle, RenderTargetDesc>,
    framebuffers: HashMap<FramebufferHandle, HeadlessFramebuffer>,
    bound_framebuffer: Option<FramebufferHandle>,
    bound_textures: BTreeMap<u32, TextureHandle>,
    state: RenderState,
    commands: Vec<DeviceCommand>,
    stats: DeviceStats,
    /// Max live textures before `create_texture` fails, like running out of VRAM
    texture_limit: Option<usize>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            bound_framebuffer: None,
            bound_textures: BTreeMap::new(),
            state: RenderState::default(),
            commands: Vec::new(),
            stats: DeviceStats::default(),
            texture_limit: None,
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Drop the command log, keeping live objects and counters
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn set_texture_limit(&mut self, limit: Option<usize>) {
        self.texture_limit = limit;
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn texture_desc(&self, texture: TextureHandle) -> Option<&RenderTargetDesc> {
        self.textures.get(&texture)
    }

    pub fn is_texture_alive(&self, texture: TextureHandle) -> bool {
        self.textures.contains_key(&texture)
    }

    pub fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound_framebuffer
    }

    pub fn bound_texture(&self, unit: u32) -> Option<TextureHandle> {
        self.bound_textures.get(&unit).copied()
    }

    pub fn attachment(&self, framebuffer: FramebufferHandle, attachment: Attachment) -> Option<TextureHandle> {
        self.framebuffers
            .get(&framebuffer)
            .and_then(|fb| fb.attachments.get(&attachment).copied())
    }

    pub fn draw_buffers(&self, framebuffer: FramebufferHandle) -> Option<&[u32]> {
        self.framebuffers.get(&framebuffer).map(|fb| fb.draw_buffers.as_slice())
    }

    /// Number of recorded draws (indexed and full-screen) while `framebuffer` was bound
    pub fn draws_into(&self, framebuffer: Option<FramebufferHandle>) -> usize {
        self.commands
            .iter()
            .filter(|cmd| match cmd {
                DeviceCommand::Draw { framebuffer: fb, .. } | DeviceCommand::FullscreenQuad { framebuffer: fb } => {
                    *fb == framebuffer
                }
                _ => false,
            })
            .count()
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for HeadlessDevice {
    fn backend_name(&self) -> &str {
        "headless"
    }

    fn create_texture(&mut self, desc: &RenderTargetDesc) -> Result<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::Device(format!(
                "texture '{}' has zero extent {}x{}",
                desc.name, desc.width, desc.height
            )));
        }
        if self.texture_limit.is_some_and(|limit| self.textures.len() >= limit) {
            return Err(Error::Device(format!("out of texture memory creating '{}'", desc.name)));
        }
        let texture = TextureHandle(self.allocate_id());
        self.textures.insert(texture, desc.clone());
        self.stats.textures_created += 1;
        self.commands.push(DeviceCommand::CreateTexture { texture, name: desc.name.clone() });
        log::trace!("headless: created texture {:?} '{}'", texture, desc.name);
        Ok(texture)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_none() {
            log::warn!("headless: destroy of unknown texture {:?}", texture);
            return;
        }
        self.bound_textures.retain(|_, bound| *bound != texture);
        self.stats.textures_destroyed += 1;
        self.commands.push(DeviceCommand::DestroyTexture(texture));
    }

    fn create_framebuffer(&mut self, label: &str) -> Result<FramebufferHandle> {
        let framebuffer = FramebufferHandle(self.allocate_id());
        self.framebuffers.insert(framebuffer, HeadlessFramebuffer::default());
        self.stats.framebuffers_created += 1;
        self.commands.push(DeviceCommand::CreateFramebuffer(framebuffer));
        log::trace!("headless: created framebuffer {:?} '{}'", framebuffer, label);
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.framebuffers.remove(&framebuffer).is_none() {
            log::warn!("headless: destroy of unknown framebuffer {:?}", framebuffer);
            return;
        }
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
        self.stats.framebuffers_destroyed += 1;
        self.commands.push(DeviceCommand::DestroyFramebuffer(framebuffer));
    }

    fn attach_texture(&mut self, framebuffer: FramebufferHandle, attachment: Attachment, texture: Option<TextureHandle>) {
        let Some(fb) = self.framebuffers.get_mut(&framebuffer) else {
            log::warn!("headless: attach to unknown framebuffer {:?}", framebuffer);
            return;
        };
        match texture {
            Some(texture) => {
                fb.attachments.insert(attachment, texture);
            }
            None => {
                fb.attachments.remove(&attachment);
            }
        }
        self.commands.push(DeviceCommand::Attach { framebuffer, attachment, texture });
    }

    fn set_draw_buffers(&mut self, framebuffer: FramebufferHandle, buffers: &[u32]) {
        if let Some(fb) = self.framebuffers.get_mut(&framebuffer) {
            fb.draw_buffers = buffers.to_vec();
        }
        self.commands.push(DeviceCommand::DrawBuffers { framebuffer, buffers: buffers.to_vec() });
    }

    fn framebuffer_status(&self, framebuffer: FramebufferHandle) -> FramebufferStatus {
        let Some(fb) = self.framebuffers.get(&framebuffer) else {
            return FramebufferStatus::Unknown;
        };
        if fb.attachments.is_empty() {
            return FramebufferStatus::MissingAttachment;
        }
        let mut extent = None;
        for texture in fb.attachments.values() {
            let Some(desc) = self.textures.get(texture) else {
                return FramebufferStatus::InvalidAttachment;
            };
            match extent {
                None => extent = Some((desc.width, desc.height)),
                Some(size) if size != (desc.width, desc.height) => {
                    return FramebufferStatus::MismatchedDimensions;
                }
                Some(_) => {}
            }
        }
        let draw_buffer_missing = fb
            .draw_buffers
            .iter()
            .any(|index| !fb.attachments.contains_key(&Attachment::Color(*index)));
        if draw_buffer_missing {
            return FramebufferStatus::InvalidAttachment;
        }
        FramebufferStatus::Complete
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        if let Some(fb) = framebuffer {
            if !self.framebuffers.contains_key(&fb) {
                log::warn!("headless: bind of unknown framebuffer {:?}", fb);
            }
        }
        self.bound_framebuffer = framebuffer;
        self.commands.push(DeviceCommand::BindFramebuffer(framebuffer));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = viewport;
        self.commands.push(DeviceCommand::Viewport(viewport));
    }

    fn clear(&mut self, flags: ClearFlags, _values: &ClearValues) {
        self.stats.clears += 1;
        self.commands.push(DeviceCommand::Clear(flags));
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        match texture {
            Some(texture) => {
                if !self.textures.contains_key(&texture) {
                    log::warn!("headless: bind of unknown texture {:?} to unit {}", texture, unit);
                }
                self.bound_textures.insert(unit, texture);
            }
            None => {
                self.bound_textures.remove(&unit);
            }
        }
        self.commands.push(DeviceCommand::BindTexture { unit, texture });
    }

    fn render_state(&self) -> RenderState {
        self.state
    }

    fn set_render_state(&mut self, state: &RenderState) {
        self.state = *state;
        self.commands.push(DeviceCommand::SetState(*state));
    }

    fn memory_barrier(&mut self, barrier: BarrierKind) {
        self.stats.barriers += 1;
        self.commands.push(DeviceCommand::Barrier(barrier));
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.commands.push(DeviceCommand::UseProgram(program));
    }

    fn set_uniform_mat4(&mut self, name: &str, _value: &Mat4) {
        self.commands.push(DeviceCommand::Uniform(name.to_string()));
    }

    fn draw_indexed(&mut self, _vertices: &[Vertex], indices: &[u32], mode: RenderMode) {
        self.stats.draws += 1;
        self.commands.push(DeviceCommand::Draw {
            framebuffer: self.bound_framebuffer,
            index_count: indices.len(),
            mode,
        });
    }

    fn draw_fullscreen_quad(&mut self) {
        self.stats.draws += 1;
        self.commands.push(DeviceCommand::FullscreenQuad { framebuffer: self.bound_framebuffer });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::PixelFormat;

    #[test]
    fn empty_framebuffer_is_incomplete() {
        let mut device = HeadlessDevice::new();
        let fb = device.create_framebuffer("empty").unwrap();
        assert_eq!(device.framebuffer_status(fb), FramebufferStatus::MissingAttachment);
    }

    #[test]
    fn mismatched_attachments_are_reported() {
        let mut device = HeadlessDevice::new();
        let fb = device.create_framebuffer("fb").unwrap();
        let a = device.create_texture(&RenderTargetDesc::color("a", PixelFormat::Rgba8, 16, 16)).unwrap();
        let b = device.create_texture(&RenderTargetDesc::color("b", PixelFormat::Rgba8, 8, 16)).unwrap();
        device.attach_texture(fb, Attachment::Color(0), Some(a));
        assert_eq!(device.framebuffer_status(fb), FramebufferStatus::Complete);
        device.attach_texture(fb, Attachment::Color(1), Some(b));
        assert_eq!(device.framebuffer_status(fb), FramebufferStatus::MismatchedDimensions);
    }

    #[test]
    fn destroyed_attachment_invalidates_framebuffer() {
        let mut device = HeadlessDevice::new();
        let fb = device.create_framebuffer("fb").unwrap();
        let a = device.create_texture(&RenderTargetDesc::color("a", PixelFormat::Rgba8, 4, 4)).unwrap();
        device.attach_texture(fb, Attachment::Color(0), Some(a));
        device.destroy_texture(a);
        assert_eq!(device.framebuffer_status(fb), FramebufferStatus::InvalidAttachment);
    }
}
