//! wgpu implementation of the device seam
//!
//! wgpu has no framebuffer objects, so a framebuffer here is just the set of
//! texture views attached to it. Clears are encoded as render passes with
//! `LoadOp::Clear` into a lazily created encoder; `flush` submits it.
//! Draw-level encoding belongs to materials, which reach the encoder and the
//! attachment views through [`WgpuDevice::encoder`] and
//! [`WgpuDevice::texture_view`].

use super::{
    Attachment, BarrierKind, ClearFlags, ClearValues, FramebufferHandle, FramebufferStatus, GpuDevice,
    ProgramHandle, RenderState, TextureHandle, Viewport,
};
use crate::command::{RenderMode, Vertex};
use crate::target::{FilterMode, RenderTargetDesc, WrapMode};
use crate::{Error, Result};
use glam::Mat4;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

struct WgpuTexture {
    texture: wgpu::Texture,
    /// Mip 0 view, usable both as attachment and for sampling
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    desc: RenderTargetDesc,
}

#[derive(Default)]
struct WgpuFramebuffer {
    label: String,
    attachments: BTreeMap<Attachment, TextureHandle>,
    draw_buffers: Vec<u32>,
}

/// Device backed by a wgpu device + queue
pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    next_id: u64,
    textures: HashMap<TextureHandle, WgpuTexture>,
    framebuffers: HashMap<FramebufferHandle, WgpuFramebuffer>,
    bound_framebuffer: Option<FramebufferHandle>,
    bound_textures: BTreeMap<u32, TextureHandle>,
    program: Option<ProgramHandle>,
    state: RenderState,
    encoder: Option<wgpu::CommandEncoder>,
    draws_this_flush: u64,
}

fn address_mode(wrap: WrapMode) -> wgpu::AddressMode {
    match wrap {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

fn filter_mode(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

impl WgpuDevice {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            next_id: 1,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            bound_framebuffer: None,
            bound_textures: BTreeMap::new(),
            program: None,
            state: RenderState::default(),
            encoder: None,
            draws_this_flush: 0,
        }
    }

    /// Request an adapter without a surface and wrap the resulting device
    #[cfg(not(target_arch = "wasm32"))]
    pub fn request_headless() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| Error::Device("no compatible wgpu adapter".to_string()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Helio Pass Graph Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map_err(|e| Error::Device(e.to_string()))?;

        log::info!("wgpu device ready: {:?}", adapter.get_info().name);
        Ok(Self::new(Arc::new(device), Arc::new(queue)))
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn texture_view(&self, texture: TextureHandle) -> Option<&wgpu::TextureView> {
        self.textures.get(&texture).map(|t| &t.view)
    }

    pub fn texture(&self, texture: TextureHandle) -> Option<&wgpu::Texture> {
        self.textures.get(&texture).map(|t| &t.texture)
    }

    pub fn sampler(&self, texture: TextureHandle) -> Option<&wgpu::Sampler> {
        self.textures.get(&texture).map(|t| &t.sampler)
    }

    pub fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound_framebuffer
    }

    pub fn bound_texture(&self, unit: u32) -> Option<TextureHandle> {
        self.bound_textures.get(&unit).copied()
    }

    pub fn current_program(&self) -> Option<ProgramHandle> {
        self.program
    }

    /// Encoder that collects this frame's GPU work until the next `flush`
    pub fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Pass Graph Encoder"),
            })
        })
    }
}

impl GpuDevice for WgpuDevice {
    fn backend_name(&self) -> &str {
        "wgpu"
    }

    fn create_texture(&mut self, desc: &RenderTargetDesc) -> Result<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::Device(format!(
                "texture '{}' has zero extent {}x{}",
                desc.name, desc.width, desc.height
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.name),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_level_count(),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format.to_wgpu(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&desc.name),
            base_mip_level: 0,
            mip_level_count: Some(1),
            ..Default::default()
        });
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&desc.name),
            address_mode_u: address_mode(desc.wrap),
            address_mode_v: address_mode(desc.wrap),
            mag_filter: filter_mode(desc.mag_filter),
            min_filter: filter_mode(desc.min_filter),
            mipmap_filter: if desc.mipmaps { wgpu::FilterMode::Linear } else { wgpu::FilterMode::Nearest },
            ..Default::default()
        });

        let handle = TextureHandle(self.allocate_id());
        log::debug!("Created wgpu texture '{}' {}x{} {:?} as {:?}", desc.name, desc.width, desc.height, desc.format, handle);
        self.textures.insert(handle, WgpuTexture { texture, view, sampler, desc: desc.clone() });
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        match self.textures.remove(&texture) {
            Some(entry) => {
                self.bound_textures.retain(|_, bound| *bound != texture);
                entry.texture.destroy();
            }
            None => log::warn!("wgpu: destroy of unknown texture {:?}", texture),
        }
    }

    fn create_framebuffer(&mut self, label: &str) -> Result<FramebufferHandle> {
        let handle = FramebufferHandle(self.allocate_id());
        self.framebuffers.insert(
            handle,
            WgpuFramebuffer {
                label: label.to_string(),
                ..Default::default()
            },
        );
        Ok(handle)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.framebuffers.remove(&framebuffer).is_none() {
            log::warn!("wgpu: destroy of unknown framebuffer {:?}", framebuffer);
        }
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn attach_texture(&mut self, framebuffer: FramebufferHandle, attachment: Attachment, texture: Option<TextureHandle>) {
        let Some(fb) = self.framebuffers.get_mut(&framebuffer) else {
            log::warn!("wgpu: attach to unknown framebuffer {:?}", framebuffer);
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
    }

    fn set_draw_buffers(&mut self, framebuffer: FramebufferHandle, buffers: &[u32]) {
        if let Some(fb) = self.framebuffers.get_mut(&framebuffer) {
            fb.draw_buffers = buffers.to_vec();
        }
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
            let Some(entry) = self.textures.get(texture) else {
                return FramebufferStatus::InvalidAttachment;
            };
            let size = (entry.desc.width, entry.desc.height);
            if *extent.get_or_insert(size) != size {
                return FramebufferStatus::MismatchedDimensions;
            }
        }
        FramebufferStatus::Complete
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.bound_framebuffer = framebuffer;
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = viewport;
    }

    fn clear(&mut self, flags: ClearFlags, values: &ClearValues) {
        let Some(bound) = self.bound_framebuffer else {
            // the screen belongs to the surface owner
            log::trace!("wgpu: clear of default framebuffer ignored");
            return;
        };
        let Some(fb) = self.framebuffers.get(&bound) else {
            return;
        };

        let color_load = if flags.contains(ClearFlags::COLOR) {
            let [r, g, b, a] = values.color.map(|c| c as f64);
            wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a })
        } else {
            wgpu::LoadOp::Load
        };
        let depth_load = if flags.contains(ClearFlags::DEPTH) {
            wgpu::LoadOp::Clear(values.depth)
        } else {
            wgpu::LoadOp::Load
        };
        let stencil_load = if flags.contains(ClearFlags::STENCIL) {
            wgpu::LoadOp::Clear(values.stencil)
        } else {
            wgpu::LoadOp::Load
        };

        let mut color_attachments = Vec::new();
        let mut depth_attachment = None;
        for (attachment, texture) in &fb.attachments {
            let Some(entry) = self.textures.get(texture) else {
                continue;
            };
            match attachment {
                Attachment::Color(index) => {
                    if !fb.draw_buffers.is_empty() && !fb.draw_buffers.contains(index) {
                        continue;
                    }
                    color_attachments.push(Some(wgpu::RenderPassColorAttachment {
                        view: &entry.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: color_load,
                            store: wgpu::StoreOp::Store,
                        },
                    }));
                }
                Attachment::Depth | Attachment::Stencil | Attachment::DepthStencil => {
                    depth_attachment = Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &entry.view,
                        depth_ops: Some(wgpu::Operations {
                            load: depth_load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: entry.desc.format.has_stencil().then_some(wgpu::Operations {
                            load: stencil_load,
                            store: wgpu::StoreOp::Store,
                        }),
                    });
                }
            }
        }

        let encoder = self.encoder.get_or_insert_with(|| {
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Pass Graph Encoder"),
            })
        });
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&fb.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        match texture {
            Some(texture) => {
                self.bound_textures.insert(unit, texture);
            }
            None => {
                self.bound_textures.remove(&unit);
            }
        }
    }

    fn render_state(&self) -> RenderState {
        self.state
    }

    fn set_render_state(&mut self, state: &RenderState) {
        self.state = *state;
    }

    fn memory_barrier(&mut self, barrier: BarrierKind) {
        // wgpu tracks resource usage and inserts transitions itself
        log::trace!("wgpu: barrier {:?} elided", barrier);
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.program = Some(program);
    }

    fn set_uniform_mat4(&mut self, name: &str, _value: &Mat4) {
        log::trace!("wgpu: uniform '{}' left to material bind groups", name);
    }

    fn draw_indexed(&mut self, _vertices: &[Vertex], indices: &[u32], mode: RenderMode) {
        self.draws_this_flush += 1;
        log::trace!("wgpu: draw {:?} with {} indices", mode, indices.len());
    }

    fn draw_fullscreen_quad(&mut self) {
        self.draws_this_flush += 1;
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
            log::trace!("wgpu: submitted frame ({} draws)", self.draws_this_flush);
        }
        self.draws_this_flush = 0;
        Ok(())
    }
}
