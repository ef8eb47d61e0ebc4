// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A backend over wgpu.

Surfaces and swapchain buffers are wgpu textures on a caller-supplied device; uploads go through
`Queue::write_texture` and presents are texture-to-texture copies.  Non-surface objects are
bookkeeping records.  Devices keep a mirror of the state their commands set; nothing is drawn.
*/

mod pixel_format;

use super::{Backend, BackendObject, DeviceCommand, Error, Extent, ObjectKind, SurfaceCreateInfo, UploadLayout};
use crate::contract::Contract;
use crate::pixel_formats::BackendFormat;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use wgpu::{Extent3d, TexelCopyBufferLayout, TexelCopyTextureInfo};

/// State a device's commands have set.
#[derive(Debug, Default)]
struct DeviceMirror {
    render_target: Option<BackendObject>,
    depth_target: Option<BackendObject>,
    render_states: BTreeMap<u32, u32>,
    in_scene: bool,
    draws: u64,
}

#[derive(Debug)]
enum Payload {
    Object(ObjectKind),
    Device(DeviceMirror),
    Texture { texture: wgpu::Texture, format: BackendFormat },
}

#[derive(Debug)]
struct Entry {
    refs: u32,
    payload: Payload,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    entries: HashMap<u64, Entry>,
}

impl Inner {
    fn insert(&mut self, payload: Payload) -> BackendObject {
        self.next_id += 1;
        self.entries.insert(self.next_id, Entry { refs: 1, payload });
        BackendObject::from_raw(self.next_id)
    }

    fn texture(&self, object: BackendObject) -> Result<(&wgpu::Texture, BackendFormat), Error> {
        match self.entries.get(&object.raw()).map(|e| &e.payload) {
            Some(Payload::Texture { texture, format }) => Ok((texture, *format)),
            _ => Err(Error::UnknownObject(object)),
        }
    }
}

#[derive(Debug)]
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    inner: Mutex<Inner>,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        WgpuBackend { device, queue, inner: Mutex::new(Inner::default()) }
    }

    fn mirror<R>(&self, device: BackendObject, f: impl FnOnce(&DeviceMirror) -> R) -> Option<R> {
        match self.inner.lock().entries.get(&device.raw()).map(|e| &e.payload) {
            Some(Payload::Device(mirror)) => Some(f(mirror)),
            _ => None,
        }
    }

    /// Draw calls `device` has received.
    pub fn draw_count(&self, device: BackendObject) -> Option<u64> {
        self.mirror(device, |m| m.draws)
    }

    /// The color and depth targets `device` was last pointed at.
    pub fn targets(&self, device: BackendObject) -> Option<(Option<BackendObject>, Option<BackendObject>)> {
        self.mirror(device, |m| (m.render_target, m.depth_target))
    }

    pub fn render_state(&self, device: BackendObject, state: u32) -> Option<u32> {
        self.mirror(device, |m| m.render_states.get(&state).copied()).flatten()
    }

    pub fn in_scene(&self, device: BackendObject) -> Option<bool> {
        self.mirror(device, |m| m.in_scene)
    }

    fn texture_format(&self, format: BackendFormat) -> Result<wgpu::TextureFormat, Error> {
        let wgpu_format = format.wgpu_format().ok_or(Error::UnsupportedFormat(format))?;
        if format.needs_bc_feature() && !self.device.features().contains(wgpu::Features::TEXTURE_COMPRESSION_BC) {
            return Err(Error::UnsupportedFormat(format));
        }
        Ok(wgpu_format)
    }

    fn create_texture(
        &self,
        label: &str,
        extent: Extent,
        format: BackendFormat,
        usage: wgpu::TextureUsages,
    ) -> Result<BackendObject, Error> {
        let wgpu_format = self.texture_format(format)?;
        let max = self.device.limits().max_texture_dimension_2d;
        if extent.width > max || extent.height > max {
            return Err(Error::Other(format!("{}x{} exceeds the device limit of {max}", extent.width, extent.height)));
        }
        let descriptor = wgpu::TextureDescriptor {
            label: Some(label),
            size: Extent3d { width: extent.width, height: extent.height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format,
            usage,
            view_formats: &[],
        };
        let texture = self.device.create_texture(&descriptor);
        log::debug!("wgpu backend: created {label} ({}x{} {wgpu_format:?})", extent.width, extent.height);
        Ok(self.inner.lock().insert(Payload::Texture { texture, format }))
    }
}

impl Backend for WgpuBackend {
    fn create_object(&self, kind: ObjectKind, _debug_name: &str) -> Result<BackendObject, Error> {
        let payload = match kind {
            ObjectKind::Device => Payload::Device(DeviceMirror::default()),
            other => Payload::Object(other),
        };
        Ok(self.inner.lock().insert(payload))
    }

    fn create_surface(&self, info: &SurfaceCreateInfo) -> Result<BackendObject, Error> {
        let mut usage = wgpu::TextureUsages::empty();
        if info.usage.depth {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        } else {
            usage |= wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC;
            if info.usage.render_target || info.usage.scanout {
                usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
            }
            if info.usage.texture {
                usage |= wgpu::TextureUsages::TEXTURE_BINDING;
            }
        }
        self.create_texture(&info.debug_name, info.extent, info.format, usage)
    }

    fn create_swapchain_buffer(
        &self,
        context: BackendObject,
        index: u32,
        extent: Extent,
        format: BackendFormat,
    ) -> Result<BackendObject, Error> {
        if !self.inner.lock().entries.contains_key(&context.raw()) {
            return Err(Error::UnknownObject(context));
        }
        let usage = wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        self.create_texture(&format!("swapchain buffer {index}"), extent, format, usage)
    }

    fn retain(&self, object: BackendObject) {
        match self.inner.lock().entries.get_mut(&object.raw()) {
            Some(entry) => entry.refs += 1,
            None => log::error!("wgpu backend: retain of unknown object {object:?}"),
        }
    }

    fn release(&self, object: BackendObject) {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.entries.get_mut(&object.raw()) else {
            log::error!("wgpu backend: release of unknown object {object:?}");
            return;
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            if let Some(Entry { payload: Payload::Texture { texture, .. }, .. }) = inner.entries.remove(&object.raw()) {
                texture.destroy();
            }
        }
    }

    fn supports(&self, _contract: Contract) -> bool {
        true
    }

    fn upload(&self, surface: BackendObject, data: &[u8], layout: UploadLayout) -> Result<(), Error> {
        if data.len() != layout.byte_len() {
            return Err(Error::UploadSize { expected: layout.byte_len(), got: data.len() });
        }
        let inner = self.inner.lock();
        let (texture, format) = inner.texture(surface)?;
        if format.is_depth() {
            //depth contents never leave the GPU
            return Ok(());
        }
        self.queue.write_texture(
            TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(layout.bytes_per_row),
                rows_per_image: Some(layout.rows),
            },
            Extent3d { width: layout.extent.width, height: layout.extent.height, depth_or_array_layers: 1 },
        );
        Ok(())
    }

    fn execute(&self, device: BackendObject, command: &DeviceCommand) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let Some(Entry { payload: Payload::Device(mirror), .. }) = inner.entries.get_mut(&device.raw()) else {
            return Err(Error::UnknownObject(device));
        };
        match command {
            DeviceCommand::BeginScene => mirror.in_scene = true,
            DeviceCommand::EndScene => mirror.in_scene = false,
            DeviceCommand::SetRenderTarget(target) => mirror.render_target = Some(*target),
            DeviceCommand::SetDepthTarget(depth) => mirror.depth_target = *depth,
            DeviceCommand::SetRenderState { state, value } => {
                mirror.render_states.insert(*state, *value);
            }
            DeviceCommand::Draw { .. } => mirror.draws += 1,
            DeviceCommand::SetViewport { .. }
            | DeviceCommand::DeactivateViewport
            | DeviceCommand::SetLight { .. }
            | DeviceCommand::SetBackground { .. } => {}
        }
        log::trace!("wgpu backend: {device:?} <- {command:?}");
        Ok(())
    }

    fn present(&self, back_buffer: BackendObject, source: BackendObject) -> Result<(), Error> {
        let inner = self.inner.lock();
        let (target, _) = inner.texture(back_buffer)?;
        let (source, _) = inner.texture(source)?;
        if target.size() != source.size() || target.format() != source.format() {
            return Err(Error::Other("present source doesn't match its swapchain buffer".to_string()));
        }
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("present") });
        encoder.copy_texture_to_texture(source.as_image_copy(), target.as_image_copy(), source.size());
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}
