// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Drawing surfaces.

A surface is a rectangle of pixels with a system-memory shadow and a backend object.  Complex
creation builds a whole structure in one call: a flip ring of back buffers behind a front buffer,
a mip chain, or the six faces of a cube map.  The implicitly created members are owned by the root
and share its reference count.

Content changes (writes, unlocks after a write lock, blts, fills, flips) mark the surface dirty;
uploads push the shadow to the backend and mark it clean.
*/

use crate::chain::{self, ChainKind, FlipChain};
use crate::config::Config;
use crate::context::Context;
use crate::contract::{Contract, ContextVersion, SurfaceVersion, TextureVersion};
use crate::delegate::Delegate;
use crate::error::{Error, Result};
use crate::imp::{Backend, BackendObject, Extent, MemoryPool, SurfaceCreateInfo, SurfaceUsage, UploadLayout};
use crate::lifecycle;
use crate::pixel_formats::{BackendFormat, LegacyPixelFormat};
use crate::refcount::Discipline;
use crate::registry::Registry;
use crate::resolver;
use crate::scene::texture::Texture;
use crate::state::attachments::Link;
use crate::state::dirty::DirtyReceiver;
use crate::state::{CommonState, Detail, ResourceCaps, ResourceId, SurfaceState};
use crate::wrapper::{WrapperId, typed_wrapper};
use bitflags::bitflags;
use std::collections::HashMap;

bitflags! {
    /// Capabilities requested when creating a surface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SurfaceCaps: u32 {
        const BACK_BUFFER = 0x0000_0004;
        const COMPLEX = 0x0000_0008;
        const FLIP = 0x0000_0010;
        const FRONT_BUFFER = 0x0000_0020;
        const OFFSCREEN_PLAIN = 0x0000_0040;
        const PRIMARY_SURFACE = 0x0000_0200;
        const SYSTEM_MEMORY = 0x0000_0800;
        const TEXTURE = 0x0000_1000;
        const THREE_D_DEVICE = 0x0000_2000;
        const VIDEO_MEMORY = 0x0000_4000;
        const ZBUFFER = 0x0002_0000;
        const MIPMAP = 0x0040_0000;
        /// Driver-managed texture.
        const MANAGED = 0x1000_0000;
        const CUBEMAP = 0x2000_0000;
    }
}

impl SurfaceCaps {
    /// The resource capabilities an attached surface must have to match these caps.
    fn as_resource_caps(self) -> ResourceCaps {
        let mut caps = ResourceCaps::empty();
        if self.contains(SurfaceCaps::BACK_BUFFER) {
            caps |= ResourceCaps::BACK_BUFFER;
        }
        if self.contains(SurfaceCaps::FRONT_BUFFER) {
            caps |= ResourceCaps::FRONT_BUFFER;
        }
        if self.contains(SurfaceCaps::FLIP) {
            caps |= ResourceCaps::FLIP;
        }
        if self.contains(SurfaceCaps::ZBUFFER) {
            caps |= ResourceCaps::DEPTH_TARGET;
        }
        if self.contains(SurfaceCaps::MIPMAP) {
            caps |= ResourceCaps::MIP_SUBLEVEL;
        }
        if self.contains(SurfaceCaps::CUBEMAP) {
            caps |= ResourceCaps::CUBE_FACE;
        }
        if self.contains(SurfaceCaps::TEXTURE) {
            caps |= ResourceCaps::TEXTURE;
        }
        caps
    }
}

/// A surface description, as passed to creation and reported back by [`Surface::desc`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    pub caps: SurfaceCaps,
    /// `None` picks a default: the display format for primaries, 16-bit depth for depth buffers.
    pub pixel_format: Option<LegacyPixelFormat>,
    pub back_buffer_count: u32,
    /// Levels requested for a mipmapped surface; 0 means a full chain.
    pub mip_map_count: u32,
}

impl SurfaceDesc {
    pub fn new(caps: SurfaceCaps) -> Self {
        SurfaceDesc { width: 0, height: 0, caps, pixel_format: None, back_buffer_count: 0, mip_map_count: 0 }
    }
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
    pub fn with_pixel_format(mut self, format: LegacyPixelFormat) -> Self {
        self.pixel_format = Some(format);
        self
    }
    pub fn with_back_buffers(mut self, count: u32) -> Self {
        self.back_buffer_count = count;
        self
    }
    pub fn with_mip_maps(mut self, count: u32) -> Self {
        self.mip_map_count = count;
        self
    }

    fn pool(&self) -> MemoryPool {
        if self.caps.contains(SurfaceCaps::MANAGED) {
            MemoryPool::Managed
        } else if self.caps.contains(SurfaceCaps::SYSTEM_MEMORY) {
            MemoryPool::System
        } else {
            MemoryPool::Video
        }
    }
}

/// What a lock hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockedRect {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    pub format: LegacyPixelFormat,
}

typed_wrapper!(
    /// A drawing surface, through one of its contract generations.
    Surface,
    Surface,
    SurfaceVersion
);

/// The surface generation a context of `version` creates.
pub(crate) fn surface_version_for(version: ContextVersion) -> SurfaceVersion {
    match version {
        ContextVersion::V1 | ContextVersion::V2 => SurfaceVersion::V1,
        ContextVersion::V4 => SurfaceVersion::V4,
        ContextVersion::V7 => SurfaceVersion::V7,
    }
}

/// One surface of a creation call.
#[derive(Debug)]
struct MemberPlan {
    width: u32,
    height: u32,
    caps: ResourceCaps,
    desc_caps: SurfaceCaps,
    /// Index of the member this one is attached to.
    attach_to: Option<usize>,
    mip_levels: u32,
    name: String,
}

#[derive(Debug)]
struct CreationPlan {
    format: LegacyPixelFormat,
    backend_format: BackendFormat,
    pool: MemoryPool,
    members: Vec<MemberPlan>,
    /// Whether the last member closes a flip ring back to the root.
    flip_ring: bool,
}

fn root_caps(desc: &SurfaceDesc) -> ResourceCaps {
    let caps = desc.caps;
    let mut resource = ResourceCaps::empty();
    let flips = caps.contains(SurfaceCaps::FLIP);
    if caps.contains(SurfaceCaps::PRIMARY_SURFACE) {
        resource |= ResourceCaps::PRIMARY | ResourceCaps::FRONT_BUFFER;
    }
    if caps.contains(SurfaceCaps::FRONT_BUFFER) || flips {
        resource |= ResourceCaps::FRONT_BUFFER;
    }
    if caps.contains(SurfaceCaps::BACK_BUFFER) {
        resource |= ResourceCaps::BACK_BUFFER;
    }
    if flips || caps.intersects(SurfaceCaps::FRONT_BUFFER | SurfaceCaps::BACK_BUFFER) {
        resource |= ResourceCaps::FLIP;
    }
    if caps.contains(SurfaceCaps::ZBUFFER) {
        resource |= ResourceCaps::DEPTH_TARGET;
    }
    if caps.contains(SurfaceCaps::TEXTURE) {
        resource |= ResourceCaps::TEXTURE;
    }
    if caps.contains(SurfaceCaps::CUBEMAP) {
        resource |= ResourceCaps::CUBE_MAP;
    }
    if caps.contains(SurfaceCaps::THREE_D_DEVICE) {
        resource |= ResourceCaps::RENDER_TARGET;
    }
    if caps.contains(SurfaceCaps::MIPMAP) {
        resource |= ResourceCaps::MIPMAP;
    }
    resource
}

fn plan_creation(desc: &SurfaceDesc, context: &crate::state::ContextState, config: &Config) -> Result<CreationPlan> {
    let caps = desc.caps;
    let primary = caps.contains(SurfaceCaps::PRIMARY_SURFACE);
    let (width, height) = if primary {
        if context.primary.is_some() {
            return Err(Error::InvalidArgument("context already has a primary surface"));
        }
        let mode = context.display_mode;
        if (desc.width != 0 || desc.height != 0) && (desc.width != mode.width || desc.height != mode.height) {
            return Err(Error::InvalidArgument("primary surface size must match the display mode"));
        }
        if mode.width == 0 || mode.height == 0 {
            return Err(Error::InvalidArgument("display mode has no width and height"));
        }
        (mode.width, mode.height)
    } else {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::InvalidArgument("surface needs a width and height"));
        }
        (desc.width, desc.height)
    };

    let depth = caps.contains(SurfaceCaps::ZBUFFER);
    let format = match desc.pixel_format {
        Some(format) => format,
        None if depth => LegacyPixelFormat::depth(16),
        None if primary => LegacyPixelFormat::for_display_depth(context.display_mode.bits_per_pixel),
        None => LegacyPixelFormat::for_display_depth(context.display_mode.bits_per_pixel),
    };
    if format.is_depth() != depth {
        return Err(Error::InvalidArgument("depth surfaces need a depth pixel format and only depth surfaces may have one"));
    }
    let backend_format = format.backend_format().map_err(|_| Error::InvalidArgument("unsupported pixel format"))?;

    let complex = caps.contains(SurfaceCaps::COMPLEX);
    let flips = caps.contains(SurfaceCaps::FLIP);
    if flips && (!complex || desc.back_buffer_count == 0) {
        return Err(Error::InvalidArgument("flipping surfaces need COMPLEX and at least one back buffer"));
    }
    if desc.back_buffer_count > 0 && !flips {
        return Err(Error::InvalidArgument("back buffers requested without FLIP"));
    }
    if desc.back_buffer_count > config.max_back_buffers() {
        return Err(Error::InvalidArgument("too many back buffers"));
    }
    let cube = caps.contains(SurfaceCaps::CUBEMAP);
    if cube && (!complex || width != height) {
        return Err(Error::InvalidArgument("cube maps need COMPLEX and square faces"));
    }
    if cube && flips {
        return Err(Error::InvalidArgument("cube maps can't flip"));
    }
    if caps.contains(SurfaceCaps::MANAGED) && !caps.contains(SurfaceCaps::TEXTURE) {
        return Err(Error::InvalidArgument("only textures can be driver-managed"));
    }
    let max_levels = width.max(height).ilog2() + 1;
    let mip_levels = if caps.contains(SurfaceCaps::MIPMAP) && complex {
        match desc.mip_map_count {
            0 => max_levels,
            n if n > max_levels => return Err(Error::InvalidArgument("too many mip levels for this size")),
            n => n,
        }
    } else if desc.mip_map_count > 1 {
        return Err(Error::InvalidArgument("mip levels requested without MIPMAP and COMPLEX"));
    } else {
        1
    };

    let root = root_caps(desc);
    let mut members = vec![MemberPlan {
        width,
        height,
        caps: root,
        desc_caps: caps,
        attach_to: None,
        mip_levels,
        name: if primary { "primary surface".to_string() } else { "surface".to_string() },
    }];
    let inherited = root & (ResourceCaps::RENDER_TARGET | ResourceCaps::TEXTURE);
    for index in 0..desc.back_buffer_count {
        members.push(MemberPlan {
            width,
            height,
            caps: inherited | ResourceCaps::BACK_BUFFER | ResourceCaps::FLIP,
            desc_caps: (caps - SurfaceCaps::PRIMARY_SURFACE - SurfaceCaps::FRONT_BUFFER) | SurfaceCaps::BACK_BUFFER,
            attach_to: Some(members.len() - 1),
            mip_levels: 1,
            name: format!("back buffer {}", index + 1),
        });
    }
    let push_mips = |members: &mut Vec<MemberPlan>, head: usize, face_caps: ResourceCaps| {
        let mut parent = head;
        for level in 1..mip_levels {
            members.push(MemberPlan {
                width: (width >> level).max(1),
                height: (height >> level).max(1),
                caps: face_caps | ResourceCaps::MIPMAP | ResourceCaps::MIP_SUBLEVEL,
                desc_caps: caps,
                attach_to: Some(parent),
                mip_levels: mip_levels - level,
                name: format!("mip level {level}"),
            });
            parent = members.len() - 1;
        }
    };
    push_mips(&mut members, 0, inherited | (root & ResourceCaps::CUBE_MAP));
    if cube {
        for face in 1..6 {
            members.push(MemberPlan {
                width,
                height,
                caps: inherited | ResourceCaps::CUBE_MAP | ResourceCaps::CUBE_FACE | (root & ResourceCaps::MIPMAP),
                desc_caps: caps,
                attach_to: Some(0),
                mip_levels,
                name: format!("cube face {face}"),
            });
            let head = members.len() - 1;
            push_mips(&mut members, head, inherited | ResourceCaps::CUBE_MAP);
        }
    }
    Ok(CreationPlan { format, backend_format, pool: desc.pool(), members, flip_ring: desc.back_buffer_count > 0 })
}

fn surface_state(plan: &CreationPlan, member: &MemberPlan, context: ResourceId, desc: &SurfaceDesc) -> SurfaceState {
    let bytes_per_row = plan.format.bytes_per_row(member.width);
    let rows = plan.format.rows(member.height);
    SurfaceState {
        desc: SurfaceDesc {
            width: member.width,
            height: member.height,
            caps: member.desc_caps,
            pixel_format: Some(plan.format),
            back_buffer_count: if member.attach_to.is_none() { desc.back_buffer_count } else { 0 },
            mip_map_count: member.mip_levels,
        },
        format: plan.format,
        backend_format: plan.backend_format,
        bytes_per_row,
        rows,
        pixels: vec![0; bytes_per_row as usize * rows as usize],
        context,
        parent: None,
        texture: None,
        device: None,
        locked: None,
        private_data: HashMap::new(),
        priority: 0,
        lod: 0,
        mip_levels: member.mip_levels,
    }
}

/**
Creates the surfaces `desc` describes under `context`, returning the root's owning wrapper.

Backend objects for every member are created first; if any fails, those already created are
released and nothing is registered.
*/
pub(crate) fn create(
    registry: &mut Registry,
    backend: &dyn Backend,
    config: &Config,
    context: ResourceId,
    desc: &SurfaceDesc,
    version: SurfaceVersion,
) -> Result<WrapperId> {
    let plan = plan_creation(desc, registry.state(context)?.context()?, config)?;
    let mut objects: Vec<BackendObject> = Vec::with_capacity(plan.members.len());
    for member in &plan.members {
        let info = SurfaceCreateInfo {
            extent: Extent { width: member.width, height: member.height },
            format: plan.backend_format,
            usage: SurfaceUsage {
                render_target: member.caps.contains(ResourceCaps::RENDER_TARGET) || member.caps.contains(ResourceCaps::FLIP),
                depth: member.caps.contains(ResourceCaps::DEPTH_TARGET),
                texture: member.caps.contains(ResourceCaps::TEXTURE),
                scanout: member.caps.contains(ResourceCaps::PRIMARY),
            },
            pool: plan.pool,
            debug_name: member.name.clone(),
        };
        match backend.create_surface(&info) {
            Ok(object) => objects.push(object),
            Err(e) => {
                log::debug!("creating {} failed ({e}); unwinding {} objects", member.name, objects.len());
                for object in objects {
                    backend.release(object);
                }
                return Err(e.into());
            }
        }
    }

    let contract = Contract::Surface(version);
    let mut resources: Vec<ResourceId> = Vec::with_capacity(plan.members.len());
    let mut root_owner = None;
    for (member, object) in plan.members.iter().zip(objects.iter().copied()) {
        let state = CommonState::new(
            Detail::Surface(surface_state(&plan, member, context, desc)),
            member.caps,
            Some(object),
            member.name.clone(),
        );
        backend.retain(object);
        let (creator, discipline) = match root_owner {
            None => (context, Discipline::Independent),
            Some(owner) => (resources[0], Discipline::DelegatedToParent(owner)),
        };
        let installed = lifecycle::install(registry, backend, state, Some(creator), contract, Delegate::Native(object), discipline);
        match installed {
            Ok((resource, owner)) => {
                resources.push(resource);
                root_owner.get_or_insert(owner);
            }
            Err(e) => {
                if let Some(root) = resources.first() {
                    lifecycle::destroy_resource(registry, backend, *root);
                }
                for later in objects.iter().skip(resources.len() + 1) {
                    backend.release(*later);
                }
                return Err(e);
            }
        }
    }

    for (index, member) in plan.members.iter().enumerate() {
        if let Some(parent) = member.attach_to {
            let (parent, child) = (resources[parent], resources[index]);
            registry.state_mut(parent)?.attachments.push(child, Link::Owned);
            registry.state_mut(child)?.surface_mut()?.parent = Some(parent);
        }
    }
    if plan.flip_ring {
        let last_back_buffer = resources[desc.back_buffer_count as usize];
        registry.state_mut(last_back_buffer)?.attachments.push(resources[0], Link::BackEdge);
    }
    if desc.caps.contains(SurfaceCaps::PRIMARY_SURFACE) {
        registry.state_mut(context)?.context_mut()?.primary = Some(resources[0]);
    }
    root_owner.ok_or_else(|| Error::inconsistency("surface creation produced no surfaces"))
}

/// Pushes `resource`'s shadow to the backend if it's dirty.  Returns whether anything was uploaded.
pub(crate) fn upload_resource(registry: &Registry, backend: &dyn Backend, resource: ResourceId) -> Result<bool> {
    let state = registry.state(resource)?;
    if !state.dirty.is_dirty() {
        return Ok(false);
    }
    let surface = state.surface()?;
    let object = state.backend.ok_or_else(|| Error::inconsistency("surface without a backend object"))?;
    let layout = UploadLayout {
        extent: Extent { width: surface.desc.width, height: surface.desc.height },
        bytes_per_row: surface.bytes_per_row,
        rows: surface.rows,
        format: surface.backend_format,
    };
    backend.upload(object, &surface.pixels, layout)?;
    state.dirty.mark_clean();
    log::trace!("uploaded {}", state.debug_name);
    Ok(true)
}

fn writable(surface: &SurfaceState) -> Result<()> {
    match surface.locked {
        Some(true) => Err(Error::InvalidArgument("surface is locked read-only")),
        _ => Ok(()),
    }
}

impl Surface {
    fn with_surface<R>(&self, f: impl FnOnce(&CommonState, &SurfaceState) -> Result<R>) -> Result<R> {
        self.0.read(|registry| {
            let state = registry.state_of(self.0.id())?;
            f(state, state.surface()?)
        })
    }

    fn with_surface_mut<R>(&self, f: impl FnOnce(&mut SurfaceState) -> Result<R>) -> Result<R> {
        self.0.write(|registry, _, _| f(registry.state_of_mut(self.0.id())?.surface_mut()?))
    }

    /// Runs `f` on the shadow buffer and marks the surface dirty if it succeeds.
    fn modify_pixels(&self, f: impl FnOnce(&mut SurfaceState) -> Result<()>) -> Result<()> {
        self.0.write(|registry, _, _| {
            let state = registry.state_of_mut(self.0.id())?;
            let surface = state.surface_mut()?;
            writable(surface)?;
            f(surface)?;
            state.dirty.mark_dirty();
            Ok(())
        })
    }

    /// The effective description: sizes and format resolved.
    pub fn desc(&self) -> Result<SurfaceDesc> {
        self.with_surface(|_, surface| Ok(surface.desc.clone()))
    }

    pub fn pixel_format(&self) -> Result<LegacyPixelFormat> {
        self.with_surface(|_, surface| Ok(surface.format))
    }

    pub fn lock(&self, read_only: bool) -> Result<LockedRect> {
        self.with_surface_mut(|surface| {
            if surface.locked.is_some() {
                return Err(Error::InvalidArgument("surface is already locked"));
            }
            surface.locked = Some(read_only);
            Ok(LockedRect {
                width: surface.desc.width,
                height: surface.desc.height,
                bytes_per_row: surface.bytes_per_row,
                format: surface.format,
            })
        })
    }

    /// Ends a lock.  Ending a writable lock counts as a content change.
    pub fn unlock(&self) -> Result<()> {
        self.0.write(|registry, _, _| {
            let state = registry.state_of_mut(self.0.id())?;
            let read_only = state.surface_mut()?.locked.take().ok_or(Error::InvalidArgument("surface is not locked"))?;
            if !read_only {
                state.dirty.mark_dirty();
            }
            Ok(())
        })
    }

    pub fn is_locked(&self) -> Result<bool> {
        self.with_surface(|_, surface| Ok(surface.locked.is_some()))
    }

    /// Copies `data` into the shadow buffer at byte `offset`.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.modify_pixels(|surface| {
            let end = offset.checked_add(data.len()).filter(|end| *end <= surface.pixels.len());
            let end = end.ok_or(Error::InvalidArgument("write past the end of the surface"))?;
            surface.pixels[offset..end].copy_from_slice(data);
            Ok(())
        })
    }

    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.with_surface(|_, surface| {
            let end = offset.checked_add(len).filter(|end| *end <= surface.pixels.len());
            let end = end.ok_or(Error::InvalidArgument("read past the end of the surface"))?;
            Ok(surface.pixels[offset..end].to_vec())
        })
    }

    /// Copies all of `source` into this surface.  Sizes and formats must match.
    pub fn blt(&self, source: &Surface) -> Result<()> {
        let source_id = source.0.id();
        self.0.write(|registry, _, _| {
            let pixels = {
                let source = registry.state_of(source_id)?.surface()?;
                let destination = registry.state_of(self.0.id())?.surface()?;
                if (source.desc.width, source.desc.height, source.format)
                    != (destination.desc.width, destination.desc.height, destination.format)
                {
                    return Err(Error::InvalidArgument("blt between surfaces of different sizes or formats"));
                }
                source.pixels.clone()
            };
            let state = registry.state_of_mut(self.0.id())?;
            let surface = state.surface_mut()?;
            writable(surface)?;
            surface.pixels = pixels;
            state.dirty.mark_dirty();
            Ok(())
        })
    }

    /// Fills every pixel with `color`, truncated to the pixel size.
    pub fn color_fill(&self, color: u32) -> Result<()> {
        self.modify_pixels(|surface| {
            let bytes = surface.format.bytes_per_pixel().ok_or(Error::InvalidArgument("can't fill a compressed surface"))?;
            let pattern = &color.to_le_bytes()[..bytes.min(4) as usize];
            for pixel in surface.pixels.chunks_exact_mut(pattern.len()) {
                pixel.copy_from_slice(pattern);
            }
            Ok(())
        })
    }

    /// Uploads the shadow if dirty.  Returns whether anything was uploaded.
    pub fn upload(&self) -> Result<bool> {
        self.0.write(|registry, backend, _| {
            let resource = registry.resource_of(self.0.id())?;
            upload_resource(registry, backend, resource)
        })
    }

    pub fn is_dirty(&self) -> Result<bool> {
        self.with_surface(|state, _| Ok(state.dirty.is_dirty()))
    }

    pub fn dirty_receiver(&self) -> Result<DirtyReceiver> {
        self.with_surface(|state, _| Ok(state.dirty.receiver()))
    }

    /**
    Presents the next back buffer.

    Only a front buffer flips.  Contents rotate one step through the chain (the front buffer
    receives the first back buffer's pixels), every member is uploaded, and slot 0 is presented.
    */
    pub fn flip(&self) -> Result<()> {
        self.0.write(|registry, backend, config| {
            let root = registry.resource_of(self.0.id())?;
            let state = registry.state(root)?;
            if !state.caps.contains(ResourceCaps::FRONT_BUFFER) {
                return Err(Error::InvalidArgument("only a front buffer can flip"));
            }
            let chain = chain::resolve_flip_chain(registry, backend, config, root)?;
            if chain.entries.len() < 2 {
                return Err(Error::InvalidArgument("flip chain has no back buffer"));
            }
            let members = chain.members();
            for member in &members {
                if registry.state(*member)?.surface()?.locked.is_some() {
                    return Err(Error::InvalidArgument("can't flip while a chain member is locked"));
                }
            }
            let mut contents = Vec::with_capacity(members.len());
            for member in &members {
                contents.push(std::mem::take(&mut registry.state_mut(*member)?.surface_mut()?.pixels));
            }
            contents.rotate_left(1);
            for (member, pixels) in members.iter().zip(contents) {
                let state = registry.state_mut(*member)?;
                state.surface_mut()?.pixels = pixels;
                state.dirty.mark_dirty();
            }
            for member in &members {
                upload_resource(registry, backend, *member)?;
            }
            let front = registry.state(members[0])?.backend.ok_or_else(|| Error::inconsistency("surface without a backend object"))?;
            backend.present(chain.entries[0].back_buffer, front)?;
            log::trace!("flipped a chain of {}", members.len());
            Ok(())
        })
    }

    /// Maps the flip chain containing this surface onto swapchain slots.
    pub fn resolve_flip_chain(&self) -> Result<FlipChain> {
        self.0.write(|registry, backend, config| {
            let root = registry.resource_of(self.0.id())?;
            chain::resolve_flip_chain(registry, backend, config, root)
        })
    }

    /// The resources of the `kind` chain starting at this surface.
    pub fn attachment_chain(&self, kind: ChainKind) -> Result<Vec<ResourceId>> {
        self.0.read(|registry| chain::walk(registry, registry.resource_of(self.0.id())?, kind))
    }

    /// The first attached surface matching `caps`, acquired, in this wrapper's generation.
    pub fn get_attached_surface(&self, caps: SurfaceCaps) -> Result<Option<Surface>> {
        let wanted = caps.as_resource_caps();
        let found = self.0.write(|registry, backend, config| {
            let contract = registry.wrapper(self.0.id())?.contract;
            let state = registry.state_of(self.0.id())?;
            let mut candidates: Vec<ResourceId> = state.attachments.iter().map(|(child, _)| child).collect();
            candidates.extend(state.attachments.depth());
            let Some(child) = candidates
                .into_iter()
                .find(|child| registry.states.get(*child).is_some_and(|s| s.caps.contains(wanted)))
            else {
                return Ok(None);
            };
            let owner = registry.owner_of(child)?;
            resolver::resolve(registry, backend, config, owner, contract).map(Some)
        })?;
        Ok(found.map(|id| Surface(self.0.sibling_handle(id))))
    }

    /**
    Attaches `child` to this surface.

    A depth surface becomes the depth attachment.  Anything else is appended to the attachment
    list; attaching the root of a flip ring to its last member closes the ring instead.  The parent
    holds a reference on the child's owning wrapper until it is detached, whichever generation of
    the child was passed in.
    */
    pub fn add_attached_surface(&self, child: &Surface) -> Result<()> {
        let child_wrapper = child.0.id();
        self.0.write(|registry, _, _| {
            let parent = registry.resource_of(self.0.id())?;
            let attached = registry.resource_of(child_wrapper)?;
            if parent == attached {
                return Err(Error::InvalidArgument("a surface can't be attached to itself"));
            }
            let child_state = registry.state(attached)?;
            let child_surface = child_state.surface()?;
            let parent_state = registry.state(parent)?;
            let parent_surface = parent_state.surface()?;

            if child_state.caps.contains(ResourceCaps::DEPTH_TARGET) {
                if parent_state.attachments.depth().is_some() {
                    return Err(Error::ResourceAlreadyBound("surface already has a depth attachment"));
                }
                if child_surface.parent.is_some() {
                    return Err(Error::ResourceAlreadyBound("depth surface is already attached"));
                }
                if (child_surface.desc.width, child_surface.desc.height) != (parent_surface.desc.width, parent_surface.desc.height) {
                    return Err(Error::InvalidArgument("depth attachment size differs from its surface"));
                }
                registry.acquire(registry.owner_of(attached)?)?;
                registry.state_mut(parent)?.attachments.set_depth(Some(attached));
                registry.state_mut(attached)?.surface_mut()?.parent = Some(parent);
                return Ok(());
            }
            if parent_state.attachments.link_of(attached).is_some() {
                return Err(Error::ResourceAlreadyBound("surface is already attached here"));
            }
            if (child_surface.desc.width, child_surface.desc.height) != (parent_surface.desc.width, parent_surface.desc.height) {
                return Err(Error::InvalidArgument("attached surface size differs from its parent"));
            }
            let closes_ring = child_state.caps.contains(ResourceCaps::FLIP)
                && chain::walk(registry, attached, ChainKind::Flip)?.contains(&parent);
            if closes_ring {
                registry.state_mut(parent)?.attachments.push(attached, Link::BackEdge);
                log::debug!("flip ring closed back to {attached:?}");
                return Ok(());
            }
            if child_surface.parent.is_some() {
                return Err(Error::ResourceAlreadyBound("surface is already attached to another surface"));
            }
            registry.acquire(registry.owner_of(attached)?)?;
            registry.state_mut(parent)?.attachments.push(attached, Link::Counted);
            registry.state_mut(attached)?.surface_mut()?.parent = Some(parent);
            Ok(())
        })
    }

    /// Detaches `child`, or with `None` every explicitly attached surface and the depth attachment.
    pub fn delete_attached_surface(&self, child: Option<&Surface>) -> Result<()> {
        let child_wrapper = child.map(|c| c.0.id());
        self.0.write(|registry, backend, _| {
            let parent = registry.resource_of(self.0.id())?;
            let Some(child_wrapper) = child_wrapper else {
                let state = registry.state_mut(parent)?;
                let detached = state.attachments.drain_where(|link| link != Link::Owned);
                let depth = state.attachments.set_depth(None);
                for (attached, link) in detached {
                    if link == Link::Counted {
                        lifecycle::release_attached(registry, backend, attached);
                    }
                }
                if let Some(depth) = depth {
                    lifecycle::release_attached(registry, backend, depth);
                }
                return Ok(());
            };
            let attached = registry.resource_of(child_wrapper)?;
            let state = registry.state_mut(parent)?;
            if state.attachments.depth() == Some(attached) {
                state.attachments.set_depth(None);
                lifecycle::release_attached(registry, backend, attached);
                return Ok(());
            }
            match state.attachments.link_of(attached) {
                None => Err(Error::InvalidArgument("surface is not attached here")),
                Some(Link::Owned) => Err(Error::InvalidArgument("implicitly created surfaces can't be detached")),
                Some(link) => {
                    state.attachments.remove(attached);
                    if link == Link::Counted {
                        lifecycle::release_attached(registry, backend, attached);
                    }
                    Ok(())
                }
            }
        })
    }

    /// The depth attachment's owning wrapper.  Does not acquire.
    pub fn depth_attachment(&self) -> Result<Option<Surface>> {
        let depth = self.0.read(|registry| {
            let Some(depth) = registry.state_of(self.0.id())?.attachments.depth() else {
                return Ok(None);
            };
            registry.owner_of(depth).map(Some)
        })?;
        Ok(depth.map(|id| Surface(self.0.sibling_handle(id))))
    }

    /// The context that created this surface, acquired.  Generation 2 and later.
    pub fn context(&self) -> Result<Context> {
        self.0.require(Contract::Surface(SurfaceVersion::V2))?;
        let owner = self.0.read(|registry| {
            let context = registry.state_of(self.0.id())?.surface()?.context;
            let owner = registry.owner_of(context)?;
            registry.acquire(owner)?;
            Ok(owner)
        })?;
        Ok(Context(self.0.sibling_handle(owner)))
    }

    /// The texture view of this surface.  Requires a texture surface.
    pub fn texture(&self, version: TextureVersion) -> Result<Texture> {
        Ok(Texture(self.0.query(Contract::Texture(version))?))
    }

    /// Generation 4 and later.
    pub fn set_private_data(&self, tag: u128, data: &[u8]) -> Result<()> {
        self.0.require(Contract::Surface(SurfaceVersion::V4))?;
        self.with_surface_mut(|surface| {
            surface.private_data.insert(tag, data.to_vec());
            Ok(())
        })
    }

    pub fn private_data(&self, tag: u128) -> Result<Option<Vec<u8>>> {
        self.0.require(Contract::Surface(SurfaceVersion::V4))?;
        self.with_surface(|_, surface| Ok(surface.private_data.get(&tag).cloned()))
    }

    /// Returns whether anything was stored under `tag`.
    pub fn free_private_data(&self, tag: u128) -> Result<bool> {
        self.0.require(Contract::Surface(SurfaceVersion::V4))?;
        self.with_surface_mut(|surface| Ok(surface.private_data.remove(&tag).is_some()))
    }

    /// A value that changes whenever the content does.  Generation 4 and later.
    pub fn uniqueness_value(&self) -> Result<u64> {
        self.0.require(Contract::Surface(SurfaceVersion::V4))?;
        self.with_surface(|state, _| Ok(state.dirty.uniqueness()))
    }

    /// Forces the uniqueness value forward.  Generation 4 and later.
    pub fn change_uniqueness_value(&self) -> Result<u64> {
        self.0.require(Contract::Surface(SurfaceVersion::V4))?;
        self.with_surface(|state, _| Ok(state.dirty.bump_uniqueness()))
    }

    fn managed<R>(&self, f: impl FnOnce(&mut SurfaceState) -> Result<R>) -> Result<R> {
        self.0.require(Contract::Surface(SurfaceVersion::V7))?;
        self.with_surface_mut(|surface| {
            if !surface.desc.caps.contains(SurfaceCaps::MANAGED) {
                return Err(Error::InvalidArgument("priority and LOD apply only to managed textures"));
            }
            f(surface)
        })
    }

    /// Generation 7, managed textures only.
    pub fn set_priority(&self, priority: u32) -> Result<()> {
        self.managed(|surface| {
            surface.priority = priority;
            Ok(())
        })
    }

    pub fn priority(&self) -> Result<u32> {
        self.managed(|surface| Ok(surface.priority))
    }

    /// Sets the most detailed mip level to keep resident.  Generation 7, managed textures only.
    pub fn set_lod(&self, lod: u32) -> Result<()> {
        self.managed(|surface| {
            if lod >= surface.mip_levels {
                return Err(Error::InvalidArgument("LOD beyond the mip chain"));
            }
            surface.lod = lod;
            Ok(())
        })
    }

    pub fn lod(&self) -> Result<u32> {
        self.managed(|surface| Ok(surface.lod))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisplayMode;
    use crate::state::ContextState;

    fn context_state() -> ContextState {
        ContextState {
            display_mode: DisplayMode::new(320, 200, 16),
            primary: None,
            scene: None,
            swapchain: Default::default(),
        }
    }

    #[test]
    fn primary_takes_display_mode() {
        let desc = SurfaceDesc::new(SurfaceCaps::PRIMARY_SURFACE);
        let plan = plan_creation(&desc, &context_state(), &Config::default()).unwrap();
        assert_eq!((plan.members[0].width, plan.members[0].height), (320, 200));
        assert_eq!(plan.format, LegacyPixelFormat::rgb565());
        assert!(plan.members[0].caps.contains(ResourceCaps::PRIMARY | ResourceCaps::FRONT_BUFFER));
    }

    #[test]
    fn primary_needs_a_sized_display_mode() {
        let state = ContextState { display_mode: DisplayMode::new(0, 0, 16), ..context_state() };
        let desc = SurfaceDesc::new(SurfaceCaps::PRIMARY_SURFACE);
        assert!(matches!(plan_creation(&desc, &state, &Config::default()), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn flip_chain_plan_links_back_buffers_in_order() {
        let desc = SurfaceDesc::new(SurfaceCaps::PRIMARY_SURFACE | SurfaceCaps::FLIP | SurfaceCaps::COMPLEX | SurfaceCaps::THREE_D_DEVICE)
            .with_back_buffers(2);
        let plan = plan_creation(&desc, &context_state(), &Config::default()).unwrap();
        let attach: Vec<_> = plan.members.iter().map(|m| m.attach_to).collect();
        assert_eq!(attach, vec![None, Some(0), Some(1)]);
        assert!(plan.flip_ring);
        assert!(plan.members[2].caps.contains(ResourceCaps::BACK_BUFFER | ResourceCaps::RENDER_TARGET));
    }

    #[test]
    fn rejects_bad_descriptions() {
        let config = Config::default();
        let state = context_state();
        let flip_without_complex = SurfaceDesc::new(SurfaceCaps::FLIP).with_size(8, 8).with_back_buffers(1);
        assert!(matches!(plan_creation(&flip_without_complex, &state, &config), Err(Error::InvalidArgument(_))));
        let too_many = SurfaceDesc::new(SurfaceCaps::FLIP | SurfaceCaps::COMPLEX).with_size(8, 8).with_back_buffers(4);
        assert!(matches!(plan_creation(&too_many, &state, &config), Err(Error::InvalidArgument(_))));
        let no_size = SurfaceDesc::new(SurfaceCaps::OFFSCREEN_PLAIN);
        assert!(matches!(plan_creation(&no_size, &state, &config), Err(Error::InvalidArgument(_))));
        let colour_depth = SurfaceDesc::new(SurfaceCaps::ZBUFFER).with_size(8, 8).with_pixel_format(LegacyPixelFormat::rgb565());
        assert!(matches!(plan_creation(&colour_depth, &state, &config), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn full_mip_chain_halves() {
        let desc = SurfaceDesc::new(SurfaceCaps::TEXTURE | SurfaceCaps::MIPMAP | SurfaceCaps::COMPLEX).with_size(8, 4);
        let plan = plan_creation(&desc, &context_state(), &Config::default()).unwrap();
        let sizes: Vec<_> = plan.members.iter().map(|m| (m.width, m.height)).collect();
        assert_eq!(sizes, vec![(8, 4), (4, 2), (2, 1), (1, 1)]);
        assert!(plan.members[1..].iter().all(|m| m.caps.contains(ResourceCaps::MIP_SUBLEVEL)));
    }

    #[test]
    fn cube_map_has_six_faces() {
        let desc = SurfaceDesc::new(SurfaceCaps::TEXTURE | SurfaceCaps::CUBEMAP | SurfaceCaps::COMPLEX).with_size(16, 16);
        let plan = plan_creation(&desc, &context_state(), &Config::default()).unwrap();
        assert_eq!(plan.members.len(), 6);
        assert_eq!(plan.members.iter().filter(|m| m.caps.contains(ResourceCaps::CUBE_FACE)).count(), 5);
    }

    #[test]
    fn surface_generation_follows_context() {
        assert_eq!(surface_version_for(ContextVersion::V2), SurfaceVersion::V1);
        assert_eq!(surface_version_for(ContextVersion::V7), SurfaceVersion::V7);
    }
}
