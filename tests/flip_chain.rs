// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Flip chains, their swapchain mapping, and the other attachment chains.

use std::sync::Arc;
use surfaces_and_scenes::backend::{RecordKind, SoftwareBackend};
use surfaces_and_scenes::{
    ChainKind, Config, Context, ContextVersion, DisplayMode, Error, Runtime, Surface, SurfaceCaps, SurfaceDesc,
};

fn runtime(config: Config) -> (Arc<Runtime>, Arc<SoftwareBackend>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = Arc::new(SoftwareBackend::new());
    let config = config.with_default_display_mode(DisplayMode::new(64, 48, 32));
    (Runtime::with_backend(config, backend.clone()), backend)
}

fn primary_chain(context: &Context, back_buffers: u32) -> Surface {
    let desc = SurfaceDesc::new(SurfaceCaps::PRIMARY_SURFACE | SurfaceCaps::COMPLEX | SurfaceCaps::FLIP)
        .with_back_buffers(back_buffers);
    context.create_surface(&desc).unwrap()
}

#[test]
fn front_buffer_takes_slot_zero() {
    let (runtime, backend) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let front = primary_chain(&context, 2);

    let chain = front.resolve_flip_chain().unwrap();
    assert_eq!(chain.entries.len(), 3);
    assert_eq!(chain.entries[0].resource, front.resource_id().unwrap());
    assert_eq!(chain.slots(), vec![0, 1, 2]);
    for entry in &chain.entries {
        assert_eq!(backend.swapchain_slot(entry.back_buffer).map(|(_, slot)| slot), Some(entry.slot));
    }
    assert_eq!(backend.live_objects_of(RecordKind::SwapchainBuffer), 3);

    let back = front.get_attached_surface(SurfaceCaps::BACK_BUFFER).unwrap().unwrap();
    assert_eq!(chain.entries[1].resource, back.resource_id().unwrap());
    assert_eq!(front.attachment_chain(ChainKind::Flip).unwrap(), chain.members());
}

#[test]
fn single_back_buffer_mode_flattens_every_slot() {
    let (runtime, backend) = runtime(Config::default().with_single_back_buffer(true));
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let front = primary_chain(&context, 2);

    let chain = front.resolve_flip_chain().unwrap();
    assert_eq!(chain.slots(), vec![0, 0, 0]);
    let buffer = chain.entries[0].back_buffer;
    assert!(chain.entries.iter().all(|e| e.back_buffer == buffer));
    assert_eq!(backend.live_objects_of(RecordKind::SwapchainBuffer), 1);
}

#[test]
fn resolution_is_deterministic_from_any_member() {
    let (runtime, backend) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let front = primary_chain(&context, 2);
    let first = front.resolve_flip_chain().unwrap();
    let again = front.resolve_flip_chain().unwrap();
    assert_eq!(first, again);

    let back = front.get_attached_surface(SurfaceCaps::BACK_BUFFER).unwrap().unwrap();
    let from_back = back.resolve_flip_chain().unwrap();
    assert_eq!(from_back, first);
    assert_eq!(backend.live_objects_of(RecordKind::SwapchainBuffer), 3);
}

#[test]
fn reset_rewalks_with_fresh_buffers() {
    let (runtime, backend) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let front = primary_chain(&context, 1);
    let before = front.resolve_flip_chain().unwrap();
    let generation = context.swapchain_generation().unwrap();

    context.reset_swapchain().unwrap();
    assert!(context.swapchain_generation().unwrap() > generation);
    for entry in &before.entries {
        assert_eq!(backend.ref_count(entry.back_buffer), None);
    }
    assert_eq!(backend.live_objects_of(RecordKind::SwapchainBuffer), 0);

    let after = front.resolve_flip_chain().unwrap();
    assert_eq!(after.members(), before.members());
    assert_eq!(after.slots(), before.slots());
    assert_ne!(after.generation, before.generation);
    for (old, new) in before.entries.iter().zip(&after.entries) {
        assert_ne!(old.back_buffer, new.back_buffer);
    }
}

#[test]
fn display_mode_changes_reset_the_swapchain() {
    let (runtime, _) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let front = primary_chain(&context, 1);
    let before = front.resolve_flip_chain().unwrap();

    context.set_display_mode(DisplayMode::new(64, 48, 16)).unwrap();
    let after = front.resolve_flip_chain().unwrap();
    assert_ne!(after.generation, before.generation);
    assert!(matches!(context.set_display_mode(DisplayMode::new(32, 32, 32)), Err(Error::InvalidArgument(_))));
    assert!(matches!(context.set_display_mode(DisplayMode::new(64, 48, 12)), Err(Error::InvalidArgument(_))));
}

#[test]
fn swapchain_failures_leave_no_buffers() {
    let (runtime, backend) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let front = primary_chain(&context, 2);

    backend.fail_swapchain_buffers(true);
    assert!(matches!(front.resolve_flip_chain(), Err(Error::BackendResourceCreationFailed(_))));
    assert_eq!(backend.live_objects_of(RecordKind::SwapchainBuffer), 0);
    backend.fail_swapchain_buffers(false);
    assert_eq!(front.resolve_flip_chain().unwrap().entries.len(), 3);
}

#[test]
fn flip_rotates_contents_and_presents_slot_zero() {
    let (runtime, backend) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let front = primary_chain(&context, 1);
    let back = front.get_attached_surface(SurfaceCaps::BACK_BUFFER).unwrap().unwrap();
    front.write(0, &[1; 4]).unwrap();
    back.write(0, &[2; 4]).unwrap();

    front.flip().unwrap();
    assert_eq!(front.read(0, 4).unwrap(), vec![2; 4]);
    assert_eq!(back.read(0, 4).unwrap(), vec![1; 4]);
    assert!(!front.is_dirty().unwrap());
    assert!(!back.is_dirty().unwrap());

    let chain = front.resolve_flip_chain().unwrap();
    let presents = backend.presents();
    assert_eq!(presents.len(), 1);
    assert_eq!(presents[0].0, chain.entries[0].back_buffer);
    let shown = backend.contents(chain.entries[0].back_buffer).unwrap();
    assert_eq!(&shown[..4], &[2; 4]);
}

#[test]
fn only_an_unlocked_front_buffer_flips() {
    let (runtime, backend) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let front = primary_chain(&context, 1);
    let back = front.get_attached_surface(SurfaceCaps::BACK_BUFFER).unwrap().unwrap();
    assert!(matches!(back.flip(), Err(Error::InvalidArgument(_))));

    back.lock(false).unwrap();
    assert!(matches!(front.flip(), Err(Error::InvalidArgument(_))));
    back.unlock().unwrap();
    front.flip().unwrap();
    assert_eq!(backend.presents().len(), 1);

    let lone = context
        .create_surface(&SurfaceDesc::new(SurfaceCaps::FRONT_BUFFER).with_size(64, 48))
        .unwrap();
    assert!(matches!(lone.flip(), Err(Error::InvalidArgument(_))));
}

#[test]
fn depth_attachment_travels_with_the_chain() {
    let (runtime, _) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let front = primary_chain(&context, 1);
    let depth = context.create_surface(&SurfaceDesc::new(SurfaceCaps::ZBUFFER).with_size(64, 48)).unwrap();

    front.add_attached_surface(&depth).unwrap();
    assert_eq!(front.resolve_flip_chain().unwrap().depth, Some(depth.resource_id().unwrap()));
    assert_eq!(front.depth_attachment().unwrap(), Some(depth.clone()));
    assert_eq!(front.get_attached_surface(SurfaceCaps::ZBUFFER).unwrap(), Some(depth.clone()));
    assert_eq!(depth.ref_count().unwrap(), 3);
    depth.release().unwrap();

    let other = context.create_surface(&SurfaceDesc::new(SurfaceCaps::ZBUFFER).with_size(64, 48)).unwrap();
    assert!(matches!(front.add_attached_surface(&other), Err(Error::ResourceAlreadyBound(_))));

    front.delete_attached_surface(Some(&depth)).unwrap();
    assert_eq!(depth.ref_count().unwrap(), 1);
    assert_eq!(front.resolve_flip_chain().unwrap().depth, None);
}

#[test]
fn chains_built_by_hand_resolve_like_implicit_ones() {
    let (runtime, _) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let front = context.create_surface(&SurfaceDesc::new(SurfaceCaps::FRONT_BUFFER).with_size(16, 16)).unwrap();
    let back = context.create_surface(&SurfaceDesc::new(SurfaceCaps::BACK_BUFFER).with_size(16, 16)).unwrap();

    front.add_attached_surface(&back).unwrap();
    assert_eq!(back.ref_count().unwrap(), 2);
    assert!(matches!(front.add_attached_surface(&back), Err(Error::ResourceAlreadyBound(_))));
    //closing the ring doesn't count
    back.add_attached_surface(&front).unwrap();
    assert_eq!(front.ref_count().unwrap(), 1);

    let chain = back.resolve_flip_chain().unwrap();
    assert_eq!(chain.members(), vec![front.resource_id().unwrap(), back.resource_id().unwrap()]);
    assert_eq!(chain.slots(), vec![0, 1]);
    front.write(0, &[5; 4]).unwrap();
    front.flip().unwrap();
    assert_eq!(back.read(0, 4).unwrap(), vec![5; 4]);

    let wrong_size = context.create_surface(&SurfaceDesc::new(SurfaceCaps::BACK_BUFFER).with_size(8, 8)).unwrap();
    assert!(matches!(back.add_attached_surface(&wrong_size), Err(Error::InvalidArgument(_))));
    assert!(matches!(front.add_attached_surface(&front), Err(Error::InvalidArgument(_))));

    front.delete_attached_surface(None).unwrap();
    assert_eq!(back.ref_count().unwrap(), 1);
    assert_eq!(front.attachment_chain(ChainKind::Flip).unwrap().len(), 1);
}

#[test]
fn mip_and_cube_chains() {
    let (runtime, _) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let mipped = context
        .create_surface(&SurfaceDesc::new(SurfaceCaps::TEXTURE | SurfaceCaps::MIPMAP | SurfaceCaps::COMPLEX).with_size(8, 8))
        .unwrap();
    let levels = mipped.attachment_chain(ChainKind::Mip).unwrap();
    assert_eq!(levels.len(), 4);
    let level = mipped.get_attached_surface(SurfaceCaps::MIPMAP).unwrap().unwrap();
    assert_eq!((level.desc().unwrap().width, level.desc().unwrap().height), (4, 4));
    assert_eq!(level.resource_id().unwrap(), levels[1]);

    let before = context.surface_count().unwrap();
    let cube = context
        .create_surface(
            &SurfaceDesc::new(SurfaceCaps::TEXTURE | SurfaceCaps::CUBEMAP | SurfaceCaps::MIPMAP | SurfaceCaps::COMPLEX)
                .with_size(8, 8),
        )
        .unwrap();
    assert_eq!(cube.attachment_chain(ChainKind::CubeFaces).unwrap().len(), 6);
    assert_eq!(cube.attachment_chain(ChainKind::Mip).unwrap().len(), 4);
    assert_eq!(context.surface_count().unwrap() - before, 24);
    cube.release().unwrap();
    assert_eq!(context.surface_count().unwrap(), before);
}
