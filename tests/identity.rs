// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! One logical resource, many contract generations.

use std::sync::Arc;
use surfaces_and_scenes::backend::{DeviceCommand, PrimitiveType, RecordKind, SoftwareBackend};
use surfaces_and_scenes::{
    Config, Contract, ContextVersion, DeviceFlags, DeviceVersion, Error, ExecuteBuffer, ExecuteInstruction,
    RefDiscipline, Runtime, SceneVersion, SurfaceCaps, SurfaceDesc, SurfaceVersion, TextureVersion, ViewportVersion,
};

fn runtime(config: Config) -> (Arc<Runtime>, Arc<SoftwareBackend>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = Arc::new(SoftwareBackend::new());
    (Runtime::with_backend(config, backend.clone()), backend)
}

fn plain() -> SurfaceDesc {
    SurfaceDesc::new(SurfaceCaps::OFFSCREEN_PLAIN).with_size(16, 16)
}

#[test]
fn same_generation_twice_is_the_same_wrapper() {
    let (runtime, _) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V1).unwrap();
    let surface = context.create_surface(&plain()).unwrap();
    assert_eq!(surface.version().unwrap(), SurfaceVersion::V1);

    let first = surface.as_version(SurfaceVersion::V7).unwrap();
    let second = surface.as_version(SurfaceVersion::V7).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.ref_count().unwrap(), 2);
    //the owner's count is untouched by an independent sibling
    assert_eq!(surface.ref_count().unwrap(), 1);

    let back = first.as_version(SurfaceVersion::V1).unwrap();
    assert_eq!(back, surface);
    assert_eq!(surface.ref_count().unwrap(), 2);
}

#[test]
fn one_generation_reached_from_two_wrappers() {
    let (runtime, _) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V1).unwrap();
    let surface = context.create_surface(&plain()).unwrap();
    let v4 = surface.as_version(SurfaceVersion::V4).unwrap();

    let through_v1 = surface.as_version(SurfaceVersion::V3).unwrap();
    let through_v4 = v4.as_version(SurfaceVersion::V3).unwrap();
    assert_eq!(through_v1, through_v4);
    assert!(through_v1.same_resource(&surface).unwrap());
    assert_eq!(runtime.live_resources(), 2);
}

#[test]
fn generations_share_state() {
    let (runtime, backend) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V1).unwrap();
    let surface = context.create_surface(&plain()).unwrap();
    let v4 = surface.as_version(SurfaceVersion::V4).unwrap();
    let v7 = surface.as_version(SurfaceVersion::V7).unwrap();

    surface.write(0, &[9, 8, 7, 6]).unwrap();
    assert_eq!(v7.read(0, 4).unwrap(), vec![9, 8, 7, 6]);
    assert!(v4.is_dirty().unwrap());

    v4.set_private_data(42, b"tag").unwrap();
    assert_eq!(v7.private_data(42).unwrap(), Some(b"tag".to_vec()));
    assert!(matches!(surface.private_data(42), Err(Error::UnsupportedCapability { .. })));

    //every wrapper of the surface lands on one backend object
    assert_eq!(backend.live_objects_of(RecordKind::Surface), 1);
}

#[test]
fn unsupported_queries_register_nothing() {
    let (runtime, backend) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let surface = context.create_surface(&plain()).unwrap();
    let scene = context.scene(SceneVersion::V7).unwrap();
    let viewport = scene.create_viewport(ViewportVersion::V3).unwrap();
    let wrappers = runtime.live_wrappers();

    assert!(matches!(
        viewport.query(Contract::Surface(SurfaceVersion::V1)),
        Err(Error::UnsupportedCapability { .. })
    ));
    //not a texture surface
    assert!(matches!(surface.texture(TextureVersion::V2), Err(Error::UnsupportedCapability { .. })));
    //not a render target
    assert!(matches!(
        surface.query(Contract::Device(DeviceVersion::V1)),
        Err(Error::UnsupportedCapability { .. })
    ));

    backend.disable_contract(Contract::Surface(SurfaceVersion::V4));
    assert!(matches!(surface.as_version(SurfaceVersion::V4), Err(Error::UnsupportedCapability { .. })));
    assert_eq!(runtime.live_wrappers(), wrappers);
}

#[test]
fn context_generations_create_matching_surfaces() {
    let (runtime, _) = runtime(Config::default());
    for (context_version, surface_version) in [
        (ContextVersion::V1, SurfaceVersion::V1),
        (ContextVersion::V2, SurfaceVersion::V1),
        (ContextVersion::V4, SurfaceVersion::V4),
        (ContextVersion::V7, SurfaceVersion::V7),
    ] {
        let context = runtime.create_context(context_version).unwrap();
        let surface = context.create_surface(&plain()).unwrap();
        assert_eq!(surface.version().unwrap(), surface_version);
    }
}

#[test]
fn texture_view_is_shared_and_counts_on_its_surface() {
    let (runtime, _) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let surface = context.create_surface(&SurfaceDesc::new(SurfaceCaps::TEXTURE).with_size(8, 8)).unwrap();

    let texture = surface.texture(TextureVersion::V2).unwrap();
    assert_eq!(texture.discipline().unwrap(), RefDiscipline::DelegatedToParent);
    assert_eq!(surface.ref_count().unwrap(), 2);
    assert!(!texture.same_resource(&surface).unwrap());

    let old = surface.as_version(SurfaceVersion::V1).unwrap();
    let again = old.texture(TextureVersion::V1).unwrap();
    assert!(again.same_resource(&texture).unwrap());
    assert_eq!(again.as_version(TextureVersion::V2).unwrap(), texture);

    let back = texture.surface(SurfaceVersion::V7).unwrap();
    assert_eq!(back, surface);
}

#[test]
fn scene_is_reached_from_any_context_generation() {
    let (runtime, _) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V1).unwrap();
    let scene = context.scene(SceneVersion::V1).unwrap();
    let newer = context.as_version(ContextVersion::V7).unwrap();
    let scene7 = newer.scene(SceneVersion::V7).unwrap();
    assert!(scene7.same_resource(&scene).unwrap());
    assert_eq!(scene.as_version(SceneVersion::V7).unwrap(), scene7);

    let back = scene.context(ContextVersion::V1).unwrap();
    assert_eq!(back, context);
}

#[test]
fn newest_device_speaks_execute_buffers_through_the_adapter() {
    let (runtime, backend) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let target = context
        .create_surface(&SurfaceDesc::new(SurfaceCaps::THREE_D_DEVICE).with_size(32, 32))
        .unwrap();
    let scene = context.scene(SceneVersion::V7).unwrap();
    let device = scene.create_device(&target, DeviceVersion::V7, DeviceFlags::empty()).unwrap();
    let old = device.as_version(DeviceVersion::V1).unwrap();
    assert!(old.same_resource(&device).unwrap());

    old.begin_scene().unwrap();
    backend.take_commands();
    let buffer = ExecuteBuffer::new()
        .push(ExecuteInstruction::SetRenderState { state: 7, value: 1 })
        .push(ExecuteInstruction::Triangles { count: 2 })
        .push(ExecuteInstruction::Exit)
        .push(ExecuteInstruction::Points { count: 1 });
    old.execute(&buffer).unwrap();
    let commands: Vec<DeviceCommand> = backend.take_commands().into_iter().map(|(_, c)| c).collect();
    assert_eq!(
        commands,
        vec![
            DeviceCommand::SetRenderState { state: 7, value: 1 },
            DeviceCommand::Draw { primitive: PrimitiveType::TriangleList, vertex_count: 6 },
        ]
    );
    assert_eq!(device.render_state(7).unwrap(), Some(1));

    //each generation keeps its own surface of the API
    assert!(matches!(device.execute(&buffer), Err(Error::UnsupportedCapability { .. })));
    assert!(matches!(
        old.draw_primitive(PrimitiveType::PointList, 1),
        Err(Error::UnsupportedCapability { .. })
    ));
    device.draw_primitive(PrimitiveType::PointList, 1).unwrap();
}

#[test]
fn oversized_execute_buffer_draws_are_rejected() {
    let (runtime, backend) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let target = context
        .create_surface(&SurfaceDesc::new(SurfaceCaps::THREE_D_DEVICE).with_size(32, 32))
        .unwrap();
    let scene = context.scene(SceneVersion::V7).unwrap();
    let device = scene.create_device(&target, DeviceVersion::V7, DeviceFlags::THREAD_SAFE).unwrap();
    let old = device.as_version(DeviceVersion::V1).unwrap();
    old.begin_scene().unwrap();
    backend.take_commands();

    let buffer = ExecuteBuffer::new().push(ExecuteInstruction::Triangles { count: u32::MAX });
    assert!(matches!(old.execute(&buffer), Err(Error::InvalidArgument(_))));
    let buffer = ExecuteBuffer::new().push(ExecuteInstruction::Lines { count: u32::MAX });
    assert!(matches!(old.execute(&buffer), Err(Error::InvalidArgument(_))));
    assert!(backend.take_commands().is_empty());
    assert!(!device.is_locked().unwrap());
    old.end_scene().unwrap();
}

#[test]
fn adapter_can_be_switched_off() {
    let (runtime, _) = runtime(Config::default().with_execute_buffer_adapter(false));
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let target = context
        .create_surface(&SurfaceDesc::new(SurfaceCaps::THREE_D_DEVICE).with_size(32, 32))
        .unwrap();
    let scene = context.scene(SceneVersion::V7).unwrap();
    let device = scene.create_device(&target, DeviceVersion::V7, DeviceFlags::empty()).unwrap();
    assert!(matches!(device.as_version(DeviceVersion::V1), Err(Error::UnsupportedCapability { .. })));
    //generation 3 is a plain sibling
    assert!(device.as_version(DeviceVersion::V3).is_ok());
}

#[test]
fn render_target_surfaces_hand_out_their_device() {
    let (runtime, _) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V1).unwrap();
    let surface = context
        .create_surface(&SurfaceDesc::new(SurfaceCaps::THREE_D_DEVICE).with_size(32, 32))
        .unwrap();

    let device = surface.query(Contract::Device(DeviceVersion::V1)).unwrap();
    assert_eq!(device.discipline().unwrap(), RefDiscipline::DelegatedToOrigin);
    assert_eq!(surface.ref_count().unwrap(), 2);

    let again = surface.query(Contract::Device(DeviceVersion::V1)).unwrap();
    assert_eq!(again, device);
    let v2 = surface.query(Contract::Device(DeviceVersion::V2)).unwrap();
    assert!(v2.same_resource(&device).unwrap());
    assert_eq!(surface.ref_count().unwrap(), 4);

    //a surface renders through one device
    let scene = context.scene(SceneVersion::V1).unwrap();
    assert!(matches!(
        scene.create_device(&surface, DeviceVersion::V2, DeviceFlags::empty()),
        Err(Error::ResourceAlreadyBound(_))
    ));
}

#[test]
fn managed_textures_take_priority_and_lod() {
    let (runtime, _) = runtime(Config::default());
    let context = runtime.create_context(ContextVersion::V7).unwrap();
    let managed = context
        .create_surface(
            &SurfaceDesc::new(SurfaceCaps::TEXTURE | SurfaceCaps::MANAGED | SurfaceCaps::MIPMAP | SurfaceCaps::COMPLEX)
                .with_size(8, 8),
        )
        .unwrap();
    managed.set_priority(5).unwrap();
    assert_eq!(managed.priority().unwrap(), 5);
    managed.set_lod(3).unwrap();
    assert_eq!(managed.lod().unwrap(), 3);
    assert!(matches!(managed.set_lod(4), Err(Error::InvalidArgument(_))));

    let plain = context.create_surface(&plain()).unwrap();
    assert!(matches!(plain.set_priority(1), Err(Error::InvalidArgument(_))));
    let old = managed.as_version(SurfaceVersion::V4).unwrap();
    assert!(matches!(old.priority(), Err(Error::UnsupportedCapability { .. })));
}
