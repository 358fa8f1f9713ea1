use scene_ngin::{
    data_structures::{camera::Camera, entity::EntityAllocator, material::Material},
    device::recording::{GpuCommand, RecordingDevice},
    error::EngineError,
    resources::{buffers::GpuResources, uniform_block::UniformBlock},
};

#[test]
fn properties_are_packed_in_declaration_order() {
    let mut block = UniformBlock::new();
    block.define_float("exposure", 1.0).unwrap();
    block.define_vec3("tint", [1.0, 0.5, 0.25]).unwrap();
    block.define_mat4("model", [[0.0; 4]; 4]).unwrap();
    block.define_vec2("uv_scale", [2.0, 2.0]).unwrap();

    let offsets: Vec<usize> = block.properties().iter().map(|p| p.offset).collect();
    assert_eq!(offsets, vec![0, 4, 16, 80]);
    assert_eq!(block.size(), 88);
    assert_eq!(block.bytes().len(), 88);
}

#[test]
fn setters_upload_only_the_changed_property() {
    let device = RecordingDevice::new();
    let probe = device.probe();
    let mut gpu = GpuResources::new(device);
    let mut block = UniformBlock::new();
    block.define_float("exposure", 1.0).unwrap();
    block.define_vec3("tint", [1.0, 1.0, 1.0]).unwrap();
    let buffer = block.create_buffer(&mut gpu, 42).unwrap();
    probe.borrow_mut().clear_commands();

    assert!(block.set_vec3(&mut gpu, "tint", [0.0, 0.5, 1.0]));
    let recording = probe.borrow();
    assert_eq!(
        recording.commands,
        vec![GpuCommand::WriteBuffer {
            buffer,
            offset: 4,
            len: 12
        }]
    );
    let expected: Vec<u8> = bytemuck::cast_slice(&[1.0f32, 0.0, 0.5, 1.0]).to_vec();
    assert_eq!(recording.buffer_contents(buffer), Some(expected.as_slice()));
}

#[test]
fn layout_is_frozen_once_the_buffer_exists() {
    let mut gpu = GpuResources::new(RecordingDevice::new());
    let mut block = UniformBlock::new();
    block.define_float("exposure", 1.0).unwrap();
    assert!(matches!(
        block.define_float("exposure", 2.0),
        Err(EngineError::DuplicateProperty(_))
    ));
    block.create_buffer(&mut gpu, 1).unwrap();

    assert!(matches!(
        block.define_float("late", 0.0),
        Err(EngineError::BlockSealed(_))
    ));
    assert!(matches!(
        block.create_buffer(&mut gpu, 1),
        Err(EngineError::BufferAlreadyCreated)
    ));
    assert_eq!(gpu.uniform_buffer_count(), 1);
}

#[test]
fn unknown_or_mistyped_properties_are_not_written() {
    let device = RecordingDevice::new();
    let probe = device.probe();
    let mut gpu = GpuResources::new(device);
    let mut block = UniformBlock::new();
    block.define_vec2("offset", [0.0, 0.0]).unwrap();
    block.create_buffer(&mut gpu, 3).unwrap();
    probe.borrow_mut().clear_commands();

    assert!(!block.set_float(&mut gpu, "missing", 1.0));
    assert!(!block.set_float(&mut gpu, "missing", 2.0));
    assert!(!block.set_float(&mut gpu, "offset", 1.0));
    assert!(probe.borrow().commands.is_empty());
    assert_eq!(block.property("offset").unwrap().value(), &[0.0, 0.0]);
}

#[test]
fn values_set_before_creation_are_uploaded_with_the_buffer() {
    let device = RecordingDevice::new();
    let probe = device.probe();
    let mut gpu = GpuResources::new(device);
    let mut block = UniformBlock::new();
    block.define_float("exposure", 1.0).unwrap();

    assert!(block.set_float(&mut gpu, "exposure", 3.0));
    assert!(probe.borrow().commands.is_empty());
    let buffer = block.create_buffer(&mut gpu, 9).unwrap();
    assert_eq!(
        probe.borrow().buffer_contents(buffer),
        Some(3.0f32.to_le_bytes().as_slice())
    );

    block.release(&mut gpu);
    assert!(!block.is_created());
    assert_eq!(probe.borrow().live_buffers(), 0);
}

#[test]
fn engine_blocks_match_their_shader_structs() {
    let mut ids = EntityAllocator::new();
    let mut gpu = GpuResources::new(RecordingDevice::new());

    let material = Material::new(&mut ids, "Plain");
    assert_eq!(material.uniforms().size(), 60);

    let mut camera = Camera::default();
    camera
        .sync(&mut gpu, ids.create(), cgmath::Matrix4::from_scale(1.0))
        .unwrap();
    let block = camera.uniforms();
    assert_eq!(block.property(Camera::VIEW).unwrap().offset, 0);
    assert_eq!(block.property(Camera::PROJECTION).unwrap().offset, 64);
    assert_eq!(block.property(Camera::POSITION).unwrap().offset, 128);
    assert_eq!(block.size(), 140);
}
