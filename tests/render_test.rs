use cgmath::Vector3;
use scene_ngin::{
    data_structures::{
        material::AlphaMode,
        mesh::{IndexType, Mesh},
    },
    device::{recording::GpuCommand, UniformSlot},
    error::EngineError,
};

use crate::common::test_utils::{
    add_camera, add_material, add_quad, add_renderable, recording_world, vertex_array,
};

mod common;

/// Pipeline state changes, frame boundaries and draws, in order.
fn state_trace(commands: &[GpuCommand]) -> Vec<String> {
    commands
        .iter()
        .filter_map(|command| match command {
            GpuCommand::BeginFrame => Some("BeginFrame".to_string()),
            GpuCommand::EndFrame => Some("EndFrame".to_string()),
            GpuCommand::DepthTest(on) => Some(format!("DepthTest({})", on)),
            GpuCommand::DepthWrite(on) => Some(format!("DepthWrite({})", on)),
            GpuCommand::Blend(mode) => Some(format!("Blend({:?})", mode)),
            GpuCommand::Draw { .. } => Some("Draw".to_string()),
            _ => None,
        })
        .collect()
}

#[test]
fn transparent_objects_draw_back_to_front() {
    let (mut world, probe) = recording_world();
    add_camera(&mut world, Vector3::new(0.0, 0.0, 0.0));
    let glass = add_material(&mut world, "Glass", AlphaMode::Blend);
    let near = add_quad(&mut world, "Near");
    let far = add_quad(&mut world, "Far");
    let middle = add_quad(&mut world, "Middle");
    add_renderable(&mut world, "Near", near, glass, Vector3::new(0.0, 0.0, -1.0));
    add_renderable(&mut world, "Far", far, glass, Vector3::new(0.0, 0.0, -5.0));
    add_renderable(&mut world, "Middle", middle, glass, Vector3::new(0.0, 0.0, -3.0));
    probe.borrow_mut().clear_commands();

    let stats = world.render_frame().unwrap();
    assert_eq!(stats.draw_calls, 3);
    assert_eq!(
        probe.borrow().draws(),
        vec![
            vertex_array(&world, far),
            vertex_array(&world, middle),
            vertex_array(&world, near),
        ]
    );
}

#[test]
fn opaque_pass_runs_before_blending_is_enabled() {
    let (mut world, probe) = recording_world();
    add_camera(&mut world, Vector3::new(0.0, 0.0, 5.0));
    let glass = add_material(&mut world, "Glass", AlphaMode::Blend);
    let stone = add_material(&mut world, "Stone", AlphaMode::Opaque);
    let pane = add_quad(&mut world, "Pane");
    let wall = add_quad(&mut world, "Wall");
    // the transparent object is added first and still drawn last
    add_renderable(&mut world, "Pane", pane, glass, Vector3::new(0.0, 0.0, 0.0));
    add_renderable(&mut world, "Wall", wall, stone, Vector3::new(0.0, 0.0, -2.0));
    probe.borrow_mut().clear_commands();

    world.render_frame().unwrap();
    let recording = probe.borrow();
    assert_eq!(
        state_trace(&recording.commands),
        vec![
            "BeginFrame",
            "DepthTest(true)",
            "DepthWrite(true)",
            "Blend(Disabled)",
            "Draw",
            "Blend(Alpha)",
            "Draw",
            "Blend(Disabled)",
            "DepthWrite(true)",
            "EndFrame",
        ]
    );
    assert_eq!(
        recording.draws(),
        vec![vertex_array(&world, wall), vertex_array(&world, pane)]
    );
}

#[test]
fn objects_sharing_a_material_bind_it_once() {
    let (mut world, probe) = recording_world();
    add_camera(&mut world, Vector3::new(0.0, 0.0, 5.0));
    let red = add_material(&mut world, "Red", AlphaMode::Opaque);
    let blue = add_material(&mut world, "Blue", AlphaMode::Opaque);
    let a = add_quad(&mut world, "A");
    let b = add_quad(&mut world, "B");
    let c = add_quad(&mut world, "C");
    add_renderable(&mut world, "A", a, red, Vector3::new(0.0, 0.0, 0.0));
    add_renderable(&mut world, "B", b, blue, Vector3::new(1.0, 0.0, 0.0));
    add_renderable(&mut world, "C", c, red, Vector3::new(2.0, 0.0, 0.0));
    probe.borrow_mut().clear_commands();

    world.render_frame().unwrap();
    let recording = probe.borrow();
    let material_binds = recording
        .commands
        .iter()
        .filter(|command| {
            matches!(
                command,
                GpuCommand::BindUniform {
                    slot: UniformSlot::Material,
                    ..
                }
            )
        })
        .count();
    assert_eq!(material_binds, 2);
    assert_eq!(
        recording.draws(),
        vec![
            vertex_array(&world, a),
            vertex_array(&world, c),
            vertex_array(&world, b),
        ]
    );
}

#[test]
fn renderers_without_a_live_material_are_left_out() {
    let (mut world, probe) = recording_world();
    add_camera(&mut world, Vector3::new(0.0, 0.0, 5.0));
    let kept = add_material(&mut world, "Kept", AlphaMode::Opaque);
    let gone = add_material(&mut world, "Gone", AlphaMode::Opaque);
    let quad = add_quad(&mut world, "Quad");
    add_renderable(&mut world, "Visible", quad, kept, Vector3::new(0.0, 0.0, 0.0));
    add_renderable(&mut world, "Orphan", quad, gone, Vector3::new(0.0, 0.0, 0.0));
    assert!(world.destroy_material(gone));

    let stats = world.render_frame().unwrap();
    assert_eq!(stats.draw_calls, 1);
    assert!(stats.errors.is_empty());
    assert_eq!(probe.borrow().draws().len(), 1);
}

#[test]
fn materials_without_a_shader_are_skipped() {
    let (mut world, probe) = recording_world();
    add_camera(&mut world, Vector3::new(0.0, 0.0, 5.0));
    let hidden = add_material(&mut world, "Hidden", AlphaMode::Opaque);
    world.materials.get_mut(hidden).unwrap().shader = None;
    let quad = add_quad(&mut world, "Quad");
    add_renderable(&mut world, "Invisible", quad, hidden, Vector3::new(0.0, 0.0, 0.0));

    let stats = world.render_frame().unwrap();
    assert_eq!(stats.draw_calls, 0);
    assert_eq!(stats.skipped, 1);
    assert!(probe.borrow().draws().is_empty());
}

#[test]
fn index_width_follows_the_largest_index() {
    let (mut world, probe) = recording_world();
    add_camera(&mut world, Vector3::new(0.0, 0.0, 5.0));
    let material = add_material(&mut world, "Plain", AlphaMode::Opaque);
    let positions = vec![[0.0, 0.0, 0.0]; 3];
    let cases = [
        (vec![0, 1, 255], IndexType::U8),
        (vec![0, 1, 256], IndexType::U16),
        (vec![0, 1, 70_000], IndexType::U32),
    ];
    for (i, (indices, _)) in cases.iter().enumerate() {
        let name = format!("Mesh {}", i);
        let mesh = Mesh::new(&mut world.ids, name.clone(), positions.clone(), indices.clone());
        let mesh = world.add_mesh(mesh).unwrap();
        add_renderable(&mut world, &name, mesh, material, Vector3::new(0.0, 0.0, 0.0));
    }
    probe.borrow_mut().clear_commands();

    world.render_frame().unwrap();
    let drawn: Vec<(IndexType, u32)> = probe
        .borrow()
        .commands
        .iter()
        .filter_map(|command| match command {
            GpuCommand::Draw {
                index_type, count, ..
            } => Some((*index_type, *count)),
            _ => None,
        })
        .collect();
    let expected: Vec<(IndexType, u32)> = cases.iter().map(|(_, ty)| (*ty, 3)).collect();
    assert_eq!(drawn, expected);
}

#[test]
fn empty_index_arrays_are_rejected() {
    let (mut world, probe) = recording_world();
    let mesh = Mesh::new(&mut world.ids, "Empty", vec![[0.0; 3]; 3], Vec::new());
    let buffers_before = probe.borrow().live_buffers();
    assert!(matches!(
        world.add_mesh(mesh),
        Err(EngineError::EmptyIndexBuffer)
    ));
    assert_eq!(probe.borrow().live_buffers(), buffers_before);
    assert!(world.meshes.is_empty());
}

#[test]
fn missing_main_camera_is_reported() {
    let (mut world, probe) = recording_world();
    let material = add_material(&mut world, "Plain", AlphaMode::Opaque);
    let quad = add_quad(&mut world, "Quad");
    add_renderable(&mut world, "Unseen", quad, material, Vector3::new(0.0, 0.0, 0.0));

    world.frame(instant::Duration::from_millis(16));
    assert_eq!(world.diagnostics.reported(), 1);
    assert_eq!(world.diagnostics.last().unwrap().kind, "NullReference");
    assert!(probe.borrow().draws().is_empty());
}

#[test]
fn destroying_objects_releases_their_buffers() {
    let (mut world, probe) = recording_world();
    add_camera(&mut world, Vector3::new(0.0, 0.0, 5.0));
    let material = add_material(&mut world, "Plain", AlphaMode::Opaque);
    let quad = add_quad(&mut world, "Quad");
    let object = add_renderable(
        &mut world,
        "Short Lived",
        quad,
        material,
        Vector3::new(0.0, 0.0, 0.0),
    );
    world.render_frame().unwrap();
    let live = probe.borrow().live_buffers();

    assert!(world.destroy_game_object(object).unwrap());
    // the object uniform block goes, mesh and material buffers stay
    assert_eq!(probe.borrow().live_buffers(), live - 1);

    assert!(world.destroy_mesh(quad));
    assert_eq!(probe.borrow().live_vertex_arrays(), 0);

    world.shutdown();
    assert_eq!(probe.borrow().live_buffers(), 0);
}
