use crate::{
    data_structures::{mesh::Topology, texture::Texture},
    device::{AttributeSlot, BlendMode, ShaderKind},
};

/// Everything a scene pipeline varies in. Pipelines are cached by this key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub shader: ShaderKind,
    pub blend: BlendMode,
    pub depth_test: bool,
    pub depth_write: bool,
    pub topology: Topology,
    /// Needed by strip topologies only.
    pub strip_index_format: Option<wgpu::IndexFormat>,
}

/// One vertex buffer per attribute slot, each holding a single tightly
/// packed `f32` vector.
pub fn vertex_layouts() -> [wgpu::VertexBufferLayout<'static>; 4] {
    const POSITION: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
    const NORMAL: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x3];
    const UV: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![2 => Float32x2];
    const TANGENT: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![3 => Float32x3];
    let layout = |slot: AttributeSlot, attributes: &'static [wgpu::VertexAttribute]| {
        wgpu::VertexBufferLayout {
            array_stride: (slot.components() as usize * std::mem::size_of::<f32>())
                as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        }
    };
    [
        layout(AttributeSlot::Position, &POSITION),
        layout(AttributeSlot::Normal, &NORMAL),
        layout(AttributeSlot::Uv, &UV),
        layout(AttributeSlot::Tangent, &TANGENT),
    ]
}

pub fn primitive_topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::Points => wgpu::PrimitiveTopology::PointList,
        Topology::Lines => wgpu::PrimitiveTopology::LineList,
        Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

/// Builds the pipeline for `key` on top of the shared layout.
pub fn mk_scene_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    key: &PipelineKey,
) -> wgpu::RenderPipeline {
    let shader = match key.shader {
        ShaderKind::Pbr => wgpu::ShaderModuleDescriptor {
            label: Some("PBR Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        },
        ShaderKind::Unlit => wgpu::ShaderModuleDescriptor {
            label: Some("Unlit Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("unlit.wgsl").into()),
        },
    };
    let blend = match key.blend {
        BlendMode::Disabled => Some(wgpu::BlendState {
            alpha: wgpu::BlendComponent::REPLACE,
            color: wgpu::BlendComponent::REPLACE,
        }),
        BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
    };
    let depth_compare = if key.depth_test {
        wgpu::CompareFunction::Less
    } else {
        wgpu::CompareFunction::Always
    };

    mk_render_pipeline(
        device,
        layout,
        color_format,
        blend,
        Some((Texture::DEPTH_FORMAT, depth_compare, key.depth_write)),
        wgpu::PrimitiveState {
            topology: primitive_topology(key.topology),
            strip_index_format: key.strip_index_format,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: match key.topology {
                Topology::Triangles | Topology::TriangleStrip => Some(wgpu::Face::Back),
                _ => None,
            },
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        &vertex_layouts(),
        shader,
    )
}

pub fn mk_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    depth: Option<(wgpu::TextureFormat, wgpu::CompareFunction, bool)>,
    primitive: wgpu::PrimitiveState,
    vertex_layouts: &[wgpu::VertexBufferLayout],
    shader: wgpu::ShaderModuleDescriptor,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(shader);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some("Render Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive,
        depth_stencil: depth.map(|(format, depth_compare, depth_write_enabled)| {
            wgpu::DepthStencilState {
                format,
                depth_write_enabled: Some(depth_write_enabled),
                depth_compare: Some(depth_compare),
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview_mask: None,
    })
}
