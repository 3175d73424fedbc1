use crate::{
    data_structures::{
        instance::InstanceRaw,
        model::{ModelVertex, Vertex},
        texture::Texture,
    },
    pipelines::basic::{PipelineTarget, mk_render_pipeline},
};

/// Flat coloured surfaces that ignore lights and shadows, e.g. the sun.
pub fn mk_unlit_pipeline(
    device: &wgpu::Device,
    target: PipelineTarget,
    layout: &wgpu::PipelineLayout,
) -> wgpu::RenderPipeline {
    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Unlit Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("unlit.wgsl").into()),
    };
    mk_render_pipeline(
        device,
        "Unlit Pipeline",
        layout,
        target,
        Some(wgpu::BlendState::REPLACE),
        Some(Texture::DEPTH_FORMAT),
        true,
        &[ModelVertex::desc(), InstanceRaw::desc()],
        shader,
    )
}
