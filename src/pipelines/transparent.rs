use crate::{
    data_structures::{
        instance::InstanceRaw,
        model::{ModelVertex, Vertex},
        texture::Texture,
    },
    pipelines::basic::{PipelineTarget, mk_render_pipeline},
};

/**
 * Lit pipeline for materials with opacity below one (the clouds).
 *
 * Shares the lit shader with the basic pipeline; the material's alpha is
 * blended over what is already drawn. Depth is tested but not written so
 * overlapping puffs don't cut holes into each other, which is why batches
 * drawn with this pipeline have to be sorted back to front.
 */
pub fn mk_transparent_pipeline(
    device: &wgpu::Device,
    target: PipelineTarget,
    layout: &wgpu::PipelineLayout,
) -> wgpu::RenderPipeline {
    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Transparent Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("basic.wgsl").into()),
    };
    mk_render_pipeline(
        device,
        "Transparent Pipeline",
        layout,
        target,
        Some(wgpu::BlendState::ALPHA_BLENDING),
        Some(Texture::DEPTH_FORMAT),
        false,
        &[ModelVertex::desc(), InstanceRaw::desc()],
        shader,
    )
}
