//! Render pipelines: lit (`basic`), `unlit`, `transparent` for the main pass
//! and the depth-only `shadow` pipeline. `light` owns the light uniform and
//! the shadow map they share.

pub mod basic;
pub mod light;
pub mod shadow;
pub mod transparent;
pub mod unlit;

use basic::PipelineTarget;

/// One main-pass pipeline built twice: with back-face culling and without,
/// for double-sided materials.
pub struct CullVariants {
    pub culled: wgpu::RenderPipeline,
    pub double_sided: wgpu::RenderPipeline,
}

impl CullVariants {
    fn new(
        target: PipelineTarget,
        mk: impl Fn(PipelineTarget) -> wgpu::RenderPipeline,
    ) -> Self {
        Self {
            culled: mk(target),
            double_sided: mk(target.double_sided()),
        }
    }

    pub fn for_cull_mode(&self, cull_mode: Option<wgpu::Face>) -> &wgpu::RenderPipeline {
        match cull_mode {
            None => &self.double_sided,
            Some(_) => &self.culled,
        }
    }
}

pub struct Pipelines {
    pub basic: CullVariants,
    pub unlit: CullVariants,
    pub transparent: CullVariants,
    pub shadow: wgpu::RenderPipeline,
    pub sample_count: u32,
}

impl Pipelines {
    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        sample_count: u32,
        material_bind_group_layout: &wgpu::BindGroupLayout,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
        light: &light::LightResources,
    ) -> Self {
        let layout = basic::mk_scene_pipeline_layout(
            device,
            material_bind_group_layout,
            camera_bind_group_layout,
            &light.bind_group_layout,
        );
        let target = PipelineTarget {
            format,
            sample_count,
            cull_mode: Some(wgpu::Face::Back),
        };
        Self {
            basic: CullVariants::new(target, |t| basic::mk_basic_pipeline(device, t, &layout)),
            unlit: CullVariants::new(target, |t| unlit::mk_unlit_pipeline(device, t, &layout)),
            transparent: CullVariants::new(target, |t| {
                transparent::mk_transparent_pipeline(device, t, &layout)
            }),
            shadow: shadow::mk_shadow_pipeline(device, &light.shadow_bind_group_layout),
            sample_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_sided_target_only_drops_culling() {
        let target = PipelineTarget {
            format: wgpu::TextureFormat::Bgra8UnormSrgb,
            sample_count: 4,
            cull_mode: Some(wgpu::Face::Back),
        };
        let double_sided = target.double_sided();
        assert_eq!(double_sided.cull_mode, None);
        assert_eq!(double_sided.format, target.format);
        assert_eq!(double_sided.sample_count, 4);
    }
}
