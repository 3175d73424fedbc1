use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Vector3};
use wgpu::util::DeviceExt;

use crate::{
    camera::OPENGL_TO_WGPU_MATRIX,
    data_structures::{scene_graph::Scene, texture::Texture},
};

/// Slope of the depth comparison offset, in light clip space.
const SHADOW_BIAS: f32 = 0.0015;
const FALLBACK_SHADOW_MAP_SIZE: u32 = 1;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    /// Unit vector pointing from the surface towards the light.
    direction: [f32; 4],
    // rgb colour, intensity in w
    color: [f32; 4],
    ambient: [f32; 4],
    view_proj: [[f32; 4]; 4],
    // texel size, depth bias, shadows enabled, unused
    shadow: [f32; 4],
}

impl LightUniform {
    /// Collect the directional and ambient light of `scene`. Without a
    /// directional light only the ambient term contributes.
    pub fn from_scene(scene: &Scene) -> Self {
        let ambient = scene.ambient();
        let mut uniform = Self {
            direction: [0.0, 1.0, 0.0, 0.0],
            color: [0.0; 4],
            ambient: [ambient[0], ambient[1], ambient[2], 1.0],
            view_proj: Matrix4::from_scale(1.0).into(),
            shadow: [0.0; 4],
        };

        if let Some((position, light)) = scene.directional_light() {
            let position = Point3::from_vec(position);
            let towards_light = (position - light.target).normalize();
            uniform.direction = towards_light.extend(0.0).into();
            uniform.color = [light.color[0], light.color[1], light.color[2], light.intensity];
            uniform.view_proj = light_view_proj(position, light.target, light.shadow_extent).into();
            if light.cast_shadow {
                uniform.shadow = [1.0 / light.shadow_map_size.max(1) as f32, SHADOW_BIAS, 1.0, 0.0];
            }
        }
        uniform
    }

    pub fn direction(&self) -> Vector3<f32> {
        Vector3::new(self.direction[0], self.direction[1], self.direction[2])
    }

    pub fn shadows_enabled(&self) -> bool {
        self.shadow[2] > 0.5
    }
}

/// Orthographic view-projection of a directional light at `position`
/// shining at `target`, covering a box of half width `extent`.
pub fn light_view_proj(position: Point3<f32>, target: Point3<f32>, extent: f32) -> Matrix4<f32> {
    let forward = target - position;
    // look_at degenerates when looking straight down the up axis
    let up = if forward.normalize().y.abs() > 0.99 {
        Vector3::unit_z()
    } else {
        Vector3::unit_y()
    };
    let view = Matrix4::look_at_rh(position, target, up);
    let far = forward.magnitude() + extent * 2.0;
    let proj = cgmath::ortho(-extent, extent, -extent, extent, 0.1, far);
    OPENGL_TO_WGPU_MATRIX * proj * view
}

/// Uniform buffer, shadow map and the bind groups that expose them.
///
/// `bind_group` is used by the main pass (light uniform plus shadow map),
/// `shadow_bind_group` by the depth-only shadow pass which renders into the
/// very map the main pass samples.
pub struct LightResources {
    pub uniform: LightUniform,
    pub buffer: wgpu::Buffer,
    pub shadow_map: Texture,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub bind_group: wgpu::BindGroup,
    pub shadow_bind_group_layout: wgpu::BindGroupLayout,
    pub shadow_bind_group: wgpu::BindGroup,
}

impl LightResources {
    pub fn new(device: &wgpu::Device, scene: &Scene) -> Self {
        let uniform = LightUniform::from_scene(scene);
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Light Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let resolution = scene
            .directional_light()
            .filter(|(_, light)| light.cast_shadow)
            .map_or(FALLBACK_SHADOW_MAP_SIZE, |(_, light)| light.shadow_map_size);
        let shadow_map = Texture::create_shadow_map(device, resolution);

        let bind_group_layout = mk_bind_group_layout(device);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&shadow_map.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&shadow_map.sampler),
                },
            ],
            label: Some("light_bind_group"),
        });

        let shadow_bind_group_layout = mk_shadow_bind_group_layout(device);
        let shadow_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &shadow_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("shadow_bind_group"),
        });

        Self {
            uniform,
            buffer,
            shadow_map,
            bind_group_layout,
            bind_group,
            shadow_bind_group_layout,
            shadow_bind_group,
        }
    }

    /// Upload the scene's current lights. Cheap enough to run every frame.
    pub fn write(&mut self, queue: &wgpu::Queue, scene: &Scene) {
        self.uniform = LightUniform::from_scene(scene);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Depth,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                count: None,
            },
        ],
        label: Some("light_bind_group_layout"),
    })
}

fn mk_shadow_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("shadow_bind_group_layout"),
    })
}

#[cfg(test)]
mod tests {
    use cgmath::{Transform, Vector4};

    use super::*;
    use crate::data_structures::{
        instance::Instance,
        scene_graph::{DirectionalLight, Node},
    };

    fn lit_scene() -> Scene {
        let mut scene = Scene::new(0);
        scene.add(
            Node::directional_light(
                "sun",
                DirectionalLight {
                    color: [1.0, 1.0, 1.0],
                    intensity: 1.5,
                    target: Point3::new(0.0, 0.0, 0.0),
                    cast_shadow: true,
                    shadow_map_size: 2048,
                    shadow_extent: 150.0,
                },
            )
            .with_transform(Instance::new().with_position(50.0, 80.0, 30.0)),
        );
        scene.add(Node::ambient_light("ambient", 0xffffff, 0.5));
        scene.update_world_transforms();
        scene
    }

    #[test]
    fn direction_points_towards_the_light() {
        let uniform = LightUniform::from_scene(&lit_scene());
        let expected = Vector3::new(50.0, 80.0, 30.0).normalize();
        assert!((uniform.direction() - expected).magnitude() < 1e-5);
        assert!(uniform.shadows_enabled());
        assert_eq!(uniform.color[3], 1.5);
        assert_eq!(uniform.ambient[..3], [0.5, 0.5, 0.5]);
    }

    #[test]
    fn no_directional_light_means_no_shadows() {
        let mut scene = Scene::new(0);
        scene.add(Node::ambient_light("ambient", 0xffffff, 0.5));
        let uniform = LightUniform::from_scene(&scene);
        assert!(!uniform.shadows_enabled());
        assert_eq!(uniform.color, [0.0; 4]);
    }

    #[test]
    fn valley_corners_fit_in_the_shadow_frustum() {
        let view_proj = light_view_proj(Point3::new(50.0, 80.0, 30.0), Point3::new(0.0, 0.0, 0.0), 150.0);
        for (x, y, z) in [
            (-90.0, 0.0, -100.0),
            (-90.0, 0.0, 100.0),
            (100.0, 0.0, -100.0),
            (70.0, 60.0, -80.0),
            (0.0, 0.0, 0.0),
        ] {
            let clip: Vector4<f32> = view_proj * Vector4::new(x, y, z, 1.0);
            let ndc = clip.truncate() / clip.w;
            assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0, "({x}, {y}, {z}) -> {ndc:?}");
            assert!((0.0..=1.0).contains(&ndc.z), "({x}, {y}, {z}) -> {ndc:?}");
        }
    }

    #[test]
    fn looking_straight_down_still_works() {
        let view_proj = light_view_proj(Point3::new(0.0, 100.0, 0.0), Point3::new(0.0, 0.0, 0.0), 50.0);
        let origin = view_proj.transform_point(Point3::new(0.0, 0.0, 0.0));
        assert!(origin.x.is_finite() && origin.y.is_finite());
        assert!(origin.x.abs() < 1e-4 && origin.y.abs() < 1e-4);
    }
}
