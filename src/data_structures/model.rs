//! Meshes, materials and the GPU resources created from them.
//!
//! [`Geometry`] and [`Material`] are plain CPU data shared through `Arc` by
//! every node that uses them; cloning a node never copies vertex data. Each
//! carries a process-unique id which the renderer uses as the key of its
//! lazily filled [`GpuMesh`]/[`GpuMaterial`] caches.

use std::{
    f32::consts::PI,
    ops::Range,
    sync::atomic::{AtomicU64, Ordering},
};

use cgmath::InnerSpace;
use wgpu::util::DeviceExt;

use crate::data_structures::texture::Texture;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Triangle list geometry kept on the CPU until the renderer uploads it.
#[derive(Debug)]
pub struct Geometry {
    id: u64,
    pub name: String,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
}

impl Geometry {
    pub fn new(name: impl Into<String>, vertices: Vec<ModelVertex>, indices: Vec<u32>) -> Self {
        Self {
            id: next_id(),
            name: name.into(),
            vertices,
            indices,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /**
     * A `width` x `height` plane in the XY plane facing +Z, split into a
     * `width_segments` x `height_segments` grid. Rotate it by -90° around X to
     * lay it flat on the ground.
     */
    pub fn plane(width: f32, height: f32, width_segments: u32, height_segments: u32) -> Self {
        let grid_x = width_segments.max(1);
        let grid_y = height_segments.max(1);
        let segment_width = width / grid_x as f32;
        let segment_height = height / grid_y as f32;

        let mut vertices = Vec::with_capacity(((grid_x + 1) * (grid_y + 1)) as usize);
        for iy in 0..=grid_y {
            let y = iy as f32 * segment_height - height / 2.0;
            for ix in 0..=grid_x {
                let x = ix as f32 * segment_width - width / 2.0;
                vertices.push(ModelVertex {
                    position: [x, -y, 0.0],
                    tex_coords: [ix as f32 / grid_x as f32, iy as f32 / grid_y as f32],
                    normal: [0.0, 0.0, 1.0],
                });
            }
        }

        let row = grid_x + 1;
        let mut indices = Vec::with_capacity((grid_x * grid_y * 6) as usize);
        for iy in 0..grid_y {
            for ix in 0..grid_x {
                let a = ix + row * iy;
                let b = ix + row * (iy + 1);
                let c = (ix + 1) + row * (iy + 1);
                let d = (ix + 1) + row * iy;
                indices.extend_from_slice(&[a, b, d, b, c, d]);
            }
        }

        Self::new(format!("plane {width}x{height}"), vertices, indices)
    }

    /// UV sphere centred at the origin.
    pub fn sphere(radius: f32, width_segments: u32, height_segments: u32) -> Self {
        let width_segments = width_segments.max(3);
        let height_segments = height_segments.max(2);

        let mut vertices = Vec::new();
        let mut grid: Vec<Vec<u32>> = Vec::with_capacity(height_segments as usize + 1);
        for iy in 0..=height_segments {
            let v = iy as f32 / height_segments as f32;
            let mut row = Vec::with_capacity(width_segments as usize + 1);
            for ix in 0..=width_segments {
                let u = ix as f32 / width_segments as f32;
                let position = cgmath::Vector3::new(
                    -radius * (u * 2.0 * PI).cos() * (v * PI).sin(),
                    radius * (v * PI).cos(),
                    radius * (u * 2.0 * PI).sin() * (v * PI).sin(),
                );
                let normal = if position.magnitude2() > 0.0 {
                    position.normalize()
                } else {
                    cgmath::Vector3::unit_y()
                };
                row.push(vertices.len() as u32);
                vertices.push(ModelVertex {
                    position: position.into(),
                    tex_coords: [u, v],
                    normal: normal.into(),
                });
            }
            grid.push(row);
        }

        let mut indices = Vec::new();
        for iy in 0..height_segments as usize {
            for ix in 0..width_segments as usize {
                let a = grid[iy][ix + 1];
                let b = grid[iy][ix];
                let c = grid[iy + 1][ix];
                let d = grid[iy + 1][ix + 1];
                if iy != 0 {
                    indices.extend_from_slice(&[a, b, d]);
                }
                if iy != height_segments as usize - 1 {
                    indices.extend_from_slice(&[b, c, d]);
                }
            }
        }

        Self::new(format!("sphere r{radius}"), vertices, indices)
    }

    /// Area weighted vertex normals for meshes exported without them.
    pub fn compute_normals(vertices: &mut [ModelVertex], indices: &[u32]) {
        let mut accumulated = vec![cgmath::Vector3::new(0.0f32, 0.0, 0.0); vertices.len()];
        for c in indices.chunks_exact(3) {
            let (i0, i1, i2) = (c[0] as usize, c[1] as usize, c[2] as usize);
            if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
                continue;
            }
            let p0: cgmath::Vector3<f32> = vertices[i0].position.into();
            let p1: cgmath::Vector3<f32> = vertices[i1].position.into();
            let p2: cgmath::Vector3<f32> = vertices[i2].position.into();
            let face = (p1 - p0).cross(p2 - p0);
            accumulated[i0] += face;
            accumulated[i1] += face;
            accumulated[i2] += face;
        }
        for (vertex, normal) in vertices.iter_mut().zip(accumulated) {
            vertex.normal = if normal.magnitude2() > 0.0 {
                normal.normalize().into()
            } else {
                [0.0, 1.0, 0.0]
            };
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shading {
    /// Physically inspired lit surface.
    Standard { metalness: f32, roughness: f32 },
    /// Diffuse only.
    Lambert,
    /// Flat colour, ignores lights and shadows.
    Unlit,
}

impl Shading {
    pub(crate) fn params(&self) -> [f32; 4] {
        match self {
            Shading::Standard {
                metalness,
                roughness,
            } => [*metalness, *roughness, 0.0, 0.0],
            Shading::Lambert => [0.0, 1.0, 1.0, 0.0],
            Shading::Unlit => [0.0, 1.0, 2.0, 0.0],
        }
    }
}

/// Decoded RGBA8 texture pixels.
#[derive(Clone, Debug)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug)]
pub struct Material {
    id: u64,
    pub name: String,
    /// Linear RGB.
    pub color: [f32; 3],
    pub opacity: f32,
    pub transparent: bool,
    pub shading: Shading,
    pub texture: Option<TextureData>,
    /// Drawn without back-face culling.
    pub double_sided: bool,
    /// Fragments whose alpha falls below the cutoff are discarded.
    pub alpha_cutoff: Option<f32>,
}

impl Material {
    pub fn new(name: impl Into<String>, color: [f32; 3], shading: Shading) -> Self {
        Self {
            id: next_id(),
            name: name.into(),
            color,
            opacity: 1.0,
            transparent: false,
            shading,
            texture: None,
            double_sided: false,
            alpha_cutoff: None,
        }
    }

    pub fn standard(name: impl Into<String>, hex: u32) -> Self {
        Self::new(
            name,
            srgb_hex_to_linear(hex),
            Shading::Standard {
                metalness: 0.0,
                roughness: 1.0,
            },
        )
    }

    pub fn lambert(name: impl Into<String>, hex: u32) -> Self {
        Self::new(name, srgb_hex_to_linear(hex), Shading::Lambert)
    }

    pub fn unlit(name: impl Into<String>, hex: u32) -> Self {
        Self::new(name, srgb_hex_to_linear(hex), Shading::Unlit)
    }

    pub fn with_metalness(mut self, value: f32) -> Self {
        if let Shading::Standard { metalness, .. } = &mut self.shading {
            *metalness = value;
        }
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self.transparent = true;
        self
    }

    pub fn with_texture(mut self, texture: TextureData) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_double_sided(mut self, double_sided: bool) -> Self {
        self.double_sided = double_sided;
        self
    }

    pub fn with_alpha_cutoff(mut self, cutoff: f32) -> Self {
        self.alpha_cutoff = Some(cutoff);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cull_mode(&self) -> Option<wgpu::Face> {
        if self.double_sided {
            None
        } else {
            Some(wgpu::Face::Back)
        }
    }

    pub(crate) fn uniform(&self) -> MaterialUniform {
        let mut params = self.shading.params();
        params[3] = self.alpha_cutoff.unwrap_or(0.0);
        MaterialUniform {
            color: [self.color[0], self.color[1], self.color[2], self.opacity],
            params,
        }
    }
}

fn srgb_channel_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Converts a `0xRRGGBB` sRGB colour into linear RGB.
pub fn srgb_hex_to_linear(hex: u32) -> [f32; 3] {
    let channel = |shift: u32| srgb_channel_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
    [channel(16), channel(8), channel(0)]
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct MaterialUniform {
    color: [f32; 4],
    // metalness, roughness, shading model, alpha cutoff
    params: [f32; 4],
}

#[derive(Debug)]
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_elements: u32,
}

impl GpuMesh {
    pub fn new(device: &wgpu::Device, geometry: &Geometry) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Vertex Buffer", geometry.name)),
            contents: bytemuck::cast_slice(&geometry.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Index Buffer", geometry.name)),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            num_elements: geometry.indices.len() as u32,
        }
    }
}

#[derive(Debug)]
pub struct GpuMaterial {
    #[allow(unused)]
    pub diffuse_texture: Texture,
    #[allow(unused)]
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl GpuMaterial {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        material: &Material,
        layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let diffuse_texture = match &material.texture {
            Some(data) => Texture::from_rgba(device, queue, data, &material.name),
            None => Texture::create_white(device, queue),
        };
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Material Buffer", material.name)),
            contents: bytemuck::cast_slice(&[material.uniform()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&diffuse_texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&diffuse_texture.sampler),
                },
            ],
            label: Some(&material.name),
        });
        Self {
            diffuse_texture,
            buffer,
            bind_group,
        }
    }
}

pub fn material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
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
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
        label: Some("material_bind_group_layout"),
    })
}

pub trait DrawModel<'a> {
    fn draw_mesh_instanced(
        &mut self,
        mesh: &'a GpuMesh,
        material: &'a GpuMaterial,
        instances: Range<u32>,
        camera_bind_group: &'a wgpu::BindGroup,
        light_bind_group: &'a wgpu::BindGroup,
    );

    fn draw_mesh_depth(&mut self, mesh: &'a GpuMesh, instances: Range<u32>);
}

impl<'a, 'b> DrawModel<'b> for wgpu::RenderPass<'a>
where
    'b: 'a,
{
    fn draw_mesh_instanced(
        &mut self,
        mesh: &'b GpuMesh,
        material: &'b GpuMaterial,
        instances: Range<u32>,
        camera_bind_group: &'b wgpu::BindGroup,
        light_bind_group: &'b wgpu::BindGroup,
    ) {
        self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.set_bind_group(0, &material.bind_group, &[]);
        self.set_bind_group(1, camera_bind_group, &[]);
        self.set_bind_group(2, light_bind_group, &[]);
        self.draw_indexed(0..mesh.num_elements, 0, instances);
    }

    fn draw_mesh_depth(&mut self, mesh: &'b GpuMesh, instances: Range<u32>) {
        self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.draw_indexed(0..mesh.num_elements, 0, instances);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_has_grid_vertices_and_two_triangles_per_cell() {
        let plane = Geometry::plane(30.0, 200.0, 32, 32);
        assert_eq!(plane.vertices.len(), 33 * 33);
        assert_eq!(plane.indices.len(), 32 * 32 * 6);
        let xs: Vec<f32> = plane.vertices.iter().map(|v| v.position[0]).collect();
        assert_eq!(xs.iter().cloned().fold(f32::MAX, f32::min), -15.0);
        assert_eq!(xs.iter().cloned().fold(f32::MIN, f32::max), 15.0);
    }

    #[test]
    fn plane_winding_faces_positive_z() {
        let plane = Geometry::plane(2.0, 2.0, 1, 1);
        let tri = &plane.indices[0..3];
        let p = |i: u32| cgmath::Vector3::from(plane.vertices[i as usize].position);
        let n = (p(tri[1]) - p(tri[0])).cross(p(tri[2]) - p(tri[0]));
        assert!(n.z > 0.0);
    }

    #[test]
    fn sphere_vertices_lie_on_radius() {
        let sphere = Geometry::sphere(9.0, 32, 32);
        assert_eq!(sphere.vertices.len(), 33 * 33);
        for v in &sphere.vertices {
            let len = cgmath::Vector3::from(v.position).magnitude();
            assert!((len - 9.0).abs() < 1e-3);
        }
        assert!(sphere.indices.iter().all(|&i| (i as usize) < sphere.vertices.len()));
    }

    #[test]
    fn computed_normals_point_along_face() {
        let mut vertices = vec![
            ModelVertex {
                position: [0.0, 0.0, 0.0],
                ..Default::default()
            },
            ModelVertex {
                position: [1.0, 0.0, 0.0],
                ..Default::default()
            },
            ModelVertex {
                position: [0.0, 1.0, 0.0],
                ..Default::default()
            },
        ];
        Geometry::compute_normals(&mut vertices, &[0, 1, 2]);
        assert!(vertices.iter().all(|v| v.normal == [0.0, 0.0, 1.0]));
    }

    #[test]
    fn hex_colours_are_linearised() {
        assert_eq!(srgb_hex_to_linear(0xffffff), [1.0, 1.0, 1.0]);
        assert_eq!(srgb_hex_to_linear(0x000000), [0.0, 0.0, 0.0]);
        let green = srgb_hex_to_linear(0x4caf50);
        assert!(green[1] > green[0] && green[1] > green[2]);
        assert!(green[1] < 175.0 / 255.0);
    }

    #[test]
    fn double_sided_materials_are_not_culled() {
        let leaves = Material::standard("leaves", 0x2e7d32).with_double_sided(true);
        let bark = Material::standard("bark", 0x6b4226);
        assert_eq!(leaves.cull_mode(), None);
        assert_eq!(bark.cull_mode(), Some(wgpu::Face::Back));
    }

    #[test]
    fn alpha_cutoff_travels_in_the_uniform() {
        let masked = Material::standard("leaves", 0x2e7d32).with_alpha_cutoff(0.3);
        assert_eq!(masked.uniform().params[3], 0.3);
        assert_eq!(Material::standard("bark", 0x6b4226).uniform().params[3], 0.0);
    }

    #[test]
    fn resources_get_distinct_ids() {
        let a = Material::lambert("a", 0xffffff);
        let b = Material::lambert("b", 0xffffff);
        assert_ne!(a.id(), b.id());
    }
}
