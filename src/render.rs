//! Render composition and pipeline batching.
//!
//! Each frame the scene graph is flattened into [`Batch`]es: all visible mesh
//! nodes that share geometry and material become one instanced draw. Batches
//! are routed to a [`Pass`] by their material, and shadow casters are batched
//! once more for the depth-only shadow pass. [`FrameBatches::pack`] lays every
//! instance of the frame out in one buffer so a frame needs a single upload.
//!
//! # Key types
//!
//! - [`FrameBatches`] is everything one frame draws, in draw order
//! - [`GpuCache`] lazily creates and keeps the GPU side of geometry and materials
//! - [`InstanceBuffer`] is the growable per-frame instance buffer

use std::{collections::HashMap, ops::Range, sync::Arc};

use cgmath::Point3;

use crate::data_structures::{
    instance::InstanceRaw,
    model::{GpuMaterial, GpuMesh, Geometry, Material, Shading},
    scene_graph::{Node, NodeKind, Scene},
};

/// Main-pass pipeline a batch is drawn with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pass {
    Basic,
    Unlit,
    Transparent,
}

impl Pass {
    pub fn for_material(material: &Material) -> Self {
        if material.transparent {
            Pass::Transparent
        } else if material.shading == Shading::Unlit {
            Pass::Unlit
        } else {
            Pass::Basic
        }
    }
}

/// Instances sharing one geometry and one material.
#[derive(Clone, Debug)]
pub struct Batch {
    pub geometry: Arc<Geometry>,
    pub material: Arc<Material>,
    pub instances: Vec<InstanceRaw>,
    /// Squared distance from the eye to the farthest instance.
    pub depth: f32,
}

impl Batch {
    fn new(geometry: &Arc<Geometry>, material: &Arc<Material>) -> Self {
        Self {
            geometry: geometry.clone(),
            material: material.clone(),
            instances: Vec::new(),
            depth: 0.0,
        }
    }

    fn push(&mut self, instance: InstanceRaw, depth: f32) {
        self.instances.push(instance);
        self.depth = self.depth.max(depth);
    }

    fn sort_back_to_front(&mut self, eye: Point3<f32>) {
        let distance = |raw: &InstanceRaw| {
            let [x, y, z] = raw.translation();
            (x - eye.x).powi(2) + (y - eye.y).powi(2) + (z - eye.z).powi(2)
        };
        self.instances
            .sort_by(|a, b| distance(b).total_cmp(&distance(a)));
    }
}

#[derive(Default)]
struct BatchSet {
    index: HashMap<(u64, u64), usize>,
    batches: Vec<Batch>,
}

impl BatchSet {
    fn push(
        &mut self,
        geometry: &Arc<Geometry>,
        material: &Arc<Material>,
        instance: InstanceRaw,
        depth: f32,
    ) {
        let key = (geometry.id(), material.id());
        let idx = *self.index.entry(key).or_insert_with(|| {
            self.batches.push(Batch::new(geometry, material));
            self.batches.len() - 1
        });
        self.batches[idx].push(instance, depth);
    }
}

/// Everything one frame draws, in draw order per pass.
#[derive(Debug, Default)]
pub struct FrameBatches {
    pub shadow_casters: Vec<Batch>,
    pub opaque: Vec<Batch>,
    pub unlit: Vec<Batch>,
    /// Sorted back to front.
    pub transparent: Vec<Batch>,
}

/// Where each batch's instances live inside the packed instance buffer.
#[derive(Debug, Default, PartialEq)]
pub struct PassRanges {
    pub shadow_casters: Vec<Range<u32>>,
    pub opaque: Vec<Range<u32>>,
    pub unlit: Vec<Range<u32>>,
    pub transparent: Vec<Range<u32>>,
}

impl FrameBatches {
    pub fn instance_count(&self) -> usize {
        self.all().map(|batch| batch.instances.len()).sum()
    }

    fn all(&self) -> impl Iterator<Item = &Batch> {
        self.shadow_casters
            .iter()
            .chain(&self.opaque)
            .chain(&self.unlit)
            .chain(&self.transparent)
    }

    /// Concatenate all instances and return the range of every batch.
    pub fn pack(&self) -> (Vec<InstanceRaw>, PassRanges) {
        let mut raw = Vec::with_capacity(self.instance_count());
        let mut ranges_for = |batches: &[Batch]| {
            batches
                .iter()
                .map(|batch| {
                    let start = raw.len() as u32;
                    raw.extend_from_slice(&batch.instances);
                    start..raw.len() as u32
                })
                .collect::<Vec<_>>()
        };
        let ranges = PassRanges {
            shadow_casters: ranges_for(&self.shadow_casters),
            opaque: ranges_for(&self.opaque),
            unlit: ranges_for(&self.unlit),
            transparent: ranges_for(&self.transparent),
        };
        (raw, ranges)
    }
}

/// Flatten the visible part of `scene` into batches. World transforms must be
/// current, see [`Scene::update_world_transforms`].
pub fn collect_batches(scene: &Scene, eye: Point3<f32>) -> FrameBatches {
    let mut shadow = BatchSet::default();
    let mut passes: HashMap<Pass, BatchSet> = HashMap::new();
    for node in scene.nodes() {
        gather(node, eye, &mut shadow, &mut passes);
    }

    let mut take = |pass: Pass| passes.remove(&pass).unwrap_or_default().batches;
    let opaque = take(Pass::Basic);
    let unlit = take(Pass::Unlit);
    let mut transparent = take(Pass::Transparent);
    for batch in transparent.iter_mut() {
        batch.sort_back_to_front(eye);
    }
    transparent.sort_by(|a, b| b.depth.total_cmp(&a.depth));

    FrameBatches {
        shadow_casters: shadow.batches,
        opaque,
        unlit,
        transparent,
    }
}

fn gather(node: &Node, eye: Point3<f32>, shadow: &mut BatchSet, passes: &mut HashMap<Pass, BatchSet>) {
    if !node.visible {
        return;
    }
    if let NodeKind::Mesh(mesh) = &node.kind {
        let world = node.world_transform();
        let raw = world.to_raw(mesh.receive_shadow);
        let depth = world.distance2(eye);
        passes
            .entry(Pass::for_material(&mesh.material))
            .or_default()
            .push(&mesh.geometry, &mesh.material, raw, depth);
        if mesh.cast_shadow {
            shadow.push(&mesh.geometry, &mesh.material, raw, depth);
        }
    }
    for child in &node.children {
        gather(child, eye, shadow, passes);
    }
}

/// GPU meshes and materials keyed by the id of their CPU counterpart.
#[derive(Default)]
pub struct GpuCache {
    meshes: HashMap<u64, GpuMesh>,
    materials: HashMap<u64, GpuMaterial>,
}

impl GpuCache {
    /// Upload whatever the frame uses that isn't on the GPU yet.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        material_layout: &wgpu::BindGroupLayout,
        frame: &FrameBatches,
    ) {
        for batch in frame.all() {
            self.meshes
                .entry(batch.geometry.id())
                .or_insert_with(|| GpuMesh::new(device, &batch.geometry));
            self.materials
                .entry(batch.material.id())
                .or_insert_with(|| GpuMaterial::new(device, queue, &batch.material, material_layout));
        }
    }

    pub fn get(&self, batch: &Batch) -> Option<(&GpuMesh, &GpuMaterial)> {
        Some((
            self.meshes.get(&batch.geometry.id())?,
            self.materials.get(&batch.material.id())?,
        ))
    }

    pub fn mesh(&self, batch: &Batch) -> Option<&GpuMesh> {
        self.meshes.get(&batch.geometry.id())
    }
}

const MIN_INSTANCE_CAPACITY: usize = 256;

/// One vertex buffer for all instances of a frame. Grows, never shrinks.
pub struct InstanceBuffer {
    pub buffer: wgpu::Buffer,
    capacity: usize,
}

impl InstanceBuffer {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            buffer: Self::allocate(device, MIN_INSTANCE_CAPACITY),
            capacity: MIN_INSTANCE_CAPACITY,
        }
    }

    fn allocate(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Instance Buffer"),
            size: (capacity * std::mem::size_of::<InstanceRaw>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, instances: &[InstanceRaw]) {
        if instances.len() > self.capacity {
            self.capacity = instances.len().next_power_of_two();
            log::debug!("Growing instance buffer to {} instances", self.capacity);
            self.buffer = Self::allocate(device, self.capacity);
        }
        if !instances.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(instances));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::instance::Instance;

    fn scene_with(nodes: Vec<Node>) -> Scene {
        let mut scene = Scene::new(0);
        for node in nodes {
            scene.add(node);
        }
        scene.update_world_transforms();
        scene
    }

    fn mesh(geometry: &Arc<Geometry>, material: &Arc<Material>, x: f32) -> Node {
        Node::mesh("m", geometry.clone(), material.clone())
            .with_transform(Instance::new().with_position(x, 0.0, 0.0))
    }

    #[test]
    fn shared_geometry_and_material_make_one_batch() {
        let geometry = Arc::new(Geometry::sphere(1.0, 4, 4));
        let material = Arc::new(Material::standard("m", 0xffffff));
        let other = Arc::new(Material::standard("other", 0xff0000));
        let scene = scene_with(vec![
            mesh(&geometry, &material, 0.0),
            mesh(&geometry, &material, 1.0),
            mesh(&geometry, &other, 2.0),
        ]);

        let frame = collect_batches(&scene, Point3::new(0.0, 0.0, 10.0));
        assert_eq!(frame.opaque.len(), 2);
        assert_eq!(frame.opaque[0].instances.len(), 2);
        assert_eq!(frame.opaque[1].instances.len(), 1);
        assert!(frame.shadow_casters.is_empty());
    }

    #[test]
    fn materials_pick_the_pass() {
        let geometry = Arc::new(Geometry::sphere(1.0, 4, 4));
        let scene = scene_with(vec![
            mesh(&geometry, &Arc::new(Material::unlit("sun", 0xffdd33)), 0.0),
            mesh(&geometry, &Arc::new(Material::lambert("cloud", 0xffffff).with_opacity(0.85)), 0.0),
            mesh(&geometry, &Arc::new(Material::lambert("wall", 0xffffff)), 0.0),
        ]);

        let frame = collect_batches(&scene, Point3::new(0.0, 0.0, 10.0));
        assert_eq!(
            (frame.opaque.len(), frame.unlit.len(), frame.transparent.len()),
            (1, 1, 1)
        );
    }

    #[test]
    fn transparent_batches_are_drawn_far_to_near() {
        let material = Arc::new(Material::lambert("cloud", 0xffffff).with_opacity(0.5));
        let near = Arc::new(Geometry::sphere(1.0, 4, 4));
        let far = Arc::new(Geometry::sphere(2.0, 4, 4));
        let scene = scene_with(vec![mesh(&near, &material, 5.0), mesh(&far, &material, -50.0)]);

        let frame = collect_batches(&scene, Point3::new(10.0, 0.0, 0.0));
        assert_eq!(frame.transparent[0].geometry.id(), far.id());
        assert_eq!(frame.transparent[1].geometry.id(), near.id());
    }

    #[test]
    fn hidden_subtrees_and_shadow_flags() {
        let geometry = Arc::new(Geometry::sphere(1.0, 4, 4));
        let material = Arc::new(Material::standard("m", 0xffffff));
        let mut hidden = Node::group("hidden");
        hidden.visible = false;
        hidden.add_child(mesh(&geometry, &material, 0.0));
        let mut caster = mesh(&geometry, &material, 1.0);
        caster.set_shadows(true, true);
        let scene = scene_with(vec![hidden, caster]);

        let frame = collect_batches(&scene, Point3::new(0.0, 0.0, 10.0));
        assert_eq!(frame.instance_count(), 2);
        assert_eq!(frame.opaque[0].instances.len(), 1);
        assert!(frame.opaque[0].instances[0].receives_shadow());
        assert_eq!(frame.shadow_casters[0].instances.len(), 1);
    }

    #[test]
    fn packing_keeps_batches_contiguous() {
        let geometry = Arc::new(Geometry::sphere(1.0, 4, 4));
        let material = Arc::new(Material::standard("m", 0xffffff));
        let sun = Arc::new(Material::unlit("sun", 0xffffff));
        let mut caster = mesh(&geometry, &material, 3.0);
        caster.set_shadows(true, false);
        let scene = scene_with(vec![
            mesh(&geometry, &material, 0.0),
            caster,
            mesh(&geometry, &sun, 9.0),
        ]);

        let frame = collect_batches(&scene, Point3::new(0.0, 0.0, 10.0));
        let (raw, ranges) = frame.pack();
        assert_eq!(raw.len(), 4);
        assert_eq!(ranges.shadow_casters, vec![0..1]);
        assert_eq!(ranges.opaque, vec![1..3]);
        assert_eq!(ranges.unlit, vec![3..4]);
        assert!(ranges.transparent.is_empty());
        assert_eq!(raw[3].translation(), [9.0, 0.0, 0.0]);
    }
}
