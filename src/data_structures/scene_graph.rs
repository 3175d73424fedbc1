//! Scene graph and hierarchical scene organization.
//!
//! A [`Scene`] owns a flat list of top-level [`Node`]s, each of which owns
//! its children. Nodes keep a local transform relative to their parent and a
//! cached world transform that [`Scene::update_world_transforms`] refreshes
//! from the root down. Mesh payloads hold `Arc`s to geometry and material, so
//! cloning a sub-tree (e.g. to scatter trees) shares the vertex data.

use std::sync::Arc;

use log::warn;

use crate::data_structures::{
    instance::Instance,
    model::{Geometry, Material, srgb_hex_to_linear},
};

/// Handle of a top-level node. Stable because nodes are only ever appended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug)]
pub struct MeshNode {
    pub geometry: Arc<Geometry>,
    pub material: Arc<Material>,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Linear RGB.
    pub color: [f32; 3],
    pub intensity: f32,
    /// Point the light shines towards; its own position comes from the node.
    pub target: cgmath::Point3<f32>,
    pub cast_shadow: bool,
    pub shadow_map_size: u32,
    /// Half width of the orthographic box the shadow map covers.
    pub shadow_extent: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AmbientLight {
    pub color: [f32; 3],
    pub intensity: f32,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Group,
    Mesh(MeshNode),
    DirectionalLight(DirectionalLight),
    AmbientLight(AmbientLight),
}

#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub local: Instance,
    world: Instance,
    pub visible: bool,
    pub kind: NodeKind,
    pub children: Vec<Node>,
}

impl Node {
    fn with_kind(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            local: Instance::default(),
            world: Instance::default(),
            visible: true,
            kind,
            children: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::with_kind(name, NodeKind::Group)
    }

    pub fn mesh(name: impl Into<String>, geometry: Arc<Geometry>, material: Arc<Material>) -> Self {
        Self::with_kind(
            name,
            NodeKind::Mesh(MeshNode {
                geometry,
                material,
                cast_shadow: false,
                receive_shadow: false,
            }),
        )
    }

    pub fn directional_light(name: impl Into<String>, light: DirectionalLight) -> Self {
        Self::with_kind(name, NodeKind::DirectionalLight(light))
    }

    pub fn ambient_light(name: impl Into<String>, hex: u32, intensity: f32) -> Self {
        Self::with_kind(
            name,
            NodeKind::AmbientLight(AmbientLight {
                color: srgb_hex_to_linear(hex),
                intensity,
            }),
        )
    }

    pub fn with_transform(mut self, local: Instance) -> Self {
        self.local = local;
        self
    }

    pub fn add_child(&mut self, child: Node) {
        self.children.push(child);
    }

    pub fn world_transform(&self) -> &Instance {
        &self.world
    }

    pub fn is_mesh(&self) -> bool {
        matches!(self.kind, NodeKind::Mesh(_))
    }

    pub fn as_mesh(&self) -> Option<&MeshNode> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    /// Visit this node and all descendants, depth first.
    pub fn traverse<'a>(&'a self, visit: &mut dyn FnMut(&'a Node)) {
        visit(self);
        for child in &self.children {
            child.traverse(visit);
        }
    }

    pub fn traverse_mut(&mut self, visit: &mut dyn FnMut(&mut Node)) {
        visit(self);
        for child in self.children.iter_mut() {
            child.traverse_mut(visit);
        }
    }

    /// Mark every mesh in this sub-tree as shadow caster and/or receiver.
    pub fn set_shadows(&mut self, cast: bool, receive: bool) {
        self.traverse_mut(&mut |node| {
            if let NodeKind::Mesh(mesh) = &mut node.kind {
                mesh.cast_shadow = cast;
                mesh.receive_shadow = receive;
            }
        });
    }

    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        self.traverse(&mut |node| {
            if node.is_mesh() {
                count += 1;
            }
        });
        count
    }

    /// Recompute cached world transforms for this sub-tree.
    pub fn update_world_transforms(&mut self, parent: &Instance) {
        self.world = parent * &self.local;
        let world = self.world.clone();
        for child in self.children.iter_mut() {
            child.update_world_transforms(&world);
        }
    }
}

pub struct Scene {
    /// Linear RGB clear colour.
    pub background: [f32; 3],
    nodes: Vec<Node>,
}

impl Scene {
    pub fn new(background_hex: u32) -> Self {
        Self {
            background: srgb_hex_to_linear(background_hex),
            nodes: Vec::new(),
        }
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let node = self.nodes.get_mut(id.0);
        if node.is_none() {
            warn!("No top-level node with index {} in the scene.", id.0);
        }
        node
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn update_world_transforms(&mut self) {
        let root = Instance::default();
        for node in self.nodes.iter_mut() {
            node.update_world_transforms(&root);
        }
    }

    /// First directional light together with its world position.
    pub fn directional_light(&self) -> Option<(cgmath::Vector3<f32>, &DirectionalLight)> {
        self.nodes.iter().find_map(|node| match &node.kind {
            NodeKind::DirectionalLight(light) => Some((node.world.position, light)),
            _ => None,
        })
    }

    /// Sum of all ambient lights, already scaled by intensity.
    pub fn ambient(&self) -> [f32; 3] {
        self.nodes
            .iter()
            .filter_map(|node| match &node.kind {
                NodeKind::AmbientLight(light) => Some(light),
                _ => None,
            })
            .fold([0.0; 3], |acc, light| {
                [
                    acc[0] + light.color[0] * light.intensity,
                    acc[1] + light.color[1] * light.intensity,
                    acc[2] + light.color[2] * light.intensity,
                ]
            })
    }
}
