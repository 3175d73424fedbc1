//! Static part of the valley: ground, river, lights, sun and clouds.

use std::{f32::consts::FRAC_PI_2, sync::Arc};

use cgmath::Rotation3;
use rand::Rng;

use crate::{
    data_structures::{
        instance::Instance,
        model::{Geometry, Material},
        scene_graph::{DirectionalLight, Node, NodeId, Scene},
    },
    landscape::clouds,
};

pub const BACKGROUND: u32 = 0xa0d8f0;
pub const SHADOW_MAP_SIZE: u32 = 2048;

/// Rotation laying an XY plane flat on the ground, facing up.
fn flat() -> cgmath::Quaternion<f32> {
    cgmath::Quaternion::from_angle_x(cgmath::Rad(-FRAC_PI_2))
}

fn ground() -> Node {
    let mut ground = Node::mesh(
        "ground",
        Arc::new(Geometry::plane(200.0, 200.0, 1, 1)),
        Arc::new(Material::standard("grass", 0x4caf50)),
    )
    .with_transform(Instance::new().with_rotation(flat()));
    ground.set_shadows(false, true);
    ground
}

fn river() -> Node {
    Node::mesh(
        "river",
        Arc::new(Geometry::plane(30.0, 200.0, 32, 32)),
        Arc::new(Material::standard("water", 0x1e6eff).with_metalness(0.1)),
    )
    .with_transform(
        Instance::new()
            .with_position(-10.0, 0.02, 0.0)
            .with_rotation(flat()),
    )
}

fn sun_light() -> Node {
    Node::directional_light(
        "sun light",
        DirectionalLight {
            color: [1.0, 1.0, 1.0],
            intensity: 1.5,
            target: cgmath::Point3::new(0.0, 0.0, 0.0),
            cast_shadow: true,
            shadow_map_size: SHADOW_MAP_SIZE,
            shadow_extent: 150.0,
        },
    )
    .with_transform(Instance::new().with_position(50.0, 80.0, 30.0))
}

fn sun() -> Node {
    Node::mesh(
        "sun",
        Arc::new(Geometry::sphere(9.0, 32, 32)),
        Arc::new(Material::unlit("sun", 0xffdd33)),
    )
    .with_transform(Instance::new().with_position(-40.0, 100.0, -100.0))
}

/// Assemble the scene as it looks before any model has loaded. Returns the
/// ids of the cloud groups in creation order.
pub fn build_scene<R: Rng + ?Sized>(cloud_count: usize, rng: &mut R) -> (Scene, Vec<NodeId>) {
    let mut scene = Scene::new(BACKGROUND);
    scene.add(ground());
    scene.add(river());
    scene.add(sun_light());
    scene.add(Node::ambient_light("ambient", 0xffffff, 0.5));
    scene.add(sun());

    let material = clouds::cloud_material();
    let cloud_ids = (0..cloud_count)
        .map(|i| scene.add(clouds::make_cloud(i, &material, rng)))
        .collect();

    scene.update_world_transforms();
    (scene, cloud_ids)
}
