//! Procedural cloud clusters and their drift.
//!
//! A cloud is a group of 3 to 5 overlapping sphere puffs sharing one
//! translucent material. Clouds drift along +X every frame and jump back to
//! the far side once they pass the edge of the valley.

use std::sync::Arc;

use rand::Rng;

use crate::data_structures::{
    instance::Instance,
    model::{Geometry, Material},
    scene_graph::Node,
};

/// Distance a cloud moves along +X each frame.
pub const DRIFT_STEP: f32 = 0.08;
/// A cloud whose x exceeds this is moved back to `-WRAP_LIMIT`.
pub const WRAP_LIMIT: f32 = 100.0;
/// Horizontal distance between neighbouring clouds at start-up.
pub const SPACING: f32 = 20.0;

const FIRST_X: f32 = -40.0;
const PUFF_SEGMENTS: u32 = 16;

pub fn cloud_material() -> Arc<Material> {
    Arc::new(Material::lambert("cloud", 0xffffff).with_opacity(0.85))
}

/// Build the `index`-th cloud. Its x position is fixed by the index; height,
/// depth, scale and the puffs are random.
pub fn make_cloud<R: Rng + ?Sized>(index: usize, material: &Arc<Material>, rng: &mut R) -> Node {
    let mut cloud = Node::group(format!("cloud {index}"));

    let puffs = rng.random_range(3..=5);
    for j in 0..puffs {
        let radius = 3.0 + rng.random_range(0.0..1.5);
        let puff = Node::mesh(
            format!("cloud {index} puff {j}"),
            Arc::new(Geometry::sphere(radius, PUFF_SEGMENTS, PUFF_SEGMENTS)),
            material.clone(),
        )
        .with_transform(Instance::new().with_position(
            j as f32 * 3.0 - 4.0,
            rng.random_range(0.0..2.0),
            rng.random_range(0.0..2.0),
        ));
        cloud.add_child(puff);
    }

    cloud.with_transform(
        Instance::new()
            .with_position(
                FIRST_X + index as f32 * SPACING,
                40.0 + rng.random_range(0.0..10.0),
                -40.0 + rng.random_range(0.0..20.0),
            )
            .with_uniform_scale(1.0 + rng.random_range(0.0..0.5)),
    )
}

/// Advance `cloud` by `step` along X, wrapping past the edge without
/// interpolation. Returns whether the cloud wrapped.
pub fn drift(cloud: &mut Node, step: f32) -> bool {
    cloud.local.position.x += step;
    if cloud.local.position.x > WRAP_LIMIT {
        cloud.local.position.x = -WRAP_LIMIT;
        return true;
    }
    false
}
