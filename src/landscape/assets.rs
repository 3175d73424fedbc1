//! The three external models and how they are grafted into the valley.

use std::fmt;

use rand::Rng;

use crate::{
    config::{AssetPlacement, LandscapeConfig},
    data_structures::{
        instance::Instance,
        scene_graph::{Node, NodeId, Scene},
    },
    resources,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Mountain,
    House,
    Tree,
}

impl AssetKind {
    pub const ALL: [AssetKind; 3] = [AssetKind::Mountain, AssetKind::House, AssetKind::Tree];

    pub fn placement(self, config: &LandscapeConfig) -> &AssetPlacement {
        match self {
            AssetKind::Mountain => &config.mountain,
            AssetKind::House => &config.house,
            AssetKind::Tree => &config.tree,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetKind::Mountain => "mountain",
            AssetKind::House => "house",
            AssetKind::Tree => "tree",
        };
        f.write_str(name)
    }
}

/// Everything a background task needs to fetch one model. Owned so the
/// future is `'static`.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetRequest {
    pub kind: AssetKind,
    pub asset_dir: String,
    pub file: String,
}

impl AssetRequest {
    pub fn new(kind: AssetKind, config: &LandscapeConfig) -> Self {
        Self {
            kind,
            asset_dir: config.asset_dir.clone(),
            file: kind.placement(config).file.clone(),
        }
    }

    pub async fn load(self) -> anyhow::Result<Node> {
        resources::load_model_gltf(&self.asset_dir, &self.file).await
    }
}

fn placed(mut model: Node, x: f32, y: f32, z: f32, scale: f32) -> Node {
    model.local = Instance::new().with_position(x, y, z).with_uniform_scale(scale);
    model.set_shadows(true, true);
    model
}

/// Add a loaded model to `scene` according to `config`. Trees are cloned
/// `tree_count` times at random spots; the clones share the model's geometry.
pub fn attach<R: Rng + ?Sized>(
    scene: &mut Scene,
    kind: AssetKind,
    model: Node,
    config: &LandscapeConfig,
    rng: &mut R,
) -> Vec<NodeId> {
    let placement = kind.placement(config);
    match kind {
        AssetKind::Mountain | AssetKind::House => {
            let [x, y, z] = placement.position;
            vec![scene.add(placed(model, x, y, z, placement.scale))]
        }
        AssetKind::Tree => {
            let area = &config.tree_area;
            if !area.has_area() {
                log::warn!("Tree area {area:?} has no extent, trees will line up on its edge");
            }
            (0..config.tree_count)
                .map(|_| {
                    let (x, z) = area.sample(rng);
                    scene.add(placed(model.clone(), x, 0.0, z, placement.scale))
                })
                .collect()
        }
    }
}
