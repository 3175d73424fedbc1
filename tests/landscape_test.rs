use valley_scene::{
    Landscape,
    data_structures::scene_graph::NodeKind,
    landscape::{assets::AssetKind, clouds},
    render::collect_batches,
};

use crate::common::test_utils::{model, seeded};

mod common;

#[test]
fn should_compose_the_scene_before_any_asset_loads() {
    let valley = Landscape::new(seeded(1), 800, 600);
    let nodes = valley.scene.nodes();
    assert_eq!(nodes.len(), 14);

    let names: Vec<&str> = nodes.iter().take(5).map(|n| n.name.as_str()).collect();
    assert_eq!(names, ["ground", "river", "sun light", "ambient", "sun"]);
    assert_eq!(valley.clouds().len(), 9);
    assert!(nodes.iter().skip(5).all(|n| matches!(n.kind, NodeKind::Group)));
}

#[test]
fn should_keep_clouds_inside_the_wrap_range() {
    let mut valley = Landscape::new(seeded(2), 800, 600);
    // 200 units at 0.08 per tick, every cloud wraps at least once
    for _ in 0..2600 {
        let before = valley.cloud_positions();
        valley.tick();
        for (b, a) in before.iter().zip(valley.cloud_positions()) {
            assert!(
                (-clouds::WRAP_LIMIT..=clouds::WRAP_LIMIT).contains(&a.x),
                "cloud escaped to x = {}",
                a.x
            );
            if b.x + clouds::DRIFT_STEP > clouds::WRAP_LIMIT {
                assert_eq!(a.x, -clouds::WRAP_LIMIT);
            }
        }
    }
}

#[test]
fn should_resize_idempotently() {
    let mut valley = Landscape::new(seeded(3), 800, 600);
    valley.resize(1280, 720);
    let once = (valley.viewport(), valley.aspect());
    valley.resize(1280, 720);
    assert_eq!((valley.viewport(), valley.aspect()), once);
}

#[test]
fn should_follow_window_resizes() {
    let mut valley = Landscape::new(seeded(4), 800, 600);
    assert!((valley.aspect() - 800.0 / 600.0).abs() < 1e-6);
    assert_eq!(valley.viewport(), (800, 600));

    valley.resize(1024, 768);
    valley.tick();
    assert!((valley.aspect() - 1024.0 / 768.0).abs() < 1e-6);
    assert_eq!(valley.viewport(), (1024, 768));
}

#[test]
fn should_plant_ninety_trees_inside_their_strip() {
    let mut valley = Landscape::new(seeded(5), 800, 600);
    let ids = valley.attach_asset(AssetKind::Tree, model("tree.glb"));
    assert_eq!(ids.len(), 90);
    assert_eq!(valley.scene.len(), 14 + 90);

    for id in ids {
        let tree = valley.scene.get(id).expect("tree was added");
        let p = tree.local.position;
        assert!((-90.0..=-30.0).contains(&p.x), "x = {}", p.x);
        assert!((-100.0..=100.0).contains(&p.z), "z = {}", p.z);
        assert_eq!(p.y, 0.0);
        assert_eq!(tree.local.scale.x, 5.0);
    }
}

#[test]
fn should_plant_trees_on_a_degenerate_strip() {
    let mut config = seeded(5);
    config.tree_area.x = (-30.0, -30.0);
    config.tree_area.z = (40.0, -40.0);
    let mut valley = Landscape::new(config, 800, 600);

    let ids = valley.attach_asset(AssetKind::Tree, model("tree.glb"));
    assert_eq!(ids.len(), 90);
    for id in ids {
        let p = valley.scene.get(id).expect("tree was added").local.position;
        assert_eq!(p.x, -30.0);
        assert!((-40.0..=40.0).contains(&p.z), "z = {}", p.z);
    }
}

#[test]
fn should_cast_and_receive_shadows_on_attached_models() {
    let mut valley = Landscape::new(seeded(6), 800, 600);
    let mut ids = valley.attach_asset(AssetKind::Mountain, model("mountain.glb"));
    ids.extend(valley.attach_asset(AssetKind::House, model("house.glb")));
    ids.extend(valley.attach_asset(AssetKind::Tree, model("tree.glb")));

    for id in ids {
        let node = valley.scene.get(id).expect("model was added");
        let mut meshes = 0;
        node.traverse(&mut |n| {
            if let Some(mesh) = n.as_mesh() {
                meshes += 1;
                assert!(mesh.cast_shadow && mesh.receive_shadow, "{} lacks shadows", n.name);
            }
        });
        assert_eq!(meshes, 2);
    }
}

#[test]
fn should_give_equal_valleys_for_equal_seeds() {
    let layout = |seed| {
        let mut valley = Landscape::new(seeded(seed), 800, 600);
        let trees = valley.attach_asset(AssetKind::Tree, model("tree.glb"));
        let tree_positions: Vec<_> = trees
            .iter()
            .filter_map(|id| valley.scene.get(*id))
            .map(|n| n.local.position)
            .collect();
        (valley.cloud_positions(), tree_positions)
    };
    assert_eq!(layout(42), layout(42));
    assert_ne!(layout(42), layout(43));
}

#[test]
fn should_share_one_batch_per_mesh_between_cloned_trees() {
    let mut valley = Landscape::new(seeded(7), 800, 600);
    valley.attach_asset(AssetKind::Tree, model("tree.glb"));
    valley.scene.update_world_transforms();

    let frame = collect_batches(&valley.scene, valley.camera.position);
    let tree_batches: Vec<_> = frame
        .opaque
        .iter()
        .filter(|b| b.material.name.starts_with("tree.glb"))
        .collect();
    assert_eq!(tree_batches.len(), 2);
    assert!(tree_batches.iter().all(|b| b.instances.len() == 90));

    let casting = frame
        .shadow_casters
        .iter()
        .filter(|b| b.material.name.starts_with("tree.glb"))
        .count();
    assert_eq!(casting, 2);
    // the ground only receives
    assert!(frame.shadow_casters.iter().all(|b| b.material.name != "grass"));
}
