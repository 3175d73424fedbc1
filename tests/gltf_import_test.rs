use valley_scene::{
    data_structures::{model::Shading, scene_graph::NodeKind},
    resources::load_model_gltf,
};

use crate::common::test_utils::{asset_dir, triangle_glb, triangle_glb_with_material};

mod common;

#[test]
fn should_import_a_binary_gltf_from_disk() {
    let dir = asset_dir("import");
    std::fs::write(dir.join("tree.glb"), triangle_glb()).expect("failed to write the fixture");
    let dir = dir.to_string_lossy().to_string();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let root = runtime
        .block_on(load_model_gltf(&dir, "tree.glb"))
        .expect("the fixture should load");

    assert_eq!(root.name, "tree.glb");
    assert!(matches!(root.kind, NodeKind::Group));
    assert_eq!(root.children.len(), 2);
    assert_eq!(root.mesh_count(), 2);

    let trunk = &root.children[0];
    assert_eq!(trunk.name, "trunk");
    assert_eq!(trunk.local.position, cgmath::Vector3::new(0.0, 1.0, 0.0));
    let mesh = trunk.as_mesh().expect("single primitive collapses into the node");
    assert_eq!(mesh.geometry.indices, vec![0, 1, 2]);
    assert_eq!(mesh.geometry.vertices.len(), 3);
    // no normals in the file, so they are computed from the winding
    for vertex in &mesh.geometry.vertices {
        assert_eq!(vertex.normal, [0.0, 0.0, 1.0]);
    }
    assert_eq!(mesh.material.name, "bark");
    assert_eq!(mesh.material.color, [0.2, 0.5, 0.1]);
    assert!(!mesh.material.transparent);
    assert!(!mesh.material.double_sided);
    assert_eq!(mesh.material.alpha_cutoff, None);
    assert_eq!(
        mesh.material.shading,
        Shading::Standard {
            metalness: 0.0,
            roughness: 0.8
        }
    );

    let crown = &root.children[1];
    assert_eq!(crown.name, "crown");
    assert_eq!(crown.local.scale, cgmath::Vector3::new(2.0, 2.0, 2.0));
    let crown_mesh = crown.as_mesh().expect("crown is a mesh");
    // both nodes use the same glTF material
    assert!(std::sync::Arc::ptr_eq(&mesh.material, &crown_mesh.material));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn should_report_missing_files_without_panicking() {
    let dir = asset_dir("missing");
    let dir = dir.to_string_lossy().to_string();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let result = runtime.block_on(load_model_gltf(&dir, "mountain.glb"));
    let message = format!("{:#}", result.expect_err("nothing to load"));
    assert!(message.contains("mountain.glb"), "{message}");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn should_reject_bytes_that_are_not_gltf() {
    let dir = asset_dir("garbage");
    std::fs::write(dir.join("house.glb"), b"definitely not gltf").expect("failed to write the fixture");
    let dir = dir.to_string_lossy().to_string();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    assert!(runtime.block_on(load_model_gltf(&dir, "house.glb")).is_err());

    std::fs::remove_dir_all(&dir).ok();
}

fn import_material(test_name: &str, material: &str) -> std::sync::Arc<valley_scene::data_structures::model::Material> {
    let dir = asset_dir(test_name);
    std::fs::write(dir.join("leaves.glb"), triangle_glb_with_material(material))
        .expect("failed to write the fixture");
    let dir = dir.to_string_lossy().to_string();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let root = runtime
        .block_on(load_model_gltf(&dir, "leaves.glb"))
        .expect("the fixture should load");
    std::fs::remove_dir_all(&dir).ok();

    root.children[0]
        .as_mesh()
        .expect("trunk is a mesh")
        .material
        .clone()
}

#[test]
fn should_import_double_sided_materials_without_culling() {
    let material = import_material(
        "double-sided",
        r#"{ "name": "leaf card", "doubleSided": true }"#,
    );

    assert_eq!(material.name, "leaf card");
    assert!(material.double_sided);
    assert_eq!(material.cull_mode(), None);
    assert!(!material.transparent);
}

#[test]
fn should_import_alpha_masked_materials_as_opaque_cutouts() {
    let material = import_material(
        "alpha-mask",
        r#"{
      "name": "foliage",
      "alphaMode": "MASK",
      "alphaCutoff": 0.3,
      "pbrMetallicRoughness": { "baseColorFactor": [0.1, 0.6, 0.2, 0.9] }
    }"#,
    );

    assert_eq!(material.alpha_cutoff, Some(0.3));
    assert_eq!(material.opacity, 0.9);
    // cut out, not blended
    assert!(!material.transparent);
    assert!(!material.double_sided);

    let default_cutoff = import_material(
        "alpha-mask-default",
        r#"{ "name": "fern", "alphaMode": "MASK" }"#,
    );
    assert_eq!(default_cutoff.alpha_cutoff, Some(0.5));
}
