use std::path::PathBuf;

use valley_scene::{
    data_structures::{
        model::{Geometry, Material, ModelVertex},
        scene_graph::Node,
    },
    LandscapeConfig,
};

const GLB_MAGIC: &[u8; 4] = b"glTF";
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

/// Two nodes sharing one indexed triangle, no normals, one material that
/// replaces `MATERIAL`. The triangle lies in the XY plane wound
/// counter-clockwise seen from +Z.
const TRIANGLE_GLTF: &str = r#"{
  "asset": { "version": "2.0" },
  "scene": 0,
  "scenes": [ { "nodes": [0, 1] } ],
  "nodes": [
    { "name": "trunk", "mesh": 0, "translation": [0.0, 1.0, 0.0] },
    { "name": "crown", "mesh": 0, "scale": [2.0, 2.0, 2.0] }
  ],
  "meshes": [
    { "primitives": [ { "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 } ] }
  ],
  "materials": [ MATERIAL ],
  "accessors": [
    { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
      "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
    { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
  ],
  "bufferViews": [
    { "buffer": 0, "byteOffset": 0, "byteLength": 36, "target": 34962 },
    { "buffer": 0, "byteOffset": 36, "byteLength": 6, "target": 34963 }
  ],
  "buffers": [ { "byteLength": 42 } ]
}"#;

/// The opaque material of [`triangle_glb`].
pub const BARK_MATERIAL: &str = r#"{
      "name": "bark",
      "pbrMetallicRoughness": {
        "baseColorFactor": [0.2, 0.5, 0.1, 1.0],
        "metallicFactor": 0.0,
        "roughnessFactor": 0.8
      }
    }"#;

fn triangle_bin() -> Vec<u8> {
    let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    let indices: [u16; 3] = [0, 1, 2];
    let mut bin = Vec::new();
    for value in positions {
        bin.extend_from_slice(&value.to_le_bytes());
    }
    for index in indices {
        bin.extend_from_slice(&index.to_le_bytes());
    }
    bin
}

fn push_chunk(glb: &mut Vec<u8>, kind: u32, mut data: Vec<u8>, pad: u8) {
    while data.len() % 4 != 0 {
        data.push(pad);
    }
    glb.extend_from_slice(&(data.len() as u32).to_le_bytes());
    glb.extend_from_slice(&kind.to_le_bytes());
    glb.extend_from_slice(&data);
}

/// A binary glTF with a JSON chunk and a BIN chunk.
pub fn triangle_glb() -> Vec<u8> {
    triangle_glb_with_material(BARK_MATERIAL)
}

/// [`triangle_glb`] with its only material given as a glTF material object.
pub fn triangle_glb_with_material(material: &str) -> Vec<u8> {
    let json = TRIANGLE_GLTF.replace("MATERIAL", material);
    let mut body = Vec::new();
    push_chunk(&mut body, CHUNK_JSON, json.into_bytes(), b' ');
    push_chunk(&mut body, CHUNK_BIN, triangle_bin(), 0);

    let mut glb = Vec::new();
    glb.extend_from_slice(GLB_MAGIC);
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&((12 + body.len()) as u32).to_le_bytes());
    glb.extend_from_slice(&body);
    glb
}

/// A fresh directory under the system temp dir, unique per test name.
pub fn asset_dir(test_name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "valley-scene-{}-{test_name}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).expect("failed to create the asset directory");
    dir
}

/// A small stand-in for a loaded model: a group with two meshes.
pub fn model(name: &str) -> Node {
    let vertex = |x: f32, y: f32| ModelVertex {
        position: [x, y, 0.0],
        normal: [0.0, 0.0, 1.0],
        ..Default::default()
    };
    let geometry = std::sync::Arc::new(Geometry::new(
        format!("{name} geometry"),
        vec![vertex(0.0, 0.0), vertex(1.0, 0.0), vertex(0.0, 1.0)],
        vec![0, 1, 2],
    ));
    let trunk = std::sync::Arc::new(Material::standard(format!("{name} trunk"), 0x8b5a2b));
    let leaves = std::sync::Arc::new(Material::standard(format!("{name} leaves"), 0x2e7d32));

    let mut group = Node::group(name);
    group.add_child(Node::mesh("trunk", geometry.clone(), trunk));
    group.add_child(Node::mesh("leaves", geometry, leaves));
    group
}

pub fn seeded(seed: u64) -> LandscapeConfig {
    LandscapeConfig::default().with_seed(seed)
}
