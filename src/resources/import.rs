//! glTF 2.0 import into CPU scene nodes.
//!
//! The document is turned into plain [`Node`]s holding `Arc`ed geometry and
//! materials, nothing touches the GPU here. That keeps the loader `Send` so
//! it can run on a background task while the scene keeps rendering.

use std::sync::Arc;

use anyhow::{Context, bail};
use gltf::{buffer, image::Source as ImageSource, material::AlphaMode, mesh::Mode};
use log::warn;

use crate::{
    data_structures::{
        instance::Instance,
        model::{Geometry, Material, ModelVertex, Shading, TextureData},
        scene_graph::Node,
        texture::decode_image,
    },
    resources::{asset_path, load_binary},
};

/// Load `file_name` from `asset_dir` and convert its default scene into one
/// group node named after the file.
pub async fn load_model_gltf(asset_dir: &str, file_name: &str) -> anyhow::Result<Node> {
    let bytes = load_binary(&asset_path(asset_dir, file_name)).await?;
    let gltf = gltf::Gltf::from_slice(&bytes).with_context(|| format!("{file_name} is not a valid glTF document"))?;

    let mut buffers = Vec::new();
    for buf in gltf.buffers() {
        let data = match buf.source() {
            buffer::Source::Bin => gltf
                .blob
                .clone()
                .with_context(|| format!("{file_name} references a missing binary chunk"))?,
            buffer::Source::Uri(uri) if uri.starts_with("data:") => {
                bail!("{file_name}: embedded data URIs are not supported, export as .glb instead")
            }
            buffer::Source::Uri(uri) => load_binary(&asset_path(asset_dir, uri)).await?,
        };
        buffers.push(data);
    }

    let mut images = Vec::new();
    for img in gltf.images() {
        let decoded = match img.source() {
            ImageSource::View { view, mime_type } => {
                let start = view.offset();
                let end = start + view.length();
                buffers
                    .get(view.buffer().index())
                    .and_then(|data| data.get(start..end))
                    .context("image view is out of bounds")
                    .and_then(|bytes| decode_image(bytes, Some(mime_type)))
            }
            ImageSource::Uri { uri, mime_type } => match load_binary(&asset_path(asset_dir, uri)).await {
                Ok(bytes) => decode_image(&bytes, mime_type),
                Err(e) => Err(e),
            },
        };
        images.push(match decoded {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Texture {} of {file_name} could not be loaded: {e:#}", img.index());
                None
            }
        });
    }

    import_document(&gltf, &buffers, &images, file_name)
}

/// Convert an already resolved document. `images` is indexed like the
/// document's images, `None` marks one that failed to decode.
pub fn import_document(
    document: &gltf::Document,
    buffers: &[Vec<u8>],
    images: &[Option<TextureData>],
    name: &str,
) -> anyhow::Result<Node> {
    let materials: Vec<Arc<Material>> = document
        .materials()
        .map(|material| Arc::new(convert_material(&material, images, name)))
        .collect();
    let fallback = Arc::new(Material::standard(format!("{name} default"), 0xffffff));

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .with_context(|| format!("{name} contains no scene"))?;

    let mut root = Node::group(name);
    for node in scene.nodes() {
        root.add_child(to_scene_node(node, buffers, &materials, &fallback, name));
    }
    Ok(root)
}

fn convert_material(material: &gltf::Material, images: &[Option<TextureData>], model: &str) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();
    let name = material
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{model} material {}", material.index().unwrap_or_default()));

    let mut converted = Material::new(
        name,
        [r, g, b],
        Shading::Standard {
            metalness: pbr.metallic_factor(),
            roughness: pbr.roughness_factor(),
        },
    );
    match material.alpha_mode() {
        AlphaMode::Blend => converted = converted.with_opacity(a),
        AlphaMode::Mask => {
            // Cut out in the opaque pass, so the factor's alpha takes part in
            // the test but nothing is blended.
            converted.opacity = a;
            converted = converted.with_alpha_cutoff(material.alpha_cutoff().unwrap_or(0.5));
        }
        AlphaMode::Opaque => {}
    }
    converted = converted.with_double_sided(material.double_sided());
    if let Some(info) = pbr.base_color_texture() {
        let source = info.texture().source().index();
        if let Some(Some(texture)) = images.get(source) {
            converted = converted.with_texture(texture.clone());
        }
    }
    converted
}

fn to_scene_node(
    node: gltf::Node,
    buffers: &[Vec<u8>],
    materials: &[Arc<Material>],
    fallback: &Arc<Material>,
    model: &str,
) -> Node {
    let name = node
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{model} node {}", node.index()));

    let mut primitives = Vec::new();
    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            let Some((vertices, indices)) = read_primitive(&primitive, buffers, &name) else {
                continue;
            };
            let material = primitive
                .material()
                .index()
                .and_then(|idx| materials.get(idx))
                .unwrap_or(fallback)
                .clone();
            let geometry = Geometry::new(format!("{name} primitive {}", primitive.index()), vertices, indices);
            primitives.push(Node::mesh(geometry.name.clone(), Arc::new(geometry), material));
        }
    }

    let mut scene_node = if primitives.len() == 1 && node.children().next().is_none() {
        let mut single = primitives.remove(0);
        single.name = name;
        single
    } else {
        let mut group = Node::group(name);
        for primitive in primitives {
            group.add_child(primitive);
        }
        group
    };

    let (translation, rotation, scale) = node.transform().decomposed();
    scene_node.local = Instance {
        position: translation.into(),
        rotation: cgmath::Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2]),
        scale: scale.into(),
    };

    for child in node.children() {
        scene_node.add_child(to_scene_node(child, buffers, materials, fallback, model));
    }
    scene_node
}

fn read_primitive(
    primitive: &gltf::Primitive,
    buffers: &[Vec<u8>],
    node: &str,
) -> Option<(Vec<ModelVertex>, Vec<u32>)> {
    if primitive.mode() != Mode::Triangles {
        warn!("Skipping {:?} primitive of {node}, only triangles are rendered.", primitive.mode());
        return None;
    }
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));

    let Some(positions) = reader.read_positions() else {
        warn!("Skipping primitive {} of {node} without positions.", primitive.index());
        return None;
    };
    let mut vertices: Vec<ModelVertex> = positions
        .map(|position| ModelVertex {
            position,
            ..Default::default()
        })
        .collect();

    let has_normals = match reader.read_normals() {
        Some(normals) => {
            for (vertex, normal) in vertices.iter_mut().zip(normals) {
                vertex.normal = normal;
            }
            true
        }
        None => false,
    };
    if let Some(tex_coords) = reader.read_tex_coords(0) {
        for (vertex, uv) in vertices.iter_mut().zip(tex_coords.into_f32()) {
            vertex.tex_coords = uv;
        }
    }

    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..vertices.len() as u32).collect(),
    };
    if vertices.is_empty() || indices.is_empty() {
        warn!("Skipping empty primitive {} of {node}.", primitive.index());
        return None;
    }
    if !has_normals {
        Geometry::compute_normals(&mut vertices, &indices);
    }

    Some((vertices, indices))
}
