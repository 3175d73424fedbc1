//! valley-scene
//!
//! A small landscape rendered with wgpu on native targets and in the
//! browser: a green field, a river, three loaded models (mountain, house and
//! a scattered forest), a sun, and clouds that drift across the sky and wrap
//! around. The camera orbits the valley with damped mouse controls.
//!
//! High-level modules
//! - `camera`: camera, projection, orbit controller and the camera uniform
//! - `config`: [`config::LandscapeConfig`], asset placement and seeding
//! - `context`: GPU and window context that owns device/queue/pipelines
//! - `data_structures`: scene graph, geometry, materials, instances, textures
//! - `flow`: the winit application and event loop
//! - `landscape`: the valley scene and its per-frame animation
//! - `pipelines`: lit, unlit, transparent and shadow render pipelines
//! - `resources`: asset paths, byte loading and glTF import
//! - `render`: batching of scene nodes into instanced draws
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod flow;
pub mod landscape;
pub mod pipelines;
pub mod render;
pub mod resources;

pub use config::LandscapeConfig;
pub use flow::run;
pub use landscape::Landscape;

/// Browser entry point, runs the valley with the default configuration.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn start() -> Result<(), wasm_bindgen::JsValue> {
    run(LandscapeConfig::default()).map_err(|e| wasm_bindgen::JsValue::from_str(&format!("{e:#}")))
}
