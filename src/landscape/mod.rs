//! The valley itself: scene, camera and the per-frame animation.
//!
//! [`Landscape`] owns everything the scene needs between frames. It never
//! touches the GPU, so the whole frame logic (cloud drift, orbit damping,
//! resize, grafting loaded models) is testable without a window.

pub mod assets;
pub mod builder;
pub mod clouds;

use cgmath::Deg;
use log::{debug, info};
use rand_chacha::ChaCha8Rng;
use winit::event::WindowEvent;

use crate::{
    camera::{Camera, OrbitController, Projection},
    config::LandscapeConfig,
    data_structures::scene_graph::{Node, NodeId, Scene},
    landscape::assets::{AssetKind, AssetRequest},
};

pub const PHASE_STEP: f32 = 0.01;
pub const DAMPING_FACTOR: f32 = 0.05;

pub const FOVY_DEGREES: f32 = 60.0;
pub const Z_NEAR: f32 = 0.1;
pub const Z_FAR: f32 = 1000.0;
pub const CAMERA_START: [f32; 3] = [20.0, 15.0, 35.0];

pub struct Landscape {
    pub scene: Scene,
    pub camera: Camera,
    pub projection: Projection,
    pub controls: OrbitController,
    clouds: Vec<NodeId>,
    phase: f32,
    viewport: (u32, u32),
    config: LandscapeConfig,
    rng: ChaCha8Rng,
}

impl Landscape {
    pub fn new(config: LandscapeConfig, width: u32, height: u32) -> Self {
        let mut rng = config.rng();
        let (scene, clouds) = builder::build_scene(config.cloud_count, &mut rng);
        // A minimized window at start-up still needs a usable aspect.
        let (width, height) = (width.max(1), height.max(1));
        let camera = Camera::new(CAMERA_START, cgmath::Point3::new(0.0, 0.0, 0.0));
        let projection = Projection::new(width, height, Deg(FOVY_DEGREES), Z_NEAR, Z_FAR);
        let controls = OrbitController::new(DAMPING_FACTOR, width, height);
        info!("Valley built with {} top-level nodes", scene.len());

        Self {
            scene,
            camera,
            projection,
            controls,
            clouds,
            phase: 0.0,
            viewport: (width, height),
            config,
            rng,
        }
    }

    /// Advance one frame: phase, cloud drift with wrap-around, damped controls.
    pub fn tick(&mut self) {
        self.phase += PHASE_STEP;
        for &id in &self.clouds {
            if let Some(cloud) = self.scene.get_mut(id) {
                clouds::drift(cloud, clouds::DRIFT_STEP);
            }
        }
        self.controls.update(&mut self.camera);
    }

    /// Zero-sized dimensions (e.g. a minimized window) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.viewport = (width, height);
        self.projection.resize(width, height);
        self.controls.set_viewport(width, height);
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        self.controls
            .handle_window_events(event, &self.camera, &self.projection);
    }

    /// Loads to start once a window exists, one per external model.
    pub fn asset_requests(&self) -> Vec<AssetRequest> {
        AssetKind::ALL
            .iter()
            .map(|kind| AssetRequest::new(*kind, &self.config))
            .collect()
    }

    /// Graft a loaded model into the scene. Returns the new top-level nodes.
    pub fn attach_asset(&mut self, kind: AssetKind, model: Node) -> Vec<NodeId> {
        let ids = assets::attach(&mut self.scene, kind, model, &self.config, &mut self.rng);
        debug!("Attached {} {kind} instance(s)", ids.len());
        ids
    }

    pub fn clouds(&self) -> &[NodeId] {
        &self.clouds
    }

    pub fn cloud_positions(&self) -> Vec<cgmath::Vector3<f32>> {
        self.clouds
            .iter()
            .filter_map(|id| self.scene.get(*id))
            .map(|cloud| cloud.local.position)
            .collect()
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn aspect(&self) -> f32 {
        self.projection.aspect()
    }
}
