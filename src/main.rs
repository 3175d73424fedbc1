#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    valley_scene::run(valley_scene::LandscapeConfig::from_env())
}

// The browser build starts from `valley_scene::start`.
#[cfg(target_arch = "wasm32")]
fn main() {}
