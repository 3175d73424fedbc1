//! Runtime configuration.
//!
//! Everything has a sensible default; `from_env` lets a launcher point the
//! binary at another asset directory or pin the random layout:
//!
//! - `VALLEY_ASSET_DIR` is the directory (or URL path on the web) the models are loaded from
//! - `VALLEY_SEED` is a `u64` seed for cloud and tree placement

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub const ASSET_DIR_VAR: &str = "VALLEY_ASSET_DIR";
pub const SEED_VAR: &str = "VALLEY_SEED";

/// Where a loaded model is grafted into the scene.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetPlacement {
    pub file: String,
    pub position: [f32; 3],
    pub scale: f32,
}

impl AssetPlacement {
    pub fn new(file: &str, position: [f32; 3], scale: f32) -> Self {
        Self {
            file: file.to_string(),
            position,
            scale,
        }
    }
}

/// Rectangle on the ground the tree clones are scattered in.
#[derive(Clone, Debug, PartialEq)]
pub struct ScatterArea {
    pub x: (f32, f32),
    pub z: (f32, f32),
}

impl ScatterArea {
    /// A random `(x, z)` inside the area. Bounds may come in either order. An
    /// axis without a usable width always yields its one finite bound.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> (f32, f32) {
        (scatter(rng, self.x), scatter(rng, self.z))
    }

    /// Whether both axes span a positive, finite width.
    pub fn has_area(&self) -> bool {
        spans(self.x) && spans(self.z)
    }
}

fn spans((a, b): (f32, f32)) -> bool {
    let (lo, hi) = (a.min(b), a.max(b));
    lo < hi && (hi - lo).is_finite()
}

fn scatter<R: Rng + ?Sized>(rng: &mut R, (a, b): (f32, f32)) -> f32 {
    let (lo, hi) = (a.min(b), a.max(b));
    if spans((lo, hi)) {
        rng.random_range(lo..hi)
    } else if lo.is_finite() {
        lo
    } else if hi.is_finite() {
        hi
    } else {
        0.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LandscapeConfig {
    pub asset_dir: String,
    /// `None` draws a fresh layout on every start.
    pub seed: Option<u64>,
    pub mountain: AssetPlacement,
    pub house: AssetPlacement,
    /// `position` is ignored for trees, the clones are scattered in `tree_area`.
    pub tree: AssetPlacement,
    pub tree_count: usize,
    pub tree_area: ScatterArea,
    pub cloud_count: usize,
}

impl Default for LandscapeConfig {
    fn default() -> Self {
        Self {
            asset_dir: "assets".to_string(),
            seed: None,
            mountain: AssetPlacement::new("mountain.glb", [70.0, 0.0, -80.0], 60.0),
            house: AssetPlacement::new("house.glb", [30.0, 10.0, 10.0], 15.0),
            tree: AssetPlacement::new("tree.glb", [0.0, 0.0, 0.0], 5.0),
            tree_count: 90,
            tree_area: ScatterArea {
                x: (-90.0, -30.0),
                z: (-100.0, 100.0),
            },
            cloud_count: 9,
        }
    }
}

impl LandscapeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Applies overrides from any key/value source, e.g. the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup(ASSET_DIR_VAR).filter(|dir| !dir.trim().is_empty()) {
            config.asset_dir = dir;
        }
        if let Some(seed) = lookup(SEED_VAR) {
            match seed.trim().parse::<u64>() {
                Ok(seed) => config.seed = Some(seed),
                Err(e) => log::warn!("Ignoring {SEED_VAR}={seed:?}: {e}"),
            }
        }
        config
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn defaults_place_the_three_models() {
        let config = LandscapeConfig::default();
        assert_eq!(config.mountain.position, [70.0, 0.0, -80.0]);
        assert_eq!(config.mountain.scale, 60.0);
        assert_eq!(config.house.position, [30.0, 10.0, 10.0]);
        assert_eq!(config.house.scale, 15.0);
        assert_eq!(config.tree.scale, 5.0);
        assert_eq!(config.tree_count, 90);
        assert_eq!(config.cloud_count, 9);
    }

    #[test]
    fn lookup_overrides_dir_and_seed() {
        let config = LandscapeConfig::from_lookup(|key| match key {
            ASSET_DIR_VAR => Some("/srv/models".to_string()),
            SEED_VAR => Some(" 42 ".to_string()),
            _ => None,
        });
        assert_eq!(config.asset_dir, "/srv/models");
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn invalid_seed_is_ignored() {
        let config = LandscapeConfig::from_lookup(|key| (key == SEED_VAR).then(|| "abc".to_string()));
        assert_eq!(config.seed, None);
        assert_eq!(config.asset_dir, "assets");
    }

    #[test]
    fn scatter_handles_reversed_and_empty_ranges() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let reversed = ScatterArea {
            x: (-30.0, -90.0),
            z: (10.0, 10.0),
        };
        assert!(!reversed.has_area());
        for _ in 0..100 {
            let (x, z) = reversed.sample(&mut rng);
            assert!((-90.0..-30.0).contains(&x));
            assert_eq!(z, 10.0);
        }

        let broken = ScatterArea {
            x: (f32::NAN, f32::NAN),
            z: (f32::NEG_INFINITY, 4.0),
        };
        assert_eq!(broken.sample(&mut rng), (0.0, 4.0));
        assert!(LandscapeConfig::default().tree_area.has_area());
    }

    #[test]
    fn seeded_rngs_agree() {
        let config = LandscapeConfig::default().with_seed(7);
        let a: f32 = config.rng().random();
        let b: f32 = config.rng().random();
        assert_eq!(a, b);
    }
}
