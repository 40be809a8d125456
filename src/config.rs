use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::color::ScalarBinding;
use crate::error::{ConfigError, Result};
use crate::integrate::TracerParams;
use crate::scene::ViewSettings;
use crate::seed::SeedSpec;
use crate::tessellation::TubeParams;

/// Paths of the static scene assets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetPaths {
    /// Surface mesh file.
    pub surface: Option<PathBuf>,
    /// Volumetric field file.
    pub field: Option<PathBuf>,
}

/// Complete viewer configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Seed line shown at startup.
    pub seed: SeedSpec,
    /// Inclusive bounds the UI may set the seed resolution to.
    pub resolution_range: [u32; 2],
    /// Streamline integration limits.
    pub tracer: TracerParams,
    /// Tube cross-section.
    pub tube: TubeParams,
    /// Scalar coloring.
    pub color: ScalarBinding,
    /// Viewport and appearance.
    pub view: ViewSettings,
    /// Static asset locations.
    pub assets: AssetPaths,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            seed: SeedSpec::default(),
            resolution_range: [5, 100],
            tracer: TracerParams::default(),
            tube: TubeParams::default(),
            color: ScalarBinding::default(),
            view: ViewSettings::default(),
            assets: AssetPaths::default(),
        }
    }
}

impl ViewerConfig {
    /// Reads and validates a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails
    /// [`ViewerConfig::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config: Self = serde_json::from_slice(&bytes).map_err(ConfigError::from)?;
        config.validate()?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parses and validates a JSON config string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed or fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section for invalid parameters.
    ///
    /// # Errors
    ///
    /// Returns the first invalid-configuration error found.
    pub fn validate(&self) -> Result<()> {
        let [lo, hi] = self.resolution_range;
        if lo < 1 || lo > hi {
            return Err(ConfigError::Invalid(format!(
                "resolution range [{lo}, {hi}] must satisfy 1 <= min <= max"
            ))
            .into());
        }
        self.check_seed(&self.seed)?;
        self.tracer.validate()?;
        self.tube.validate()?;
        if self.tracer.scalar_array != self.color.array {
            debug!(
                traced = %self.tracer.scalar_array,
                colored = %self.color.array,
                "coloring by a different array than the tracer samples"
            );
        }
        if !(self.view.view_angle_deg > 0.0 && self.view.view_angle_deg < 180.0) {
            return Err(ConfigError::Invalid("view angle must lie in (0, 180) degrees".to_owned()).into());
        }
        if self.view.aspect.is_nan() || self.view.aspect <= 0.0 {
            return Err(ConfigError::Invalid("aspect ratio must be positive".to_owned()).into());
        }
        Ok(())
    }

    /// Checks a seed line against the UI bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolution lies outside `resolution_range` or
    /// an endpoint is not finite.
    pub fn check_seed(&self, seed: &SeedSpec) -> Result<()> {
        let [lo, hi] = self.resolution_range;
        if seed.resolution < lo || seed.resolution > hi {
            return Err(ConfigError::ParameterOutOfRange {
                parameter: "resolution",
                value: f64::from(seed.resolution),
                min: f64::from(lo),
                max: f64::from(hi),
            }
            .into());
        }
        if !seed.p1.iter().chain(seed.p2.iter()).all(|c| c.is_finite()) {
            return Err(ConfigError::Invalid("seed endpoints must be finite".to_owned()).into());
        }
        Ok(())
    }
}
