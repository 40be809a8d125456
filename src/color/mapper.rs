use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FieldError, Result};
use crate::tessellation::TubeGeometry;

use super::{ColorPreset, ColorTable, OutOfRange, Rgb, ScalarRange};

/// Which scalar array drives coloring, over which fixed domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalarBinding {
    /// Name of the per-vertex scalar array.
    pub array: String,
    /// Fixed domain the table is stretched over; never rescaled to the data.
    pub domain: ScalarRange,
    /// Preset selected at startup.
    pub preset: ColorPreset,
    /// Treatment of values outside `domain`.
    pub out_of_range: OutOfRange,
}

impl Default for ScalarBinding {
    fn default() -> Self {
        Self {
            array: "k".to_owned(),
            domain: ScalarRange {
                min: 0.0,
                max: 15.6,
            },
            preset: ColorPreset::Ramp,
            out_of_range: OutOfRange::Undefined,
        }
    }
}

/// Tube geometry with one color per vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct ColoredGeometry {
    /// The geometry being colored, shared with the pipeline cache.
    pub geometry: Arc<TubeGeometry>,
    /// The table the colors were computed with, bound to its domain.
    pub table: Arc<ColorTable>,
    /// Name of the scalar array the colors were computed from.
    pub array_name: String,
    /// One color per vertex of `geometry.mesh`.
    pub colors: Vec<Rgb>,
}

/// Binds a color table to a named scalar array of tube geometry.
pub struct MapColors {
    table: ColorTable,
    array_name: String,
}

impl MapColors {
    /// Creates a new `MapColors` operation. The table is rebound to `domain`.
    #[must_use]
    pub fn new(table: &ColorTable, array_name: impl Into<String>, domain: ScalarRange) -> Self {
        Self {
            table: table.clone().with_domain(domain),
            array_name: array_name.into(),
        }
    }

    /// Uses `policy` for values outside the domain.
    #[must_use]
    pub fn with_out_of_range(mut self, policy: OutOfRange) -> Self {
        self.table = self.table.with_out_of_range(policy);
        self
    }

    /// Executes the mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the geometry has no array named `array_name`.
    pub fn execute(self, geometry: Arc<TubeGeometry>) -> Result<ColoredGeometry> {
        let values = geometry
            .mesh
            .scalars(&self.array_name)
            .ok_or_else(|| FieldError::MissingArray(self.array_name.clone()))?;
        let colors: Vec<Rgb> = values.iter().map(|&v| self.table.map(v)).collect();

        debug!(
            array = %self.array_name,
            preset = ?self.table.preset(),
            vertices = colors.len(),
            "mapped colors"
        );
        Ok(ColoredGeometry {
            geometry,
            table: Arc::new(self.table),
            array_name: self.array_name,
            colors,
        })
    }
}
