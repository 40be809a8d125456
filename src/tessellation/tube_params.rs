use serde::{Deserialize, Serialize};

use crate::error::{Result, TessellationError};

/// Cross-section parameters for tube tessellation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TubeParams {
    radius: f64,
    sides: usize,
    capping: bool,
}

impl TubeParams {
    /// Creates capped tube parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if `radius` is not positive or `sides < 3`.
    pub fn new(radius: f64, sides: usize) -> Result<Self> {
        let params = Self {
            radius,
            sides,
            capping: true,
        };
        params.validate()?;
        Ok(params)
    }

    /// Enables or disables end caps.
    #[must_use]
    pub fn with_capping(mut self, capping: bool) -> Self {
        self.capping = capping;
        self
    }

    /// Checks the preconditions of tube tessellation.
    ///
    /// # Errors
    ///
    /// Returns an error if `radius` is not positive or `sides < 3`.
    pub fn validate(&self) -> Result<()> {
        if self.radius.is_nan() || self.radius <= 0.0 {
            return Err(TessellationError::InvalidParameters(format!(
                "tube radius must be positive, got {}",
                self.radius
            ))
            .into());
        }
        if self.sides < 3 {
            return Err(TessellationError::InvalidParameters(format!(
                "tube needs at least 3 sides, got {}",
                self.sides
            ))
            .into());
        }
        Ok(())
    }

    /// Returns the tube radius.
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Returns the number of sides of the cross-section.
    #[must_use]
    pub fn sides(&self) -> usize {
        self.sides
    }

    /// Returns whether tube ends are capped.
    #[must_use]
    pub fn capping(&self) -> bool {
        self.capping
    }
}

impl Default for TubeParams {
    fn default() -> Self {
        Self {
            radius: 0.01,
            sides: 6,
            capping: true,
        }
    }
}
