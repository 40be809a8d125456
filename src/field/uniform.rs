use crate::error::{ConfigError, Result};
use crate::math::{Aabb, Point3, Vector3};

use super::FlowField;

/// A scalar array defined as an affine function of position:
/// `value(p) = base + gradient · (p - origin)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearScalar {
    /// Array name.
    pub name: String,
    /// Value at the origin.
    pub base: f64,
    /// Spatial gradient of the value.
    pub gradient: Vector3,
}

impl LinearScalar {
    /// Creates a new linear scalar array.
    #[must_use]
    pub fn new(name: impl Into<String>, base: f64, gradient: Vector3) -> Self {
        Self {
            name: name.into(),
            base,
            gradient,
        }
    }
}

/// A constant flow confined to an axis-aligned box.
#[derive(Debug, Clone)]
pub struct UniformField {
    bounds: Aabb,
    velocity: Vector3,
    cell_length: f64,
    scalars: Vec<LinearScalar>,
}

impl UniformField {
    /// Creates a uniform field with unit cell length and no scalar arrays.
    #[must_use]
    pub fn new(bounds: Aabb, velocity: Vector3) -> Self {
        Self {
            bounds,
            velocity,
            cell_length: 1.0,
            scalars: Vec::new(),
        }
    }

    /// Sets the characteristic cell length.
    ///
    /// # Errors
    ///
    /// Returns an error if `cell_length` is not positive.
    pub fn with_cell_length(mut self, cell_length: f64) -> Result<Self> {
        if cell_length.is_nan() || cell_length <= 0.0 {
            return Err(ConfigError::Invalid("cell length must be positive".to_owned()).into());
        }
        self.cell_length = cell_length;
        Ok(self)
    }

    /// Adds a scalar array, replacing any array with the same name.
    #[must_use]
    pub fn with_scalar(mut self, scalar: LinearScalar) -> Self {
        self.scalars.retain(|s| s.name != scalar.name);
        self.scalars.push(scalar);
        self
    }
}

impl FlowField for UniformField {
    fn bounds(&self) -> Aabb {
        self.bounds
    }

    fn velocity(&self, p: &Point3) -> Option<Vector3> {
        self.bounds.contains(p).then_some(self.velocity)
    }

    fn scalar(&self, name: &str, p: &Point3) -> Option<f64> {
        if !self.bounds.contains(p) {
            return None;
        }
        let s = self.scalars.iter().find(|s| s.name == name)?;
        Some(s.base + s.gradient.dot(&(p - self.bounds.min)))
    }

    fn has_scalar(&self, name: &str) -> bool {
        self.scalars.iter().any(|s| s.name == name)
    }

    fn cell_length(&self, _p: &Point3) -> f64 {
        self.cell_length
    }
}
