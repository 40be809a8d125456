use std::collections::BTreeMap;
use std::ops::{Add, Mul};

use crate::error::{FieldError, Result};
use crate::math::{Aabb, Point3, Vector3, TOLERANCE};

use super::FlowField;

/// Geometry of a rectilinear grid of sample points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    origin: Point3,
    spacing: Vector3,
    dimensions: [usize; 3],
    point_count: usize,
}

impl GridSpec {
    /// Creates a grid spec.
    ///
    /// # Errors
    ///
    /// Returns an error if any axis has fewer than 2 samples, a spacing is
    /// not positive, or the total sample count overflows `usize`.
    pub fn new(origin: Point3, spacing: Vector3, dimensions: [usize; 3]) -> Result<Self> {
        if dimensions.iter().any(|&n| n < 2) {
            return Err(FieldError::InvalidGrid(format!(
                "every axis needs at least 2 samples, got {dimensions:?}"
            ))
            .into());
        }
        if spacing.iter().any(|&h| h.is_nan() || h <= 0.0) {
            return Err(FieldError::InvalidGrid("grid spacing must be positive".to_owned()).into());
        }
        let point_count = dimensions
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .ok_or_else(|| {
                FieldError::InvalidGrid(format!("sample count of {dimensions:?} overflows"))
            })?;
        Ok(Self {
            origin,
            spacing,
            dimensions,
            point_count,
        })
    }

    /// Position of sample `(0, 0, 0)`.
    #[must_use]
    pub fn origin(&self) -> Point3 {
        self.origin
    }

    /// Distance between neighbouring samples along each axis.
    #[must_use]
    pub fn spacing(&self) -> Vector3 {
        self.spacing
    }

    /// Number of samples along each axis.
    #[must_use]
    pub fn dimensions(&self) -> [usize; 3] {
        self.dimensions
    }

    /// Total number of sample points.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Linear index of sample `(i, j, k)`.
    #[must_use]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        let [nx, ny, _] = self.dimensions;
        i + nx * (j + ny * k)
    }

    /// World position of sample `(i, j, k)`.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn position(&self, i: usize, j: usize, k: usize) -> Point3 {
        self.origin
            + Vector3::new(
                self.spacing.x * i as f64,
                self.spacing.y * j as f64,
                self.spacing.z * k as f64,
            )
    }

    /// Domain bounds.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        let [nx, ny, nz] = self.dimensions;
        Aabb::new(self.origin, self.position(nx - 1, ny - 1, nz - 1))
    }

    /// Finds the cell containing `p` and the fractional position inside it.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn locate(&self, p: &Point3) -> Option<([usize; 3], [f64; 3])> {
        let mut cell = [0usize; 3];
        let mut frac = [0.0f64; 3];
        for axis in 0..3 {
            let n = self.dimensions[axis];
            let u = (p[axis] - self.origin[axis]) / self.spacing[axis];
            let last = (n - 1) as f64;
            if !(-TOLERANCE..=last + TOLERANCE).contains(&u) {
                return None;
            }
            let u = u.clamp(0.0, last);
            let i = (u.floor() as usize).min(n - 2);
            cell[axis] = i;
            frac[axis] = u - i as f64;
        }
        Some((cell, frac))
    }

    /// Trilinearly interpolates `values` at `p`.
    fn interpolate<T>(&self, values: &[T], p: &Point3) -> Option<T>
    where
        T: Copy + Add<Output = T> + Mul<f64, Output = T>,
    {
        let ([i, j, k], [fx, fy, fz]) = self.locate(p)?;
        let mut acc: Option<T> = None;
        for dk in 0..2 {
            let wz = if dk == 0 { 1.0 - fz } else { fz };
            for dj in 0..2 {
                let wy = if dj == 0 { 1.0 - fy } else { fy };
                for di in 0..2 {
                    let wx = if di == 0 { 1.0 - fx } else { fx };
                    let term = values[self.index(i + di, j + dj, k + dk)] * (wx * wy * wz);
                    acc = Some(match acc {
                        Some(sum) => sum + term,
                        None => term,
                    });
                }
            }
        }
        acc
    }
}

/// A flow field sampled on a rectilinear grid, interpolated trilinearly.
#[derive(Debug, Clone)]
pub struct GridField {
    grid: GridSpec,
    velocity: Vec<Vector3>,
    scalars: BTreeMap<String, Vec<f64>>,
}

impl GridField {
    /// Creates a grid field from per-sample flow vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if `velocity` does not hold one vector per sample.
    pub fn new(grid: GridSpec, velocity: Vec<Vector3>) -> Result<Self> {
        check_length(&grid, "velocity", velocity.len())?;
        Ok(Self {
            grid,
            velocity,
            scalars: BTreeMap::new(),
        })
    }

    /// Creates a grid field by evaluating `velocity` at every sample position.
    #[must_use]
    pub fn from_fn(grid: GridSpec, velocity: impl Fn(&Point3) -> Vector3) -> Self {
        let velocity = sample_grid(&grid, velocity);
        Self {
            grid,
            velocity,
            scalars: BTreeMap::new(),
        }
    }

    /// Adds a scalar array with one value per sample.
    ///
    /// # Errors
    ///
    /// Returns an error if `values` does not hold one value per sample.
    pub fn with_scalar(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        let name = name.into();
        check_length(&self.grid, &name, values.len())?;
        self.scalars.insert(name, values);
        Ok(self)
    }

    /// Adds a scalar array by evaluating `f` at every sample position.
    #[must_use]
    pub fn with_scalar_fn(mut self, name: impl Into<String>, f: impl Fn(&Point3) -> f64) -> Self {
        let values = sample_grid(&self.grid, f);
        self.scalars.insert(name.into(), values);
        self
    }

    /// Returns the grid geometry.
    #[must_use]
    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }
}

impl FlowField for GridField {
    fn bounds(&self) -> Aabb {
        self.grid.bounds()
    }

    fn velocity(&self, p: &Point3) -> Option<Vector3> {
        self.grid.interpolate(&self.velocity, p)
    }

    fn scalar(&self, name: &str, p: &Point3) -> Option<f64> {
        let values = self.scalars.get(name)?;
        self.grid.interpolate(values, p)
    }

    fn has_scalar(&self, name: &str) -> bool {
        self.scalars.contains_key(name)
    }

    fn cell_length(&self, _p: &Point3) -> f64 {
        self.grid.spacing.norm()
    }
}

fn check_length(grid: &GridSpec, name: &str, actual: usize) -> Result<()> {
    let expected = grid.point_count();
    if actual != expected {
        return Err(FieldError::LengthMismatch {
            name: name.to_owned(),
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}

fn sample_grid<T>(grid: &GridSpec, f: impl Fn(&Point3) -> T) -> Vec<T> {
    let [nx, ny, nz] = grid.dimensions;
    let mut out = Vec::with_capacity(grid.point_count());
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                out.push(f(&grid.position(i, j, k)));
            }
        }
    }
    out
}
