use serde::{Deserialize, Serialize};

use crate::error::{GeometryError, Result};
use crate::math::{Point3, Vector3};

/// Parametric seed line: `resolution` points sampled on the segment `[p1, p2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedSpec {
    /// First endpoint of the seed line.
    pub p1: Point3,
    /// Second endpoint of the seed line.
    pub p2: Point3,
    /// Number of seed points, at least 1.
    pub resolution: u32,
}

impl SeedSpec {
    /// Creates a seed spec. Validation happens in [`GenerateSeeds::execute`].
    #[must_use]
    pub fn new(p1: Point3, p2: Point3, resolution: u32) -> Self {
        Self { p1, p2, resolution }
    }

    /// Direction from `p1` to `p2` (not normalized).
    #[must_use]
    pub fn direction(&self) -> Vector3 {
        self.p2 - self.p1
    }

    /// Evaluates the segment at parameter `t` in `[0, 1]`.
    #[must_use]
    pub fn evaluate(&self, t: f64) -> Point3 {
        self.p1 + self.direction() * t
    }
}

impl Default for SeedSpec {
    fn default() -> Self {
        Self {
            p1: Point3::new(-0.4, 0.0, 0.05),
            p2: Point3::new(-0.4, 0.0, 1.5),
            resolution: 50,
        }
    }
}

/// Ordered seed points produced from a [`SeedSpec`].
#[derive(Debug, Clone, PartialEq)]
pub struct SeedGeometry {
    /// The spec these points were generated from.
    pub spec: SeedSpec,
    /// Seed points, evenly spaced from `p1` towards `p2`.
    pub points: Vec<Point3>,
}

impl SeedGeometry {
    /// Number of seed points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if there are no seed points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Samples a seed line into seed points.
pub struct GenerateSeeds {
    spec: SeedSpec,
}

impl GenerateSeeds {
    /// Creates a new `GenerateSeeds` operation.
    #[must_use]
    pub fn new(spec: SeedSpec) -> Self {
        Self { spec }
    }

    /// Executes the operation.
    ///
    /// Produces exactly `resolution` points. Both endpoints are included when
    /// `resolution >= 2`; a resolution of 1 yields the single point `p1`.
    ///
    /// # Errors
    ///
    /// Returns an error if `resolution` is zero.
    pub fn execute(&self) -> Result<SeedGeometry> {
        let n = self.spec.resolution;
        if n < 1 {
            return Err(GeometryError::ParameterOutOfRange {
                parameter: "resolution",
                value: f64::from(n),
                min: 1.0,
                max: f64::from(u32::MAX),
            }
            .into());
        }

        let points = if n == 1 {
            vec![self.spec.p1]
        } else {
            let last = f64::from(n - 1);
            (0..n)
                .map(|i| {
                    if i == n - 1 {
                        self.spec.p2
                    } else {
                        self.spec.evaluate(f64::from(i) / last)
                    }
                })
                .collect()
        };

        Ok(SeedGeometry {
            spec: self.spec,
            points,
        })
    }
}
