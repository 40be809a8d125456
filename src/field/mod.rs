mod grid;
mod uniform;

pub use grid::{GridField, GridSpec};
pub use uniform::{LinearScalar, UniformField};

use std::fmt::Debug;

use crate::math::{Aabb, Point3, Vector3};

/// A read-only volumetric field carrying one 3-vector flow array and any
/// number of named scalar arrays.
///
/// Implementations must be pure: the same query always yields the same
/// answer, which keeps streamline tracing reproducible.
pub trait FlowField: Send + Sync + Debug {
    /// Returns the bounds of the field's domain.
    fn bounds(&self) -> Aabb;

    /// Samples the flow vector at `p`, or `None` if `p` lies outside the domain.
    fn velocity(&self, p: &Point3) -> Option<Vector3>;

    /// Samples the scalar array `name` at `p`, or `None` if `p` lies outside
    /// the domain or the array does not exist.
    fn scalar(&self, name: &str, p: &Point3) -> Option<f64>;

    /// Returns `true` if the field carries a scalar array called `name`.
    fn has_scalar(&self, name: &str) -> bool;

    /// Characteristic cell length near `p`, used to convert step sizes given
    /// in cell-length units into world lengths.
    fn cell_length(&self, p: &Point3) -> f64;
}
