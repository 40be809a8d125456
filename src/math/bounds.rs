use serde::{Deserialize, Serialize};

use super::{Point3, Vector3};

/// An axis-aligned bounding box.
///
/// The empty box has `min > max` on every axis and absorbs nothing when
/// united with another box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point3,
    /// Maximum corner of the bounding box.
    pub max: Point3,
}

impl Aabb {
    /// Creates a box from two corners, sorting each axis.
    #[must_use]
    pub fn new(a: Point3, b: Point3) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Returns the empty box.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Computes the bounding box of a point set. Returns the empty box for no points.
    #[must_use]
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.include(p);
        }
        aabb
    }

    /// Returns `true` if the box contains no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grows the box to contain `p`.
    pub fn include(&mut self, p: &Point3) {
        self.min = Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    /// Returns the smallest box containing both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let mut out = *self;
        out.include(&other.min);
        out.include(&other.max);
        out
    }

    /// Returns `true` if `p` lies inside the box (boundary included).
    #[must_use]
    pub fn contains(&self, p: &Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Returns the center of the box.
    #[must_use]
    pub fn center(&self) -> Point3 {
        nalgebra::center(&self.min, &self.max)
    }

    /// Returns the extent of the box along each axis.
    #[must_use]
    pub fn extent(&self) -> Vector3 {
        self.max - self.min
    }

    /// Returns the radius of the sphere circumscribing the box.
    #[must_use]
    pub fn bounding_radius(&self) -> f64 {
        self.extent().norm() * 0.5
    }
}
