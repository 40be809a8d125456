mod cap;
mod tessellate_tube;
mod tube_params;

pub use tessellate_tube::{TessellateTubes, TubeGeometry, TubeSpan};
pub use tube_params::TubeParams;

use std::collections::BTreeMap;

use crate::math::{Aabb, Point2, Point3, Vector3};

/// A triangle mesh with optional per-vertex scalar arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    /// Vertex positions.
    pub vertices: Vec<Point3>,
    /// Vertex normals.
    pub normals: Vec<Vector3>,
    /// UV coordinates.
    pub uvs: Vec<Point2>,
    /// Triangle indices (each triple defines a triangle).
    pub indices: Vec<[u32; 3]>,
    /// Named scalar arrays with one value per vertex.
    pub point_data: BTreeMap<String, Vec<f64>>,
}

impl TriangleMesh {
    /// Returns `true` if the mesh has no triangles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// Bounding box of all vertices.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(&self.vertices)
    }

    /// Returns the scalar array `name`, if present.
    #[must_use]
    pub fn scalars(&self, name: &str) -> Option<&[f64]> {
        self.point_data.get(name).map(Vec::as_slice)
    }

    /// Appends `other`, offsetting its indices.
    ///
    /// Scalar arrays present on only one side are padded with `NaN`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn merge(&mut self, other: &TriangleMesh) {
        let before = self.vertices.len();
        let offset = before as u32;

        self.vertices.extend_from_slice(&other.vertices);
        self.normals.extend_from_slice(&other.normals);
        self.uvs.extend_from_slice(&other.uvs);
        self.indices.extend(
            other
                .indices
                .iter()
                .map(|t| [t[0] + offset, t[1] + offset, t[2] + offset]),
        );

        for (name, values) in &other.point_data {
            self.point_data
                .entry(name.clone())
                .or_insert_with(|| vec![f64::NAN; before])
                .extend_from_slice(values);
        }
        let total = self.vertices.len();
        for values in self.point_data.values_mut() {
            values.resize(total, f64::NAN);
        }
    }
}
