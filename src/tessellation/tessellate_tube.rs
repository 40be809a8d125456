use std::f64::consts::TAU;
use std::ops::Range;

use rayon::prelude::*;
use tracing::debug;

use crate::error::Result;
use crate::integrate::{Streamline, StreamlineSet};
use crate::math::frame::{perpendicular_dir, transport_normal};
use crate::math::{Point2, Point3, Vector3, TOLERANCE};

use super::cap::triangulate_cross_section;
use super::{TriangleMesh, TubeParams};

/// Vertex and triangle ranges of one tube inside the merged mesh.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TubeSpan {
    /// Range into [`TriangleMesh::vertices`].
    pub vertices: Range<usize>,
    /// Range into [`TriangleMesh::indices`].
    pub triangles: Range<usize>,
}

impl TubeSpan {
    /// Returns `true` if the tube produced no geometry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

/// Tubes swept along a [`StreamlineSet`], merged into one mesh.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TubeGeometry {
    /// Merged tube surfaces.
    pub mesh: TriangleMesh,
    /// One span per input streamline, in streamline order.
    pub spans: Vec<TubeSpan>,
    /// Name of the scalar array propagated from the streamlines.
    pub array_name: String,
}

/// Thickens streamlines into closed tubes of fixed radius.
///
/// Each polyline vertex becomes a ring of `sides` vertices oriented by a
/// parallel-transport frame, so the tube does not twist along straight
/// stretches. Every tube vertex carries the scalar value of the polyline
/// vertex it was generated from.
#[derive(Debug)]
pub struct TessellateTubes {
    params: TubeParams,
}

/// Orthonormal frame at one polyline vertex.
struct Frame {
    normal: Vector3,
    binormal: Vector3,
}

impl TessellateTubes {
    /// Creates a new tube tessellation operation.
    #[must_use]
    pub fn new(params: TubeParams) -> Self {
        Self { params }
    }

    /// Executes the tessellation.
    ///
    /// Empty and single-vertex streamlines produce an empty span rather than
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the tube parameters are invalid or the cap
    /// triangulation fails.
    pub fn execute(&self, streamlines: &StreamlineSet) -> Result<TubeGeometry> {
        self.params.validate()?;
        let cap = if self.params.capping() {
            triangulate_cross_section(self.params.sides())?
        } else {
            Vec::new()
        };

        let tubes: Vec<TriangleMesh> = streamlines
            .lines
            .par_iter()
            .map(|line| self.sweep(line, &streamlines.array_name, &cap))
            .collect();

        let mut geometry = TubeGeometry {
            array_name: streamlines.array_name.clone(),
            ..TubeGeometry::default()
        };
        geometry
            .mesh
            .point_data
            .insert(streamlines.array_name.clone(), Vec::new());
        for tube in &tubes {
            let v0 = geometry.mesh.vertices.len();
            let t0 = geometry.mesh.indices.len();
            geometry.mesh.merge(tube);
            geometry.spans.push(TubeSpan {
                vertices: v0..geometry.mesh.vertices.len(),
                triangles: t0..geometry.mesh.indices.len(),
            });
        }

        debug!(
            tubes = geometry.spans.iter().filter(|s| !s.is_empty()).count(),
            triangles = geometry.mesh.triangle_count(),
            "tessellated tubes"
        );
        Ok(geometry)
    }

    /// Sweeps one streamline. Returns an empty mesh for degenerate input.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn sweep(&self, line: &Streamline, array_name: &str, cap: &[[usize; 3]]) -> TriangleMesh {
        let (points, scalars) = drop_coincident(line);
        let n = points.len();
        if n < 2 {
            return TriangleMesh::default();
        }

        let sides = self.params.sides();
        let radius = self.params.radius();
        let frames = parallel_transport_frames(&points);
        let arc = cumulative_arc_lengths(&points);
        let inv_total = if arc[n - 1] > f64::EPSILON {
            1.0 / arc[n - 1]
        } else {
            0.0
        };

        let mut mesh = TriangleMesh::default();
        let mut values = Vec::with_capacity(n * sides);
        for (i, (p, frame)) in points.iter().zip(&frames).enumerate() {
            for j in 0..sides {
                let theta = TAU * j as f64 / sides as f64;
                let dir = frame.normal * theta.cos() + frame.binormal * theta.sin();
                mesh.vertices.push(p + dir * radius);
                mesh.normals.push(dir);
                mesh.uvs.push(Point2::new(j as f64 / sides as f64, arc[i] * inv_total));
                values.push(scalars[i]);
            }
        }

        let ring = |i: usize, j: usize| (i * sides + j % sides) as u32;
        for i in 0..n - 1 {
            for j in 0..sides {
                let (a0, a1) = (ring(i, j), ring(i, j + 1));
                let (b0, b1) = (ring(i + 1, j), ring(i + 1, j + 1));
                mesh.indices.push([a0, a1, b0]);
                mesh.indices.push([a1, b1, b0]);
            }
        }

        // End cap faces along the tangent, start cap against it.
        for tri in cap {
            mesh.indices.push([ring(0, tri[0]), ring(0, tri[2]), ring(0, tri[1])]);
        }
        for tri in cap {
            mesh.indices.push([ring(n - 1, tri[0]), ring(n - 1, tri[1]), ring(n - 1, tri[2])]);
        }

        mesh.point_data.insert(array_name.to_owned(), values);
        mesh
    }
}

/// Removes consecutive duplicate vertices, keeping the first scalar of each run.
fn drop_coincident(line: &Streamline) -> (Vec<Point3>, Vec<f64>) {
    let mut points: Vec<Point3> = Vec::with_capacity(line.points.len());
    let mut scalars = Vec::with_capacity(line.points.len());
    for (p, &s) in line.points.iter().zip(&line.scalars) {
        if points.last().is_some_and(|last| (p - last).norm() <= TOLERANCE) {
            continue;
        }
        points.push(*p);
        scalars.push(s);
    }
    (points, scalars)
}

/// Builds a twist-minimizing frame at every vertex. Requires at least two
/// distinct points.
fn parallel_transport_frames(points: &[Point3]) -> Vec<Frame> {
    let n = points.len();
    let segments: Vec<Vector3> = points.windows(2).map(|w| (w[1] - w[0]).normalize()).collect();

    let tangents = (0..n).map(|i| {
        if i == 0 {
            segments[0]
        } else if i == n - 1 {
            segments[n - 2]
        } else {
            let sum = segments[i - 1] + segments[i];
            let len = sum.norm();
            if len < TOLERANCE {
                segments[i]
            } else {
                sum / len
            }
        }
    });

    let mut frames: Vec<Frame> = Vec::with_capacity(n);
    for tangent in tangents {
        let normal = match frames.last() {
            Some(prev) => transport_normal(&prev.normal, &tangent),
            None => perpendicular_dir(&tangent),
        };
        frames.push(Frame {
            normal,
            binormal: tangent.cross(&normal),
        });
    }
    frames
}

/// Computes cumulative arc lengths along the polyline.
fn cumulative_arc_lengths(points: &[Point3]) -> Vec<f64> {
    let mut lengths = Vec::with_capacity(points.len());
    let mut acc = 0.0;
    lengths.push(0.0);
    for w in points.windows(2) {
        acc += (w[1] - w[0]).norm();
        lengths.push(acc);
    }
    lengths
}
