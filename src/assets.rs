//! Static scene assets: the surface mesh and the volumetric flow field.
//!
//! Both are loaded once at startup and shared read-only afterwards. The file
//! formats are plain JSON:
//!
//! ```json
//! { "vertices": [[x, y, z], ...], "triangles": [[a, b, c], ...] }
//! ```
//!
//! ```json
//! { "origin": [x, y, z], "spacing": [dx, dy, dz], "dimensions": [nx, ny, nz],
//!   "velocity": [[u, v, w], ...], "scalars": { "k": [...] } }
//! ```
//!
//! Grid samples are ordered x fastest, then y, then z.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;

use crate::error::{AssetError, Result, StreamviewError};
use crate::field::{FlowField, GridField, GridSpec, LinearScalar, UniformField};
use crate::math::{Aabb, Point3, Vector3, TOLERANCE};
use crate::tessellation::TriangleMesh;

#[derive(Debug, Deserialize)]
struct SurfaceFile {
    vertices: Vec<[f64; 3]>,
    triangles: Vec<[u32; 3]>,
}

#[derive(Debug, Deserialize)]
struct FieldFile {
    origin: [f64; 3],
    spacing: [f64; 3],
    dimensions: [usize; 3],
    velocity: Vec<[f64; 3]>,
    #[serde(default)]
    scalars: BTreeMap<String, Vec<f64>>,
}

/// The immutable inputs shared by every pipeline run.
#[derive(Debug, Clone)]
pub struct SceneAssets {
    /// Surface drawn by the static actor.
    pub surface: Arc<TriangleMesh>,
    /// Field the streamlines are traced through.
    pub field: Arc<dyn FlowField>,
}

impl SceneAssets {
    /// Loads both assets from JSON files.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError`] if a file cannot be read, parsed, or describes
    /// inconsistent data.
    pub fn load(surface: &Path, field: &Path) -> Result<Self> {
        let surface = load_surface(surface)?;
        let field = load_field(field)?;
        Ok(Self {
            surface: Arc::new(surface),
            field,
        })
    }

    /// A self-contained scene: a box-shaped body inside a channel of uniform
    /// upward flow whose `k` array grows linearly with height.
    #[must_use]
    pub fn synthetic() -> Self {
        let channel = Aabb::new(Point3::new(-2.0, -1.5, -0.5), Point3::new(2.0, 1.5, 5.0));
        let field = UniformField::new(channel, Vector3::z())
            .with_scalar(LinearScalar::new("k", 0.0, Vector3::new(0.0, 0.0, 3.0)));
        let body = Aabb::new(Point3::new(0.2, -0.3, 0.0), Point3::new(0.8, 0.3, 0.4));
        Self {
            surface: Arc::new(cuboid_mesh(&body)),
            field: Arc::new(field),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_owned(),
        source,
    })?;
    let value = serde_json::from_slice(&bytes).map_err(|source| AssetError::Parse {
        path: path.to_owned(),
        source,
    })?;
    Ok(value)
}

fn invalid(path: &Path, reason: impl Into<String>) -> StreamviewError {
    AssetError::Invalid {
        path: PathBuf::from(path),
        reason: reason.into(),
    }
    .into()
}

/// Loads a surface mesh and computes area-weighted vertex normals.
///
/// # Errors
///
/// Returns an error if the file is unreadable or a triangle references a
/// vertex that does not exist.
pub fn load_surface(path: &Path) -> Result<TriangleMesh> {
    let file: SurfaceFile = read_json(path)?;
    let vertex_count = file.vertices.len();
    if let Some(bad) = file
        .triangles
        .iter()
        .flatten()
        .find(|&&i| i as usize >= vertex_count)
    {
        return Err(invalid(
            path,
            format!("triangle index {bad} exceeds vertex count {vertex_count}"),
        ));
    }

    let vertices: Vec<Point3> = file.vertices.iter().map(|&v| Point3::from(v)).collect();
    let normals = vertex_normals(&vertices, &file.triangles);
    info!(
        path = %path.display(),
        vertices = vertex_count,
        triangles = file.triangles.len(),
        "loaded surface"
    );
    Ok(TriangleMesh {
        vertices,
        normals,
        indices: file.triangles,
        ..TriangleMesh::default()
    })
}

/// Loads a rectilinear grid field.
///
/// # Errors
///
/// Returns an error if the file is unreadable or its arrays do not match the
/// grid dimensions.
pub fn load_field(path: &Path) -> Result<Arc<dyn FlowField>> {
    let file: FieldFile = read_json(path)?;
    let build = || -> Result<GridField> {
        let grid = GridSpec::new(
            Point3::from(file.origin),
            Vector3::from(file.spacing),
            file.dimensions,
        )?;
        let velocity = file.velocity.iter().map(|&v| Vector3::from(v)).collect();
        let mut field = GridField::new(grid, velocity)?;
        for (name, values) in &file.scalars {
            field = field.with_scalar(name.clone(), values.clone())?;
        }
        Ok(field)
    };
    let field = build().map_err(|e| invalid(path, e.to_string()))?;
    info!(
        path = %path.display(),
        dimensions = ?file.dimensions,
        scalars = ?file.scalars.keys().collect::<Vec<_>>(),
        "loaded field"
    );
    Ok(Arc::new(field))
}

fn vertex_normals(vertices: &[Point3], triangles: &[[u32; 3]]) -> Vec<Vector3> {
    let mut normals = vec![Vector3::zeros(); vertices.len()];
    for tri in triangles {
        let [a, b, c] = tri.map(|i| i as usize);
        // Unnormalized cross product weights each face by twice its area.
        let n = (vertices[b] - vertices[a]).cross(&(vertices[c] - vertices[a]));
        for i in [a, b, c] {
            normals[i] += n;
        }
    }
    for n in &mut normals {
        let len = n.norm();
        if len > TOLERANCE {
            *n /= len;
        }
    }
    normals
}

/// Closed box with outward-facing triangles and flat-shaded normals.
fn cuboid_mesh(bounds: &Aabb) -> TriangleMesh {
    let (lo, hi) = (bounds.min, bounds.max);
    // Each face: outward normal and its four corners counter-clockwise seen
    // from outside.
    let faces: [(Vector3, [Point3; 4]); 6] = [
        (
            -Vector3::x(),
            [
                Point3::new(lo.x, lo.y, lo.z),
                Point3::new(lo.x, lo.y, hi.z),
                Point3::new(lo.x, hi.y, hi.z),
                Point3::new(lo.x, hi.y, lo.z),
            ],
        ),
        (
            Vector3::x(),
            [
                Point3::new(hi.x, lo.y, lo.z),
                Point3::new(hi.x, hi.y, lo.z),
                Point3::new(hi.x, hi.y, hi.z),
                Point3::new(hi.x, lo.y, hi.z),
            ],
        ),
        (
            -Vector3::y(),
            [
                Point3::new(lo.x, lo.y, lo.z),
                Point3::new(hi.x, lo.y, lo.z),
                Point3::new(hi.x, lo.y, hi.z),
                Point3::new(lo.x, lo.y, hi.z),
            ],
        ),
        (
            Vector3::y(),
            [
                Point3::new(lo.x, hi.y, lo.z),
                Point3::new(lo.x, hi.y, hi.z),
                Point3::new(hi.x, hi.y, hi.z),
                Point3::new(hi.x, hi.y, lo.z),
            ],
        ),
        (
            -Vector3::z(),
            [
                Point3::new(lo.x, lo.y, lo.z),
                Point3::new(lo.x, hi.y, lo.z),
                Point3::new(hi.x, hi.y, lo.z),
                Point3::new(hi.x, lo.y, lo.z),
            ],
        ),
        (
            Vector3::z(),
            [
                Point3::new(lo.x, lo.y, hi.z),
                Point3::new(hi.x, lo.y, hi.z),
                Point3::new(hi.x, hi.y, hi.z),
                Point3::new(lo.x, hi.y, hi.z),
            ],
        ),
    ];

    let mut mesh = TriangleMesh::default();
    for (base, (normal, corners)) in (0u32..).step_by(4).zip(faces) {
        mesh.vertices.extend(corners);
        mesh.normals.extend([normal; 4]);
        mesh.indices.push([base, base + 1, base + 2]);
        mesh.indices.push([base, base + 2, base + 3]);
    }
    mesh
}
