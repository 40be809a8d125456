use std::collections::HashMap;
use std::f64::consts::TAU;

use spade::{ConstrainedDelaunayTriangulation, InsertionError, Point2 as SpadePoint2, Triangulation};

use crate::error::{Result, TessellationError};

/// Triangulates the regular `sides`-gon used as a tube cross-section.
///
/// Returned triangles index ring vertices `0..sides` and wind counter-clockwise
/// in the cross-section plane, i.e. their normal points along the tube
/// tangent. Because every ring is the same polygon up to scale and placement,
/// one triangulation serves every cap.
#[allow(clippy::cast_precision_loss)]
pub(super) fn triangulate_cross_section(sides: usize) -> Result<Vec<[usize; 3]>> {
    if sides < 3 {
        return Err(TessellationError::InvalidParameters(
            "cross-section needs at least 3 vertices".into(),
        )
        .into());
    }

    let ring: Vec<SpadePoint2<f64>> = (0..sides)
        .map(|j| {
            let theta = TAU * j as f64 / sides as f64;
            SpadePoint2::new(theta.cos(), theta.sin())
        })
        .collect();

    let mut cdt = ConstrainedDelaunayTriangulation::<SpadePoint2<f64>>::new();
    let mut ring_index: HashMap<usize, usize> = HashMap::with_capacity(sides);
    let mut handles = Vec::with_capacity(sides);
    for (j, &pt) in ring.iter().enumerate() {
        let h = cdt
            .insert(pt)
            .map_err(|e: InsertionError| TessellationError::Failed(format!("CDT insert: {e}")))?;
        ring_index.insert(h.index(), j);
        handles.push(h);
    }
    for j in 0..handles.len() {
        let from = handles[j];
        let to = handles[(j + 1) % handles.len()];
        if from != to {
            cdt.add_constraint(from, to);
        }
    }

    let mut triangles = Vec::with_capacity(sides - 2);
    for face in cdt.inner_faces() {
        let verts = face.vertices();
        let positions = verts.map(|v| v.position());
        let centroid = SpadePoint2::new(
            (positions[0].x + positions[1].x + positions[2].x) / 3.0,
            (positions[0].y + positions[1].y + positions[2].y) / 3.0,
        );
        if !point_in_polygon(&ring, centroid) {
            continue;
        }
        let mut tri = [0usize; 3];
        for (slot, v) in tri.iter_mut().zip(verts.iter()) {
            *slot = *ring_index.get(&v.fix().index()).ok_or_else(|| {
                TessellationError::Failed("CDT produced a vertex outside the ring".into())
            })?;
        }
        triangles.push(tri);
    }

    if triangles.len() != sides - 2 {
        return Err(TessellationError::Failed(format!(
            "cap triangulation produced {} triangles, expected {}",
            triangles.len(),
            sides - 2
        ))
        .into());
    }
    Ok(triangles)
}

/// Even-odd point-in-polygon test.
fn point_in_polygon(polygon: &[SpadePoint2<f64>], p: SpadePoint2<f64>) -> bool {
    let mut inside = false;
    let n = polygon.len();
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if p.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn signed_area(sides: usize, tri: [usize; 3]) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let pt = |j: usize| {
            let theta = TAU * j as f64 / sides as f64;
            (theta.cos(), theta.sin())
        };
        let (a, b, c) = (pt(tri[0]), pt(tri[1]), pt(tri[2]));
        0.5 * ((b.0 - a.0) * (c.1 - a.1) - (c.0 - a.0) * (b.1 - a.1))
    }

    #[test]
    fn hexagon_has_four_ccw_triangles() {
        let tris = triangulate_cross_section(6).unwrap();
        assert_eq!(tris.len(), 4);
        assert!(tris.iter().all(|&t| signed_area(6, t) > 0.0));
    }

    #[test]
    fn triangles_cover_the_polygon() {
        for sides in 3..=16 {
            let tris = triangulate_cross_section(sides).unwrap();
            let area: f64 = tris.iter().map(|&t| signed_area(sides, t)).sum();
            #[allow(clippy::cast_precision_loss)]
            let n = sides as f64;
            let expected = 0.5 * n * (TAU / n).sin();
            assert!((area - expected).abs() < 1e-9, "sides = {sides}");
        }
    }

    #[test]
    fn fewer_than_three_sides_fail() {
        assert!(triangulate_cross_section(2).is_err());
    }
}
