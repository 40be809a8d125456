use super::{Vector3, TOLERANCE};

/// Finds a unit direction perpendicular to the given unit vector.
#[must_use]
pub fn perpendicular_dir(axis: &Vector3) -> Vector3 {
    let candidate = if axis.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let perp = axis.cross(&candidate);
    perp / perp.norm()
}

/// Transports `normal` onto the plane perpendicular to `tangent`.
///
/// Both inputs are unit vectors. Falls back to [`perpendicular_dir`] when the
/// previous normal is parallel to the new tangent.
#[must_use]
pub fn transport_normal(normal: &Vector3, tangent: &Vector3) -> Vector3 {
    let projected = normal - tangent * normal.dot(tangent);
    let len = projected.norm();
    if len < TOLERANCE {
        perpendicular_dir(tangent)
    } else {
        projected / len
    }
}
