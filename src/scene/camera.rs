use serde::{Deserialize, Serialize};

use crate::math::frame::perpendicular_dir;
use crate::math::{Aabb, Point3, Vector3, TOLERANCE};

/// Bounds used when the scene is empty.
const DEFAULT_HALF_EXTENT: f64 = 1.0;

/// Radius used for point-like scenes.
const MIN_RADIUS: f64 = 0.5;

/// Slack added to the clipping range on both sides of the bounding sphere.
const CLIP_SLACK: f64 = 1.01;

/// A perspective camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Eye position.
    pub position: Point3,
    /// Point the camera looks at.
    pub focal_point: Point3,
    /// Up direction, orthogonal to the view direction.
    pub view_up: Vector3,
    /// Vertical field of view in degrees.
    pub view_angle_deg: f64,
    /// Viewport width divided by height.
    pub aspect: f64,
    /// Near and far clipping distances.
    pub clipping_range: [f64; 2],
}

impl Camera {
    /// Creates a camera at `+z` looking at the origin with `+y` up.
    #[must_use]
    pub fn new(view_angle_deg: f64, aspect: f64) -> Self {
        Self {
            position: Point3::new(0.0, 0.0, 1.0),
            focal_point: Point3::origin(),
            view_up: Vector3::y(),
            view_angle_deg,
            aspect,
            clipping_range: [0.01, 1000.01],
        }
    }

    /// Unit vector from the focal point towards the eye.
    #[must_use]
    pub fn view_plane_normal(&self) -> Vector3 {
        let d = self.position - self.focal_point;
        let len = d.norm();
        if len < TOLERANCE {
            Vector3::z()
        } else {
            d / len
        }
    }

    /// Half of the narrower of the vertical and horizontal view angles, in radians.
    #[must_use]
    pub fn limiting_half_angle(&self) -> f64 {
        let half_v = (self.view_angle_deg * 0.5).to_radians();
        let half_h = (half_v.tan() * self.aspect).atan();
        half_v.min(half_h)
    }

    /// Moves the camera so the sphere around `bounds` fills the view.
    ///
    /// Keeps the view direction and up vector. An empty box is treated as
    /// the cube `[-1, 1]^3`.
    pub fn fit(&mut self, bounds: &Aabb) {
        let bounds = if bounds.is_empty() {
            let h = DEFAULT_HALF_EXTENT;
            Aabb::new(Point3::new(-h, -h, -h), Point3::new(h, h, h))
        } else {
            *bounds
        };

        let mut radius = bounds.bounding_radius();
        if radius < TOLERANCE {
            radius = MIN_RADIUS;
        }
        let center = bounds.center();
        let normal = self.view_plane_normal();
        let distance = radius / self.limiting_half_angle().sin();

        self.focal_point = center;
        self.position = center + normal * distance;
        self.view_up = orthogonal_up(&self.view_up, &normal);
        self.clipping_range = [
            (distance - radius * CLIP_SLACK).max(distance * 1e-3),
            distance + radius * CLIP_SLACK,
        ];
    }

    /// Returns `true` if `p` lies inside the clipping range and within the
    /// limiting half-angle of the view direction.
    ///
    /// The cone is circular, so it is narrower than the real frustum along
    /// the wider viewport axis. Use it to check a camera fit, not for culling.
    #[must_use]
    pub fn sees(&self, p: &Point3) -> bool {
        let forward = -self.view_plane_normal();
        let to_p = p - self.position;
        let depth = to_p.dot(&forward);
        if depth < self.clipping_range[0] || depth > self.clipping_range[1] {
            return false;
        }
        let cos_angle = depth / to_p.norm();
        cos_angle >= self.limiting_half_angle().cos() - 1e-9
    }
}

/// Removes the component of `up` along `normal`, falling back to any
/// perpendicular direction when they are parallel.
fn orthogonal_up(up: &Vector3, normal: &Vector3) -> Vector3 {
    let projected = up - normal * up.dot(normal);
    let len = projected.norm();
    if len < TOLERANCE {
        perpendicular_dir(normal)
    } else {
        projected / len
    }
}
