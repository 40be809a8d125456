use crate::field::FlowField;
use crate::math::{Point3, Vector3};

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 3.0 / 10.0;
const A42: f64 = -9.0 / 10.0;
const A43: f64 = 6.0 / 5.0;
const A51: f64 = -11.0 / 54.0;
const A52: f64 = 5.0 / 2.0;
const A53: f64 = -70.0 / 27.0;
const A54: f64 = 35.0 / 27.0;
const A61: f64 = 1631.0 / 55296.0;
const A62: f64 = 175.0 / 512.0;
const A63: f64 = 575.0 / 13824.0;
const A64: f64 = 44275.0 / 110_592.0;
const A65: f64 = 253.0 / 4096.0;

/// Fifth-order weights. All non-negative and summing to one, so a step of
/// size `h` over a unit-length direction field never moves further than `h`.
const C1: f64 = 37.0 / 378.0;
const C3: f64 = 250.0 / 621.0;
const C4: f64 = 125.0 / 594.0;
const C6: f64 = 512.0 / 1771.0;

/// Difference between fifth- and fourth-order weights.
const DC1: f64 = C1 - 2825.0 / 27648.0;
const DC3: f64 = C3 - 18575.0 / 48384.0;
const DC4: f64 = C4 - 13525.0 / 55296.0;
const DC5: f64 = -277.0 / 14336.0;
const DC6: f64 = C6 - 1.0 / 4.0;

/// Result of probing the direction field at one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Probe {
    /// Unit flow direction and the local speed.
    Flow { direction: Vector3, speed: f64 },
    /// Local speed is at or below the terminal speed.
    Stalled,
    /// The point lies outside the field's domain.
    Outside,
}

/// Samples the normalized flow direction at `p`.
pub(crate) fn probe(field: &dyn FlowField, p: &Point3, terminal_speed: f64) -> Probe {
    let Some(v) = field.velocity(p) else {
        return Probe::Outside;
    };
    let speed = v.norm();
    if speed <= terminal_speed || speed == 0.0 {
        return Probe::Stalled;
    }
    Probe::Flow {
        direction: v / speed,
        speed,
    }
}

/// Outcome of one trial step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum StepResult {
    /// The step stayed inside the domain.
    Moved { next: Point3, error: f64 },
    /// A stage evaluation fell outside the domain.
    LeftDomain,
    /// A stage evaluation hit a stagnant region.
    Stalled,
}

/// Takes one trial step of arc length `h` from `p`, whose direction `k1` is
/// already known.
pub(crate) fn step(
    field: &dyn FlowField,
    p: &Point3,
    k1: &Vector3,
    h: f64,
    terminal_speed: f64,
) -> StepResult {
    let stage = |q: Point3| match probe(field, &q, terminal_speed) {
        Probe::Flow { direction, .. } => Ok(direction),
        Probe::Stalled => Err(StepResult::Stalled),
        Probe::Outside => Err(StepResult::LeftDomain),
    };

    let run = || -> Result<StepResult, StepResult> {
        let k2 = stage(p + k1 * (h * A21))?;
        let k3 = stage(p + (k1 * A31 + k2 * A32) * h)?;
        let k4 = stage(p + (k1 * A41 + k2 * A42 + k3 * A43) * h)?;
        let k5 = stage(p + (k1 * A51 + k2 * A52 + k3 * A53 + k4 * A54) * h)?;
        let k6 = stage(p + (k1 * A61 + k2 * A62 + k3 * A63 + k4 * A64 + k5 * A65) * h)?;

        let next = p + (k1 * C1 + k3 * C3 + k4 * C4 + k6 * C6) * h;
        let error = ((k1 * DC1 + k3 * DC3 + k4 * DC4 + k5 * DC5 + k6 * DC6) * h).norm();

        if field.velocity(&next).is_none() {
            return Err(StepResult::LeftDomain);
        }
        Ok(StepResult::Moved { next, error })
    };

    match run() {
        Ok(result) | Err(result) => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{GridField, GridSpec, UniformField};
    use crate::math::Aabb;

    fn box_field(velocity: Vector3) -> UniformField {
        UniformField::new(
            Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0)),
            velocity,
        )
    }

    #[test]
    fn uniform_flow_moves_exactly_h() {
        let field = box_field(Vector3::new(0.0, 0.0, 3.0));
        let p = Point3::origin();
        let StepResult::Moved { next, error } = step(&field, &p, &Vector3::z(), 0.5, 0.0) else {
            panic!("expected a successful step");
        };
        assert!((next.z - 0.5).abs() < 1e-12);
        assert!(error < 1e-12);
    }

    #[test]
    fn step_past_boundary_reports_left_domain() {
        let field = box_field(Vector3::z());
        let p = Point3::new(0.0, 0.0, 0.9);
        assert_eq!(step(&field, &p, &Vector3::z(), 0.5, 0.0), StepResult::LeftDomain);
    }

    #[test]
    fn rotating_flow_has_small_error() {
        let grid = GridSpec::new(
            Point3::new(-2.0, -2.0, -1.0),
            Vector3::new(0.05, 0.05, 0.5),
            [81, 81, 5],
        )
        .unwrap_or_else(|e| panic!("{e}"));
        let field = GridField::from_fn(grid, |p| Vector3::new(-p.y, p.x, 0.0));
        let p = Point3::new(1.0, 0.0, 0.0);
        let Probe::Flow { direction, .. } = probe(&field, &p, 0.0) else {
            panic!("expected flow at the seed");
        };
        let StepResult::Moved { next, error } = step(&field, &p, &direction, 0.1, 0.0) else {
            panic!("expected a successful step");
        };
        assert!(error < 1e-3);
        assert!(((next - Point3::origin()).norm() - 1.0).abs() < 1e-2);
    }

    #[test]
    fn zero_flow_is_stalled() {
        let field = box_field(Vector3::zeros());
        assert_eq!(probe(&field, &Point3::origin(), 1e-11), Probe::Stalled);
    }
}
