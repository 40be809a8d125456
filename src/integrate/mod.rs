mod rk45;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, FieldError, Result};
use crate::field::FlowField;
use crate::math::{Point3, Vector3, TOLERANCE};
use crate::seed::SeedGeometry;

use rk45::{Probe, StepResult};

/// Safety factor applied to the optimal step size estimate.
const SAFETY: f64 = 0.9;

/// Largest factor by which a step may grow after an accepted step.
const MAX_GROWTH: f64 = 5.0;

/// Smallest factor by which a step may shrink after a rejected step.
const MIN_SHRINK: f64 = 0.1;

/// Unit in which step sizes are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepUnit {
    /// World-space length.
    Length,
    /// Multiples of the local cell length of the field.
    #[default]
    CellLength,
}

/// Limits and tolerances for streamline integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerParams {
    /// Maximum arc length of a streamline (world units).
    pub max_propagation: f64,
    /// Unit of `initial_step`, `min_step` and `max_step`.
    pub step_unit: StepUnit,
    /// First trial step.
    pub initial_step: f64,
    /// Smallest allowed step.
    pub min_step: f64,
    /// Largest allowed step.
    pub max_step: f64,
    /// Largest accepted local error estimate per step.
    pub max_error: f64,
    /// Maximum number of vertices per streamline, seed included.
    pub max_steps: usize,
    /// Integration stops once the local speed drops to this value.
    pub terminal_speed: f64,
    /// Scalar array sampled at every vertex.
    pub scalar_array: String,
}

impl Default for TracerParams {
    fn default() -> Self {
        Self {
            max_propagation: 3.0,
            step_unit: StepUnit::CellLength,
            initial_step: 0.2,
            min_step: 0.01,
            max_step: 0.5,
            max_error: 1e-6,
            max_steps: 2000,
            terminal_speed: 1e-11,
            scalar_array: "k".to_owned(),
        }
    }
}

impl TracerParams {
    /// Checks the limits for consistency.
    ///
    /// # Errors
    ///
    /// Returns an error if a limit is non-positive, `min_step > max_step`,
    /// or `max_steps` is zero.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_propagation", self.max_propagation),
            ("initial_step", self.initial_step),
            ("min_step", self.min_step),
            ("max_step", self.max_step),
            ("max_error", self.max_error),
        ];
        for (name, value) in positive {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive, got {value}")).into());
            }
        }
        if self.min_step > self.max_step {
            return Err(ConfigError::Invalid(format!(
                "min_step {} exceeds max_step {}",
                self.min_step, self.max_step
            ))
            .into());
        }
        if self.max_steps == 0 {
            return Err(ConfigError::Invalid("max_steps must be at least 1".to_owned()).into());
        }
        if self.terminal_speed.is_nan() || self.terminal_speed < 0.0 {
            return Err(ConfigError::Invalid("terminal_speed must be non-negative".to_owned()).into());
        }
        Ok(())
    }
}

/// Why a streamline stopped growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The seed or the next step lies outside the field.
    OutOfDomain,
    /// The arc length reached `max_propagation`.
    MaxPropagation,
    /// The vertex count reached `max_steps`.
    MaxSteps,
    /// The local speed dropped to `terminal_speed`.
    Stalled,
    /// The error estimate stayed above `max_error` at the smallest step.
    ErrorTolerance,
}

/// A single traced streamline.
#[derive(Debug, Clone, PartialEq)]
pub struct Streamline {
    /// Seed the line was traced from.
    pub seed: Point3,
    /// Vertices in integration order. Empty if the seed lies outside the field.
    pub points: Vec<Point3>,
    /// Scalar value per vertex (`NaN` where the array is undefined).
    pub scalars: Vec<f64>,
    /// Why integration stopped.
    pub termination: Termination,
}

impl Streamline {
    /// Cumulative arc length of the polyline.
    #[must_use]
    pub fn arc_length(&self) -> f64 {
        self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }

    /// Returns `true` if the line has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Streamlines for every seed, in seed order.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamlineSet {
    /// Name of the scalar array carried by every line.
    pub array_name: String,
    /// One streamline per seed point.
    pub lines: Vec<Streamline>,
}

impl StreamlineSet {
    /// Total number of vertices over all lines.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.lines.iter().map(|l| l.points.len()).sum()
    }
}

/// Traces one forward streamline per seed point.
pub struct TraceStreamlines<'a> {
    params: &'a TracerParams,
}

impl<'a> TraceStreamlines<'a> {
    /// Creates a new `TraceStreamlines` operation.
    #[must_use]
    pub fn new(params: &'a TracerParams) -> Self {
        Self { params }
    }

    /// Executes the tracing. Seeds are traced in parallel; the output keeps
    /// seed order and is identical for identical inputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid or the field lacks the
    /// configured scalar array.
    pub fn execute(&self, field: &dyn FlowField, seeds: &SeedGeometry) -> Result<StreamlineSet> {
        self.params.validate()?;
        if !field.has_scalar(&self.params.scalar_array) {
            return Err(FieldError::MissingArray(self.params.scalar_array.clone()).into());
        }

        let lines: Vec<Streamline> = seeds
            .points
            .par_iter()
            .map(|seed| self.trace_one(field, seed))
            .collect();

        let set = StreamlineSet {
            array_name: self.params.scalar_array.clone(),
            lines,
        };
        debug!(
            seeds = seeds.len(),
            vertices = set.vertex_count(),
            "traced streamlines"
        );
        Ok(set)
    }

    fn trace_one(&self, field: &dyn FlowField, seed: &Point3) -> Streamline {
        let p = self.params;
        let mut line = Streamline {
            seed: *seed,
            points: Vec::new(),
            scalars: Vec::new(),
            termination: Termination::OutOfDomain,
        };
        if field.velocity(seed).is_none() {
            return line;
        }

        let mut pos = *seed;
        self.push_vertex(field, &mut line, pos);

        let mut propagated = 0.0;
        let mut h = p.initial_step.clamp(p.min_step, p.max_step);

        line.termination = loop {
            if line.points.len() >= p.max_steps {
                break Termination::MaxSteps;
            }
            let remaining = p.max_propagation - propagated;
            if remaining <= TOLERANCE {
                break Termination::MaxPropagation;
            }
            let direction = match rk45::probe(field, &pos, p.terminal_speed) {
                Probe::Flow { direction, .. } => direction,
                Probe::Stalled => break Termination::Stalled,
                Probe::Outside => break Termination::OutOfDomain,
            };

            let scale = match p.step_unit {
                StepUnit::Length => 1.0,
                StepUnit::CellLength => field.cell_length(&pos),
            };

            match self.advance(field, &pos, &direction, &mut h, scale, remaining) {
                Ok(next) => {
                    propagated += (next - pos).norm();
                    pos = next;
                    self.push_vertex(field, &mut line, pos);
                }
                Err(reason) => break reason,
            }
        };
        line
    }

    /// Attempts steps from `pos` until one is accepted, adapting `h` (in step
    /// units) along the way.
    fn advance(
        &self,
        field: &dyn FlowField,
        pos: &Point3,
        direction: &Vector3,
        h: &mut f64,
        scale: f64,
        remaining: f64,
    ) -> std::result::Result<Point3, Termination> {
        let p = self.params;
        loop {
            let len = (*h * scale).min(remaining);
            let at_min = *h <= p.min_step;
            match rk45::step(field, pos, direction, len, p.terminal_speed) {
                StepResult::Moved { next, error } => {
                    if error > p.max_error && !at_min {
                        let shrink = (SAFETY * (p.max_error / error).powf(0.2)).max(MIN_SHRINK);
                        *h = (*h * shrink).max(p.min_step);
                        continue;
                    }
                    if error > p.max_error {
                        return Err(Termination::ErrorTolerance);
                    }
                    let grow = if error > 0.0 {
                        (SAFETY * (p.max_error / error).powf(0.2)).min(MAX_GROWTH)
                    } else {
                        MAX_GROWTH
                    };
                    *h = (*h * grow).clamp(p.min_step, p.max_step);
                    return Ok(next);
                }
                StepResult::LeftDomain if !at_min => {
                    *h = (*h * 0.5).max(p.min_step);
                }
                StepResult::LeftDomain => return Err(Termination::OutOfDomain),
                StepResult::Stalled => return Err(Termination::Stalled),
            }
        }
    }

    fn push_vertex(&self, field: &dyn FlowField, line: &mut Streamline, pos: Point3) {
        let value = field
            .scalar(&self.params.scalar_array, &pos)
            .unwrap_or(f64::NAN);
        line.points.push(pos);
        line.scalars.push(value);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::field::{GridField, GridSpec, LinearScalar, UniformField};
    use crate::math::Aabb;
    use crate::seed::{GenerateSeeds, SeedSpec};

    fn tall_uniform_field() -> UniformField {
        UniformField::new(
            Aabb::new(Point3::new(-1.0, -1.0, 0.0), Point3::new(1.0, 1.0, 10.0)),
            Vector3::z(),
        )
        .with_scalar(LinearScalar::new("k", 0.0, Vector3::new(0.0, 0.0, 1.0)))
    }

    fn vortex_field() -> GridField {
        let grid = GridSpec::new(
            Point3::new(-2.0, -2.0, -0.5),
            Vector3::new(0.1, 0.1, 0.25),
            [41, 41, 5],
        )
        .unwrap();
        GridField::from_fn(grid, |p| Vector3::new(-p.y, p.x, 0.0))
            .with_scalar_fn("k", |p| p.x * p.x + p.y * p.y)
    }

    fn seeds(p1: Point3, p2: Point3, n: u32) -> SeedGeometry {
        GenerateSeeds::new(SeedSpec::new(p1, p2, n)).execute().unwrap()
    }

    #[test]
    fn uniform_flow_gives_straight_lines_of_max_propagation() {
        let params = TracerParams::default();
        let field = tall_uniform_field();
        let seeds = seeds(Point3::new(-0.4, 0.0, 0.05), Point3::new(-0.4, 0.0, 1.5), 10);
        let set = TraceStreamlines::new(&params).execute(&field, &seeds).unwrap();

        assert_eq!(set.lines.len(), 10);
        for line in &set.lines {
            assert_eq!(line.termination, Termination::MaxPropagation);
            assert!((line.arc_length() - 3.0).abs() < 1e-9);
            for q in &line.points {
                assert!((q.x - line.seed.x).abs() < 1e-12);
                assert!((q.y - line.seed.y).abs() < 1e-12);
            }
            assert!(line.points.windows(2).all(|w| w[1].z > w[0].z));
            assert_eq!(line.points.len(), line.scalars.len());
        }
    }

    #[test]
    fn seed_outside_domain_gives_empty_line() {
        let params = TracerParams::default();
        let field = tall_uniform_field();
        let seeds = seeds(Point3::new(5.0, 0.0, 1.0), Point3::new(6.0, 0.0, 1.0), 2);
        let set = TraceStreamlines::new(&params).execute(&field, &seeds).unwrap();
        assert!(set.lines.iter().all(Streamline::is_empty));
        assert!(set.lines.iter().all(|l| l.termination == Termination::OutOfDomain));
    }

    #[test]
    fn line_stops_at_domain_boundary() {
        let params = TracerParams {
            max_propagation: 100.0,
            ..TracerParams::default()
        };
        let field = tall_uniform_field();
        let seeds = seeds(Point3::new(0.0, 0.0, 9.0), Point3::new(0.0, 0.0, 9.0), 1);
        let set = TraceStreamlines::new(&params).execute(&field, &seeds).unwrap();
        let line = &set.lines[0];
        assert_eq!(line.termination, Termination::OutOfDomain);
        assert!(line.points.iter().all(|q| q.z <= 10.0));
        assert!(line.arc_length() > 0.9);
    }

    #[test]
    fn vertex_count_respects_max_steps() {
        let params = TracerParams {
            max_steps: 4,
            ..TracerParams::default()
        };
        let field = tall_uniform_field();
        let seeds = seeds(Point3::new(0.0, 0.0, 1.0), Point3::new(0.0, 0.0, 1.0), 1);
        let set = TraceStreamlines::new(&params).execute(&field, &seeds).unwrap();
        assert_eq!(set.lines[0].points.len(), 4);
        assert_eq!(set.lines[0].termination, Termination::MaxSteps);
    }

    #[test]
    fn curved_flow_respects_limits_and_stays_on_circle() {
        let params = TracerParams {
            step_unit: StepUnit::Length,
            max_propagation: 2.0,
            ..TracerParams::default()
        };
        let field = vortex_field();
        let seeds = seeds(Point3::new(0.5, 0.0, 0.0), Point3::new(1.5, 0.0, 0.0), 5);
        let set = TraceStreamlines::new(&params).execute(&field, &seeds).unwrap();

        for line in &set.lines {
            assert!(line.points.len() <= params.max_steps);
            assert!(line.arc_length() <= params.max_propagation + 1e-9);
            let r0 = (line.seed - Point3::origin()).norm();
            for (q, k) in line.points.iter().zip(&line.scalars) {
                let r = (q - Point3::origin()).norm();
                assert!((r - r0).abs() < 1e-3, "radius drifted from {r0} to {r}");
                assert!((k - r * r).abs() < 0.05);
            }
        }
    }

    #[test]
    fn tracing_is_deterministic() {
        let params = TracerParams::default();
        let field = vortex_field();
        let seeds = seeds(Point3::new(0.2, -0.3, 0.0), Point3::new(1.2, 0.4, 0.1), 20);
        let a = TraceStreamlines::new(&params).execute(&field, &seeds).unwrap();
        let b = TraceStreamlines::new(&params).execute(&field, &seeds).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn stagnant_flow_stalls_at_seed() {
        let params = TracerParams::default();
        let field = UniformField::new(
            Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0)),
            Vector3::zeros(),
        )
        .with_scalar(LinearScalar::new("k", 1.0, Vector3::zeros()));
        let seeds = seeds(Point3::new(0.5, 0.5, 0.5), Point3::new(0.5, 0.5, 0.5), 1);
        let set = TraceStreamlines::new(&params).execute(&field, &seeds).unwrap();
        assert_eq!(set.lines[0].points.len(), 1);
        assert_eq!(set.lines[0].termination, Termination::Stalled);
    }

    #[test]
    fn missing_scalar_array_is_reported() {
        let params = TracerParams {
            scalar_array: "p".to_owned(),
            ..TracerParams::default()
        };
        let field = tall_uniform_field();
        let seeds = seeds(Point3::new(0.0, 0.0, 1.0), Point3::new(0.0, 0.0, 2.0), 2);
        assert!(TraceStreamlines::new(&params).execute(&field, &seeds).is_err());
    }

    #[test]
    fn inconsistent_step_limits_are_rejected() {
        let params = TracerParams {
            min_step: 1.0,
            max_step: 0.5,
            ..TracerParams::default()
        };
        let err = params.validate().unwrap_err();
        assert!(err.is_invalid_configuration());
    }
}
