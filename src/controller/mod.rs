mod inbox;

pub use inbox::ParameterInbox;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::assets::SceneAssets;
use crate::color::ColorPreset;
use crate::config::ViewerConfig;
use crate::error::Result;
use crate::pipeline::{
    Artifacts, Parameter, PipelineContext, PipelineInputs, SceneSnapshot, SnapshotHandle, Stage,
    Subscriptions,
};
use crate::scene::{FrameSink, RenderState, SceneUpdate, UpdateReason};
use crate::seed::SeedSpec;

/// One UI-side input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamChange {
    /// New seed line endpoints and resolution.
    Seed(SeedSpec),
    /// New lookup-table preset.
    ColorPreset(ColorPreset),
    /// Re-fit the camera to the scene.
    ResetCamera,
}

/// Coalesced set of pending changes: the latest value per parameter.
///
/// Also the wire shape of one input line: `{"seed": {..}}`,
/// `{"color_preset": 1}` or `{"reset_camera": true}`, any combination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChangeBatch {
    pub seed: Option<SeedSpec>,
    pub color_preset: Option<ColorPreset>,
    pub reset_camera: bool,
}

impl ChangeBatch {
    /// Folds `change` in, replacing any earlier value of the same parameter.
    pub fn push(&mut self, change: ParamChange) {
        match change {
            ParamChange::Seed(seed) => self.seed = Some(seed),
            ParamChange::ColorPreset(preset) => self.color_preset = Some(preset),
            ParamChange::ResetCamera => self.reset_camera = true,
        }
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seed.is_none() && self.color_preset.is_none() && !self.reset_camera
    }

    /// Splits the batch back into individual changes.
    #[must_use]
    pub fn into_changes(self) -> Vec<ParamChange> {
        let mut changes = Vec::with_capacity(3);
        changes.extend(self.seed.map(ParamChange::Seed));
        changes.extend(self.color_preset.map(ParamChange::ColorPreset));
        if self.reset_camera {
            changes.push(ParamChange::ResetCamera);
        }
        changes
    }
}

/// Whether a recompute cycle is in progress. Internal bookkeeping only:
/// changes that arrive during a cycle wait in the [`ParameterInbox`], which
/// is what makes them queue and coalesce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ControllerState {
    #[default]
    Idle,
    Recomputing,
}

/// Owns the pipeline context and the render state, and is the single writer
/// of both.
pub struct ReactiveController {
    config: ViewerConfig,
    subscriptions: Subscriptions,
    context: PipelineContext,
    render: RenderState,
    state: ControllerState,
    inbox: Arc<ParameterInbox>,
    snapshots: SnapshotHandle,
    sink: Box<dyn FrameSink>,
}

impl ReactiveController {
    /// Runs the full pipeline once, binds the result to a fresh render
    /// state, fits the camera and publishes the initial frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the initial
    /// pipeline run fails.
    pub fn new(config: ViewerConfig, assets: SceneAssets, sink: Box<dyn FrameSink>) -> Result<Self> {
        let context = PipelineContext::new(&config, assets)?;
        let mut render = RenderState::init(Arc::clone(&context.assets().surface), &config.view);
        render.update(Arc::clone(&context.artifacts().colored));
        render.reset_camera();
        let frame = render.frame(UpdateReason::Initial);
        sink.publish(&frame);

        let snapshots = SnapshotHandle::new(SceneSnapshot {
            artifacts: Arc::clone(context.artifacts()),
            frame,
        });
        info!(
            seeds = context.artifacts().seeds.len(),
            triangles = context.artifacts().tubes.mesh.triangle_count(),
            "pipeline initialized"
        );
        Ok(Self {
            config,
            subscriptions: Subscriptions::default(),
            context,
            render,
            state: ControllerState::Idle,
            inbox: Arc::new(ParameterInbox::new()),
            snapshots,
            sink,
        })
    }

    /// Replaces the invalidation table.
    #[must_use]
    pub fn with_subscriptions(mut self, subscriptions: Subscriptions) -> Self {
        self.subscriptions = subscriptions;
        self
    }

    /// Runs one recompute cycle for `batch` and returns the frames it
    /// produced, which have also been published to the sink.
    ///
    /// The whole batch is validated before any stage runs. On any error the
    /// committed artifacts, the render state and the published snapshot stay
    /// exactly as they were.
    ///
    /// # Errors
    ///
    /// Returns an invalid-configuration error for a rejected parameter, or
    /// the error of the failing stage.
    pub fn apply(&mut self, batch: ChangeBatch) -> Result<Vec<SceneUpdate>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(seed) = &batch.seed {
            if let Err(err) = self.config.check_seed(seed) {
                warn!(%err, "rejected parameter change");
                return Err(err);
            }
        }

        let current = self.context.artifacts().inputs;
        let mut inputs = current;
        let mut changed = Vec::new();
        if let Some(seed) = batch.seed.filter(|s| *s != current.seed) {
            inputs.seed = seed;
            changed.push(Parameter::Seed);
        }
        if let Some(preset) = batch.color_preset.filter(|p| *p != current.preset) {
            inputs.preset = preset;
            changed.push(Parameter::ColorPreset);
        }
        let dirty = self.subscriptions.invalidated(changed);
        if dirty.is_empty() && !batch.reset_camera {
            debug!("parameter values unchanged");
            return Ok(Vec::new());
        }

        self.state = ControllerState::Recomputing;
        debug!(state = ?self.state, stages = ?dirty, "cycle started");
        let result = self.cycle(&inputs, &dirty, batch.reset_camera);
        self.state = ControllerState::Idle;
        if let Err(err) = &result {
            warn!(%err, stages = ?dirty, "recompute failed, keeping previous frame");
        }
        result
    }

    fn cycle(
        &mut self,
        inputs: &PipelineInputs,
        dirty: &BTreeSet<Stage>,
        reset_camera: bool,
    ) -> Result<Vec<SceneUpdate>> {
        let started = Instant::now();
        let mut updates = Vec::new();

        if !dirty.is_empty() {
            let artifacts = self.context.recompute(inputs, dirty)?;
            self.context.commit(artifacts);
            if dirty.contains(&Stage::Render) {
                let _span = info_span!("stage", name = Stage::Render.name()).entered();
                updates.push(self.render.update(Arc::clone(&self.context.artifacts().colored)));
            }
        }
        if reset_camera {
            updates.push(self.render.reset_camera());
        }

        if let Some(frame) = updates.last() {
            self.snapshots.store(SceneSnapshot {
                artifacts: Arc::clone(self.context.artifacts()),
                frame: frame.clone(),
            });
        }
        for update in &updates {
            self.sink.publish(update);
        }
        info!(
            stages = ?dirty,
            reset_camera,
            revision = self.render.revision(),
            elapsed = ?started.elapsed(),
            "recompute cycle done"
        );
        Ok(updates)
    }

    /// Applies whatever the inbox holds, if anything.
    ///
    /// # Errors
    ///
    /// See [`ReactiveController::apply`].
    pub fn process_pending(&mut self) -> Result<Vec<SceneUpdate>> {
        match self.inbox.take() {
            Some(batch) => self.apply(batch),
            None => Ok(Vec::new()),
        }
    }

    /// Processes batches until the inbox is shut down and drained.
    pub fn run(&mut self) {
        while let Some(batch) = self.inbox.wait() {
            // Failures are logged by `apply`; the last good frame stays up.
            let _ = self.apply(batch);
        }
        info!(revision = self.render.revision(), "controller stopped");
    }

    /// Inbox that feeds this controller.
    #[must_use]
    pub fn inbox(&self) -> Arc<ParameterInbox> {
        Arc::clone(&self.inbox)
    }

    /// Handle to the published snapshots.
    #[must_use]
    pub fn snapshots(&self) -> SnapshotHandle {
        self.snapshots.clone()
    }

    /// Committed artifacts.
    #[must_use]
    pub fn artifacts(&self) -> &Arc<Artifacts> {
        self.context.artifacts()
    }

    /// Render state.
    #[must_use]
    pub fn render(&self) -> &RenderState {
        &self.render
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::mpsc;
    use std::thread;

    use approx::assert_relative_eq;

    use super::*;
    use crate::field::{LinearScalar, UniformField};
    use crate::integrate::Termination;
    use crate::math::{Aabb, Point3, Vector3};
    use crate::scene::NullSink;

    fn controller() -> ReactiveController {
        ReactiveController::new(
            ViewerConfig::default(),
            SceneAssets::synthetic(),
            Box::new(NullSink),
        )
        .unwrap()
    }

    fn with_field(field: UniformField) -> SceneAssets {
        SceneAssets {
            field: Arc::new(field),
            ..SceneAssets::synthetic()
        }
    }

    fn preset(p: ColorPreset) -> ChangeBatch {
        ChangeBatch {
            color_preset: Some(p),
            ..ChangeBatch::default()
        }
    }

    fn seed(p1: Point3, p2: Point3, resolution: u32) -> ChangeBatch {
        ChangeBatch {
            seed: Some(SeedSpec::new(p1, p2, resolution)),
            ..ChangeBatch::default()
        }
    }

    #[test]
    fn preset_change_reuses_streamlines() {
        let mut ctl = controller();
        let before = Arc::clone(ctl.artifacts());
        let camera = *ctl.render().camera();

        let updates = ctl.apply(preset(ColorPreset::Ordinal)).unwrap();
        let after = ctl.artifacts();

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].reason, UpdateReason::Geometry);
        assert!(Arc::ptr_eq(&before.seeds, &after.seeds));
        assert!(Arc::ptr_eq(&before.streamlines, &after.streamlines));
        assert!(Arc::ptr_eq(&before.tubes, &after.tubes));
        assert_eq!(*before.streamlines, *after.streamlines);
        assert!(!Arc::ptr_eq(&before.colored, &after.colored));
        assert_eq!(after.table.preset(), ColorPreset::Ordinal);
        assert_eq!(*ctl.render().camera(), camera);
        assert_eq!(ctl.state, ControllerState::Idle);
    }

    #[test]
    fn seed_change_regenerates_downstream_artifacts() {
        let mut ctl = controller();
        let before = Arc::clone(ctl.artifacts());

        ctl.apply(seed(Point3::new(-0.3, 0.1, 0.2), Point3::new(-0.3, 0.1, 1.0), 20))
            .unwrap();
        let after = ctl.artifacts();

        assert_eq!(after.seeds.len(), 20);
        assert_ne!(*before.streamlines, *after.streamlines);
        assert_ne!(*before.tubes, *after.tubes);
        assert_ne!(*before.colored, *after.colored);
        assert_eq!(after.tubes.spans.len(), 20);
        assert!(Arc::ptr_eq(&after.colored.geometry, &after.tubes));
    }

    #[test]
    fn uniform_flow_end_to_end() {
        let domain = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 10.0));
        let field = UniformField::new(domain, Vector3::z())
            .with_scalar(LinearScalar::new("k", 0.0, Vector3::new(0.0, 0.0, 1.0)));
        let ctl =
            ReactiveController::new(ViewerConfig::default(), with_field(field), Box::new(NullSink))
                .unwrap();
        let artifacts = ctl.artifacts();

        assert_eq!(artifacts.streamlines.lines.len(), 50);
        for line in &artifacts.streamlines.lines {
            assert_eq!(line.termination, Termination::MaxPropagation);
            assert_relative_eq!(line.arc_length(), 3.0, epsilon = 1e-9);
            for p in &line.points {
                assert_relative_eq!(p.x, line.seed.x, epsilon = 1e-12);
                assert_relative_eq!(p.y, line.seed.y, epsilon = 1e-12);
            }
        }

        let mesh = &artifacts.tubes.mesh;
        for (span, line) in artifacts.tubes.spans.iter().zip(&artifacts.streamlines.lines) {
            let rings = line.points.len();
            assert_eq!(span.vertices.len(), rings * 6);
            // Six quads per segment plus two hexagonal caps of four triangles.
            assert_eq!(span.triangles.len(), (rings - 1) * 12 + 8);
            for v in &mesh.vertices[span.vertices.clone()] {
                let off_axis = Vector3::new(v.x - line.seed.x, v.y - line.seed.y, 0.0);
                assert_relative_eq!(off_axis.norm(), 0.01, epsilon = 1e-9);
            }
        }
        let bounds = ctl.render().scene_bounds();
        for corner in [bounds.min, bounds.max] {
            assert!(ctl.render().camera().sees(&corner));
        }
    }

    #[test]
    fn out_of_domain_values_stay_undefined_across_presets() {
        // k runs from -5 to 40 along the lines, well past [0, 15.6] both ways.
        let domain = Aabb::new(Point3::new(-1.0, -1.0, 0.0), Point3::new(1.0, 1.0, 4.5));
        let field = UniformField::new(domain, Vector3::z())
            .with_scalar(LinearScalar::new("k", -5.0, Vector3::new(0.0, 0.0, 10.0)));
        let mut ctl =
            ReactiveController::new(ViewerConfig::default(), with_field(field), Box::new(NullSink))
                .unwrap();

        for p in [ColorPreset::Ramp, ColorPreset::Ordinal, ColorPreset::Diverging] {
            ctl.apply(preset(p)).unwrap();
            let colored = &ctl.artifacts().colored;
            assert_eq!(colored.table.preset(), p);
            let values = colored.geometry.mesh.scalars("k").unwrap();
            let mut outside = 0;
            for (&value, color) in values.iter().zip(&colored.colors) {
                if !(0.0..=15.6).contains(&value) {
                    outside += 1;
                    assert_eq!(*color, colored.table.undefined_color());
                }
            }
            assert!(outside > 0);
        }
    }

    #[test]
    fn invalid_change_leaves_everything_untouched() {
        let (tx, rx) = mpsc::channel();
        let mut ctl =
            ReactiveController::new(ViewerConfig::default(), SceneAssets::synthetic(), Box::new(tx))
                .unwrap();
        assert_eq!(rx.try_recv().unwrap().reason, UpdateReason::Initial);
        let before = Arc::clone(ctl.artifacts());
        let snapshot = ctl.snapshots().load();
        let revision = ctl.render().revision();

        let mut batch = seed(Point3::origin(), Point3::new(0.0, 0.0, 1.0), 3);
        batch.color_preset = Some(ColorPreset::Diverging);
        let err = ctl.apply(batch).unwrap_err();

        assert!(err.is_invalid_configuration());
        assert!(Arc::ptr_eq(ctl.artifacts(), &before));
        assert!(Arc::ptr_eq(&ctl.snapshots().load(), &snapshot));
        assert_eq!(ctl.render().revision(), revision);
        assert_eq!(ctl.state, ControllerState::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn non_finite_seed_is_rejected() {
        let mut ctl = controller();
        let before = Arc::clone(ctl.artifacts());
        let err = ctl
            .apply(seed(Point3::new(f64::NAN, 0.0, 0.0), Point3::origin(), 10))
            .unwrap_err();
        assert!(err.is_invalid_configuration());
        assert!(Arc::ptr_eq(ctl.artifacts(), &before));
    }

    #[test]
    fn seeds_outside_the_field_give_empty_geometry() {
        let (tx, rx) = mpsc::channel();
        let mut ctl =
            ReactiveController::new(ViewerConfig::default(), SceneAssets::synthetic(), Box::new(tx))
                .unwrap();
        assert_eq!(rx.try_recv().unwrap().reason, UpdateReason::Initial);

        let updates = ctl
            .apply(seed(Point3::new(50.0, 0.0, 0.0), Point3::new(60.0, 0.0, 0.0), 10))
            .unwrap();

        let artifacts = ctl.artifacts();
        assert_eq!(artifacts.streamlines.lines.len(), 10);
        assert!(artifacts.streamlines.lines.iter().all(|line| line.is_empty()));
        assert_eq!(artifacts.tubes.mesh.triangle_count(), 0);
        assert!(artifacts.tubes.spans.iter().all(|span| span.is_empty()));
        assert!(artifacts.colored.colors.is_empty());
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].reason, UpdateReason::Geometry);
        assert_eq!(updates[0].actors[1].triangles, 0);
        assert_eq!(rx.try_recv().unwrap(), updates[0]);
        assert_eq!(ctl.state, ControllerState::Idle);
    }

    #[test]
    fn camera_reset_bypasses_the_pipeline() {
        let mut ctl = controller();
        let before = Arc::clone(ctl.artifacts());
        let updates = ctl
            .apply(ChangeBatch {
                reset_camera: true,
                ..ChangeBatch::default()
            })
            .unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].reason, UpdateReason::Camera);
        assert!(Arc::ptr_eq(ctl.artifacts(), &before));
        assert_eq!(ctl.snapshots().load().frame.revision, updates[0].revision);
    }

    #[test]
    fn custom_subscriptions_widen_the_rerun() {
        let subs = Subscriptions::default().subscribe(Parameter::ColorPreset, Stage::Tubes);
        let mut ctl = controller().with_subscriptions(subs);
        let before = Arc::clone(ctl.artifacts());
        ctl.apply(preset(ColorPreset::Ordinal)).unwrap();
        let after = ctl.artifacts();
        assert!(Arc::ptr_eq(&before.streamlines, &after.streamlines));
        assert!(!Arc::ptr_eq(&before.tubes, &after.tubes));
        assert_eq!(*before.tubes, *after.tubes);
    }

    #[test]
    fn unchanged_values_do_not_recompute() {
        let mut ctl = controller();
        let before = Arc::clone(ctl.artifacts());
        let current = before.inputs;
        let updates = ctl
            .apply(ChangeBatch {
                seed: Some(current.seed),
                color_preset: Some(current.preset),
                reset_camera: false,
            })
            .unwrap();
        assert!(updates.is_empty());
        assert!(Arc::ptr_eq(ctl.artifacts(), &before));
    }

    #[test]
    fn queued_changes_coalesce_into_one_cycle() {
        let mut ctl = controller();
        let inbox = ctl.inbox();
        let revision = ctl.render().revision();
        let mut spec = SeedSpec::default();
        for resolution in [10, 60, 25] {
            spec.resolution = resolution;
            inbox.submit(ParamChange::Seed(spec));
        }
        inbox.submit(ParamChange::ColorPreset(ColorPreset::Ordinal));
        inbox.submit(ParamChange::ColorPreset(ColorPreset::Diverging));
        inbox.submit(ParamChange::ResetCamera);

        let updates = ctl.process_pending().unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(ctl.render().revision(), revision + 2);
        assert_eq!(ctl.artifacts().seeds.len(), 25);
        assert_eq!(ctl.artifacts().inputs.preset, ColorPreset::Diverging);
        assert!(ctl.process_pending().unwrap().is_empty());
    }

    #[test]
    fn snapshot_pairs_geometry_with_its_color_table() {
        let mut ctl = controller();
        let handle = ctl.snapshots();
        ctl.apply(preset(ColorPreset::Diverging)).unwrap();
        let snapshot = handle.load();
        assert_eq!(snapshot.artifacts.table.preset(), ColorPreset::Diverging);
        assert!(Arc::ptr_eq(&snapshot.artifacts.table, &snapshot.artifacts.colored.table));
        assert_eq!(snapshot.frame.actors[1].color_preset, Some(2));
    }

    #[test]
    fn runs_on_its_own_thread() {
        let (tx, rx) = mpsc::channel();
        let mut ctl =
            ReactiveController::new(ViewerConfig::default(), SceneAssets::synthetic(), Box::new(tx))
                .unwrap();
        let inbox = ctl.inbox();
        let worker = thread::spawn(move || ctl.run());

        inbox.submit(ParamChange::ColorPreset(ColorPreset::Ordinal));
        inbox.shutdown();
        worker.join().unwrap();

        let reasons: Vec<UpdateReason> = rx.iter().map(|u| u.reason).collect();
        assert_eq!(reasons, vec![UpdateReason::Initial, UpdateReason::Geometry]);
    }

    #[test]
    fn batch_parses_from_json_lines() {
        let batch: ChangeBatch = serde_json::from_str(r#"{"color_preset": 2}"#).unwrap();
        assert_eq!(batch.into_changes(), vec![ParamChange::ColorPreset(ColorPreset::Diverging)]);

        let batch: ChangeBatch = serde_json::from_str(
            r#"{"seed": {"p1": [0, 0, 0], "p2": [0, 0, 1], "resolution": 5}, "reset_camera": true}"#,
        )
        .unwrap();
        assert_eq!(batch.into_changes().len(), 2);

        assert!(serde_json::from_str::<ChangeBatch>(r#"{"color_preset": 3}"#).is_err());
        assert!(serde_json::from_str::<ChangeBatch>(r#"{"zoom": 2}"#).is_err());
    }
}
