use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info_span};

use crate::assets::SceneAssets;
use crate::color::{ColorPreset, ColorTable, ColoredGeometry, MapColors, ScalarBinding};
use crate::config::ViewerConfig;
use crate::error::Result;
use crate::integrate::{StreamlineSet, TraceStreamlines, TracerParams};
use crate::seed::{GenerateSeeds, SeedGeometry, SeedSpec};
use crate::tessellation::{TessellateTubes, TubeGeometry, TubeParams};

use super::Stage;

/// Parameter values a set of artifacts was computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineInputs {
    pub seed: SeedSpec,
    pub preset: ColorPreset,
}

/// One consistent generation of cached pipeline outputs.
///
/// Artifacts that a cycle did not recompute are shared with the previous
/// generation, so `Arc::ptr_eq` tells whether a stage re-ran.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub inputs: PipelineInputs,
    pub seeds: Arc<SeedGeometry>,
    pub streamlines: Arc<StreamlineSet>,
    pub tubes: Arc<TubeGeometry>,
    pub table: Arc<ColorTable>,
    pub colored: Arc<ColoredGeometry>,
}

/// The explicit context every stage reads from: static assets, fixed stage
/// parameters, and the last committed artifacts.
///
/// Recomputation is staged into a fresh [`Artifacts`] value and only
/// replaces the committed one through [`PipelineContext::commit`], so a
/// failing stage never leaves a half-updated cache behind.
#[derive(Debug)]
pub struct PipelineContext {
    assets: SceneAssets,
    tracer: TracerParams,
    tube: TubeParams,
    binding: ScalarBinding,
    committed: Arc<Artifacts>,
}

impl PipelineContext {
    /// Runs every stage once for the configured initial seed and preset.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or any stage fails.
    pub fn new(config: &ViewerConfig, assets: SceneAssets) -> Result<Self> {
        config.validate()?;
        let inputs = PipelineInputs {
            seed: config.seed,
            preset: config.color.preset,
        };
        let seeds = Arc::new(run_seeds(&inputs.seed)?);
        let streamlines = Arc::new(run_streamlines(&config.tracer, &assets, &seeds)?);
        let tubes = Arc::new(run_tubes(config.tube, &streamlines)?);
        let colored = Arc::new(run_colors(&config.color, inputs.preset, &tubes)?);
        let committed = Arc::new(Artifacts {
            inputs,
            seeds,
            streamlines,
            tubes,
            table: Arc::clone(&colored.table),
            colored,
        });
        Ok(Self {
            assets,
            tracer: config.tracer.clone(),
            tube: config.tube,
            binding: config.color.clone(),
            committed,
        })
    }

    /// The last committed artifacts.
    #[must_use]
    pub fn artifacts(&self) -> &Arc<Artifacts> {
        &self.committed
    }

    /// Static scene assets.
    #[must_use]
    pub fn assets(&self) -> &SceneAssets {
        &self.assets
    }

    /// Recomputes the `dirty` stages for `inputs`, reusing committed
    /// artifacts for every clean stage. Does not modify the context.
    ///
    /// `dirty` must be closed downstream (see
    /// [`Subscriptions::invalidated`](super::Subscriptions::invalidated)).
    /// The render stage is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure.
    pub fn recompute(&self, inputs: &PipelineInputs, dirty: &BTreeSet<Stage>) -> Result<Artifacts> {
        let prev = &self.committed;

        let seeds = if dirty.contains(&Stage::Seeds) {
            Arc::new(run_seeds(&inputs.seed)?)
        } else {
            Arc::clone(&prev.seeds)
        };
        let streamlines = if dirty.contains(&Stage::Streamlines) {
            Arc::new(run_streamlines(&self.tracer, &self.assets, &seeds)?)
        } else {
            Arc::clone(&prev.streamlines)
        };
        let tubes = if dirty.contains(&Stage::Tubes) {
            Arc::new(run_tubes(self.tube, &streamlines)?)
        } else {
            Arc::clone(&prev.tubes)
        };
        let colored = if dirty.contains(&Stage::Colors) {
            Arc::new(run_colors(&self.binding, inputs.preset, &tubes)?)
        } else {
            Arc::clone(&prev.colored)
        };

        Ok(Artifacts {
            inputs: *inputs,
            seeds,
            streamlines,
            tubes,
            table: Arc::clone(&colored.table),
            colored,
        })
    }

    /// Replaces the committed artifacts as a whole.
    pub fn commit(&mut self, artifacts: Artifacts) {
        self.committed = Arc::new(artifacts);
    }
}

fn run_seeds(spec: &SeedSpec) -> Result<SeedGeometry> {
    let _span = info_span!("stage", name = Stage::Seeds.name()).entered();
    let started = Instant::now();
    let seeds = GenerateSeeds::new(*spec).execute()?;
    debug!(points = seeds.len(), elapsed = ?started.elapsed(), "stage done");
    Ok(seeds)
}

fn run_streamlines(
    tracer: &TracerParams,
    assets: &SceneAssets,
    seeds: &SeedGeometry,
) -> Result<StreamlineSet> {
    let _span = info_span!("stage", name = Stage::Streamlines.name()).entered();
    let started = Instant::now();
    let set = TraceStreamlines::new(tracer).execute(assets.field.as_ref(), seeds)?;
    debug!(
        lines = set.lines.len(),
        vertices = set.vertex_count(),
        elapsed = ?started.elapsed(),
        "stage done"
    );
    Ok(set)
}

fn run_tubes(params: TubeParams, streamlines: &StreamlineSet) -> Result<TubeGeometry> {
    let _span = info_span!("stage", name = Stage::Tubes.name()).entered();
    let started = Instant::now();
    let tubes = TessellateTubes::new(params).execute(streamlines)?;
    debug!(
        triangles = tubes.mesh.triangle_count(),
        elapsed = ?started.elapsed(),
        "stage done"
    );
    Ok(tubes)
}

fn run_colors(
    binding: &ScalarBinding,
    preset: ColorPreset,
    tubes: &Arc<TubeGeometry>,
) -> Result<ColoredGeometry> {
    let _span = info_span!("stage", name = Stage::Colors.name()).entered();
    let started = Instant::now();
    let table = ColorTable::build(preset);
    let colored = MapColors::new(&table, binding.array.clone(), binding.domain)
        .with_out_of_range(binding.out_of_range)
        .execute(Arc::clone(tubes))?;
    debug!(
        preset = i64::from(preset),
        vertices = colored.colors.len(),
        elapsed = ?started.elapsed(),
        "stage done"
    );
    Ok(colored)
}
