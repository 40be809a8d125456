mod context;
mod snapshot;

pub use context::{Artifacts, PipelineContext, PipelineInputs};
pub use snapshot::{SceneSnapshot, SnapshotHandle};

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// A node of the pipeline DAG, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Seeds,
    Streamlines,
    Tubes,
    Colors,
    Render,
}

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::Seeds,
        Stage::Streamlines,
        Stage::Tubes,
        Stage::Colors,
        Stage::Render,
    ];

    /// Stages that consume this stage's output directly.
    #[must_use]
    pub fn successors(self) -> &'static [Stage] {
        match self {
            Stage::Seeds => &[Stage::Streamlines],
            Stage::Streamlines => &[Stage::Tubes],
            Stage::Tubes => &[Stage::Colors],
            Stage::Colors => &[Stage::Render],
            Stage::Render => &[],
        }
    }

    /// Stage name used in log spans.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Stage::Seeds => "seeds",
            Stage::Streamlines => "streamlines",
            Stage::Tubes => "tubes",
            Stage::Colors => "colors",
            Stage::Render => "render",
        }
    }
}

/// A UI parameter that feeds the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    /// Seed line endpoints and resolution.
    Seed,
    /// Lookup-table preset.
    ColorPreset,
}

/// Maps each parameter to the stages it invalidates directly.
///
/// Camera resets are not parameters: they bypass the pipeline and go straight
/// to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriptions {
    table: BTreeMap<Parameter, BTreeSet<Stage>>,
}

impl Default for Subscriptions {
    fn default() -> Self {
        Self::new()
            .subscribe(Parameter::Seed, Stage::Seeds)
            .subscribe(Parameter::ColorPreset, Stage::Colors)
    }
}

impl Subscriptions {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }

    /// Registers `stage` as directly dependent on `parameter`.
    #[must_use]
    pub fn subscribe(mut self, parameter: Parameter, stage: Stage) -> Self {
        self.table.entry(parameter).or_default().insert(stage);
        self
    }

    /// Stages `parameter` invalidates directly.
    #[must_use]
    pub fn direct(&self, parameter: Parameter) -> BTreeSet<Stage> {
        self.table.get(&parameter).cloned().unwrap_or_default()
    }

    /// Every stage that must re-run when `changed` parameters change: the
    /// directly subscribed stages plus everything reachable downstream.
    #[must_use]
    pub fn invalidated(&self, changed: impl IntoIterator<Item = Parameter>) -> BTreeSet<Stage> {
        let mut dirty = BTreeSet::new();
        let mut pending: Vec<Stage> = changed
            .into_iter()
            .flat_map(|p| self.direct(p))
            .collect();
        while let Some(stage) = pending.pop() {
            if dirty.insert(stage) {
                pending.extend_from_slice(stage.successors());
            }
        }
        dirty
    }
}
