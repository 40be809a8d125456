use std::sync::{Arc, PoisonError, RwLock};

use crate::scene::SceneUpdate;

use super::Artifacts;

/// What readers outside the pipeline thread see: one artifact generation
/// together with the frame rendered from it.
#[derive(Debug, Clone)]
pub struct SceneSnapshot {
    pub artifacts: Arc<Artifacts>,
    pub frame: SceneUpdate,
}

/// Shared, atomically swapped pointer to the latest [`SceneSnapshot`].
///
/// The pipeline thread is the only writer. Readers get an `Arc` to a complete
/// snapshot and never observe new geometry paired with an old color table.
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    inner: Arc<RwLock<Arc<SceneSnapshot>>>,
}

impl SnapshotHandle {
    /// Creates a handle holding `snapshot`.
    #[must_use]
    pub fn new(snapshot: SceneSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<SceneSnapshot> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replaces the current snapshot.
    pub(crate) fn store(&self, snapshot: SceneSnapshot) {
        let snapshot = Arc::new(snapshot);
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = snapshot;
    }
}
