use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use super::{ChangeBatch, ParamChange};

#[derive(Debug, Default)]
struct InboxState {
    pending: ChangeBatch,
    shutdown: bool,
}

/// Thread-safe mailbox between the UI side and the pipeline thread.
///
/// Submissions coalesce: only the latest value of each parameter survives
/// until the controller takes the batch, and camera reset requests collapse
/// into one.
#[derive(Debug, Default)]
pub struct ParameterInbox {
    state: Mutex<InboxState>,
    ready: Condvar,
}

impl ParameterInbox {
    /// Creates an empty inbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a change, replacing any pending value of the same parameter.
    /// Changes submitted after [`ParameterInbox::shutdown`] are dropped.
    pub fn submit(&self, change: ParamChange) {
        let mut state = self.lock();
        if state.shutdown {
            return;
        }
        trace!(?change, "parameter change queued");
        state.pending.push(change);
        self.ready.notify_one();
    }

    /// Takes the pending batch without blocking.
    #[must_use]
    pub fn take(&self) -> Option<ChangeBatch> {
        let mut state = self.lock();
        (!state.pending.is_empty()).then(|| std::mem::take(&mut state.pending))
    }

    /// Blocks until a batch is pending or the inbox is shut down.
    ///
    /// Returns `None` only after shutdown, once every pending change has
    /// been taken.
    #[must_use]
    pub fn wait(&self) -> Option<ChangeBatch> {
        let mut state = self.lock();
        while state.pending.is_empty() && !state.shutdown {
            state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        (!state.pending.is_empty()).then(|| std::mem::take(&mut state.pending))
    }

    /// Stops accepting changes and wakes a waiting controller.
    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.ready.notify_all();
    }

    /// Returns `true` once [`ParameterInbox::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.lock().shutdown
    }
}
