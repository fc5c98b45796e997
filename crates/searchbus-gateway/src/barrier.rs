//! Dynamic fan-out / fan-in completion barrier
//!
//! A barrier tracks a number of outstanding units of work that may grow after
//! construction. It finishes exactly once: successfully when every unit has
//! completed, or on the first recorded failure. Callers must `increment` before
//! starting the work that will later `complete` or `fail`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Final result reported to finish callbacks
pub type Outcome<E> = Result<(), E>;

type Callback<E> = Box<dyn FnOnce(Outcome<E>) + Send>;

struct State<E> {
    required: usize,
    completed: usize,
    failure: Option<E>,
    finished: bool,
    callbacks: Vec<Callback<E>>,
}

impl<E: Clone> State<E> {
    fn outcome(&self) -> Outcome<E> {
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Shared completion barrier; clones observe the same state.
pub struct CompletionBarrier<E> {
    state: Arc<Mutex<State<E>>>,
}

impl<E> Clone for CompletionBarrier<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<E> std::fmt::Debug for CompletionBarrier<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CompletionBarrier")
            .field("required", &state.required)
            .field("completed", &state.completed)
            .field("failed", &state.failure.is_some())
            .field("finished", &state.finished)
            .finish()
    }
}

impl<E: Clone + Send + 'static> CompletionBarrier<E> {
    /// Create a barrier awaiting `required` completions.
    ///
    /// A barrier created with zero required units is already finished successfully.
    pub fn new(required: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                required,
                completed: 0,
                failure: None,
                finished: required == 0,
                callbacks: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add one outstanding unit. Returns `false` once the barrier has finished.
    pub fn increment(&self) -> bool {
        let mut state = self.lock();
        if state.finished {
            warn!(
                required = state.required,
                completed = state.completed,
                "Increment on finished barrier ignored"
            );
            return false;
        }
        state.required += 1;
        true
    }

    /// Mark one outstanding unit as done.
    pub fn complete(&self) {
        let callbacks = {
            let mut state = self.lock();
            if state.finished {
                return;
            }
            if state.completed >= state.required {
                warn!(
                    required = state.required,
                    "Completion without outstanding unit ignored"
                );
                return;
            }
            state.completed += 1;
            if state.completed < state.required {
                return;
            }
            state.finished = true;
            debug!(required = state.required, "Barrier finished");
            std::mem::take(&mut state.callbacks)
        };
        fire(callbacks, &Ok(()));
    }

    /// Record a failure and finish immediately. Only the first failure is kept.
    pub fn fail(&self, error: E) {
        let callbacks = {
            let mut state = self.lock();
            if state.finished {
                return;
            }
            state.failure = Some(error.clone());
            state.finished = true;
            debug!(
                required = state.required,
                completed = state.completed,
                "Barrier failed"
            );
            std::mem::take(&mut state.callbacks)
        };
        fire(callbacks, &Err(error));
    }

    /// Register a callback run once with the final outcome.
    ///
    /// Runs immediately on the calling thread when the barrier has already finished.
    pub fn on_finished<F>(&self, callback: F)
    where
        F: FnOnce(Outcome<E>) + Send + 'static,
    {
        let outcome = {
            let mut state = self.lock();
            if !state.finished {
                state.callbacks.push(Box::new(callback));
                return;
            }
            state.outcome()
        };
        callback(outcome);
    }

    /// Wait for the final outcome.
    ///
    /// Returns `None` only if the barrier state is dropped while unfinished.
    pub async fn wait(&self) -> Option<Outcome<E>> {
        let (tx, rx) = oneshot::channel();
        self.on_finished(move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await.ok()
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Units still expected before a successful finish
    pub fn outstanding(&self) -> usize {
        let state = self.lock();
        state.required.saturating_sub(state.completed)
    }
}

fn fire<E: Clone>(callbacks: Vec<Callback<E>>, outcome: &Outcome<E>) {
    for callback in callbacks {
        callback(outcome.clone());
    }
}
