//! Action dispatcher
//!
//! Routes every inbound envelope to the operation named by its `action` field
//! and turns the outcome into exactly one reply. Panics inside an operation
//! are caught here so the bus handler never goes down with a request.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use searchbus_backend::SearchBackend;
use searchbus_protocol::{Action, Envelope, Failure, Reply};
use tracing::{debug, error, warn};

use crate::bus::EnvelopeHandler;
use crate::metrics::{DISPATCH_LATENCY, FAILURES_TOTAL, REQUESTS_TOTAL, UNKNOWN_ACTION};
use crate::ops::{self, OpError, OpResult};

/// Failure message for a panic caught at the dispatch boundary
pub const UNHANDLED: &str = "Unhandled exception!";

/// Stateless envelope handler over a shared search backend
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn SearchBackend>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    /// Handle one envelope
    pub async fn dispatch(&self, envelope: Envelope) -> Reply {
        let action = match envelope.action() {
            Ok(action) => action,
            Err(err) => {
                warn!(error = %err, "Envelope rejected");
                REQUESTS_TOTAL.with_label_values(&[UNKNOWN_ACTION]).inc();
                FAILURES_TOTAL
                    .with_label_values(&[UNKNOWN_ACTION, "dispatch"])
                    .inc();
                return Err(err.into());
            }
        };

        let label = action.as_str();
        REQUESTS_TOTAL.with_label_values(&[label]).inc();
        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.route(action, &envelope))
            .catch_unwind()
            .await;
        DISPATCH_LATENCY
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        match outcome {
            Ok(Ok(reply)) => {
                debug!(action = %action, "Envelope handled");
                Ok(reply)
            }
            Ok(Err(err)) => {
                FAILURES_TOTAL.with_label_values(&[label, err.kind()]).inc();
                match &err {
                    OpError::Invalid(_) => {
                        warn!(action = %action, error = %err, "Invalid envelope")
                    }
                    _ => error!(action = %action, error = %err, "Operation failed"),
                }
                Err(err.into())
            }
            Err(_) => {
                FAILURES_TOTAL.with_label_values(&[label, "panic"]).inc();
                error!(action = %action, "{UNHANDLED}");
                Err(Failure::new(UNHANDLED))
            }
        }
    }

    async fn route(&self, action: Action, envelope: &Envelope) -> OpResult<Envelope> {
        let backend = self.backend.as_ref();
        match action {
            Action::Index => ops::index::execute(backend, envelope).await,
            Action::Get => ops::get::execute(backend, envelope).await,
            Action::Search => ops::search::execute(backend, envelope).await,
            Action::Scroll => ops::scroll::execute(backend, envelope).await,
            Action::PutIndexTemplate => ops::template::execute(backend, envelope).await,
        }
    }
}

#[async_trait]
impl EnvelopeHandler for Dispatcher {
    async fn handle(&self, envelope: Envelope) -> Reply {
        self.dispatch(envelope).await
    }
}
