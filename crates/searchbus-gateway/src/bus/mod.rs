//! Message bus abstraction
//!
//! The gateway only needs point-to-point request/reply: one handler per
//! address, and a `send` that waits a bounded time for the reply.

mod local;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use searchbus_protocol::{Envelope, Failure, Reply};
use thiserror::Error;

pub use local::LocalBus;

/// Consumer of envelopes delivered to an address
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    /// Handle one envelope, producing exactly one reply or failure
    async fn handle(&self, envelope: Envelope) -> Reply;
}

/// Request/reply message channel
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Install `handler` as the sole consumer of `address`
    async fn register(&self, address: &str, handler: Arc<dyn EnvelopeHandler>) -> BusResult<()>;

    /// Withdraw the handler of `address`; returns whether one was registered
    async fn unregister(&self, address: &str) -> bool;

    /// Deliver `envelope` to `address` and wait up to `timeout` for the reply
    async fn send(
        &self,
        address: &str,
        envelope: Envelope,
        timeout: Duration,
    ) -> BusResult<Envelope>;
}

/// Message bus errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("No handlers for address {0}")]
    NoHandlers(String),

    #[error("Timed out after {}ms waiting for a reply from {address}", timeout.as_millis())]
    Timeout { address: String, timeout: Duration },

    #[error("{0}")]
    RecipientFailure(Failure),

    #[error("Address {0} already has a handler")]
    AddressInUse(String),

    #[error("Address must not be empty")]
    InvalidAddress,

    #[error("Handler for {0} went away without replying")]
    Closed(String),
}

impl BusError {
    /// Failure code reported for delivery problems
    pub const TIMEOUT: i32 = -2;
    pub const NO_HANDLERS: i32 = -3;

    pub fn code(&self) -> i32 {
        match self {
            BusError::Timeout { .. } => Self::TIMEOUT,
            BusError::NoHandlers(_) => Self::NO_HANDLERS,
            BusError::RecipientFailure(failure) => failure.code,
            _ => Failure::HANDLER,
        }
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            BusError::NoHandlers(_) => "no_handlers",
            BusError::Timeout { .. } => "timeout",
            BusError::RecipientFailure(_) => "recipient_failure",
            BusError::AddressInUse(_) => "address_in_use",
            BusError::InvalidAddress => "invalid_address",
            BusError::Closed(_) => "closed",
        }
    }
}

impl From<BusError> for Failure {
    fn from(err: BusError) -> Self {
        match err {
            BusError::RecipientFailure(failure) => failure,
            other => Failure::new(other.to_string()).with_code(other.code()),
        }
    }
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;
