//! searchbus gateway
//!
//! This crate connects a message bus to a search engine, handling:
//! - Action dispatch for index, get, search, scroll and template registration
//! - Startup bootstrap of index templates behind a completion barrier
//! - WebSocket access to the bus address
//! - Health, readiness and Prometheus metrics endpoints

pub mod barrier;
pub mod bootstrap;
pub mod bus;
pub mod config;
pub mod dispatch;
pub mod metrics;
pub mod ops;
pub mod router;
pub mod server;
pub mod templates;

pub use barrier::CompletionBarrier;
pub use bootstrap::{
    BootstrapError, BootstrapReport, BootstrapSettings, BootstrapState, Bootstrapper,
};
pub use bus::{BusError, EnvelopeHandler, LocalBus, MessageBus};
pub use config::{BackendKind, ConfigError, GatewayArgs, GatewayConfig};
pub use dispatch::Dispatcher;
pub use router::{build_routes, AppState};
pub use server::{serve_while_bootstrapping, ServeError};
pub use templates::{LocalFs, TemplateDefinition, TemplateFs};

/// Gateway version
pub const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");
