//! searchbus gateway entry point

use std::sync::Arc;

use axum::Router;
use clap::Parser;
use searchbus_gateway::{
    build_routes, serve_while_bootstrapping, AppState, BootstrapSettings, Bootstrapper,
    Dispatcher, GatewayArgs, LocalBus, LocalFs, GATEWAY_VERSION,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "searchbus_gateway=debug,tower_http=debug".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = GatewayArgs::parse();
    init_tracing(args.log_json);

    tracing::info!("Starting searchbus gateway v{}", GATEWAY_VERSION);

    let config = args.into_config()?;
    let backend = config.create_backend()?;
    tracing::info!(backend = backend.name(), address = %config.address, "Search backend ready");

    let bus = Arc::new(LocalBus::new());
    let dispatcher = Arc::new(Dispatcher::new(backend));
    let bootstrapper = Bootstrapper::new(
        bus.clone(),
        Arc::new(LocalFs),
        BootstrapSettings::from(&config),
    );

    let state = AppState::new(
        bus.clone(),
        config.address.clone(),
        config.request_timeout,
        bootstrapper.subscribe(),
    );

    // Build router
    let app = Router::new()
        .merge(build_routes(state))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);

    serve_while_bootstrapping(listener, app, bootstrapper.run(dispatcher)).await?;

    Ok(())
}
