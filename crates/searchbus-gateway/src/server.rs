//! HTTP server lifecycle

use std::future::Future;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinError;

use crate::bootstrap::{BootstrapError, BootstrapReport};

/// Errors that stop the gateway
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("HTTP server failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error("HTTP server task failed: {0}")]
    Join(#[from] JoinError),
}

/// Serve `app` on `listener` while `bootstrap` runs.
///
/// The listener accepts requests from the start, so `/ready` reports the
/// bootstrap state as it moves. A failed bootstrap shuts the server down and
/// is returned; otherwise this runs until the server stops.
pub async fn serve_while_bootstrapping<F>(
    listener: TcpListener,
    app: Router,
    bootstrap: F,
) -> Result<(), ServeError>
where
    F: Future<Output = Result<BootstrapReport, BootstrapError>>,
{
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    match bootstrap.await {
        Ok(report) => {
            tracing::info!(templates = ?report.templates, "Templates loaded");
        }
        Err(err) => {
            server.abort();
            return Err(err.into());
        }
    }

    server.await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::BootstrapState;
    use crate::bus::{LocalBus, MessageBus};
    use crate::router::{build_routes, AppState};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{oneshot, watch};

    #[tokio::test]
    async fn readiness_is_served_while_bootstrap_runs() {
        let (state_tx, readiness) = watch::channel(BootstrapState::Registering);
        let bus: Arc<dyn MessageBus> = Arc::new(LocalBus::new());
        let app = build_routes(AppState::new(
            bus,
            "realtime/search",
            Duration::from_secs(1),
            readiness,
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (release, released) = oneshot::channel::<()>();
        let gateway = tokio::spawn(serve_while_bootstrapping(listener, app, async move {
            let _ = released.await;
            state_tx.send_replace(BootstrapState::Failed);
            Err(BootstrapError::Abandoned)
        }));

        let response = reqwest::get(format!("http://{addr}/ready")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.text().await.unwrap(), "registering");

        release.send(()).unwrap();
        let err = gateway.await.unwrap().unwrap_err();
        assert!(matches!(err, ServeError::Bootstrap(BootstrapError::Abandoned)));
    }

    #[tokio::test]
    async fn successful_bootstrap_keeps_serving() {
        let (_state_tx, readiness) = watch::channel(BootstrapState::Ready);
        let bus: Arc<dyn MessageBus> = Arc::new(LocalBus::new());
        let app = build_routes(AppState::new(
            bus,
            "realtime/search",
            Duration::from_secs(1),
            readiness,
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let gateway = tokio::spawn(serve_while_bootstrapping(listener, app, async {
            Ok(BootstrapReport::default())
        }));

        let response = reqwest::get(format!("http://{addr}/ready")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(!gateway.is_finished());
        gateway.abort();
    }
}
