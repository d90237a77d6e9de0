use crate::server::{routes, static_files};
use crate::state::AppState;
use axum::{
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    routing::{get, post},
    BoxError, Router,
};
use std::net::SocketAddr;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Build the Axum application
pub fn build_app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(routes::health))
        .route("/ready", get(routes::ready))
        .route("/model", get(routes::model_info))
        .route("/predict", post(routes::predict))
        .route("/predictions/:id/image", get(routes::prediction_image));

    let mut app = Router::new()
        .nest("/api", api_routes)
        .route("/metrics", get(routes::metrics))
        .fallback(static_files::serve_static)
        .layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes))
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = cors_layer(allow_any_origin()) {
        app = app.layer(cors);
    }

    if let Some(timeout) = state.config.server.request_timeout() {
        app = app.layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(move |err: BoxError| async move {
                    routes::middleware_error(err, timeout)
                }))
                .timeout(timeout),
        );
    }

    app.with_state(state)
}

/// The UI is same-origin; cross-origin access is opt-in via `SNAPLABEL_ALLOW_ANY_ORIGIN`
fn allow_any_origin() -> bool {
    std::env::var("SNAPLABEL_ALLOW_ANY_ORIGIN")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn cors_layer(allow_any_origin: bool) -> Option<CorsLayer> {
    allow_any_origin.then(|| {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    })
}

/// Run the server until a shutdown signal arrives.
///
/// With eager loading the model is fetched and loaded before the listener is
/// bound, and a failure aborts startup.
pub async fn run_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    if state.config.server.eager_load {
        info!("Loading model before accepting connections");
        state.model.get().await?;
    }

    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("snaplabel listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            warn!("Shutdown signal received, stopping server...");
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_is_opt_in() {
        assert!(cors_layer(false).is_none());
        assert!(cors_layer(true).is_some());
    }
}
