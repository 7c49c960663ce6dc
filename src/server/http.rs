use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers::*;
use super::SharedState;
use crate::error::{AppError, AppResult};

/// Build the HTTP router over `state`.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/code_stream/{session}/push-cell/", post(push_cell))
        .route("/code_stream/{session}/get-cell/", get(get_cell))
        .route("/code_stream/{session}/update/", post(update_cell))
        .route("/code_stream/{session}/delete/", post(delete_cell))
        .route("/code_stream/get-all-cell-ids/", get(list_all_cell_ids))
        .route(
            "/code_stream/{session}/get-all-cell-ids/",
            get(list_session_cell_ids),
        )
        .route(
            "/code_stream/{session}/cleanup-orphans/",
            post(cleanup_orphans),
        )
        .route("/code_stream/clear-all/", post(clear_all))
        .route(
            "/code_stream/config/",
            get(get_pointer).post(set_pointer).delete(delete_pointer),
        )
        .route("/code_stream/test-connection/", post(test_connection))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `state` on `listener` until `shutdown` resolves.
///
/// In-flight requests are allowed to finish. The store is not closed here;
/// that is the caller's job once this returns.
pub async fn serve<F>(state: SharedState, listener: TcpListener, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().map_err(|e| AppError::Server {
        message: format!("Listener has no local address: {}", e),
    })?;
    let principal = state.principal().to_string();

    info!(addr = %addr, principal = %principal, "HTTP server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AppError::Server {
            message: e.to_string(),
        })?;

    info!("HTTP server stopped");
    Ok(())
}
