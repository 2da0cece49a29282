// HTTP surface of the broadcaster node.
//
// Ingest endpoints (when enabled):
// - POST|PUT /live/{manifestID}/{seqNo}.{ext}   - segment push
// - POST|PUT /stream/{manifestID}/{seqNo}.{ext} - same, alternate prefix
// Always mounted:
// - GET /status - live stream listing

pub mod multipart;
pub mod path;
pub mod push;

use axum::extract::State;
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use castnode_core::IngestNode;

#[derive(Clone)]
pub struct AppState {
    pub node: Arc<IngestNode>,
}

/// Assemble the node router. Ingest routes are mounted only when HTTP
/// ingest is enabled.
pub fn router(state: AppState, http_ingest: bool) -> Router {
    let mut router = Router::new().route("/status", get(status));
    if http_ingest {
        router = router
            .route("/live/{*path}", any(push::handle_push))
            .route("/stream/{*path}", any(push::handle_push));
    }
    router.layer(TraceLayer::new_for_http()).with_state(state)
}

#[derive(Serialize)]
struct StatusResponse {
    node_id: String,
    manifests: Vec<String>,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        node_id: state.node.node_id.clone(),
        manifests: state.node.registry.manifest_ids(),
    })
}
