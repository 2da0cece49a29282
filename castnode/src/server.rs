// Server lifecycle.
//
// Binds the HTTP listener and serves until ctrl-c.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use castnode_core::{Config, IngestNode};

use crate::http::{router, AppState};

pub struct IngestServer {
    config: Config,
    node: Arc<IngestNode>,
}

impl IngestServer {
    #[must_use]
    pub fn new(config: Config, node: Arc<IngestNode>) -> Self {
        Self { config, node }
    }

    pub async fn run(self) -> Result<()> {
        let addr = self.config.http_address();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("HTTP server listening on {}", addr);
        if self.config.server.http_ingest {
            info!("HTTP ingest: enabled");
        }

        let app = router(AppState { node: self.node }, self.config.server.http_ingest);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("HTTP server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received shutdown signal");
    }
}
