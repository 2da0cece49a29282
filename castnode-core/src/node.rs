// Shared node state.
//
// One IngestNode per process, assembled at startup and handed to the HTTP
// layer behind an Arc. Requests treat everything here as read-only; the
// default profile set in particular is deep-copied before any per-connection
// mutation.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{IngestError, IngestResult};
use crate::profile::VideoProfile;
use crate::registry::{Connection, ConnectionRegistry};
use crate::storage::{ObjectStore, StoreSession};
use crate::transcode::{OrchestratorPool, PoolSegmentProcessor, SegmentProcessor, SessionManager};
use crate::webhook::AuthWebhookClient;

/// Default push timeout: the maximum gap between activity refreshes before
/// the reaper ends a stream.
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(60);

/// Process-wide broadcaster state shared by all ingest requests.
pub struct IngestNode {
    pub node_id: String,
    pub push_timeout: Duration,
    pub registry: Arc<ConnectionRegistry>,
    /// Default output profiles; entries keep `Format::None` forever.
    pub default_profiles: Vec<VideoProfile>,
    pub auth_webhook: Option<AuthWebhookClient>,
    pub storage: Option<Arc<dyn ObjectStore>>,
    pub record_storage: Option<Arc<dyn ObjectStore>>,
    pub pool: OrchestratorPool,
    pub processor: Arc<dyn SegmentProcessor>,
}

impl IngestNode {
    #[must_use]
    pub fn new(node_id: String, push_timeout: Duration, max_sessions: usize) -> Self {
        Self {
            node_id,
            push_timeout,
            registry: Arc::new(ConnectionRegistry::new(max_sessions)),
            default_profiles: Vec::new(),
            auth_webhook: None,
            storage: None,
            record_storage: None,
            pool: OrchestratorPool::default(),
            processor: Arc::new(PoolSegmentProcessor::new()),
        }
    }

    #[must_use]
    pub fn with_default_profiles(mut self, profiles: Vec<VideoProfile>) -> Self {
        self.default_profiles = profiles;
        self
    }

    #[must_use]
    pub fn with_auth_webhook(mut self, webhook_url: String) -> Self {
        self.auth_webhook = Some(AuthWebhookClient::new(webhook_url));
        self
    }

    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn ObjectStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_record_storage(mut self, storage: Arc<dyn ObjectStore>) -> Self {
        self.record_storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_orchestrators(mut self, endpoints: Vec<String>) -> Self {
        self.pool = OrchestratorPool::new(endpoints);
        self
    }

    #[must_use]
    pub fn with_processor(mut self, processor: Arc<dyn SegmentProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Build a connection for a resolved identity. The caller registers it;
    /// on a lost race the registry cleans up the session manager built here.
    pub fn build_connection(
        &self,
        internal_id: &str,
        external_id: Option<&str>,
        source_profile: VideoProfile,
        profiles: Vec<VideoProfile>,
    ) -> IngestResult<Connection> {
        let Some(storage) = &self.storage else {
            return Err(IngestError::Storage(std::io::Error::other(
                "no storage driver configured",
            )));
        };
        let store = StoreSession::new(storage.clone(), internal_id);
        let record_store = self.record_storage.as_ref().map(|s| {
            StoreSession::recording(s.clone(), external_id.unwrap_or(internal_id), &self.node_id)
        });
        Ok(Connection::new(
            internal_id.to_string(),
            external_id.map(str::to_string),
            source_profile,
            profiles,
            store,
            record_store,
            SessionManager::new(self.pool.clone()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{preset, Format};
    use crate::storage::MemoryStore;

    fn source_profile() -> VideoProfile {
        VideoProfile {
            name: "source".to_string(),
            format: Format::MpegTs,
            ..VideoProfile::default()
        }
    }

    #[test]
    fn test_build_connection_requires_storage() {
        let node = IngestNode::new("node-a".to_string(), DEFAULT_PUSH_TIMEOUT, 10);
        let err = node
            .build_connection("mani", None, source_profile(), Vec::new())
            .unwrap_err();
        assert!(matches!(err, IngestError::Storage(_)));
    }

    #[test]
    fn test_build_connection_with_record_session() {
        let node = IngestNode::new("node-a".to_string(), DEFAULT_PUSH_TIMEOUT, 10)
            .with_storage(Arc::new(MemoryStore::new()))
            .with_record_storage(Arc::new(MemoryStore::new()))
            .with_default_profiles(vec![preset("P240p30fps16x9").unwrap()]);

        let conn = node
            .build_connection(
                "intmid",
                Some("extmid"),
                source_profile(),
                node.default_profiles.clone(),
            )
            .unwrap();
        assert_eq!(conn.manifest_id, "intmid");
        assert_eq!(conn.external_id.as_deref(), Some("extmid"));
        assert!(conn.record_store.is_some());

        let (registered, created) = node.registry.register(conn).unwrap();
        assert!(created);
        assert_eq!(registered.manifest_id, "intmid");
    }
}
