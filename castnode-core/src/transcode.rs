// Segment dispatch seam.
//
// Orchestrator discovery and the full selection/submission pipeline live
// outside this crate; the ingest path only needs a session manager that
// owns per-stream selection state and a processor that turns a segment
// into an ordered list of rendition URIs.

use async_trait::async_trait;
use base64::Engine;
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{IngestError, IngestResult};
use crate::playlist::PlaylistEntry;
use crate::profile::VideoProfile;
use crate::registry::Connection;
use crate::segment::MediaSegment;

/// Configured orchestrator endpoints, selected round-robin.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorPool {
    endpoints: Arc<Vec<String>>,
    next: Arc<AtomicUsize>,
}

impl OrchestratorPool {
    #[must_use]
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints: Arc::new(endpoints),
            next: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Pick the next endpoint, or `None` when the pool is empty.
    #[must_use]
    pub fn select(&self) -> Option<String> {
        if self.endpoints.is_empty() {
            return None;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        self.endpoints.get(idx).cloned()
    }
}

/// Per-stream orchestrator session state.
///
/// Owned by the connection; the registry's losing register path and
/// `remove` both call [`SessionManager::cleanup`].
#[derive(Debug)]
pub struct SessionManager {
    pool: OrchestratorPool,
    /// Rendition profiles negotiated for the current session. The multipart
    /// responder names parts after these, which may differ from the
    /// connection's configured profile list.
    rendition_profiles: RwLock<Vec<VideoProfile>>,
    closed: AtomicBool,
}

impl SessionManager {
    #[must_use]
    pub fn new(pool: OrchestratorPool) -> Self {
        Self {
            pool,
            rendition_profiles: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn select(&self) -> Option<String> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        self.pool.select()
    }

    pub fn set_rendition_profiles(&self, profiles: Vec<VideoProfile>) {
        *self.rendition_profiles.write() = profiles;
    }

    #[must_use]
    pub fn rendition_profiles(&self) -> Vec<VideoProfile> {
        self.rendition_profiles.read().clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release session state. Idempotent.
    pub fn cleanup(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.rendition_profiles.write().clear();
            debug!("Session manager cleaned up");
        }
    }
}

/// Turns one segment into an ordered list of rendition URIs.
///
/// Implementations may block for a long time; the push handler keeps the
/// connection alive with the liveness kicker while this runs. Rendition
/// payloads read back by the responder are written into the connection's
/// in-memory store under the returned URI keys.
#[async_trait]
pub trait SegmentProcessor: Send + Sync {
    async fn process_segment(
        &self,
        conn: &Connection,
        seg: &MediaSegment,
    ) -> IngestResult<Vec<String>>;
}

/// One rendition in an orchestrator reply: a URI, optionally with the
/// payload inlined.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RenditionReply {
    name: String,
    uri: String,
    /// Base64 payload; when present the payload is stored locally and the
    /// local storage key replaces `uri` in the result.
    data: Option<String>,
}

/// Production processor: persists the source, submits the segment to a
/// pooled orchestrator, and collects rendition URIs and payloads.
pub struct PoolSegmentProcessor {
    client: reqwest::Client,
}

impl PoolSegmentProcessor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn submit(
        &self,
        endpoint: &str,
        conn: &Connection,
        seg: &MediaSegment,
    ) -> IngestResult<Vec<RenditionReply>> {
        let ext = conn.source_profile.format.extension();
        let url = format!(
            "{}/segment/{}/{}{}",
            endpoint.trim_end_matches('/'),
            conn.manifest_id,
            seg.seq_no,
            ext
        );
        let resp = self
            .client
            .post(&url)
            .header("Content-Duration", seg.duration_ms)
            .body(seg.data.clone())
            .send()
            .await
            .map_err(|e| IngestError::TranscodeError(format!("submit to {endpoint} failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(IngestError::TranscodeError(format!(
                "orchestrator {endpoint} returned status {status}"
            )));
        }
        resp.json()
            .await
            .map_err(|e| IngestError::TranscodeError(format!("bad orchestrator reply: {e}")))
    }
}

impl Default for PoolSegmentProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SegmentProcessor for PoolSegmentProcessor {
    async fn process_segment(
        &self,
        conn: &Connection,
        seg: &MediaSegment,
    ) -> IngestResult<Vec<String>> {
        let ext = conn.source_profile.format.extension();

        let source_key = conn
            .store
            .save_source(seg.seq_no, ext, seg.data.clone())
            .await?;
        conn.add_source_bytes(seg.data.len() as u64);
        conn.playlist.insert_segment(
            "source",
            PlaylistEntry {
                seq_no: seg.seq_no,
                uri: source_key,
                duration_ms: seg.duration_ms,
            },
        );
        if let Some(record) = &conn.record_store {
            if let Err(e) = record.save_source(seg.seq_no, ext, seg.data.clone()).await {
                warn!(
                    "Failed to record source segment for {}: {}",
                    conn.manifest_id, e
                );
            }
        }

        if seg.data.is_empty() {
            return Ok(Vec::new());
        }
        let Some(endpoint) = conn.sessions.select() else {
            debug!("No orchestrator session for {}", conn.manifest_id);
            return Ok(Vec::new());
        };

        let replies = self.submit(&endpoint, conn, seg).await?;

        let profiles: Vec<VideoProfile> = replies
            .iter()
            .map(|r| {
                conn.profiles
                    .iter()
                    .find(|p| p.name == r.name)
                    .cloned()
                    .unwrap_or_else(|| VideoProfile {
                        name: r.name.clone(),
                        format: conn.source_profile.format,
                        ..VideoProfile::default()
                    })
            })
            .collect();
        conn.sessions.set_rendition_profiles(profiles);

        let mut urls = Vec::with_capacity(replies.len());
        for reply in replies {
            let uri = match reply.data {
                Some(encoded) => {
                    let payload = base64::engine::general_purpose::STANDARD
                        .decode(encoded.as_bytes())
                        .map_err(|e| {
                            IngestError::TranscodeError(format!("bad rendition payload: {e}"))
                        })?;
                    let len = payload.len() as u64;
                    let key = conn
                        .store
                        .save_rendition(&reply.name, seg.seq_no, ext, payload.into())
                        .await?;
                    conn.add_transcoded_bytes(len);
                    key
                }
                None => reply.uri,
            };
            conn.playlist.insert_segment(
                &reply.name,
                PlaylistEntry {
                    seq_no: seg.seq_no,
                    uri: uri.clone(),
                    duration_ms: seg.duration_ms,
                },
            );
            urls.push(uri);
        }
        Ok(urls)
    }
}
