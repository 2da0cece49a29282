// Connection registry.
//
// One record per live stream, tracked under the internal manifest identity,
// with a secondary map from webhook-rewritten external identities. A single
// read-write lock guards both maps so removal stays atomic across them; the
// lock is never held across I/O, only for map operations.

use parking_lot::RwLock;
use rand::RngExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{IngestError, IngestResult};
use crate::playlist::PlaylistManager;
use crate::profile::VideoProfile;
use crate::storage::StoreSession;
use crate::transcode::SessionManager;

static MONO_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Milliseconds since the process-wide monotonic epoch. Uses the tokio clock
/// so time-controlled tests see consistent ages.
fn mono_ms() -> u64 {
    MONO_EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
}

/// In-memory record for one live stream.
#[derive(Debug)]
pub struct Connection {
    /// Internal manifest identity; immutable after creation.
    pub manifest_id: String,
    /// Identity the publisher used in the URL, when the webhook rewrote it.
    pub external_id: Option<String>,
    /// Random nonce for telemetry correlation.
    pub nonce: u64,
    pub source_profile: VideoProfile,
    pub profiles: Vec<VideoProfile>,
    pub playlist: PlaylistManager,
    pub store: StoreSession,
    pub record_store: Option<StoreSession>,
    pub sessions: SessionManager,
    last_used_ms: AtomicU64,
    source_bytes: AtomicU64,
    transcoded_bytes: AtomicU64,
}

impl Connection {
    #[must_use]
    pub fn new(
        manifest_id: String,
        external_id: Option<String>,
        source_profile: VideoProfile,
        profiles: Vec<VideoProfile>,
        store: StoreSession,
        record_store: Option<StoreSession>,
        sessions: SessionManager,
    ) -> Self {
        Self {
            manifest_id,
            external_id,
            nonce: rand::rng().random(),
            source_profile,
            profiles,
            playlist: PlaylistManager::new(),
            store,
            record_store,
            sessions,
            last_used_ms: AtomicU64::new(mono_ms()),
            source_bytes: AtomicU64::new(0),
            transcoded_bytes: AtomicU64::new(0),
        }
    }

    /// Refresh the last-used timestamp to now. `fetch_max` keeps the value
    /// monotonically non-decreasing under concurrent refreshes.
    pub fn refresh_last_used(&self) {
        self.last_used_ms.fetch_max(mono_ms(), Ordering::AcqRel);
    }

    /// Time since the last refresh.
    #[must_use]
    pub fn last_used_age(&self) -> Duration {
        let last = self.last_used_ms.load(Ordering::Acquire);
        Duration::from_millis(mono_ms().saturating_sub(last))
    }

    pub fn add_source_bytes(&self, n: u64) {
        self.source_bytes.fetch_add(n, Ordering::AcqRel);
    }

    #[must_use]
    pub fn source_bytes(&self) -> u64 {
        self.source_bytes.load(Ordering::Acquire)
    }

    pub fn add_transcoded_bytes(&self, n: u64) {
        self.transcoded_bytes.fetch_add(n, Ordering::AcqRel);
    }

    #[must_use]
    pub fn transcoded_bytes(&self) -> u64 {
        self.transcoded_bytes.load(Ordering::Acquire)
    }

    /// Release owned resources. Called once by the registry on removal,
    /// outside the lock.
    pub fn close(&self) {
        self.sessions.cleanup();
        self.playlist.cleanup();
    }
}

#[derive(Default)]
struct RegistryInner {
    /// internal manifest id -> connection
    streams: HashMap<String, Arc<Connection>>,
    /// external id -> internal id, only for rewritten identities
    external: HashMap<String, String>,
}

/// Process-wide map of live connections.
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
    max_sessions: usize,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new(max_sessions: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            max_sessions,
        }
    }

    /// Resolve an identity (external or internal) to its live connection.
    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<Arc<Connection>> {
        let inner = self.inner.read();
        let internal = inner.external.get(id).map_or(id, String::as_str);
        inner.streams.get(internal).cloned()
    }

    /// Double-checked insertion. The caller builds the connection outside
    /// any lock; if another writer got there first, the fresh session
    /// manager is discarded and the winner is returned with `created=false`.
    pub fn register(&self, conn: Connection) -> IngestResult<(Arc<Connection>, bool)> {
        let internal = conn.manifest_id.clone();

        // Fast path: somebody already registered this identity.
        if let Some(existing) = self.inner.read().streams.get(&internal) {
            let existing = existing.clone();
            conn.sessions.cleanup();
            return Ok((existing, false));
        }

        let conn = Arc::new(conn);
        let mut inner = self.inner.write();
        if let Some(existing) = inner.streams.get(&internal) {
            let existing = existing.clone();
            drop(inner);
            debug!("Lost registration race for {}", internal);
            conn.sessions.cleanup();
            return Ok((existing, false));
        }
        if inner.streams.len() >= self.max_sessions {
            drop(inner);
            conn.sessions.cleanup();
            return Err(IngestError::MaxSessions);
        }
        inner.streams.insert(internal.clone(), conn.clone());
        drop(inner);
        info!("Registered stream manifest_id={}", internal);
        Ok((conn, true))
    }

    /// End a stream: resolve the identity, delete both map entries
    /// atomically, then release the connection's resources. Removing a
    /// missing identity returns `UnknownStream` and changes nothing.
    pub fn remove(&self, id: &str) -> IngestResult<()> {
        let conn = {
            let mut inner = self.inner.write();
            let internal = inner
                .external
                .get(id)
                .cloned()
                .unwrap_or_else(|| id.to_string());
            let Some(conn) = inner.streams.remove(&internal) else {
                return Err(IngestError::UnknownStream(id.to_string()));
            };
            inner.external.retain(|_, mapped| *mapped != internal);
            conn
        };
        conn.close();
        info!("Removed stream manifest_id={}", conn.manifest_id);
        Ok(())
    }

    /// Bind an external identity to a live internal identity. A different
    /// older external bound to the same internal is evicted silently; the
    /// connection itself is preserved. Returns whether a new binding was
    /// inserted.
    pub fn rebind_external(&self, external: &str, internal: &str) -> bool {
        if external == internal {
            return false;
        }
        let mut inner = self.inner.write();
        if !inner.streams.contains_key(internal) {
            return false;
        }
        if inner.external.get(external).map(String::as_str) == Some(internal) {
            return false;
        }
        inner
            .external
            .retain(|ext, mapped| !(mapped == internal && ext != external));
        inner
            .external
            .insert(external.to_string(), internal.to_string());
        debug!("Bound external identity {} -> {}", external, internal);
        true
    }

    /// Whether an external identity is currently bound.
    #[must_use]
    pub fn is_external_bound(&self, external: &str) -> bool {
        self.inner.read().external.contains_key(external)
    }

    /// The internal identity an external identity maps to, if bound.
    #[must_use]
    pub fn resolve_external(&self, external: &str) -> Option<String> {
        self.inner.read().external.get(external).cloned()
    }

    #[must_use]
    pub fn contains(&self, internal: &str) -> bool {
        self.inner.read().streams.contains_key(internal)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().streams.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().streams.is_empty()
    }

    /// Live internal manifest identities, for status output.
    #[must_use]
    pub fn manifest_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.read().streams.keys().cloned().collect();
        ids.sort();
        ids
    }
}
