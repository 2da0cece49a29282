// Per-connection playlist bookkeeping.
//
// Playlist *assembly* (HLS output, recording playlists) happens elsewhere;
// the connection only tracks the live window of segments it has seen per
// rendition so those collaborators can read it.

use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Segments kept per rendition in the live window.
const LIVE_WINDOW: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub seq_no: u64,
    pub uri: String,
    pub duration_ms: u64,
}

/// Tracks the most recent segments per rendition for one connection.
#[derive(Debug, Default)]
pub struct PlaylistManager {
    renditions: Mutex<BTreeMap<String, Vec<PlaylistEntry>>>,
}

impl PlaylistManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a segment for a rendition, trimming beyond the live window.
    pub fn insert_segment(&self, rendition: &str, entry: PlaylistEntry) {
        let mut renditions = self.renditions.lock();
        let entries = renditions.entry(rendition.to_string()).or_default();
        entries.push(entry);
        if entries.len() > LIVE_WINDOW {
            let excess = entries.len() - LIVE_WINDOW;
            entries.drain(..excess);
        }
    }

    /// Current window for a rendition, oldest first.
    #[must_use]
    pub fn entries(&self, rendition: &str) -> Vec<PlaylistEntry> {
        self.renditions
            .lock()
            .get(rendition)
            .cloned()
            .unwrap_or_default()
    }

    /// Rendition names with at least one tracked segment.
    #[must_use]
    pub fn renditions(&self) -> Vec<String> {
        self.renditions.lock().keys().cloned().collect()
    }

    /// Drop all tracked segments. Called when the connection is destroyed.
    pub fn cleanup(&self) {
        self.renditions.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(seq_no: u64) -> PlaylistEntry {
        PlaylistEntry {
            seq_no,
            uri: format!("mani/source/{seq_no}.ts"),
            duration_ms: 2000,
        }
    }

    #[test]
    fn test_insert_and_window_trim() {
        let pl = PlaylistManager::new();
        for seq in 0..10 {
            pl.insert_segment("source", entry(seq));
        }
        let entries = pl.entries("source");
        assert_eq!(entries.len(), LIVE_WINDOW);
        assert_eq!(entries.first().map(|e| e.seq_no), Some(4));
        assert_eq!(entries.last().map(|e| e.seq_no), Some(9));
    }

    #[test]
    fn test_cleanup_clears_all_renditions() {
        let pl = PlaylistManager::new();
        pl.insert_segment("source", entry(0));
        pl.insert_segment("P240p30fps16x9", entry(0));
        assert_eq!(pl.renditions().len(), 2);

        pl.cleanup();
        assert!(pl.renditions().is_empty());
        assert!(pl.entries("source").is_empty());
    }
}
