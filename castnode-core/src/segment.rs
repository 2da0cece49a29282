use bytes::Bytes;

/// One media chunk pushed by a publisher, identified by (manifest, seqno).
#[derive(Debug, Clone)]
pub struct MediaSegment {
    pub data: Bytes,
    pub seq_no: u64,
    /// Segment duration in milliseconds, from the `Content-Duration` header.
    pub duration_ms: u64,
    /// Basename of the push URL, e.g. "17.ts".
    pub name: String,
}

/// Default segment duration when the publisher sends no `Content-Duration`.
pub const DEFAULT_SEGMENT_DURATION_MS: u64 = 2000;

impl MediaSegment {
    #[must_use]
    pub fn new(data: Bytes, seq_no: u64, duration_ms: u64, name: String) -> Self {
        Self {
            data,
            seq_no,
            duration_ms,
            name,
        }
    }
}
