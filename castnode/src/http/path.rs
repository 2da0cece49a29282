// Push URL parsing.
//
// Push URLs look like `/live/<manifestID>/<seqNo>.<ext>`; `live/` and
// `stream/` prefixes are optional. A lone `/live/<name>.<ext>` names the
// stream directly and gets sequence number 0, as does any non-numeric stem.

use castnode_core::{IngestError, IngestResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPath {
    pub manifest_id: String,
    pub seq_no: u64,
    /// File extension including the leading dot, e.g. ".ts".
    pub ext: String,
    /// Basename of the URL, e.g. "17.ts".
    pub file_name: String,
}

/// Extract stream identity and segment coordinates from a push URL path.
pub fn parse_push_path(path: &str) -> IngestResult<PushPath> {
    let trimmed = path.trim_start_matches('/');
    let rest = trimmed
        .strip_prefix("live/")
        .or_else(|| trimmed.strip_prefix("stream/"))
        .unwrap_or(trimmed);

    let (manifest_id, file_name) = match rest.split_once('/') {
        Some((first, tail)) => {
            let base = tail.rsplit('/').next().unwrap_or(tail);
            (first.to_string(), base.to_string())
        }
        None => {
            let stem = rest.rsplit_once('.').map_or(rest, |(stem, _)| stem);
            (stem.to_string(), rest.to_string())
        }
    };
    if manifest_id.is_empty() {
        return Err(IngestError::BadRequest("Bad URL".to_string()));
    }

    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), format!(".{ext}")),
        None => (file_name.clone(), String::new()),
    };
    let seq_no = stem.parse().unwrap_or(0);

    Ok(PushPath {
        manifest_id,
        seq_no,
        ext,
        file_name,
    })
}
