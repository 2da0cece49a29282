// multipart/mixed response assembly.
//
// One part per rendition, in the order the segment processor returned them.
// A rendition whose payload is present in the connection's in-memory store
// is emitted as binary; anything else becomes a URI reference part.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream;
use rand::distr::Alphanumeric;
use rand::RngExt;
use std::convert::Infallible;

use castnode_core::{Connection, Format};

const URI_MIME: &str = "application/vnd+livepeer.uri";

/// Random boundary token, generated once per response.
fn random_boundary() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Incremental multipart/mixed body writer.
///
/// Produces one chunk per part so the body can be streamed as parts become
/// available; the terminator is emitted by [`MultipartWriter::finish`].
pub struct MultipartWriter {
    boundary: String,
    chunks: Vec<Bytes>,
}

impl MultipartWriter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            boundary: random_boundary(),
            chunks: Vec::new(),
        }
    }

    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Append one part. `file_name` lands in both the `Content-Type` name
    /// parameter and the `Content-Disposition` filename.
    pub fn add_part(&mut self, mime: &str, file_name: &str, rendition: &str, body: &[u8]) {
        let mut part = Vec::with_capacity(body.len() + 256);
        part.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
        part.extend_from_slice(format!("Content-Type: {mime}; name=\"{file_name}\"\r\n").as_bytes());
        part.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        part.extend_from_slice(
            format!("Content-Disposition: attachment; filename=\"{file_name}\"\r\n").as_bytes(),
        );
        part.extend_from_slice(format!("Rendition-Name: {rendition}\r\n\r\n").as_bytes());
        part.extend_from_slice(body);
        part.extend_from_slice(b"\r\n");
        self.chunks.push(Bytes::from(part));
    }

    /// Close the body and hand back the chunk sequence.
    #[must_use]
    pub fn finish(mut self) -> Vec<Bytes> {
        self.chunks
            .push(Bytes::from(format!("--{}--\r\n", self.boundary)));
        self.chunks
    }
}

impl Default for MultipartWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the multipart response for one processed segment.
///
/// Part names come from the session manager's rendition profiles (what the
/// orchestrator session actually produced), falling back to the connection's
/// configured profile list.
pub async fn multipart_response(conn: &Connection, seq_no: u64, urls: &[String]) -> Response {
    let rendition_profiles = conn.sessions.rendition_profiles();
    let mut writer = MultipartWriter::new();

    for (i, url) in urls.iter().enumerate() {
        let profile = rendition_profiles.get(i).or_else(|| conn.profiles.get(i));
        let rendition = profile
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("rendition_{i}"));
        let format = match profile.map(|p| p.format) {
            Some(Format::None) | None => conn.source_profile.format,
            Some(f) => f,
        };

        match conn.store.store().read(url).await {
            Ok(payload) => {
                let file_name = format!("{rendition}_{seq_no}{}", format.extension());
                writer.add_part(format.mime_type(), &file_name, &rendition, &payload);
            }
            Err(_) => {
                let file_name = format!("{rendition}_{seq_no}.txt");
                writer.add_part(URI_MIME, &file_name, &rendition, url.as_bytes());
            }
        }
    }

    let content_type = format!("multipart/mixed; boundary={}", writer.boundary());
    let chunks = writer.finish();
    let body = Body::from_stream(stream::iter(
        chunks.into_iter().map(Ok::<_, Infallible>),
    ));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
