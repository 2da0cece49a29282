// Segment push handler.
//
// One request = one segment. The handler binds (or creates) the stream's
// connection, hands the segment to the processing pipeline under liveness
// protection, and answers with either an empty 200 or a multipart body.
//
// A client disconnect drops this future; the kicker guard stops the liveness
// task on that path too, and any in-flight processing results are discarded
// with the future.

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::{header, request::Parts, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, error, info};

use castnode_core::segment::DEFAULT_SEGMENT_DURATION_MS;
use castnode_core::{
    profile::resolve_profiles, spawn_reaper, start_kicker, Connection, Format, IngestError,
    IngestNode, MediaSegment, VideoProfile,
};

use super::path::{parse_push_path, PushPath};
use super::{multipart::multipart_response, AppState};

type PushError = (StatusCode, String);

pub async fn handle_push(State(state): State<AppState>, req: Request) -> Response {
    match push(&state.node, req).await {
        Ok(resp) => resp,
        Err((status, body)) => (status, body).into_response(),
    }
}

async fn push(node: &Arc<IngestNode>, req: Request) -> Result<Response, PushError> {
    if req.method() != Method::POST && req.method() != Method::PUT {
        return Err((StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".into()));
    }

    let (parts, body) = req.into_parts();
    let body = to_bytes(body, usize::MAX).await.map_err(|e| {
        error!("Failed to read push body: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error reading http request body".into(),
        )
    })?;

    let push_path = parse_push_path(parts.uri.path())
        .map_err(|_| (StatusCode::BAD_REQUEST, "Bad URL".to_string()))?;
    let format = Format::from_extension(&push_path.ext);
    if format == Format::None {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("ignoring file extension: {}", push_path.ext),
        ));
    }
    let external_id = push_path.manifest_id.clone();

    let conn = match node.registry.lookup(&external_id) {
        Some(conn) => {
            conn.refresh_last_used();
            conn
        }
        None => bind_connection(node, &parts, &push_path, format).await?,
    };

    let duration_ms = parts
        .headers
        .get("Content-Duration")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_SEGMENT_DURATION_MS);
    let seg = MediaSegment::new(body, push_path.seq_no, duration_ms, push_path.file_name);
    debug!(
        "Processing segment manifest_id={} seq_no={} bytes={} nonce={}",
        conn.manifest_id,
        seg.seq_no,
        seg.data.len(),
        conn.nonce
    );

    // Keep the connection ahead of the reaper while processing blocks.
    let kicker = start_kicker(node.registry.clone(), external_id, node.push_timeout);
    let result = node.processor.process_segment(&conn, &seg).await;
    kicker.cancel();
    drop(kicker);

    let urls = result.map_err(|e| {
        error!(
            "Segment processing failed manifest_id={} seq_no={}: {}",
            conn.manifest_id, seg.seq_no, e
        );
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("http push error processing segment: {e}"),
        )
    })?;

    if urls.is_empty() {
        // An empty segment has nothing to dispatch; acknowledge it.
        if seg.data.is_empty() {
            return Ok(StatusCode::OK.into_response());
        }
        info!(
            "No sessions available manifest_id={} seq_no={}",
            conn.manifest_id, seg.seq_no
        );
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "No sessions available".into(),
        ));
    }

    let accept = parts
        .headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if accept != "multipart/mixed" {
        return Ok(StatusCode::OK.into_response());
    }
    Ok(multipart_response(&conn, seg.seq_no, &urls).await)
}

/// Resolve the stream identity (optionally through the auth webhook) and
/// register a connection for it. Safe against concurrent first-pushes: the
/// registry's double-checked insert leaves exactly one winner and the loser
/// adopts it without starting a second reaper.
async fn bind_connection(
    node: &Arc<IngestNode>,
    parts: &Parts,
    push_path: &PushPath,
    format: Format,
) -> Result<Arc<Connection>, PushError> {
    let external_id = &push_path.manifest_id;

    let auth = match &node.auth_webhook {
        Some(client) => {
            let request_url = full_request_url(parts);
            client.authenticate(&request_url).await.map_err(|e| {
                error!("Stream authentication failed for {}: {}", external_id, e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Could not create stream ID".into(),
                )
            })?
        }
        None => None,
    };

    let internal_id = auth
        .as_ref()
        .map(|a| a.manifest_id.clone())
        .filter(|mid| !mid.is_empty())
        .unwrap_or_else(|| external_id.clone());

    let (presets, explicit) = match &auth {
        Some(a) => {
            let explicit = a.video_profiles().map_err(|e| {
                error!("Bad webhook profiles for {}: {}", external_id, e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Could not create stream ID".into(),
                )
            })?;
            (a.presets.clone(), explicit)
        }
        None => (Vec::new(), Vec::new()),
    };
    let profiles = resolve_profiles(&presets, &explicit, &node.default_profiles, format);
    let source_profile = derive_source_profile(parts, format);

    let rewritten = internal_id != *external_id;
    let conn = node
        .build_connection(
            &internal_id,
            rewritten.then_some(external_id.as_str()),
            source_profile,
            profiles,
        )
        .map_err(map_register_error)?;
    let (conn, created) = node.registry.register(conn).map_err(map_register_error)?;
    if !created {
        conn.refresh_last_used();
    }

    let newly_bound = rewritten && node.registry.rebind_external(external_id, &internal_id);
    if created || newly_bound {
        info!(
            "Stream bound external_id={} manifest_id={} created={}",
            external_id, internal_id, created
        );
        spawn_reaper(node.registry.clone(), external_id.clone(), node.push_timeout);
    }
    Ok(conn)
}

fn map_register_error(err: IngestError) -> PushError {
    match err {
        IngestError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Could not create stream ID".into(),
        ),
    }
}

/// The source profile carries the URL-derived container format and, when the
/// publisher sent `Content-Resolution`, the source dimensions.
fn derive_source_profile(parts: &Parts, format: Format) -> VideoProfile {
    let mut profile = VideoProfile {
        name: "source".to_string(),
        format,
        ..VideoProfile::default()
    };
    if let Some((width, height)) = parts
        .headers
        .get("Content-Resolution")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once('x'))
    {
        match (width.parse(), height.parse()) {
            (Ok(w), Ok(h)) => {
                profile.width = w;
                profile.height = h;
            }
            _ => debug!("Ignoring unparsable Content-Resolution header"),
        }
    }
    profile
}

/// Reconstruct the URL the publisher used, for the auth webhook payload.
/// TLS termination happens upstream, so the scheme is always http here.
fn full_request_url(parts: &Parts) -> String {
    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}{}", host, parts.uri.path())
}
