// Auth webhook client.
//
// When configured, every unknown stream identity is resolved through an
// outbound POST before a connection is created. A 200 with an empty body
// means the webhook has no opinion and the URL-derived identity stands;
// any non-200 (or transport failure) denies the push.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{IngestError, IngestResult};
use crate::profile::{ProfileDescriptor, VideoProfile};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Authoritative identity and stream parameters returned by the webhook.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(rename = "manifestID")]
    pub manifest_id: String,
    pub stream_key: String,
    pub presets: Vec<String>,
    pub profiles: Vec<ProfileDescriptor>,
    pub object_store: String,
    pub record_object_store: String,
    pub record_object_store_url: String,
    pub previous_sessions: Vec<String>,
}

impl AuthResponse {
    /// Explicit profiles with their GOP fields parsed.
    pub fn video_profiles(&self) -> IngestResult<Vec<VideoProfile>> {
        self.profiles
            .iter()
            .cloned()
            .map(ProfileDescriptor::into_video_profile)
            .collect()
    }
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    url: &'a str,
}

/// Outbound client for the configured auth webhook URL.
#[derive(Clone)]
pub struct AuthWebhookClient {
    webhook_url: String,
    client: reqwest::Client,
}

impl AuthWebhookClient {
    #[must_use]
    pub fn new(webhook_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            webhook_url,
            client,
        }
    }

    /// Resolve a push request URL to an authoritative stream identity.
    ///
    /// Returns `None` when the webhook answered 200 with an empty body
    /// ("no opinion"); the caller proceeds with the URL-derived identity.
    pub async fn authenticate(&self, request_url: &str) -> IngestResult<Option<AuthResponse>> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&AuthRequest { url: request_url })
            .send()
            .await
            .map_err(|e| IngestError::AuthDenied(format!("webhook request failed: {e}")))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(IngestError::AuthDenied(format!(
                "webhook returned status {status}"
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| IngestError::AuthDenied(format!("webhook body read failed: {e}")))?;
        if body.is_empty() {
            debug!("Auth webhook had no opinion for {}", request_url);
            return Ok(None);
        }

        let auth: AuthResponse = serde_json::from_slice(&body)
            .map_err(|e| IngestError::BadAuthResponse(format!("cannot parse response: {e}")))?;
        if auth.manifest_id.is_empty() {
            return Err(IngestError::BadAuthResponse(
                "empty manifest id in response".to_string(),
            ));
        }
        Ok(Some(auth))
    }
}
