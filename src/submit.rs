//! Submitter (C6; §4.6).
//!
//! Posts ready block samples and peer-change notifications to the remote
//! collector. Retryable vs. permanent failure is the caller's (C4's)
//! signal for whether to keep or evict a group.

use crate::correlator::BlockSample;
use crate::event::{Direction, Endpoint, PeerConnState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Network error or 5xx — C4 keeps the group and retries next tick.
    #[error("transient submit failure: {0}")]
    ApiConnectionError(String),
    /// 4xx other than auth — C4 evicts with a warning.
    #[error("permanent submit failure ({status}): {body}")]
    PermanentApiError { status: u16, body: String },
    /// 401/403 — permanent, but logged prominently per §4.6.
    #[error("authentication failure ({status}): {body}")]
    AuthError { status: u16, body: String },
}

impl SubmitError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::ApiConnectionError(_))
    }
}

#[derive(Debug, Serialize)]
struct BlockSampleWire<'a> {
    block_hash: &'a str,
    block_number: u64,
    block_size: u64,
    slot: u64,
    slot_time: DateTime<Utc>,
    header_remote_endpoint: String,
    block_remote_endpoint: String,
    header_delta_ms: i64,
    block_request_delta_ms: i64,
    block_response_delta_ms: i64,
    block_adopt_delta_ms: i64,
    local_endpoint: String,
    network_magic: u32,
    client_version: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAck {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerEvent {
    pub at: DateTime<Utc>,
    pub direction: Direction,
    pub local_addr: String,
    pub local_port: u16,
    pub remote_addr: String,
    pub remote_port: u16,
    pub change_type: &'static str,
    pub last_seen: DateTime<Utc>,
    pub last_state: PeerConnState,
}

impl PeerEvent {
    pub fn new(
        at: DateTime<Utc>,
        direction: Direction,
        local: Endpoint,
        remote: Endpoint,
        change_type: &'static str,
        last_state: PeerConnState,
    ) -> Self {
        PeerEvent {
            at,
            direction,
            local_addr: local.ip.to_string(),
            local_port: local.port,
            remote_addr: remote.ip.to_string(),
            remote_port: remote.port,
            change_type,
            last_seen: at,
            last_state,
        }
    }
}

pub struct Submitter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    client_id: Option<String>,
}

impl Submitter {
    pub fn new(base_url: String, api_key: String, client_id: Option<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Submitter {
            client,
            base_url,
            api_key,
            client_id,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let mut req = self
            .client
            .request(method, url)
            .header("X-Api-Key", &self.api_key);
        if let Some(client_id) = &self.client_id {
            req = req.header("X-Client-Id", client_id);
        }
        req
    }

    /// `POST /submit/blocksample` — §4.6.
    pub async fn submit_block_sample(&self, sample: &BlockSample) -> Result<SubmitAck, SubmitError> {
        let wire = BlockSampleWire {
            block_hash: &sample.block_hash,
            block_number: sample.block_number,
            block_size: sample.block_size,
            slot: sample.slot,
            slot_time: sample.slot_time,
            header_remote_endpoint: sample.header_remote_endpoint.to_string(),
            block_remote_endpoint: sample.block_remote_endpoint.to_string(),
            header_delta_ms: sample.header_delta_ms,
            block_request_delta_ms: sample.block_request_delta_ms,
            block_response_delta_ms: sample.block_response_delta_ms,
            block_adopt_delta_ms: sample.block_adopt_delta_ms,
            local_endpoint: sample.local_endpoint.to_string(),
            network_magic: sample.network_magic,
            client_version: &sample.client_version,
        };

        let response = self
            .request(reqwest::Method::POST, "/submit/blocksample")
            .json(&wire)
            .send()
            .await
            .map_err(|e| SubmitError::ApiConnectionError(e.to_string()))?;

        handle_response(response).await
    }

    /// `POST /submit/peerevent` — fire-and-forget; errors are logged, not propagated.
    pub async fn submit_peer_event(&self, event: &PeerEvent) {
        let result = self
            .request(reqwest::Method::POST, "/submit/peerevent")
            .json(event)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => warn!(status = %resp.status(), "peer event submit rejected"),
            Err(e) => warn!(error = %e, "peer event submit failed"),
        }
    }
}

async fn handle_response(response: reqwest::Response) -> Result<SubmitAck, SubmitError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<SubmitAck>()
            .await
            .map_err(|e| SubmitError::ApiConnectionError(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        error!(status = status.as_u16(), %body, "submit authentication failure");
        return Err(SubmitError::AuthError {
            status: status.as_u16(),
            body,
        });
    }
    if status.is_server_error() {
        return Err(SubmitError::ApiConnectionError(format!("{status}: {body}")));
    }
    Err(SubmitError::PermanentApiError {
        status: status.as_u16(),
        body,
    })
}
