use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::error::Error as StdError;
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::types::{ReadRequest, UpstreamTarget};
use crate::config::UpstreamConfig;
use crate::error::{UpstreamError, UpstreamResult};

/// Forwards read requests to an authority node.
///
/// One GET per call, no retries. The underlying client is shared across
/// calls and holds no per-request state.
#[derive(Clone)]
pub struct Forwarder {
    client: Client,
    request_timeout_ms: u64,
}

impl Forwarder {
    /// Create a forwarder with the configured connect and total timeouts
    pub fn new(config: &UpstreamConfig) -> UpstreamResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(UpstreamError::Http)?;

        Ok(Self {
            client,
            request_timeout_ms: config.request_timeout_ms,
        })
    }

    /// Forward `request` to `target` and return the upstream JSON body verbatim.
    pub async fn forward(
        &self,
        target: &UpstreamTarget,
        request: &ReadRequest,
    ) -> UpstreamResult<Value> {
        let url = build_url(&target.address, request)?;
        let start = Instant::now();

        debug!(
            operation = request.operation(),
            url = %url,
            has_credential = target.credential.is_some(),
            "Forwarding read upstream"
        );

        match self.execute(&url, target, request).await {
            Ok(body) => {
                info!(
                    operation = request.operation(),
                    latency_ms = start.elapsed().as_millis(),
                    "Upstream read succeeded"
                );
                Ok(body)
            }
            Err(e) => {
                warn!(
                    operation = request.operation(),
                    url = %url,
                    error = %e,
                    latency_ms = start.elapsed().as_millis(),
                    "Upstream read failed"
                );
                Err(e)
            }
        }
    }

    /// Check that the authority answers a global listing.
    pub async fn probe(&self, target: &UpstreamTarget) -> UpstreamResult<()> {
        self.forward(target, &ReadRequest::cell_ids(None))
            .await
            .map(|_| ())
    }

    async fn execute(
        &self,
        url: &Url,
        target: &UpstreamTarget,
        request: &ReadRequest,
    ) -> UpstreamResult<Value> {
        let mut builder = self.client.get(url.clone());
        if let Some(credential) = &target.credential {
            builder = builder.bearer_auth(credential);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.classify_transport(e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, url, request));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.classify_transport(e, url))?;

        serde_json::from_slice(&body).map_err(|e| UpstreamError::InvalidResponse {
            message: format!("Failed to parse response: {}", e),
        })
    }

    fn classify_transport(&self, err: reqwest::Error, url: &Url) -> UpstreamError {
        if err.is_timeout() || has_io_kind(&err, io::ErrorKind::TimedOut) {
            UpstreamError::Timeout {
                timeout_ms: self.request_timeout_ms,
            }
        } else if has_io_kind(&err, io::ErrorKind::ConnectionRefused) {
            // Connect errors also cover DNS and TLS failures.
            UpstreamError::ConnectionRefused {
                url: origin(url),
            }
        } else {
            UpstreamError::Network {
                message: err.to_string(),
            }
        }
    }
}

fn build_url(base: &str, request: &ReadRequest) -> UpstreamResult<Url> {
    let raw = format!("{}{}", base.trim_end_matches('/'), request.path());
    let mut url = Url::parse(&raw).map_err(|e| UpstreamError::InvalidUrl {
        message: e.to_string(),
    })?;

    let query = request.query();
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}

fn classify_status(status: StatusCode, url: &Url, request: &ReadRequest) -> UpstreamError {
    match status {
        StatusCode::UNAUTHORIZED => UpstreamError::AuthFailed,
        StatusCode::FORBIDDEN => UpstreamError::Forbidden,
        StatusCode::NOT_FOUND => match request {
            ReadRequest::Cell { .. } => UpstreamError::CellNotFound,
            ReadRequest::CellIds { .. } => UpstreamError::EndpointNotFound {
                url: url.path().to_string(),
            },
        },
        StatusCode::PRECONDITION_REQUIRED => UpstreamError::PreconditionRequired,
        other => UpstreamError::Status {
            status: other.as_u16(),
        },
    }
}

/// Walk the source chain looking for an I/O error of `kind`.
fn has_io_kind(err: &reqwest::Error, kind: io::ErrorKind) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == kind {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

fn origin(url: &Url) -> String {
    url.origin().ascii_serialization()
}
