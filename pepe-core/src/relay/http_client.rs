//! Direct HTTP transport and retry for idempotent requests.

use backoff::{future::retry_notify, ExponentialBackoff};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::{ClientConfig, RelayRequest, RelayResponse, Transport};
use crate::error::{PepeError, Result};

/// Transport backed by a `reqwest` client.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PepeError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse> {
        let start = Instant::now();

        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        debug!(
            status,
            body_len = body.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Received HTTP response"
        );

        Ok(RelayResponse {
            status,
            headers,
            body,
        })
    }
}

/// Send a request that is safe to repeat, retrying transient failures with
/// exponential backoff.
pub async fn send_idempotent<T: Transport + ?Sized>(
    transport: &T,
    request: &RelayRequest,
    config: &ClientConfig,
) -> Result<RelayResponse> {
    let backoff = ExponentialBackoff {
        initial_interval: config.initial_interval,
        max_interval: config.max_interval,
        max_elapsed_time: Some(config.timeout * config.max_retries),
        ..Default::default()
    };

    retry_notify(
        backoff,
        || async move { send_once(transport, request).await },
        |err: PepeError, duration: Duration| {
            warn!(
                error = %err,
                retry_after_ms = duration.as_millis() as u64,
                "Retry scheduled"
            );
        },
    )
    .await
}

async fn send_once<T: Transport + ?Sized>(
    transport: &T,
    request: &RelayRequest,
) -> std::result::Result<RelayResponse, backoff::Error<PepeError>> {
    let response = transport.send(request.clone()).await.map_err(|err| {
        if is_transient(&err) {
            warn!(error = %err, "Transient error, will retry");
            backoff::Error::transient(err)
        } else {
            warn!(error = %err, "Permanent error, aborting");
            backoff::Error::permanent(err)
        }
    })?;

    let transient_status = StatusCode::from_u16(response.status)
        .map(is_transient_status)
        .unwrap_or(false);
    if transient_status {
        warn!(status = response.status, "Transient HTTP status, will retry");
        return Err(backoff::Error::transient(PepeError::Network(format!(
            "{} returned status {}",
            request.url, response.status
        ))));
    }

    Ok(response)
}

fn is_transient(err: &PepeError) -> bool {
    match err {
        PepeError::HttpError(e) => is_transient_error(e),
        PepeError::Network(_) => true,
        _ => false,
    }
}

/// Check if a reqwest error is transient and should be retried.
pub fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Check if an HTTP status code indicates a transient error.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::BAD_GATEWAY
    )
}
