use std::time::Duration;

use reqwest::{
    header::USER_AGENT,
    Client,
    RequestBuilder,
    Response,
    StatusCode,
};

use crate::core::KotoError;

const AGENT: &str = "kotodeck/0.1 (+reqwest)";

pub fn http_client(timeout: Duration) -> Result<Client, KotoError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| KotoError::Custom(format!("HTTP client build failed: {e}")))
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Sends a request built by `build`, retrying connection failures and transient statuses
/// with a linear backoff.
pub async fn send_with_retry(
    attempts: usize,
    build: impl Fn() -> RequestBuilder,
) -> Result<Response, KotoError> {
    let attempts = attempts.max(1);
    let mut attempt: usize = 0;

    loop {
        attempt += 1;

        match build().header(USER_AGENT, AGENT).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(resp),
            Ok(resp) if is_transient(resp.status()) && attempt < attempts => {
                tracing::debug!("HTTP {} from {}, retrying", resp.status(), resp.url());
            }
            Ok(resp) => {
                return Err(KotoError::Custom(format!(
                    "HTTP error {} from {}",
                    resp.status(),
                    resp.url()
                )));
            }
            Err(e) if attempt < attempts => {
                tracing::debug!("HTTP request failed ({}), retrying", e);
            }
            Err(e) => return Err(e.into()),
        }

        tokio::time::sleep(Duration::from_secs(2 * attempt as u64)).await;
    }
}
