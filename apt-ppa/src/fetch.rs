// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Rate-limit-aware upstream HTTP fetching.

Source adapters poll vendor download endpoints that throttle aggressively.
[http_with_retry] wraps a request with bounded 429 retry handling so every
adapter gets the same behavior.
*/

use {
    crate::error::{PpaError, Result},
    reqwest::{header, Client, Method, Response, StatusCode},
    std::time::Duration,
    tokio_util::sync::CancellationToken,
    tracing::warn,
};

/// Total attempts made before giving up on a rate-limited endpoint.
const MAX_ATTEMPTS: u32 = 3;

/// Upper bound honored for `Retry-After` values, in seconds.
const MAX_RETRY_AFTER_SECS: i64 = 3600;

/// Timeout applied to upstream requests by [build_http_client].
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Build the HTTP client source adapters share.
///
/// The generous timeout accommodates multi-hundred-megabyte vendor
/// downloads.
pub fn build_http_client() -> reqwest::Result<Client> {
    Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .user_agent(concat!("apt-ppa/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Compute the backoff before retrying a rate-limited request.
///
/// Exponential (`30s · 2^attempt`) unless the response carried a
/// `Retry-After` header with a positive integer seconds value, which is
/// honored up to one hour. Non-numeric or non-positive values fall back to
/// the exponential schedule.
fn retry_delay(attempt: u32, retry_after: Option<&str>) -> Duration {
    if let Some(secs) = retry_after.and_then(|v| v.trim().parse::<i64>().ok()) {
        if secs > 0 {
            return Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS) as u64);
        }
    }

    Duration::from_secs(30) * 2u32.pow(attempt)
}

/// Perform an HTTP request, retrying on `429 Too Many Requests`.
///
/// Any response other than 429 (including non-2xx) is returned to the
/// caller. Cancellation aborts immediately with [PpaError::Cancelled];
/// exhausting the retry budget yields [PpaError::RateLimited].
pub async fn http_with_retry(
    client: &Client,
    cancel: &CancellationToken,
    method: Method,
    url: &str,
) -> Result<Response> {
    for attempt in 0..MAX_ATTEMPTS {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(PpaError::Cancelled),
            response = client.request(method.clone(), url).send() => response?,
        };

        if response.status() != StatusCode::TOO_MANY_REQUESTS {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok());
        let wait = retry_delay(attempt, retry_after);

        warn!(
            url,
            attempt = attempt + 1,
            retry_after_secs = wait.as_secs(),
            "rate limited"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(PpaError::Cancelled),
            _ = tokio::time::sleep(wait) => {}
        }
    }

    Err(PpaError::RateLimited)
}
