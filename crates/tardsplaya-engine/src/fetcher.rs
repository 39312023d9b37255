//! HTTP fetcher.
//!
//! A single `reqwest::Client` is shared process-wide by the Coordinator so
//! connections are pooled across streams; `danger_accept_invalid_certs`
//! lives on the client builder and is surfaced as a `warn` log rather than a
//! pipeline-visible distinction.

use bytes::Bytes;
use std::sync::Once;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::retry::{retry_with_backoff, RetryPolicy};

static CRYPTO_PROVIDER: Once = Once::new();

/// `reqwest`'s `rustls-tls-*-no-provider` feature ships no default crypto
/// backend; one process-wide provider must be installed before the first
/// TLS handshake. Mirrors the `ring` provider install used elsewhere in this
/// stack's HTTP client construction.
fn ensure_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

pub fn build_client(config: &FetchConfig) -> Result<reqwest::Client, reqwest::Error> {
    ensure_crypto_provider();
    if config.danger_accept_invalid_certs {
        warn!(
            target: "tardsplaya::net",
            "certificate validation relaxed for legacy-platform compatibility (danger_accept_invalid_certs=true)"
        );
    }
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .danger_accept_invalid_certs(config.danger_accept_invalid_certs)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
}

/// `get_text`/`get_bytes` over a shared `reqwest::Client`.
pub struct Fetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(client: reqwest::Client, config: FetchConfig) -> Self {
        Self { client, config }
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.config.max_attempts,
            base_delay: self.config.retry_delay,
            max_delay: self.config.retry_delay.saturating_mul(4).max(Duration::from_secs(3)),
        }
    }

    pub async fn get_text(&self, url: &Url, cancel: &CancellationToken) -> Result<String, FetchError> {
        let bytes = self.get_bytes(url, cancel).await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| FetchError::ParseRejected {
            reason: format!("response body is not valid UTF-8: {e}"),
        })
    }

    pub async fn get_bytes(&self, url: &Url, cancel: &CancellationToken) -> Result<Bytes, FetchError> {
        let policy = self.policy();
        retry_with_backoff(
            &policy,
            cancel,
            || FetchError::Cancelled,
            |_attempt| async {
                if cancel.is_cancelled() {
                    return Err(FetchError::Cancelled);
                }

                let send = self
                    .client
                    .get(url.clone())
                    .timeout(self.config.attempt_timeout)
                    .send();

                let response = tokio::select! {
                    _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    response = send => response?,
                };

                if !response.status().is_success() {
                    return Err(FetchError::Http(response.status()));
                }

                let bytes = tokio::select! {
                    _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    bytes = response.bytes() => bytes?,
                };
                Ok(bytes)
            },
        )
        .await
    }
}
