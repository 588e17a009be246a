//! Verification client for the remote proxy testing endpoint

use crate::proxy::models::Proxy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default remote verification endpoint
pub const DEFAULT_API_URL: &str = "https://vip-proxy-api.lindy.site";

/// Slack added on top of the forwarded timeout for the endpoint call itself
const REQUEST_GRACE: Duration = Duration::from_secs(2);

/// Fallback reason when the transport gives nothing more specific
const GENERIC_FAILURE: &str = "Request failed";

/// Fallback reason for an unsuccessful endpoint response without an error field
const CONNECTION_FAILED: &str = "Connection failed";

/// Outcome of a single verification attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Success {
        speed_ms: Option<u64>,
        country: Option<String>,
        country_code: Option<String>,
    },
    Failure {
        reason: String,
    },
}

impl TestOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        TestOutcome::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestOutcome::Success { .. })
    }
}

/// Request body forwarded to the verification endpoint
#[derive(Debug, Serialize)]
struct TestRequest<'a> {
    ip: &'a str,
    port: u16,
    #[serde(rename = "type")]
    proxy_type: &'a str,
    timeout: u64,
}

/// Response body of the verification endpoint
#[derive(Debug, Deserialize)]
struct TestResponse {
    success: bool,
    #[serde(default)]
    speed: Option<u64>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default, rename = "countryCode")]
    country_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Issues one bounded-duration verification request per proxy.
///
/// Implementations never error upward; every call settles into a
/// `TestOutcome`. Exactly one attempt per call, no retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProxyVerifier: Send + Sync {
    async fn verify(&self, proxy: &Proxy, timeout_secs: u64) -> TestOutcome;
}

/// HTTP client for the remote verification endpoint.
///
/// The endpoint performs the actual network probe against the target
/// proxy and reports back success, measured speed and geolocation.
#[derive(Debug, Clone)]
pub struct VerifyClient {
    http: reqwest::Client,
    api_url: String,
}

impl VerifyClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into(),
        }
    }

    fn settle(response: TestResponse) -> TestOutcome {
        if response.success {
            TestOutcome::Success {
                speed_ms: response.speed,
                country: response.country,
                country_code: response.country_code,
            }
        } else {
            TestOutcome::Failure {
                reason: response
                    .error
                    .unwrap_or_else(|| CONNECTION_FAILED.to_string()),
            }
        }
    }
}

impl Default for VerifyClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

#[async_trait]
impl ProxyVerifier for VerifyClient {
    async fn verify(&self, proxy: &Proxy, timeout_secs: u64) -> TestOutcome {
        let request = TestRequest {
            ip: &proxy.host,
            port: proxy.port,
            proxy_type: proxy.proxy_type.label(),
            timeout: timeout_secs,
        };

        let call = async {
            let response = self
                .http
                .post(format!("{}/api/test-proxy", self.api_url))
                .json(&request)
                .send()
                .await?;
            // Proxy failures are reported in the body, not the HTTP status
            response.json::<TestResponse>().await
        };

        // Hard deadline on the endpoint call, independent of the timeout
        // value forwarded in the request body
        let deadline = Duration::from_secs(timeout_secs) + REQUEST_GRACE;
        match tokio::time::timeout(deadline, call).await {
            Ok(Ok(response)) => Self::settle(response),
            Ok(Err(e)) => TestOutcome::failure(e.to_string()),
            Err(_) => TestOutcome::failure(GENERIC_FAILURE),
        }
    }
}
