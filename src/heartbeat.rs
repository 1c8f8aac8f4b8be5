//! Heartbeat client - the "session still in use" request
//!
//! One heartbeat is a single authenticated POST with an empty body.
//! Any 2xx is success; every other outcome is a retryable failure.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};

use crate::config::HeartbeatConfig;
use crate::error::{HeartwatchError, Result};
use crate::token::Credential;

#[async_trait]
pub trait HeartbeatClient: Send + Sync {
    /// Send one heartbeat carrying `token`
    async fn beat(&self, token: &Credential) -> Result<()>;
}

/// Heartbeat over HTTP
pub struct HttpHeartbeatClient {
    client: Client,
    url: String,
    auth_scheme: String,
}

impl HttpHeartbeatClient {
    pub fn new(config: &HeartbeatConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| HeartwatchError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            auth_scheme: config.auth_scheme.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn authorization(&self, token: &Credential) -> String {
        format!("{} {}", self.auth_scheme, token.as_str())
    }
}

#[async_trait]
impl HeartbeatClient for HttpHeartbeatClient {
    async fn beat(&self, token: &Credential) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, self.authorization(token))
            .body("")
            .send()
            .await
            .map_err(|e| HeartwatchError::HeartbeatTransport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(status = status.as_u16(), "Heartbeat accepted");
            Ok(())
        } else {
            Err(status_error(status))
        }
    }
}

fn status_error(status: StatusCode) -> HeartwatchError {
    HeartwatchError::HeartbeatStatus {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or("").to_string(),
    }
}

/// Scripted outcome for [`MockHeartbeatClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    Accept,
    Status(u16),
    Transport(String),
}

impl MockOutcome {
    fn into_result(self) -> Result<()> {
        match self {
            MockOutcome::Accept => Ok(()),
            MockOutcome::Status(code) => match StatusCode::from_u16(code) {
                Ok(status) => Err(status_error(status)),
                Err(_) => Err(HeartwatchError::HeartbeatStatus {
                    status: code,
                    status_text: String::new(),
                }),
            },
            MockOutcome::Transport(msg) => Err(HeartwatchError::HeartbeatTransport(msg)),
        }
    }
}

/// Heartbeat client replaying scripted outcomes, for tests and dry runs.
///
/// Once the script is used up every call gets the fallback outcome.
pub struct MockHeartbeatClient {
    script: Mutex<VecDeque<MockOutcome>>,
    fallback: MockOutcome,
    latency: Duration,
    calls: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
    tokens: Mutex<Vec<String>>,
}

impl MockHeartbeatClient {
    /// Accepts every heartbeat
    pub fn new() -> Self {
        Self::with_script(Vec::new(), MockOutcome::Accept)
    }

    /// Rejects every heartbeat with `status`
    pub fn always_failing(status: u16) -> Self {
        Self::with_script(Vec::new(), MockOutcome::Status(status))
    }

    pub fn with_script(script: Vec<MockOutcome>, fallback: MockOutcome) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            latency: Duration::ZERO,
            calls: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
            tokens: Mutex::new(Vec::new()),
        }
    }

    /// Simulated round-trip time per call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were outstanding at once
    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Tokens presented, in call order
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for MockHeartbeatClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HeartbeatClient for MockHeartbeatClient {
    async fn beat(&self, token: &Credential) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outstanding = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(outstanding, Ordering::SeqCst);
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(token.as_str().to_string());

        let outcome = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{StubResponse, spawn_http_stub};

    fn config_for(url: String) -> HeartbeatConfig {
        HeartbeatConfig {
            url,
            ..HeartbeatConfig::default()
        }
    }

    #[tokio::test]
    async fn test_http_beat_posts_with_star_authorization() {
        let stub = spawn_http_stub(vec![StubResponse::new(204, "No Content", "")]).await;
        let client = HttpHeartbeatClient::new(&config_for(stub.url("/api/v1/remote/keep-alive"))).unwrap();

        client.beat(&Credential::new("tok-9")).await.unwrap();

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("POST /api/v1/remote/keep-alive"));
        assert!(requests[0].to_lowercase().contains("authorization: star tok-9"));
    }

    #[tokio::test]
    async fn test_http_beat_non_success_is_status_error() {
        let stub = spawn_http_stub(vec![StubResponse::new(503, "Service Unavailable", "down")]).await;
        let client = HttpHeartbeatClient::new(&config_for(stub.url("/keep-alive"))).unwrap();

        let err = client.beat(&Credential::new("t")).await.unwrap_err();
        match err {
            HeartwatchError::HeartbeatStatus { status, status_text } => {
                assert_eq!(status, 503);
                assert_eq!(status_text, "Service Unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_beat_redirect_range_is_failure() {
        let stub = spawn_http_stub(vec![StubResponse::new(304, "Not Modified", "")]).await;
        let client = HttpHeartbeatClient::new(&config_for(stub.url("/keep-alive"))).unwrap();

        let err = client.beat(&Credential::new("t")).await.unwrap_err();
        assert!(matches!(err, HeartwatchError::HeartbeatStatus { status: 304, .. }));
    }

    #[tokio::test]
    async fn test_http_beat_transport_error() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpHeartbeatClient::new(&config_for(format!("http://{}/keep-alive", addr))).unwrap();
        let err = client.beat(&Credential::new("t")).await.unwrap_err();
        assert!(matches!(err, HeartwatchError::HeartbeatTransport(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_mock_replays_script_then_fallback() {
        let mock = MockHeartbeatClient::with_script(
            vec![MockOutcome::Status(500), MockOutcome::Transport("reset".to_string())],
            MockOutcome::Accept,
        );
        let token = Credential::new("abc");

        assert!(matches!(
            mock.beat(&token).await,
            Err(HeartwatchError::HeartbeatStatus { status: 500, .. })
        ));
        assert!(matches!(
            mock.beat(&token).await,
            Err(HeartwatchError::HeartbeatTransport(_))
        ));
        assert!(mock.beat(&token).await.is_ok());
        assert!(mock.beat(&token).await.is_ok());

        assert_eq!(mock.calls(), 4);
        assert_eq!(mock.tokens(), vec!["abc"; 4]);
    }

    #[tokio::test]
    async fn test_mock_always_failing() {
        let mock = MockHeartbeatClient::always_failing(502);
        let err = mock.beat(&Credential::new("x")).await.unwrap_err();
        assert_eq!(err.to_string(), "Heartbeat rejected with status 502 Bad Gateway");
    }
}
