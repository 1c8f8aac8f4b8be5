//! Session credential acquisition
//!
//! The credential is fetched once before the keep-alive loop starts and held
//! for the lifetime of the loop. Refreshing it is the provider's business.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::TokenConfig;
use crate::error::{HeartwatchError, Result};

/// Opaque bearer credential. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn acquire_token(&self) -> Result<Credential>;
}

/// Returns a token fixed at construction.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: Credential,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Credential::new(token),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn acquire_token(&self) -> Result<Credential> {
        if self.token.as_str().is_empty() {
            return Err(HeartwatchError::TokenAcquisition("configured token is empty".to_string()));
        }
        Ok(self.token.clone())
    }
}

/// Reads the token from the instance metadata server.
pub struct MetadataTokenProvider {
    client: Client,
    url: String,
    header: String,
    header_value: String,
}

impl MetadataTokenProvider {
    pub fn new(config: &TokenConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| HeartwatchError::TokenAcquisition(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.metadata_url.clone(),
            header: config.metadata_header.clone(),
            header_value: config.metadata_header_value.clone(),
        })
    }
}

#[async_trait]
impl TokenProvider for MetadataTokenProvider {
    async fn acquire_token(&self) -> Result<Credential> {
        let response = self
            .client
            .get(&self.url)
            .header(self.header.as_str(), self.header_value.as_str())
            .send()
            .await
            .map_err(|e| HeartwatchError::TokenAcquisition(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HeartwatchError::TokenAcquisition(format!(
                "Metadata server returned {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| HeartwatchError::TokenAcquisition(format!("Failed to read response: {}", e)))?;

        let token = body.trim();
        if token.is_empty() {
            return Err(HeartwatchError::TokenAcquisition("Metadata server returned an empty token".to_string()));
        }

        tracing::info!("Acquired keep-alive token");
        Ok(Credential::new(token))
    }
}

/// Pick the provider the configuration asks for.
pub fn provider_from_config(config: &TokenConfig) -> Result<Box<dyn TokenProvider>> {
    match &config.value {
        Some(value) => Ok(Box::new(StaticTokenProvider::new(value.clone()))),
        None => Ok(Box::new(MetadataTokenProvider::new(config)?)),
    }
}
