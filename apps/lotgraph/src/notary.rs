//! # Notarization Client
//!
//! Each committed creation call yields one [`MintRequest`] per new batch.
//! They are dispatched after the ledger write lock is released, in
//! creation order. A failed mint is logged and never reaches the caller:
//! the ledger stays the system of record.

use crate::config::NotaryConfig;
use async_trait::async_trait;
use lotgraph_core::MintRequest;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from a notarization backend.
#[derive(Debug, Clone, Error)]
pub enum NotaryError {
    #[error("Cannot reach notary at {0}")]
    ConnectionFailed(String),

    #[error("Notary rejected mint ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Notary client setup failed: {0}")]
    Setup(String),
}

/// A sink for notarization requests.
#[async_trait]
pub trait Notary: Send + Sync {
    /// Submit one mint.
    async fn mint(&self, request: &MintRequest) -> Result<(), NotaryError>;
}

// =============================================================================
// LOGGING NOTARY
// =============================================================================

/// Records mints in the log only. Used when no notary URL is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotary;

#[async_trait]
impl Notary for LoggingNotary {
    async fn mint(&self, request: &MintRequest) -> Result<(), NotaryError> {
        match request {
            MintRequest::Root { batch, plot } => {
                tracing::info!(event = "mint", kind = "root", batch = batch.0, plot = ?plot);
            }
            MintRequest::Leaf { batch, parents } => {
                tracing::info!(event = "mint", kind = "leaf", batch = batch.0, parents = ?parents);
            }
        }
        Ok(())
    }
}

// =============================================================================
// HTTP NOTARY
// =============================================================================

/// Posts mints as JSON to `{base_url}/mints`.
#[derive(Debug, Clone)]
pub struct HttpNotary {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpNotary {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, NotaryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotaryError::Setup(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Notary for HttpNotary {
    async fn mint(&self, request: &MintRequest) -> Result<(), NotaryError> {
        let url = format!("{}/mints", self.base_url);
        let mut req = self.http.post(&url).json(request);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| NotaryError::ConnectionFailed(format!("{}: {e}", self.base_url)))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let message = resp.text().await.unwrap_or_default();
        Err(NotaryError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Build the notary described by `config`.
pub fn notary_from_config(config: &NotaryConfig) -> Result<Arc<dyn Notary>, NotaryError> {
    match &config.url {
        Some(url) => {
            let notary = HttpNotary::new(
                url.clone(),
                config.api_key.clone(),
                Duration::from_millis(config.timeout_ms),
            )?;
            tracing::info!("Notarization enabled: {}", notary.base_url());
            Ok(Arc::new(notary))
        }
        None => {
            tracing::info!("No notary URL configured, mints are logged only");
            Ok(Arc::new(LoggingNotary))
        }
    }
}

/// Submit `mints` in order. Returns how many failed.
pub async fn dispatch_mints(notary: &dyn Notary, mints: &[MintRequest]) -> usize {
    let mut failures = 0usize;
    for request in mints {
        if let Err(e) = notary.mint(request).await {
            failures = failures.saturating_add(1);
            tracing::warn!(
                event = "mint_failure",
                batch = request.batch().0,
                "Notarization failed: {}",
                e
            );
        }
    }
    failures
}

// =============================================================================
// TESTS
// =============================================================================
