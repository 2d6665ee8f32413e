//! # API Request/Response Types
//!
//! JSON bodies of the HTTP API. Ledger records (`Batch`, `RelatedBatches`,
//! `ExportSnapshot`...) are serialized as-is; this module only adds the
//! envelopes around them.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lotgraph_core::{
    BatchFilter, BatchSort, ErrorKind, LedgerMetrics, LotgraphError, ProcessStepId,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Ledger status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub batch_count: usize,
    pub active_batch_count: usize,
    pub consumed_batch_count: usize,
    pub edge_count: usize,
    pub process_step_count: usize,
    pub plot_count: usize,
    pub active_millionths: u64,
}

impl From<LedgerMetrics> for StatusResponse {
    fn from(metrics: LedgerMetrics) -> Self {
        Self {
            batch_count: metrics.batch_count,
            active_batch_count: metrics.active_batch_count,
            consumed_batch_count: metrics.consumed_batch_count(),
            edge_count: metrics.edge_count,
            process_step_count: metrics.process_step_count,
            plot_count: metrics.plot_count,
            active_millionths: metrics.active_millionths,
        }
    }
}

// =============================================================================
// CREATION RESPONSE
// =============================================================================

/// Body of a `201 Created` creation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub process_step_id: ProcessStepId,
}

// =============================================================================
// LISTING QUERY
// =============================================================================

/// Query string of `GET /companies/{id}/batches`.
///
/// `filter` and `sort` are JSON documents, URL-encoded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
}

impl ListQuery {
    /// Decode the embedded JSON documents.
    pub fn parse(&self) -> Result<(BatchFilter, BatchSort), LotgraphError> {
        let filter = match self.filter.as_deref() {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)
                .map_err(|e| LotgraphError::BadRequest(format!("invalid filter: {e}")))?,
            _ => BatchFilter::default(),
        };
        let sort = match self.sort.as_deref() {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)
                .map_err(|e| LotgraphError::BadRequest(format!("invalid sort: {e}")))?,
            _ => BatchSort::default(),
        };
        Ok((filter, sort))
    }
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// Body of every non-2xx ledger response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub kind: ErrorKind,
    pub error: String,
}

/// A ledger error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub LotgraphError);

impl From<LotgraphError> for ApiError {
    fn from(error: LotgraphError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Storage detail stays in the log.
        let error = if kind == ErrorKind::Internal {
            tracing::error!("Ledger failure: {}", self.0);
            "Internal error".to_string()
        } else {
            self.0.to_string()
        };
        let body = ErrorResponse {
            success: false,
            kind,
            error,
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use lotgraph_core::{SortField, SortOrder};

    #[test]
    fn empty_query_uses_defaults() {
        let (filter, sort) = ListQuery::default().parse().unwrap();
        assert_eq!(filter, BatchFilter::default());
        assert_eq!(sort, BatchSort::default());
    }

    #[test]
    fn query_documents_decode() {
        let query = ListQuery {
            filter: Some(r#"{"active":true}"#.to_string()),
            sort: Some(r#"{"field":"weight","order":"desc"}"#.to_string()),
        };
        let (filter, sort) = query.parse().unwrap();
        assert_eq!(filter.active, Some(true));
        assert_eq!(sort.field, SortField::Weight);
        assert_eq!(sort.order, SortOrder::Desc);
    }

    #[test]
    fn malformed_filter_is_bad_request() {
        let query = ListQuery {
            filter: Some("{not json".to_string()),
            sort: None,
        };
        let err = query.parse().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn error_status_follows_kind() {
        let cases = [
            (LotgraphError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (LotgraphError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (LotgraphError::TraversalLimit("x".into()), StatusCode::BAD_REQUEST),
            (
                LotgraphError::IoError("disk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError(error).into_response().status(), status);
        }
    }
}
