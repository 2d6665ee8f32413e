//! # API Endpoint Handlers
//!
//! Creation handlers hold the write lock only for the ledger call; mints
//! are dispatched once it is released. Read handlers share the read lock.

use super::{
    AppState,
    types::{ApiError, CreatedResponse, HealthResponse, ListQuery, StatusResponse},
};
use crate::notary::dispatch_mints;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use lotgraph_core::{
    BatchCreateRequest, BatchDetails, BatchId, BatchSummary, CombinedHarvestRequest, CompanyId,
    CreationEngine, CreationOutcome, ExportSnapshot, LedgerMetrics, Plot, PlotRegistry,
    RelatedBatches, export_batch, read_batch_by_id, read_batches_by_company,
    read_related_batches,
};

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

/// Get ledger status.
pub async fn status_handler(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    let session = state.session.read().await;
    let metrics = LedgerMetrics::from_store(&*session)?;
    Ok(Json(StatusResponse::from(metrics)))
}

// =============================================================================
// CREATION HANDLERS
// =============================================================================

/// Turn a committed outcome into a response, notarizing what was created.
async fn finish_creation(state: &AppState, outcome: CreationOutcome) -> Response {
    match outcome {
        CreationOutcome::NoContent => StatusCode::NO_CONTENT.into_response(),
        CreationOutcome::Created(receipt) => {
            tracing::info!(
                event = "batches_created",
                process_step = receipt.process_step_id.0,
                count = receipt.created.len()
            );
            dispatch_mints(state.notary.as_ref(), &receipt.mints).await;
            (
                StatusCode::CREATED,
                Json(CreatedResponse {
                    process_step_id: receipt.process_step_id,
                }),
            )
                .into_response()
        }
    }
}

/// Record one harvest event.
pub async fn create_harvests_handler(
    State(state): State<AppState>,
    Json(requests): Json<Vec<BatchCreateRequest>>,
) -> Result<Response, ApiError> {
    let outcome = {
        let mut session = state.session.write().await;
        CreationEngine::create_harvests(&mut *session, &requests, Utc::now())?
    };
    Ok(finish_creation(&state, outcome).await)
}

/// Record one harvest spread evenly across several plots.
pub async fn create_combined_harvests_handler(
    State(state): State<AppState>,
    Json(request): Json<CombinedHarvestRequest>,
) -> Result<Response, ApiError> {
    let outcome = {
        let mut session = state.session.write().await;
        CreationEngine::create_combined_harvests(&mut *session, &request, Utc::now())?
    };
    Ok(finish_creation(&state, outcome).await)
}

/// Derive batches from existing ones (split, blend, transform).
pub async fn create_batches_handler(
    State(state): State<AppState>,
    Json(requests): Json<Vec<BatchCreateRequest>>,
) -> Result<Response, ApiError> {
    let outcome = {
        let mut session = state.session.write().await;
        CreationEngine::create_batches(&mut *session, &requests, Utc::now())?
    };
    Ok(finish_creation(&state, outcome).await)
}

// =============================================================================
// PLOT REGISTRY
// =============================================================================

/// Sync one plot of land from the external registry.
pub async fn upsert_plot_handler(
    State(state): State<AppState>,
    Json(plot): Json<Plot>,
) -> Result<StatusCode, ApiError> {
    let mut session = state.session.write().await;
    tracing::debug!(plot = plot.id.0, proofs = plot.proof_count(), "Plot synced");
    session.upsert_plot(plot)?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// READ HANDLERS
// =============================================================================

/// One batch with its step, plot and proof count.
pub async fn read_batch_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<BatchDetails>, ApiError> {
    let session = state.session.read().await;
    Ok(Json(read_batch_by_id(&*session, BatchId(id))?))
}

/// Batches held by a company, filtered and sorted.
pub async fn company_batches_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BatchSummary>>, ApiError> {
    let (filter, sort) = query.parse()?;
    let session = state.session.read().await;
    Ok(Json(read_batches_by_company(
        &*session,
        CompanyId(id),
        &filter,
        &sort,
    )?))
}

/// The whole lineage component of a batch, with invalid edges flagged.
pub async fn related_batches_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<RelatedBatches>, ApiError> {
    let session = state.session.read().await;
    Ok(Json(read_related_batches(&*session, BatchId(id))?))
}

/// Audit export tree rooted at a batch.
pub async fn export_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ExportSnapshot>, ApiError> {
    let session = state.session.read().await;
    let snapshot = export_batch(&*session, BatchId(id), Utc::now())?;
    tracing::info!(
        event = "export",
        batch = id,
        nodes = snapshot.root_batch.node_count()
    );
    Ok(Json(snapshot))
}
