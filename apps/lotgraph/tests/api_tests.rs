//! Integration tests for the lotgraph HTTP API.
//!
//! Uses axum-test to drive the router without starting a real server.

#![allow(clippy::unwrap_used, clippy::panic)]

use async_trait::async_trait;
use axum::http::HeaderValue;
use axum_test::TestServer;
use lotgraph::api::{
    AppState, CreatedResponse, ErrorResponse, HealthResponse, StatusResponse, create_router,
};
use lotgraph::config::SecurityConfig;
use lotgraph::notary::{Notary, NotaryError};
use lotgraph_core::{
    BatchDetails, BatchId, BatchSummary, ErrorKind, ExportSnapshot, IndividualId, MintRequest,
    Plot, PlotId, PlotRegistry, Proof, ProofKind, RelatedBatches, Session,
    primitives::HARVEST_PROCESS,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

const FARMER: u64 = 7;
const COMPANY: u64 = 3;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Remembers every mint in arrival order.
#[derive(Default)]
struct RecordingNotary {
    minted: Mutex<Vec<MintRequest>>,
}

#[async_trait]
impl Notary for RecordingNotary {
    async fn mint(&self, request: &MintRequest) -> Result<(), NotaryError> {
        self.minted.lock().unwrap().push(request.clone());
        Ok(())
    }
}

/// Always refuses.
struct DownNotary;

#[async_trait]
impl Notary for DownNotary {
    async fn mint(&self, _request: &MintRequest) -> Result<(), NotaryError> {
        Err(NotaryError::ConnectionFailed("test".to_string()))
    }
}

fn proofs(count: usize) -> Vec<Proof> {
    (0..count)
        .map(|i| Proof {
            kind: if i == 0 {
                ProofKind::Ownership
            } else {
                ProofKind::FreedomFromDeforestation
            },
            document: format!("doc-{i}"),
        })
        .collect()
}

/// Plot 1 is fully proven, plot 2 has a single proof.
fn seeded_session() -> Session {
    let mut session = Session::new();
    for (id, count) in [(1, 2), (2, 1)] {
        session
            .upsert_plot(Plot {
                id: PlotId(id),
                farmer: IndividualId(FARMER),
                description: format!("plot {id}"),
                proofs: proofs(count),
            })
            .unwrap();
    }
    session
}

fn open_security() -> SecurityConfig {
    SecurityConfig {
        api_key: None,
        rate_limit: 0,
        cors_origins: None,
    }
}

fn create_test_server_with(notary: Arc<dyn Notary>, security: SecurityConfig) -> TestServer {
    let state = AppState::with_parts(seeded_session(), notary, security);
    TestServer::new(create_router(state)).unwrap()
}

fn create_test_server() -> TestServer {
    create_test_server_with(Arc::new(RecordingNotary::default()), open_security())
}

fn harvest(plot: u64, weight: u64) -> Value {
    json!({
        "weight": weight,
        "recipient": { "company": COMPANY },
        "process_step": {
            "location": "Finca",
            "date_of_process": "2024-05-01T00:00:00Z",
            "executed_by": { "individual": FARMER },
            "recorded_by": { "individual": FARMER },
            "plot": plot
        }
    })
}

fn derived(ins: &[u64], weight: u64, process: &str) -> Value {
    json!({
        "weight": weight,
        "ins": ins,
        "recipient": { "company": COMPANY },
        "process_step": {
            "date_of_process": "2024-06-01T00:00:00Z",
            "process": process,
            "executed_by": { "company": COMPANY },
            "recorded_by": { "company": COMPANY }
        }
    })
}

/// Ids of the company's batches, ascending.
async fn company_batch_ids(server: &TestServer) -> Vec<BatchId> {
    let rows: Vec<BatchSummary> = server
        .get(&format!("/companies/{COMPANY}/batches"))
        .await
        .json();
    rows.into_iter().map(|r| r.batch.id).collect()
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server();
    let response = server.get("/health").await;
    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
}

#[tokio::test]
async fn test_status_counts_plots() {
    let server = create_test_server();
    let response = server.get("/status").await;
    response.assert_status_ok();
    let status: StatusResponse = response.json();
    assert_eq!(status.plot_count, 2);
    assert_eq!(status.batch_count, 0);
}

// =============================================================================
// CREATION ENDPOINTS
// =============================================================================

#[tokio::test]
async fn test_empty_harvest_is_no_content() {
    let server = create_test_server();
    let response = server.post("/harvests").json(&json!([])).await;
    assert_eq!(response.status_code().as_u16(), 204);
}

#[tokio::test]
async fn test_harvest_creates_and_notarizes() {
    let notary = Arc::new(RecordingNotary::default());
    let server = create_test_server_with(notary.clone(), open_security());

    let response = server
        .post("/harvests")
        .json(&json!([harvest(1, 33), harvest(1, 33)]))
        .await;
    assert_eq!(response.status_code().as_u16(), 201);
    let _: CreatedResponse = response.json();

    // Two lots plus their merge; only the merge stays active.
    let status: StatusResponse = server.get("/status").await.json();
    assert_eq!(status.batch_count, 3);
    assert_eq!(status.active_batch_count, 1);

    let minted = notary.minted.lock().unwrap().clone();
    assert_eq!(minted.len(), 3);
    assert!(matches!(minted[0], MintRequest::Root { .. }));
    assert!(matches!(minted[1], MintRequest::Root { .. }));
    assert!(matches!(minted[2], MintRequest::Leaf { .. }));

    let rows: Vec<BatchSummary> = server
        .get(&format!("/companies/{COMPANY}/batches"))
        .add_query_param("filter", r#"{"active":true}"#)
        .await
        .json();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].batch.weight.value(), 66);
}

#[tokio::test]
async fn test_notary_failure_does_not_fail_request() {
    let server = create_test_server_with(Arc::new(DownNotary), open_security());
    let response = server
        .post("/harvests")
        .json(&json!([harvest(1, 10)]))
        .await;
    assert_eq!(response.status_code().as_u16(), 201);
}

#[tokio::test]
async fn test_unknown_plot_is_not_found() {
    let server = create_test_server();
    let response = server
        .post("/harvests")
        .json(&json!([harvest(99, 10)]))
        .await;
    assert_eq!(response.status_code().as_u16(), 404);
    let body: ErrorResponse = response.json();
    assert!(!body.success);
    assert_eq!(body.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_combined_harvest_splits_weight() {
    let server = create_test_server();
    let response = server
        .post("/harvests/combined")
        .json(&json!({
            "weight": 101,
            "recipient": { "company": COMPANY },
            "process_step": {
                "date_of_process": "2024-05-01T00:00:00Z",
                "executed_by": { "individual": FARMER },
                "recorded_by": { "individual": FARMER }
            },
            "plots": [1, 2]
        }))
        .await;
    assert_eq!(response.status_code().as_u16(), 201);

    let rows: Vec<BatchSummary> = server
        .get(&format!("/companies/{COMPANY}/batches"))
        .await
        .json();
    let weights: Vec<u64> = rows.iter().map(|r| r.batch.weight.value()).collect();
    assert_eq!(weights, vec![51, 50, 101]);
}

#[tokio::test]
async fn test_consuming_inactive_batch_is_bad_request() {
    let server = create_test_server();
    server
        .post("/harvests")
        .json(&json!([harvest(1, 10)]))
        .await
        .assert_status_success();
    let origin = company_batch_ids(&server).await[0];

    server
        .post("/batches")
        .json(&json!([derived(&[origin.0], 10, "Drying")]))
        .await
        .assert_status_success();

    let response = server
        .post("/batches")
        .json(&json!([derived(&[origin.0], 10, "Drying")]))
        .await;
    response.assert_status_bad_request();
    let body: ErrorResponse = response.json();
    assert_eq!(body.kind, ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_malformed_body_is_client_error() {
    let server = create_test_server();
    let response = server
        .post("/batches")
        .json(&json!({ "not": "a list" }))
        .await;
    assert!(response.status_code().is_client_error());
}

// =============================================================================
// READ ENDPOINTS
// =============================================================================

#[tokio::test]
async fn test_read_batch_and_missing_batch() {
    let server = create_test_server();
    server
        .post("/harvests")
        .json(&json!([harvest(1, 10)]))
        .await
        .assert_status_success();
    let id = company_batch_ids(&server).await[0];

    let details: BatchDetails = server.get(&format!("/batches/{}", id.0)).await.json();
    assert_eq!(details.proof_count, Some(2));
    assert_eq!(details.process_step.process, HARVEST_PROCESS);

    let response = server.get("/batches/9999").await;
    assert_eq!(response.status_code().as_u16(), 404);
}

#[tokio::test]
async fn test_related_flags_edges_from_unproven_plot() {
    let server = create_test_server();
    server
        .post("/harvests")
        .json(&json!([harvest(1, 10)]))
        .await
        .assert_status_success();
    server
        .post("/harvests")
        .json(&json!([harvest(2, 10)]))
        .await
        .assert_status_success();
    let ids = company_batch_ids(&server).await;
    let (proven, unproven) = (ids[0], ids[1]);

    server
        .post("/batches")
        .json(&json!([derived(&[proven.0, unproven.0], 20, "Blending")]))
        .await
        .assert_status_success();

    let related: RelatedBatches = server
        .get(&format!("/batches/{}/related", proven.0))
        .await
        .json();
    assert_eq!(related.batches.len(), 3);
    let invalid: Vec<_> = related.invalid_edges().map(|e| e.from).collect();
    assert_eq!(invalid, vec![unproven]);

    let rows: Vec<BatchSummary> = server
        .get(&format!("/companies/{COMPANY}/batches"))
        .add_query_param("filter", r#"{"process":"Blending"}"#)
        .await
        .json();
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].has_all_proofs);
}

#[tokio::test]
async fn test_export_carries_digest() {
    let server = create_test_server();
    server
        .post("/harvests")
        .json(&json!([harvest(1, 10)]))
        .await
        .assert_status_success();
    let origin = company_batch_ids(&server).await[0];
    server
        .post("/batches")
        .json(&json!([
            derived(&[origin.0], 4, "Split"),
            derived(&[origin.0], 6, "Split")
        ]))
        .await
        .assert_status_success();

    let snapshot: ExportSnapshot = server
        .get(&format!("/batches/{}/export", origin.0))
        .await
        .json();
    assert_eq!(snapshot.root_batch.batch.id, origin);
    assert_eq!(snapshot.root_batch.outs.len(), 2);
    assert!(snapshot.verify_digest().unwrap());
}

#[tokio::test]
async fn test_invalid_sort_is_bad_request() {
    let server = create_test_server();
    let response = server
        .get(&format!("/companies/{COMPANY}/batches"))
        .add_query_param("sort", r#"{"field":"colour"}"#)
        .await;
    response.assert_status_bad_request();
}

// =============================================================================
// SECURITY
// =============================================================================

fn keyed_security(key: &str) -> SecurityConfig {
    SecurityConfig {
        api_key: Some(key.to_string()),
        ..open_security()
    }
}

#[tokio::test]
async fn test_auth_rejects_missing_and_wrong_key() {
    let server =
        create_test_server_with(Arc::new(RecordingNotary::default()), keyed_security("k3y"));

    assert_eq!(server.get("/status").await.status_code().as_u16(), 401);

    let response = server
        .get("/status")
        .add_header(
            axum::http::header::AUTHORIZATION,
            "Bearer wrong".parse::<HeaderValue>().unwrap(),
        )
        .await;
    assert_eq!(response.status_code().as_u16(), 401);
}

#[tokio::test]
async fn test_auth_accepts_bearer_and_exempts_health() {
    let server =
        create_test_server_with(Arc::new(RecordingNotary::default()), keyed_security("k3y"));

    server.get("/health").await.assert_status_ok();
    server
        .get("/status")
        .add_header(
            axum::http::header::AUTHORIZATION,
            "Bearer k3y".parse::<HeaderValue>().unwrap(),
        )
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let security = SecurityConfig {
        rate_limit: 1,
        ..open_security()
    };
    let server = create_test_server_with(Arc::new(RecordingNotary::default()), security);

    server.get("/health").await.assert_status_ok();
    assert_eq!(server.get("/health").await.status_code().as_u16(), 429);
}

#[tokio::test]
async fn test_plot_sync_endpoint() {
    let server = create_test_server();
    let response = server
        .post("/plots")
        .json(&json!({
            "id": 5,
            "farmer": FARMER,
            "description": "terrace",
            "proofs": []
        }))
        .await;
    assert_eq!(response.status_code().as_u16(), 204);

    let status: StatusResponse = server.get("/status").await.json();
    assert_eq!(status.plot_count, 3);
}
