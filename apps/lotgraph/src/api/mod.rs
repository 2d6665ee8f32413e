//! # lotgraph HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `POST /harvests` - Record a harvest (merged when several lots)
//! - `POST /harvests/combined` - One harvest split across several plots
//! - `POST /batches` - Derive batches from existing ones
//! - `POST /plots` - Sync a plot of land from the registry
//! - `GET /batches/{id}` - Batch with step, plot and proof count
//! - `GET /batches/{id}/related` - Lineage component with invalid edges
//! - `GET /batches/{id}/export` - Nested audit export tree
//! - `GET /companies/{id}/batches` - Company holdings (`?filter=&sort=`)
//! - `GET /status` - Ledger metrics
//! - `GET /health` - Health check
//!
//! Security settings (API key, rate limit, CORS origins) come from
//! [`SecurityConfig`], see [`crate::config`].

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{ApiKey, api_key_auth_middleware};
pub use handlers::{
    company_batches_handler, create_batches_handler, create_combined_harvests_handler,
    create_harvests_handler, export_handler, health_handler, read_batch_handler,
    related_batches_handler, status_handler, upsert_plot_handler,
};
pub use middleware::{GlobalRateLimiter, create_rate_limiter, rate_limit_middleware};
pub use types::{
    ApiError, CreatedResponse, ErrorResponse, HealthResponse, ListQuery, StatusResponse,
};

use crate::config::{Config, SecurityConfig};
use crate::notary::{LoggingNotary, Notary, notary_from_config};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use lotgraph_core::{LotgraphError, Session};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum request body size (2 MiB).
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// The session containing the ledger.
    pub session: Arc<RwLock<Session>>,
    /// Where mint requests go after each committed creation call.
    pub notary: Arc<dyn Notary>,
    pub security: Arc<SecurityConfig>,
}

impl AppState {
    /// Create state with default security and a logging notary.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self::with_parts(session, Arc::new(LoggingNotary), SecurityConfig::default())
    }

    #[must_use]
    pub fn with_parts(
        session: Session,
        notary: Arc<dyn Notary>,
        security: SecurityConfig,
    ) -> Self {
        Self {
            session: Arc::new(RwLock::new(session)),
            notary,
            security: Arc::new(security),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer.
///
/// - `["*"]`: allows all origins
/// - `None` or no valid origin: localhost only
/// - otherwise: exactly the listed origins
fn build_cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let Some(origins) = origins else {
        tracing::info!("CORS: No origins configured, defaulting to localhost only");
        return build_localhost_cors();
    };

    if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
        return CorsLayer::permissive();
    }

    let allowed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(hv) => {
                tracing::info!("CORS: Allowing origin: {}", origin);
                Some(hv)
            }
            Err(e) => {
                tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    if allowed_origins.is_empty() {
        tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
        return build_localhost_cors();
    }

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing
/// 2. CORS
/// 3. Body limit
/// 4. Rate limiting (if enabled)
/// 5. Authentication (if a key is configured)
pub fn create_router(state: AppState) -> Router {
    let security = Arc::clone(&state.security);
    let cors = build_cors_layer(security.cors_origins.as_deref());

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/harvests", post(handlers::create_harvests_handler))
        .route(
            "/harvests/combined",
            post(handlers::create_combined_harvests_handler),
        )
        .route("/batches", post(handlers::create_batches_handler))
        .route("/batches/{id}", get(handlers::read_batch_handler))
        .route(
            "/batches/{id}/related",
            get(handlers::related_batches_handler),
        )
        .route("/batches/{id}/export", get(handlers::export_handler))
        .route(
            "/companies/{id}/batches",
            get(handlers::company_batches_handler),
        )
        .route("/plots", post(handlers::upsert_plot_handler));

    match security.api_key.as_deref() {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            let key: ApiKey = Arc::from(key);
            router = router.layer(axum_middleware::from_fn_with_state(
                key,
                auth::api_key_auth_middleware,
            ));
        }
        None => {
            tracing::warn!(
                "API key authentication DISABLED - all endpoints are publicly accessible! \
                 Set LOTGRAPH_API_KEY to enable authentication."
            );
        }
    }

    if security.rate_limit > 0 {
        tracing::info!(
            "Rate limiting enabled: {} requests/second",
            security.rate_limit
        );
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(security.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server on `config.server`.
pub async fn run_server(config: &Config, session: Session) -> Result<(), LotgraphError> {
    let notary = notary_from_config(&config.notary)
        .map_err(|e| LotgraphError::IoError(e.to_string()))?;
    let state = AppState::with_parts(session, notary, config.security.clone());
    let router = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| LotgraphError::IoError(format!("Bind failed: {e}")))?;

    tracing::info!("lotgraph HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| LotgraphError::IoError(format!("Server error: {e}")))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn router(security: SecurityConfig) -> Router {
        create_router(AppState::with_parts(
            Session::new(),
            Arc::new(LoggingNotary),
            security,
        ))
    }

    fn open() -> SecurityConfig {
        SecurityConfig {
            api_key: None,
            rate_limit: 0,
            cors_origins: None,
        }
    }

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/status")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn configured_origin_is_allowed() {
        let security = SecurityConfig {
            cors_origins: Some(vec!["https://audit.example".to_string()]),
            ..open()
        };
        let response = router(security)
            .oneshot(preflight("https://audit.example"))
            .await
            .unwrap();
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "https://audit.example"
        );
    }

    #[tokio::test]
    async fn default_cors_is_localhost_only() {
        let response = router(open())
            .oneshot(preflight("https://evil.example"))
            .await
            .unwrap();
        assert!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let body = vec![b' '; MAX_BODY_SIZE + 1];
        let request = Request::builder()
            .method(Method::POST)
            .uri("/batches")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = router(open()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let request = Request::builder()
            .uri("/unknown")
            .body(Body::empty())
            .unwrap();
        let response = router(open()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
