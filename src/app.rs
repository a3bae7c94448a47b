//! Application wiring
//! Mission: Build the shared state once and mount every route on it

use crate::{
    auth::{self, AuthState, JwtHandler, RevocationList, SessionService, UserStore},
    cache::{Cache, CacheClient},
    config::Config,
    db::Database,
    loans::{self, LoanStore},
    middleware::{expose_internal_errors, rate_limit, request_logging, RateLimitConfig, RateLimiter},
};
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, OriginalUri, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::error;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Services shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub users: UserStore,
    pub loans: LoanStore,
    pub auth: AuthState,
    pub sessions: SessionService,
    pub rate_limiter: RateLimiter,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config, db: Database, cache_backend: Arc<dyn Cache>) -> Self {
        let cache = CacheClient::new(cache_backend, config.cache_timeout);
        let jwt = Arc::new(JwtHandler::new(
            &config.jwt_secret,
            config.session_ttl,
            config.refresh_ttl,
        ));
        let revocations = RevocationList::new(cache.clone());
        let users = UserStore::new(db.clone(), cache.clone(), config.cache_ttl);
        let loans = LoanStore::new(db.clone(), cache, config.cache_ttl);

        let auth = AuthState {
            jwt: jwt.clone(),
            revocations: revocations.clone(),
            fail_policy: config.revocation_fail_policy,
        };
        let sessions = SessionService::new(
            users.clone(),
            jwt,
            revocations,
            config.revocation_fail_policy,
            config.bcrypt_cost,
        );
        let rate_limiter = RateLimiter::new(RateLimitConfig::from_config(&config));

        Self {
            config: Arc::new(config),
            db,
            users,
            loans,
            auth,
            sessions,
            rate_limiter,
            started_at: Instant::now(),
        }
    }
}

/// Full HTTP surface: `/health`, everything else under `/api/v1`
pub fn build_router(state: AppState) -> Result<Router> {
    let origin = state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS_ORIGIN '{}'", state.config.cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let api = Router::new()
        .merge(auth::api::routes(&state))
        .merge(loans::api::routes(&state))
        .layer(from_fn_with_state(state.rate_limiter.clone(), rate_limit));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    if state.config.environment.is_development() {
        app = app.layer(from_fn(expose_internal_errors));
    }

    Ok(app
        .layer(from_fn(request_logging))
        .layer(cors)
        .with_state(state))
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "timestamp": Utc::now().to_rfc3339(),
                "uptime_secs": state.started_at.elapsed().as_secs(),
                "environment": state.config.environment.as_str(),
            })),
        ),
        Err(e) => {
            error!("Health check failed: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "error": "Database connection failed",
                })),
            )
        }
    }
}

async fn not_found(method: Method, OriginalUri(uri): OriginalUri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not Found",
            "message": format!("Route {} {} not found", method, uri.path()),
        })),
    )
}
