//! HTTP API for Quill.

use crate::error::TrackError;
use crate::models::validate_slug;
use crate::node::SiteState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use quill_rankings::{Leader, RankingSnapshot, Scope, Team};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type AppState = Arc<SiteState>;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        .route("/ready", get(ready))
        // The read action
        .route("/blog/:slug/read", post(record_read))
        // Leaderboards
        .route("/api/v1/rankings", get(get_rankings))
        .route("/api/v1/posts/:slug/reads", get(get_post_reads))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// --- Health endpoints ---

async fn health() -> &'static str {
    "OK"
}

async fn ready() -> &'static str {
    "OK"
}

// --- Read action ---

#[derive(Debug, Serialize)]
struct ReadResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    recorded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ReadResponse {
    fn recorded(recorded: bool) -> Json<Self> {
        Json(Self {
            success: true,
            recorded: Some(recorded),
            error: None,
        })
    }

    fn failed(error: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            recorded: None,
            error: Some(error.into()),
        })
    }
}

async fn record_read(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    jar: CookieJar,
) -> Response {
    if let Err(reason) = validate_slug(&slug) {
        return (StatusCode::BAD_REQUEST, ReadResponse::failed(reason)).into_response();
    }

    let resolution = match state.resolver.resolve(&jar).await {
        Ok(resolution) => resolution,
        Err(e) => {
            tracing::error!(slug = %slug, "Cannot resolve reader: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                ReadResponse::failed("could not identify reader"),
            )
                .into_response();
        }
    };
    let jar = resolution.apply(jar);

    match state.tracker.track_read(&slug, &resolution).await {
        Ok(receipt) => (jar, ReadResponse::recorded(receipt.recorded())).into_response(),
        Err(TrackError::InvalidSlug(reason)) => {
            (StatusCode::BAD_REQUEST, jar, ReadResponse::failed(reason)).into_response()
        }
        Err(e) => {
            tracing::error!(slug = %slug, reader = %resolution.identity, "Read not recorded: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                jar,
                ReadResponse::failed("read could not be recorded"),
            )
                .into_response()
        }
    }
}

// --- Leaderboards ---

#[derive(Debug, Deserialize)]
struct RankingsQuery {
    slug: Option<String>,
    #[serde(default)]
    force_fresh: bool,
}

#[derive(Debug, Serialize)]
struct TeamStanding {
    team: Team,
    total_reads: u64,
    percent: f64,
}

#[derive(Debug, Serialize)]
struct RankingsResponse {
    scope: Scope,
    teams: Vec<TeamStanding>,
    total_reads: u64,
    leader: Option<Leader>,
}

impl From<&RankingSnapshot> for RankingsResponse {
    fn from(snapshot: &RankingSnapshot) -> Self {
        Self {
            scope: snapshot.scope().clone(),
            teams: snapshot
                .entries()
                .map(|(team, total_reads)| TeamStanding {
                    team,
                    total_reads,
                    percent: snapshot.percent(team),
                })
                .collect(),
            total_reads: snapshot.total_reads(),
            leader: snapshot.leader(),
        }
    }
}

async fn get_rankings(
    State(state): State<AppState>,
    Query(query): Query<RankingsQuery>,
) -> Result<Json<RankingsResponse>, StatusCode> {
    if let Some(slug) = &query.slug {
        validate_slug(slug).map_err(|_| StatusCode::BAD_REQUEST)?;
    }

    let snapshot = state
        .aggregator()
        .get_blog_read_rankings(query.slug.as_deref(), query.force_fresh)
        .await
        .map_err(|e| {
            tracing::warn!(slug = ?query.slug, "Rankings unavailable: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    Ok(Json(RankingsResponse::from(snapshot.as_ref())))
}

#[derive(Debug, Serialize)]
struct PostReadsResponse {
    slug: String,
    total_reads: u64,
}

async fn get_post_reads(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PostReadsResponse>, StatusCode> {
    validate_slug(&slug).map_err(|_| StatusCode::BAD_REQUEST)?;

    let total_reads = state
        .aggregator()
        .get_total_post_reads(&slug)
        .await
        .map_err(|e| {
            tracing::warn!(slug = %slug, "Read count unavailable: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    Ok(Json(PostReadsResponse { slug, total_reads }))
}
