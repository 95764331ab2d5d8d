//! Read-only HTTP API over the listing store.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::db::ListingStore;
use crate::query::{self, ListingPage, ListingQuery, QueryError};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ListingStore>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TitleParams {
    pub title: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// A failed query plus the message shown when the store is at fault.
pub struct ApiError {
    err: QueryError,
    context: String,
}

fn failed(context: impl Into<String>) -> impl FnOnce(QueryError) -> ApiError {
    let context = context.into();
    move |err| ApiError { err, context }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.err {
            QueryError::Store(e) => {
                error!("{}: {}", self.context, e);
                (StatusCode::INTERNAL_SERVER_ERROR, self.context)
            }
            invalid => (StatusCode::BAD_REQUEST, invalid.to_string()),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

type ApiResult = std::result::Result<Json<ListingPage>, ApiError>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/title", get(jobs_by_title))
        .route("/api/experience/:level", get(jobs_by_experience))
        .route("/api/companyLevel/:level", get(jobs_by_company_level))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn welcome() -> &'static str {
    "Welcome to the job harvester API"
}

async fn list_jobs(State(state): State<AppState>, Query(q): Query<ListingQuery>) -> ApiResult {
    query::list_listings(state.store.as_ref(), &q)
        .await
        .map(Json)
        .map_err(failed("Error fetching jobs"))
}

async fn jobs_by_title(State(state): State<AppState>, Query(q): Query<TitleParams>) -> ApiResult {
    let context = format!(
        "Error fetching jobs with title containing \"{}\"",
        q.title.as_deref().unwrap_or_default()
    );
    query::search_by_title(state.store.as_ref(), q.title.as_deref(), q.page, q.limit)
        .await
        .map(Json)
        .map_err(failed(context))
}

async fn jobs_by_experience(
    State(state): State<AppState>,
    Path(level): Path<String>,
    Query(p): Query<PageParams>,
) -> ApiResult {
    query::by_experience(state.store.as_ref(), &level, p.page, p.limit)
        .await
        .map(Json)
        .map_err(failed(format!("Error fetching jobs with experience level {}", level)))
}

async fn jobs_by_company_level(
    State(state): State<AppState>,
    Path(level): Path<String>,
    Query(p): Query<PageParams>,
) -> ApiResult {
    query::by_company_level(state.store.as_ref(), &level, p.page, p.limit)
        .await
        .map(Json)
        .map_err(failed(format!("Error fetching jobs with company level {}", level)))
}

/// Serve until ctrl-c.
pub async fn listen(addr: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Listening at {}", addr);
    tokio::select! {
        r = axum::serve(listener, create_router(state)) => {
            warn!("server ended unexpectedly: {:?}", &r)
        },
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl+c interrupt, closing server");
        }
    }
    Ok(())
}
