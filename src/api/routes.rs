//! Thin read/write HTTP surface over the Job Manager (§10.5): `GET
//! /healthz`, `GET /jobs`, `GET /jobs/:id`, `POST /jobs`, `POST
//! /jobs/:id/cancel`. Deliberately minimal — no auth, no
//! organisations/billing UI.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::job_manager::{CreateJobOptions, JobManager, ListJobsOptions};
use crate::models::{Job, JobStatus, SourceType};
use crate::status::{ServiceStatus, ServiceStatusRegistry};

#[derive(Clone)]
pub struct ApiState {
    pub jobs: JobManager,
    pub service_statuses: ServiceStatusRegistry,
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/jobs", get(list_jobs).post(create_job))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .with_state(state)
        .layer((
            CompressionLayer::new().gzip(true),
            TraceLayer::new_for_http(),
            TimeoutLayer::new(Duration::from_secs(10)),
        ))
}

async fn healthz(State(state): State<ApiState>) -> Json<Value> {
    let services: BTreeMap<String, String> = state
        .service_statuses
        .all()
        .into_iter()
        .map(|(name, status)| (name, format!("{status:?}").to_lowercase()))
        .collect();

    let healthy = !services
        .values()
        .any(|status| status == &format!("{:?}", ServiceStatus::Error).to_lowercase());

    Json(json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "commit": env!("GIT_COMMIT_SHORT"),
        "services": services,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[derive(Deserialize)]
struct CreateJobRequest {
    organisation_id: Uuid,
    user_id: Uuid,
    domain: String,
    #[serde(default = "default_concurrency")]
    concurrency: i32,
    #[serde(default)]
    find_links: bool,
    #[serde(default = "default_max_pages")]
    max_pages: i32,
    #[serde(default)]
    include_paths: Vec<String>,
    #[serde(default)]
    exclude_paths: Vec<String>,
    #[serde(default = "default_use_sitemap")]
    use_sitemap: bool,
    #[serde(default)]
    manual_urls: Vec<String>,
    #[serde(default = "default_required_workers")]
    required_workers: i32,
}

fn default_concurrency() -> i32 {
    3
}
fn default_max_pages() -> i32 {
    1000
}
fn default_use_sitemap() -> bool {
    true
}
fn default_required_workers() -> i32 {
    1
}

async fn create_job(
    State(state): State<ApiState>,
    Json(body): Json<CreateJobRequest>,
) -> Result<Json<Job>, ApiError> {
    let options = CreateJobOptions {
        organisation_id: body.organisation_id,
        user_id: body.user_id,
        domain: body.domain,
        concurrency: body.concurrency,
        find_links: body.find_links,
        max_pages: body.max_pages,
        include_paths: body.include_paths,
        exclude_paths: body.exclude_paths,
        use_sitemap: body.use_sitemap,
        manual_urls: body.manual_urls,
        required_workers: body.required_workers,
        source_type: SourceType::Manual,
    };
    let job = state.jobs.create_job(options).await?;
    Ok(Json(job))
}

async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, ApiError> {
    let job = state
        .jobs
        .get_job_status(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job {id} not found")))?;
    Ok(Json(job))
}

#[derive(Deserialize)]
struct ListJobsParams {
    organisation_id: Uuid,
    status: Option<JobStatus>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    #[serde(default)]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
}

fn default_page_size() -> i64 {
    50
}

#[derive(Serialize)]
struct ListJobsResponse {
    jobs: Vec<Job>,
    page: i64,
    page_size: i64,
}

async fn list_jobs(
    State(state): State<ApiState>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let options = ListJobsOptions {
        organisation_id: params.organisation_id,
        status: params.status,
        since: params.since,
        until: params.until,
        page: params.page,
        page_size: params.page_size,
    };
    let jobs = state.jobs.list_jobs(options).await?;
    Ok(Json(ListJobsResponse {
        jobs,
        page: params.page,
        page_size: params.page_size,
    }))
}

async fn cancel_job(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.jobs.cancel_job(id).await?;
    Ok(Json(json!({ "cancelled": id })))
}
