//! # Serving the Pipeline over HTTP
//!
//! Exposes the run entry point and the history store through a small Axum
//! API, the surface a research frontend talks to:
//!
//! - `POST /api/research`        submit a query, get the finished report
//! - `GET /api/history`          recent runs, with `?limit=` and `?search=`
//! - `GET /api/history/{id}`     one stored run
//! - `DELETE /api/history/{id}`  remove one stored run
//! - `DELETE /api/history`       clear the history
//! - `GET /api/health`           liveness probe
//!
//! The generation backend here is scripted so the server runs offline; swap
//! in a real `GenerationService` implementation for live use.
//!
//! Run with:
//! ```bash
//! cargo run --example serve_api
//! ```
//!
//! Then, in another terminal:
//! ```bash
//! curl -s localhost:3000/api/health
//! curl -s -X POST localhost:3000/api/research \
//!   -H 'content-type: application/json' \
//!   -d '{"query": "what controls tidal ranges?", "params": {"preset": "discovery"}}'
//! curl -s 'localhost:3000/api/history?limit=5'
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use uuid::Uuid;

use delvegraph::api::{RunOutcome, RunRequest, submit};
use delvegraph::records::{InMemoryRecordStore, RecordId, RecordStore, RunRecord};
use delvegraph::stage::Capabilities;
use delvegraph::telemetry;
use delvegraph::utils::testing::ScriptedService;

const DEFAULT_HISTORY_LIMIT: usize = 20;

/// One scripted backend that can answer every prompt of both presets.
fn scripted_backend() -> ScriptedService {
    ScriptedService::new()
        .structured_on(
            "research planner",
            json!({
                "question": "scripted",
                "topics": [
                    {"name": "mechanisms", "queries": ["underlying mechanism"]},
                    {"name": "evidence", "queries": ["observed evidence"]},
                ],
                "depth": "focused",
            }),
        )
        .grounded_on(
            "Sub-topic:",
            "A concise research block on the requested sub-topic.",
            &[("reference site", "https://example.com/reference")],
        )
        .text_on(
            "Synthesize the research",
            "The mechanisms are well understood [s0.0] and well evidenced [s1.0].",
        )
        .structured_on(
            "critical reviewer",
            json!({
                "assessment": "publishable",
                "strengths": ["grounded"],
                "weaknesses": [],
                "suggestions": [],
                "should_revise": false,
            }),
        )
        .structured_on(
            "search specialist",
            json!({"queries": ["primary angle", "secondary angle"]}),
        )
        .grounded_on(
            "web access",
            "A search result summary with supporting detail.",
            &[("search hit", "https://example.com/hit")],
        )
        .structured_on(
            "research auditor",
            json!({
                "is_sufficient": true,
                "knowledge_gap": "",
                "follow_up_queries": [],
            }),
        )
        .text_on(
            "complete markdown answer",
            "A direct answer backed by the gathered sources [s0.0].",
        )
}

#[derive(Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
    search: Option<String>,
}

async fn run_research(
    State(caps): State<Capabilities>,
    Json(request): Json<RunRequest>,
) -> Result<Json<RunOutcome>, (StatusCode, String)> {
    submit(request, caps)
        .await
        .map(Json)
        .map_err(|error| (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()))
}

/// History reads are best effort: a broken store reads as empty.
async fn list_history(
    State(caps): State<Capabilities>,
    Query(params): Query<HistoryParams>,
) -> Json<Value> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let histories = caps
        .records
        .recent(limit, params.search.as_deref())
        .await
        .unwrap_or_default();
    let total = histories.len();
    Json(json!({ "histories": histories, "total": total }))
}

async fn history_detail(
    State(caps): State<Capabilities>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunRecord>, (StatusCode, String)> {
    match caps.records.get(RecordId(id)).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err((StatusCode::NOT_FOUND, "record not found".into())),
        Err(error) => Err((StatusCode::INTERNAL_SERVER_ERROR, error.to_string())),
    }
}

async fn delete_history(State(caps): State<Capabilities>, Path(id): Path<Uuid>) -> Json<Value> {
    let (success, message) = match caps.records.remove(RecordId(id)).await {
        Ok(true) => (true, "record removed".to_string()),
        Ok(false) => (false, "no record with that id".to_string()),
        Err(error) => (false, error.to_string()),
    };
    Json(json!({ "success": success, "message": message }))
}

async fn clear_history(State(caps): State<Capabilities>) -> Json<Value> {
    let (success, message) = match caps.records.clear().await {
        Ok(count) => (true, format!("removed {count} records")),
        Err(error) => (false, error.to_string()),
    };
    Json(json!({ "success": success, "message": message }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "message": "research API is running" }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();
    miette::set_panic_hook();

    let caps = Capabilities::new(
        Arc::new(scripted_backend()),
        Arc::new(InMemoryRecordStore::new()),
    );

    let router = Router::new()
        .route("/api/research", post(run_research))
        .route("/api/history", get(list_history).delete(clear_history))
        .route("/api/history/:id", get(history_detail).delete(delete_history))
        .route("/api/health", get(health))
        .with_state(caps);

    let addr: SocketAddr = "127.0.0.1:3000".parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("research API listening on http://{addr}");
    axum::serve(listener, router.into_make_service()).await?;

    Ok(())
}
