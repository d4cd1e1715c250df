use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use agriplan_core::error::PlanningError;
use agriplan_core::kb::{ArticleRef, KnowledgeBase};
use agriplan_core::planner::{Planner, ReplanOptions};
use agriplan_db::models::{
    Field, NewField, NewMeasurement, Plan, ReplanLog, ScheduleTask, TaskStatus,
};
use agriplan_db::queries::{
    fields as field_db, measurements as measurement_db, plans as plan_db,
    replan_logs as replan_log_db, schedule_tasks as task_db,
};

use crate::calendar::{self, CalendarItem};
use crate::config::AgriplanConfig;
use crate::services;

const DEFAULT_SEARCH_K: usize = 5;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub planner: Arc<Planner>,
    pub kb: Arc<KnowledgeBase>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        let message = format!("{err:#}");
        tracing::error!(error = %message, "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl From<PlanningError> for AppError {
    fn from(err: PlanningError) -> Self {
        match err {
            PlanningError::FieldNotFound(_) | PlanningError::NoPlan(_) => {
                Self::not_found(err.to_string())
            }
            PlanningError::Configuration(_) => Self::internal(anyhow::Error::new(err)),
            PlanningError::Persistence(e) => Self::internal(e),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request and response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct FormatQuery {
    #[serde(default)]
    pub format: Option<String>,
}

impl FormatQuery {
    fn is_calendar(&self) -> bool {
        self.format.as_deref() == Some("calendar")
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListFieldsQuery {
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScheduleQuery {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplanRequest {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub problems: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskStatusRequest {
    pub status: String,
    #[serde(default)]
    pub actual_quantity: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct NewDocumentRequest {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CalendarResponse {
    pub field_id: Uuid,
    pub plan_id: Uuid,
    pub version: i32,
    pub calendar: BTreeMap<NaiveDate, Vec<CalendarItem>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<ArticleRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replan: Option<ReplanLog>,
}

impl CalendarResponse {
    fn new(plan: &Plan, tasks: &[ScheduleTask]) -> Self {
        Self {
            field_id: plan.field_id,
            plan_id: plan.id,
            version: plan.version,
            calendar: calendar::group_by_date(tasks),
            citations: Vec::new(),
            replan: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReplanResponse {
    pub plan: Plan,
    pub tasks: Vec<ScheduleTask>,
    pub replan: Option<ReplanLog>,
    pub drift: agriplan_core::drift::DriftVerdict,
    pub citations: Vec<ArticleRef>,
}

#[derive(Debug, Serialize)]
pub struct PlanHistoryResponse {
    pub plans: Vec<Plan>,
    pub replans: Vec<ReplanLog>,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub doc_id: Uuid,
    pub title: Option<String>,
    pub source_url: Option<String>,
    pub ord: i32,
    pub text: String,
    pub score: f32,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/fields", post(create_field).get(list_fields))
        .route("/api/fields/{id}", get(get_field))
        .route("/api/fields/{id}/plan", post(generate_plan))
        .route("/api/fields/{id}/replan", post(replan_field))
        .route("/api/fields/{id}/plans", get(list_plans))
        .route("/api/fields/{id}/schedule", get(list_schedule))
        .route("/api/fields/{id}/measurements", post(add_measurement))
        .route("/api/tasks/{id}", patch(update_task))
        .route("/api/kb/documents", post(add_document))
        .route("/api/kb/search", get(search_kb))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(config: &AgriplanConfig, pool: PgPool, bind: &str, port: u16) -> Result<()> {
    let kb = services::build_knowledge_base(config, &pool)?;
    let planner = services::build_planner(config, &pool, kb.clone())?;
    let state = AppState {
        pool,
        planner: Arc::new(planner),
        kb,
    };

    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("agriplan serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("agriplan serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn require_field(pool: &PgPool, id: Uuid) -> Result<Field, AppError> {
    field_db::get_field(pool, id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("field {id} not found")))
}

async fn create_field(
    State(state): State<AppState>,
    payload: Result<Json<NewField>, JsonRejection>,
) -> Result<axum::response::Response, AppError> {
    let Json(new) = payload?;
    new.validate().map_err(AppError::bad_request)?;

    let field = field_db::insert_field(&state.pool, &new)
        .await
        .map_err(AppError::internal)?;
    Ok((StatusCode::CREATED, Json(field)).into_response())
}

async fn list_fields(
    State(state): State<AppState>,
    query: Result<Query<ListFieldsQuery>, QueryRejection>,
) -> Result<axum::response::Response, AppError> {
    let Query(query) = query?;
    let fields = field_db::list_fields(&state.pool, query.owner.as_deref())
        .await
        .map_err(AppError::internal)?;
    Ok(Json(fields).into_response())
}

async fn get_field(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let field = require_field(&state.pool, id).await?;
    Ok(Json(field).into_response())
}

async fn generate_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    query: Result<Query<FormatQuery>, QueryRejection>,
) -> Result<axum::response::Response, AppError> {
    let Query(format) = query?;
    let generated = state.planner.generate_first_plan(id).await?;

    if format.is_calendar() {
        let mut body = CalendarResponse::new(&generated.plan, &generated.tasks);
        body.citations = generated.citations;
        return Ok((StatusCode::CREATED, Json(body)).into_response());
    }
    Ok((StatusCode::CREATED, Json(generated)).into_response())
}

async fn replan_field(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    query: Result<Query<FormatQuery>, QueryRejection>,
    body: Bytes,
) -> Result<axum::response::Response, AppError> {
    let Query(format) = query?;
    // An empty body means "re-check drift only".
    let request: ReplanRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ReplanRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::bad_request(format!("invalid replan request: {e}")))?
    };

    let outcome = state
        .planner
        .replan(
            id,
            ReplanOptions {
                reason: request.reason,
                problems: request.problems,
            },
        )
        .await?;

    if format.is_calendar() {
        let mut body = CalendarResponse::new(&outcome.plan, &outcome.tasks);
        body.citations = outcome.citations;
        body.replan = outcome.log;
        return Ok(Json(body).into_response());
    }
    Ok(Json(ReplanResponse {
        plan: outcome.plan,
        tasks: outcome.tasks,
        replan: outcome.log,
        drift: outcome.drift,
        citations: outcome.citations,
    })
    .into_response())
}

async fn list_plans(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    require_field(&state.pool, id).await?;
    let plans = plan_db::list_plans_for_field(&state.pool, id)
        .await
        .map_err(AppError::internal)?;
    let replans = replan_log_db::list_replan_logs(&state.pool, id)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(PlanHistoryResponse { plans, replans }).into_response())
}

async fn list_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    query: Result<Query<ScheduleQuery>, QueryRejection>,
) -> Result<axum::response::Response, AppError> {
    let Query(range) = query?;
    require_field(&state.pool, id).await?;
    let tasks = task_db::list_tasks_for_field(&state.pool, id, range.from, range.to)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(tasks).into_response())
}

async fn add_measurement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<NewMeasurement>, JsonRejection>,
) -> Result<axum::response::Response, AppError> {
    let Json(new) = payload?;
    require_field(&state.pool, id).await?;
    let measurement = measurement_db::insert_measurement(&state.pool, id, &new)
        .await
        .map_err(AppError::internal)?;
    Ok((StatusCode::CREATED, Json(measurement)).into_response())
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<TaskStatusRequest>, JsonRejection>,
) -> Result<axum::response::Response, AppError> {
    let Json(request) = payload?;
    let status: TaskStatus = request
        .status
        .parse()
        .map_err(|e| AppError::bad_request(format!("{e}")))?;

    let task = task_db::update_task_status(&state.pool, id, status, request.actual_quantity)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("task {id} not found")))?;
    Ok(Json(task).into_response())
}

async fn add_document(
    State(state): State<AppState>,
    payload: Result<Json<NewDocumentRequest>, JsonRejection>,
) -> Result<axum::response::Response, AppError> {
    let Json(request) = payload?;
    if request.title.trim().is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }
    if request.text.trim().is_empty() {
        return Err(AppError::bad_request("text must not be empty"));
    }

    let ingested = state
        .kb
        .upsert_document(
            &request.title,
            &request.tags,
            &request.text,
            request.source_url.as_deref(),
        )
        .await
        .map_err(AppError::internal)?;
    Ok((StatusCode::CREATED, Json(ingested)).into_response())
}

async fn search_kb(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<axum::response::Response, AppError> {
    let Query(query) = query?;
    let k = query.k.unwrap_or(DEFAULT_SEARCH_K);

    let hits = state
        .kb
        .search(&query.q, k)
        .await
        .map_err(AppError::internal)?;
    let doc_ids: Vec<Uuid> = hits.iter().map(|h| h.chunk.doc_id).collect();
    let docs = state
        .kb
        .docs_meta(&doc_ids)
        .await
        .map_err(AppError::internal)?;

    let results: Vec<SearchHit> = hits
        .into_iter()
        .map(|hit| {
            let doc = docs.get(&hit.chunk.doc_id);
            SearchHit {
                doc_id: hit.chunk.doc_id,
                title: doc.map(|d| d.title.clone()),
                source_url: doc.and_then(|d| d.source_url.clone()),
                ord: hit.chunk.ord,
                text: hit.chunk.text,
                score: hit.score,
            }
        })
        .collect();
    Ok(Json(results).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sqlx::PgPool;
    use tower::ServiceExt;
    use uuid::Uuid;

    use agriplan_core::advisor::OfflineAdvisor;
    use agriplan_core::kb::KnowledgeBase;
    use agriplan_core::planner::Planner;
    use agriplan_core::rules::RuleTable;
    use agriplan_test_utils::{create_test_db, drop_test_db, insert_sample_field};

    use super::AppState;

    // -----------------------------------------------------------------------
    // HTTP helpers
    // -----------------------------------------------------------------------

    fn test_state(pool: PgPool) -> AppState {
        let kb = Arc::new(KnowledgeBase::new(pool.clone(), None));
        let planner = Planner::new(
            pool.clone(),
            Arc::new(RuleTable::builtin().unwrap()),
            Arc::new(OfflineAdvisor),
        )
        .with_knowledge_base(kb.clone());
        AppState {
            pool,
            planner: Arc::new(planner),
            kb,
        }
    }

    async fn send_request(pool: PgPool, uri: &str) -> axum::response::Response {
        let app = super::build_router(test_state(pool));
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn send_json(
        pool: PgPool,
        method: &str,
        uri: &str,
        body: serde_json::Value,
    ) -> axum::response::Response {
        let app = super::build_router(test_state(pool));
        app.oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn field_payload() -> serde_json::Value {
        serde_json::json!({
            "owner_id": "farmer-9",
            "variety": "KK3",
            "crop_type": "ratoon",
            "area_rai": 12.5,
            "soil_texture": "clay",
            "irrigation_source": "canal",
            "planting_date": "2025-02-01"
        })
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_healthz() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_request(pool.clone(), "/healthz").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_create_and_fetch_field() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_json(pool.clone(), "POST", "/api/fields", field_payload()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created = body_json(resp).await;
        assert_eq!(created["owner_id"], "farmer-9");
        assert_eq!(created["province"], "");

        let id = created["id"].as_str().unwrap();
        let resp = send_request(pool.clone(), &format!("/api/fields/{id}")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["soil_texture"], "clay");

        let resp = send_request(pool.clone(), "/api/fields?owner=farmer-9").await;
        let list = body_json(resp).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_create_field_rejects_bad_input() {
        let (pool, db_name) = create_test_db().await;

        let mut payload = field_payload();
        payload["area_rai"] = serde_json::json!(0);
        let resp = send_json(pool.clone(), "POST", "/api/fields", payload).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("area_rai"));

        let resp = send_json(
            pool.clone(),
            "POST",
            "/api/fields",
            serde_json::json!({ "owner_id": "x" }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_unknown_field_is_404() {
        let (pool, db_name) = create_test_db().await;
        let id = Uuid::new_v4();

        let resp = send_request(pool.clone(), &format!("/api/fields/{id}")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send_json(
            pool.clone(),
            "POST",
            &format!("/api/fields/{id}/plan"),
            serde_json::json!({}),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(body_json(resp).await["error"].as_str().unwrap().contains("not found"));

        let resp = send_json(
            pool.clone(),
            "POST",
            &format!("/api/fields/{id}/measurements"),
            serde_json::json!({ "cane_height_cm": 40.0 }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_generate_plan_returns_created() {
        let (pool, db_name) = create_test_db().await;
        let field = insert_sample_field(&pool).await;

        let resp = send_json(
            pool.clone(),
            "POST",
            &format!("/api/fields/{}/plan", field.id),
            serde_json::json!({}),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_json(resp).await;
        assert_eq!(json["plan"]["version"], 1);
        assert!(!json["tasks"].as_array().unwrap().is_empty());
        assert!(
            json["plan"]["summary_md"]
                .as_str()
                .unwrap()
                .starts_with("**Preliminary plan summary**")
        );

        let resp = send_request(pool.clone(), &format!("/api/fields/{}/plans", field.id)).await;
        let history = body_json(resp).await;
        assert_eq!(history["plans"].as_array().unwrap().len(), 1);
        assert_eq!(history["replans"], serde_json::json!([]));

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_generate_plan_calendar_format() {
        let (pool, db_name) = create_test_db().await;
        let field = insert_sample_field(&pool).await;

        let resp = send_json(
            pool.clone(),
            "POST",
            &format!("/api/fields/{}/plan?format=calendar", field.id),
            serde_json::json!({}),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_json(resp).await;
        assert_eq!(json["field_id"], field.id.to_string());
        assert_eq!(json["version"], 1);

        let calendar = json["calendar"].as_object().unwrap();
        assert!(!calendar.is_empty());
        let dates: Vec<&String> = calendar.keys().collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
        let first = &calendar[dates[0]][0];
        assert!(first["task_id"].is_string());
        assert!(first["type"].is_string());
        assert_eq!(first["status"], "todo");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_replan_without_plan_is_404() {
        let (pool, db_name) = create_test_db().await;
        let field = insert_sample_field(&pool).await;

        let resp = send_json(
            pool.clone(),
            "POST",
            &format!("/api/fields/{}/replan", field.id),
            serde_json::json!({ "problems": ["storm"] }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_replan_with_problems_adds_tasks() {
        let (pool, db_name) = create_test_db().await;
        let field = insert_sample_field(&pool).await;

        let resp = send_json(
            pool.clone(),
            "POST",
            &format!("/api/fields/{}/plan", field.id),
            serde_json::json!({}),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = send_json(
            pool.clone(),
            "POST",
            &format!("/api/fields/{}/replan", field.id),
            serde_json::json!({ "reason": "field visit", "problems": ["storm", "ใบขาว"] }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["plan"]["version"], 1);
        assert!(json["replan"]["reason"].as_str().unwrap().contains("field visit"));
        let kinds: Vec<&str> = json["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["kind"].as_str().unwrap())
            .collect();
        assert!(kinds.contains(&"advisory"));
        assert!(kinds.contains(&"inspect"));

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_replan_empty_body_is_noop() {
        let (pool, db_name) = create_test_db().await;
        let field = insert_sample_field(&pool).await;

        send_json(
            pool.clone(),
            "POST",
            &format!("/api/fields/{}/plan", field.id),
            serde_json::json!({}),
        )
        .await;

        let app = super::build_router(test_state(pool.clone()));
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/fields/{}/replan", field.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert!(json["replan"].is_null());
        assert_eq!(json["tasks"], serde_json::json!([]));
        assert_eq!(json["drift"]["drifted"], false);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_measurement_and_schedule_range() {
        let (pool, db_name) = create_test_db().await;
        let field = insert_sample_field(&pool).await;

        let resp = send_json(
            pool.clone(),
            "POST",
            &format!("/api/fields/{}/measurements", field.id),
            serde_json::json!({ "moisture_state": "dry", "note": "cracked soil" }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(body_json(resp).await["moisture_state"], "dry");

        send_json(
            pool.clone(),
            "POST",
            &format!("/api/fields/{}/plan", field.id),
            serde_json::json!({}),
        )
        .await;

        let resp = send_request(
            pool.clone(),
            &format!(
                "/api/fields/{}/schedule?from=2025-01-01&to=2025-01-01",
                field.id
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let tasks = body_json(resp).await;
        for task in tasks.as_array().unwrap() {
            assert_eq!(task["due_date"], "2025-01-01");
        }

        let resp = send_request(
            pool.clone(),
            &format!("/api/fields/{}/schedule?from=not-a-date", field.id),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_update_task_status() {
        let (pool, db_name) = create_test_db().await;
        let field = insert_sample_field(&pool).await;

        let resp = send_json(
            pool.clone(),
            "POST",
            &format!("/api/fields/{}/plan", field.id),
            serde_json::json!({}),
        )
        .await;
        let json = body_json(resp).await;
        let task_id = json["tasks"][0]["id"].as_str().unwrap().to_owned();

        let resp = send_json(
            pool.clone(),
            "PATCH",
            &format!("/api/tasks/{task_id}"),
            serde_json::json!({ "status": "done", "actual_quantity": 18.0 }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let task = body_json(resp).await;
        assert_eq!(task["status"], "done");
        assert_eq!(task["actual_quantity"], 18.0);

        let resp = send_json(
            pool.clone(),
            "PATCH",
            &format!("/api/tasks/{task_id}"),
            serde_json::json!({ "status": "finished" }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = send_json(
            pool.clone(),
            "PATCH",
            &format!("/api/tasks/{}", Uuid::new_v4()),
            serde_json::json!({ "status": "skipped" }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_kb_ingest_and_search() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_json(
            pool.clone(),
            "POST",
            "/api/kb/documents",
            serde_json::json!({
                "title": "Drainage after storms",
                "text": "Dig furrows to drain standing water after a storm.",
                "source_url": "https://www.mitrpholmodernfarm.com/drainage"
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let ingested = body_json(resp).await;
        assert_eq!(ingested["chunks"], 1);
        assert_eq!(ingested["embedded"], false);

        let resp = send_request(pool.clone(), "/api/kb/search?q=furrows&k=3").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let hits = body_json(resp).await;
        let hits = hits.as_array().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["title"], "Drainage after storms");

        let resp = send_json(
            pool.clone(),
            "POST",
            "/api/kb/documents",
            serde_json::json!({ "title": "Empty", "text": "   " }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        pool.close().await;
        drop_test_db(&db_name).await;
    }
}
