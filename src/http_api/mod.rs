use std::{net::SocketAddr, str::FromStr, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    AssignmentStore, BookingError, DayProgress, EngineConfig, RouteStatus, RoutingContainer,
    RunId, RunManager, RunRequest, RunStatus, Scheduler, SolverConfig, StoreError, StrategyKind,
    Task, TaskUpdate,
};

type SharedScheduler = Arc<Scheduler<dyn AssignmentStore>>;

#[derive(Clone)]
pub struct AppState {
    runs: Arc<RunManager<dyn AssignmentStore>>,
    strategy: StrategyKind,
    solver: SolverConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn AssignmentStore>) -> Self {
        Self::with_config(store, &EngineConfig::default())
    }

    pub fn with_config(store: Arc<dyn AssignmentStore>, config: &EngineConfig) -> Self {
        let scheduler: SharedScheduler = Arc::new(Scheduler::with_shared(store));
        Self {
            runs: Arc::new(RunManager::new(scheduler).with_retention(config.run_retention)),
            strategy: config.strategy,
            solver: config.solver_config(),
        }
    }

    fn scheduler(&self) -> SharedScheduler {
        self.runs.scheduler().clone()
    }

    fn store(&self) -> Arc<dyn AssignmentStore> {
        self.runs.scheduler().store().clone()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    Conflict(String),
    Invalid(String),
    Internal(String),
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    fn invalid(message: impl Into<String>) -> Self {
        ApiError::Invalid(message.into())
    }

    fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            StoreError::InvalidData(message) => ApiError::Invalid(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(value: BookingError) -> Self {
        match value {
            // Double bookings are a bad request, not a state conflict.
            BookingError::Conflict(err) => ApiError::Invalid(err.to_string()),
            BookingError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            BookingError::Exists(what) => ApiError::Conflict(format!("{what} already exists")),
            BookingError::Invalid(message) => ApiError::Invalid(message),
            BookingError::Store(err) => ApiError::from(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, "conflict", message),
            ApiError::Invalid(message) => (StatusCode::BAD_REQUEST, "invalid_request", message),
            ApiError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
            }
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct GeneratePayload {
    date: NaiveDate,
    #[serde(default)]
    resource_ids: Option<Vec<String>>,
    #[serde(default)]
    strategy: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunView {
    run_id: RunId,
    status: RunStatus,
}

#[derive(Debug, Serialize)]
struct RouteView {
    #[serde(flatten)]
    route: RoutingContainer,
    total_hours: f64,
}

impl From<RoutingContainer> for RouteView {
    fn from(route: RoutingContainer) -> Self {
        let total_hours = route.total_hours();
        Self { route, total_hours }
    }
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    status: String,
}

#[derive(Debug, Deserialize)]
struct AssignPayload {
    resource_id: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/routes", get(list_routes))
        .route("/routes/generate", post(generate_routes))
        .route("/routes/progress/:date", get(day_progress))
        .route("/routes/:id/status", put(update_route_status))
        .route("/runs/:id", get(get_run).delete(cancel_run))
        .route("/visits", get(list_visits).post(create_visit))
        .route("/visits/:id", put(update_visit).delete(delete_visit))
        .route("/visits/:id/assign", put(assign_visit))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

/// Runs a booking on the blocking pool; it may wait on a date lock held by
/// a scheduling run.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, BookingError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| ApiError::internal(format!("booking task failed: {err}")))?
        .map_err(ApiError::from)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn generate_routes(
    State(state): State<AppState>,
    Json(payload): Json<GeneratePayload>,
) -> Result<(StatusCode, Json<RunView>), ApiError> {
    let strategy = match payload.strategy.as_deref() {
        Some(raw) => StrategyKind::from_str(raw).map_err(ApiError::invalid)?,
        None => state.strategy,
    };
    let mut request = RunRequest::new(payload.date)
        .with_strategy(strategy)
        .with_solver(state.solver);
    request.resource_ids = payload.resource_ids;

    let handle = state.runs.submit(request);
    let view = RunView {
        run_id: handle.id,
        status: handle.status(),
    };
    Ok((StatusCode::ACCEPTED, Json(view)))
}

async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> Result<Json<RunView>, ApiError> {
    let status = state
        .runs
        .status(run_id)
        .ok_or_else(|| ApiError::not_found(format!("run {run_id} not found")))?;
    Ok(Json(RunView { run_id, status }))
}

async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> Result<StatusCode, ApiError> {
    if state.runs.status(run_id).is_none() {
        return Err(ApiError::not_found(format!("run {run_id} not found")));
    }
    if !state.runs.cancel(run_id) {
        return Err(ApiError::Conflict(format!("run {run_id} already finished")));
    }
    Ok(StatusCode::ACCEPTED)
}

async fn list_routes(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Vec<RouteView>>, ApiError> {
    let routes = state.store().routes_for(query.date)?;
    Ok(Json(routes.into_iter().map(RouteView::from).collect()))
}

async fn update_route_status(
    State(state): State<AppState>,
    Path(route_id): Path<i64>,
    Json(payload): Json<StatusPayload>,
) -> Result<Json<RouteView>, ApiError> {
    let status = RouteStatus::from_str(&payload.status).map_err(ApiError::invalid)?;
    let route = state.scheduler().set_route_status(route_id, status)?;
    Ok(Json(route.into()))
}

async fn day_progress(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
) -> Result<Json<DayProgress>, ApiError> {
    Ok(Json(state.scheduler().progress(date)?))
}

async fn list_visits(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let mut tasks = state.store().tasks_for(query.date)?;
    tasks.sort_by_key(|task| (task.start, task.id));
    Ok(Json(tasks))
}

async fn create_visit(
    State(state): State<AppState>,
    Json(task): Json<Task>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let scheduler = state.scheduler();
    let created = blocking(move || scheduler.create_task(task)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_visit(
    State(state): State<AppState>,
    Path(task_id): Path<i32>,
    Json(update): Json<TaskUpdate>,
) -> Result<Json<Task>, ApiError> {
    let scheduler = state.scheduler();
    let updated = blocking(move || scheduler.update_task(task_id, &update)).await?;
    Ok(Json(updated))
}

async fn delete_visit(
    State(state): State<AppState>,
    Path(task_id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let scheduler = state.scheduler();
    blocking(move || scheduler.delete_task(task_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn assign_visit(
    State(state): State<AppState>,
    Path(task_id): Path<i32>,
    Json(payload): Json<AssignPayload>,
) -> Result<Json<RouteView>, ApiError> {
    let scheduler = state.scheduler();
    let route = blocking(move || scheduler.assign_task(task_id, &payload.resource_id)).await?;
    Ok(Json(route.into()))
}
