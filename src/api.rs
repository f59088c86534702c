//! HTTP feed for the presentation layer.
//! Every route reads or mutates the shared store; all derived data comes from it.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::DashboardConfig;
use crate::error::DashboardError;
use crate::export::{self, ExportView};
use crate::history::{HistoryRecord, Snapshot};
use crate::models::{AggregationConfig, ApiResponse, DerivedViews, FilterConfig, RawRecord, Theme};
use crate::persistence::StateRepository;
use crate::scheduler::{lock, tick_once, Debouncer, SharedFeed, SharedStore, Throttle};

pub type SharedRepository = Arc<Mutex<StateRepository>>;

type ApiError = (StatusCode, Json<ApiResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub feed: SharedFeed,
    pub repository: Option<SharedRepository>,
    filter_updates: Arc<Debouncer<FilterConfig>>,
    aggregation_updates: Arc<Throttle<AggregationConfig>>,
}

impl AppState {
    pub fn new(
        store: SharedStore,
        feed: SharedFeed,
        repository: Option<SharedRepository>,
        config: &DashboardConfig,
    ) -> Self {
        let filter_updates = {
            let store = store.clone();
            let repository = repository.clone();
            Debouncer::new(config.debounce(), move |filter: FilterConfig| {
                lock(&store).set_filter_config(filter);
                persist(&store, repository.as_ref());
            })
        };

        let aggregation_updates = {
            let store = store.clone();
            let repository = repository.clone();
            Throttle::new(config.throttle(), move |aggregation: AggregationConfig| {
                if let Err(e) = lock(&store).set_aggregation_config(aggregation) {
                    error!(error = %e, "throttled aggregation update failed");
                    return;
                }
                persist(&store, repository.as_ref());
            })
        };

        Self {
            store,
            feed,
            repository,
            filter_updates: Arc::new(filter_updates),
            aggregation_updates: Arc::new(aggregation_updates),
        }
    }

    pub fn persist(&self) {
        persist(&self.store, self.repository.as_ref());
    }
}

/// Save the store's bundle; failures are logged, never surfaced
pub fn persist(store: &SharedStore, repository: Option<&SharedRepository>) {
    let Some(repository) = repository else {
        return;
    };
    let bundle = lock(store).bundle();
    if let Err(e) = lock(repository).save_state(&bundle) {
        error!(error = %e, "failed to persist dashboard state");
    }
}

fn status_for(e: &DashboardError) -> StatusCode {
    match e {
        DashboardError::Import(_)
        | DashboardError::UnsupportedSchema { .. }
        | DashboardError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        DashboardError::SnapshotNotFound(_) => StatusCode::NOT_FOUND,
        DashboardError::SourceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DashboardError::Storage(_) | DashboardError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn reject(e: DashboardError) -> ApiError {
    (status_for(&e), Json(ApiResponse::error(e.to_string())))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route(
            "/records",
            get(list_records).post(create_record).delete(clear_records),
        )
        .route("/records/filtered", get(list_filtered_records))
        .route("/views", get(get_views))
        .route("/state", get(get_state))
        .route("/filter", put(update_filter))
        .route("/aggregation", put(update_aggregation))
        .route("/export/json", get(export_json))
        .route("/export/json/:target", get(export_json_target))
        .route("/export/csv/:view", get(export_csv))
        .route("/import", post(import_data))
        .route("/snapshots", get(list_snapshots).post(create_snapshot))
        .route("/snapshots/:id/restore", post(restore_snapshot))
        .route("/history", get(list_history))
        .route("/theme", put(set_theme))
        .route("/retry", post(retry_feed))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> &'static str {
    "Live Dashboard API v0.1.0"
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let store = lock(&state.store);
    let aggregator = store.aggregator();
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "records": store.records().len(),
        "cachedViews": aggregator.cached_entries(),
        "cacheHits": aggregator.hits(),
        "cacheMisses": aggregator.misses(),
    }))
}

async fn list_records(State(state): State<AppState>) -> Json<Vec<RawRecord>> {
    Json(lock(&state.store).records().to_vec())
}

/// Append one record outside the feed schedule
async fn create_record(
    State(state): State<AppState>,
    Json(record): Json<RawRecord>,
) -> ApiResult<ApiResponse> {
    let views = {
        let mut store = lock(&state.store);
        store.add_record(record);
        store.views().clone()
    };
    state.persist();

    let data = serde_json::to_value(views).map_err(|e| reject(e.into()))?;
    Ok(Json(ApiResponse::success("Record added", Some(data))))
}

async fn list_filtered_records(State(state): State<AppState>) -> Json<Vec<RawRecord>> {
    Json(lock(&state.store).filtered_records())
}

async fn clear_records(State(state): State<AppState>) -> Json<ApiResponse> {
    lock(&state.store).clear_data();
    state.persist();
    Json(ApiResponse::success("Records cleared", None))
}

async fn get_views(State(state): State<AppState>) -> Json<DerivedViews> {
    Json(lock(&state.store).views().clone())
}

async fn get_state(State(state): State<AppState>) -> Json<serde_json::Value> {
    let store = lock(&state.store);
    Json(serde_json::json!({
        "ui": store.ui(),
        "filter": store.filter_config(),
        "aggregation": store.aggregation_config(),
        "records": store.records().len(),
        "maxRecords": store.max_records(),
    }))
}

/// Filter changes are debounced; the views update after the quiet period
async fn update_filter(
    State(state): State<AppState>,
    Json(filter): Json<FilterConfig>,
) -> (StatusCode, Json<ApiResponse>) {
    state.filter_updates.call(filter);
    (
        StatusCode::ACCEPTED,
        Json(ApiResponse::success("Filter update scheduled", None)),
    )
}

async fn update_aggregation(
    State(state): State<AppState>,
    Json(aggregation): Json<AggregationConfig>,
) -> Result<(StatusCode, Json<ApiResponse>), ApiError> {
    aggregation.validate().map_err(reject)?;
    state.aggregation_updates.call(aggregation);
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success("Aggregation update scheduled", None)),
    ))
}

fn attachment(body: String, content_type: &'static str, filename: String) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
}

async fn export_json(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = lock(&state.store).export_data().map_err(reject)?;
    Ok(attachment(
        body,
        "application/json",
        format!("{}.json", export::export_filename("state")),
    ))
}

/// Raw records or the current views as pretty JSON
async fn export_json_target(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let body = {
        let store = lock(&state.store);
        match target.as_str() {
            "records" => store.export_records_json(),
            "views" => store.export_views_json(),
            _ => {
                return Err((
                    StatusCode::NOT_FOUND,
                    Json(ApiResponse::error(format!("unknown export target '{}'", target))),
                ))
            }
        }
        .map_err(reject)?
    };
    Ok(attachment(
        body,
        "application/json",
        format!("{}.json", export::export_filename(&target)),
    ))
}

async fn export_csv(
    State(state): State<AppState>,
    Path(view): Path<ExportView>,
) -> Result<impl IntoResponse, ApiError> {
    let body = lock(&state.store).export_csv(view).map_err(reject)?;
    let name = match view {
        ExportView::Raw => "raw",
        ExportView::TimeSeries => "time-series",
        ExportView::Category => "category",
        ExportView::Distribution => "distribution",
    };
    Ok(attachment(
        body,
        "text/csv; charset=utf-8",
        format!("{}.csv", export::export_filename(name)),
    ))
}

async fn import_data(State(state): State<AppState>, body: String) -> ApiResult<ApiResponse> {
    let count = {
        let mut store = lock(&state.store);
        store.import_data(&body).map_err(reject)?;
        store.records().len()
    };
    state.persist();

    Ok(Json(ApiResponse::success(
        format!("Imported {} records", count),
        Some(serde_json::json!({ "records": count })),
    )))
}

async fn list_snapshots(State(state): State<AppState>) -> Json<Vec<Snapshot>> {
    Json(lock(&state.store).snapshots())
}

#[derive(Debug, Deserialize)]
struct SnapshotInput {
    name: String,
}

async fn create_snapshot(
    State(state): State<AppState>,
    Json(input): Json<SnapshotInput>,
) -> (StatusCode, Json<Snapshot>) {
    let snapshot = lock(&state.store).save_snapshot(input.name);
    (StatusCode::CREATED, Json(snapshot))
}

async fn restore_snapshot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse> {
    lock(&state.store).restore_snapshot(id).map_err(reject)?;
    state.persist();
    info!(%id, "snapshot restored via api");
    Ok(Json(ApiResponse::success("Snapshot restored", None)))
}

async fn list_history(State(state): State<AppState>) -> Json<Vec<HistoryRecord>> {
    Json(lock(&state.store).history())
}

#[derive(Debug, Deserialize)]
struct ThemeInput {
    theme: Theme,
}

async fn set_theme(
    State(state): State<AppState>,
    Json(input): Json<ThemeInput>,
) -> Json<ApiResponse> {
    lock(&state.store).set_theme(input.theme);
    Json(ApiResponse::success("Theme updated", None))
}

/// Clear the error state and poll the feed once
async fn retry_feed(State(state): State<AppState>) -> Json<serde_json::Value> {
    lock(&state.store).clear_error();
    tick_once(&state.store, &state.feed);
    let ui = lock(&state.store).ui().clone();
    Json(serde_json::json!({ "ui": ui }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::DataFeed;
    use crate::store::DashboardStore;
    use axum::body::Body;
    use axum::http::Request;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_state(failure_rate: f64) -> AppState {
        let config = DashboardConfig::default();
        let store = Arc::new(Mutex::new(DashboardStore::new(&config)));
        let feed = Arc::new(Mutex::new(DataFeed::new(
            StdRng::seed_from_u64(11),
            failure_rate,
            config.max_retries,
        )));
        let repository = Arc::new(Mutex::new(StateRepository::open_in_memory().unwrap()));
        AppState::new(store, feed, Some(repository), &config)
    }

    async fn send(state: &AppState, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    const RECORD_A: &str =
        r#"{"time":"10:00:00","value":10,"category":"A","region":"North","productLine":"Line 1"}"#;

    #[tokio::test]
    async fn test_health_and_records() {
        let state = app_state(0.0);
        let (status, body) = send(&state, "GET", "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("healthy"));

        let (status, _) = send(&state, "POST", "/records", RECORD_A).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&state, "GET", "/records/filtered", "").await;
        let filtered: Vec<RawRecord> = serde_json::from_str(&body).unwrap();
        assert_eq!(filtered.len(), 1);

        let (_, body) = send(&state, "GET", "/views", "").await;
        let views: DerivedViews = serde_json::from_str(&body).unwrap();
        assert_eq!(views.category_totals[0].category, "A");
        assert_eq!(views.category_totals[0].value, 10.0);

        // Appending persisted the state
        let saved = lock(state.repository.as_ref().unwrap()).load_state().unwrap();
        assert_eq!(saved.unwrap().records.len(), 1);

        let (status, _) = send(&state, "DELETE", "/records", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(lock(&state.store).records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_updates_are_debounced() {
        let state = app_state(0.0);
        send(&state, "POST", "/records", RECORD_A).await;

        let (status, _) = send(&state, "PUT", "/filter", r#"{"categories":["B"]}"#).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(lock(&state.store).filter_config().is_empty());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(lock(&state.store).views().category_totals.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_aggregation_is_rejected() {
        let state = app_state(0.0);
        let (status, body) = send(&state, "PUT", "/aggregation", r#"{"groupBy":[],"operator":"sum"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("groupBy"));

        let (status, _) =
            send(&state, "PUT", "/aggregation", r#"{"groupBy":["region"],"operator":"max"}"#).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let store = lock(&state.store);
        assert_eq!(store.aggregation_config().group_by, vec![crate::models::Dimension::Region]);
    }

    #[tokio::test]
    async fn test_import_and_export() {
        let state = app_state(0.0);
        let (status, body) = send(&state, "POST", "/import", "{ broken").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("error"));
        assert!(lock(&state.store).ui().error.is_some());

        let bundle = format!(r#"{{"schemaVersion":1,"records":[{}]}}"#, RECORD_A);
        let (status, _) = send(&state, "POST", "/import", &bundle).await;
        assert_eq!(status, StatusCode::OK);
        assert!(lock(&state.store).ui().error.is_none());

        let (status, csv) = send(&state, "GET", "/export/csv/raw", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(csv, "time,value,category,region,productLine\n10:00:00,10.0,A,North,Line 1");

        let (_, records_json) = send(&state, "GET", "/export/json/records", "").await;
        let records: Vec<RawRecord> = serde_json::from_str(&records_json).unwrap();
        assert_eq!(records.len(), 1);
        let (status, _) = send(&state, "GET", "/export/json/everything", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, json) = send(&state, "GET", "/export/json", "").await;
        let mut other = DashboardStore::new(&DashboardConfig::default());
        other.import_data(&json).unwrap();
        assert_eq!(other.records(), lock(&state.store).records());
    }

    #[tokio::test]
    async fn test_snapshot_routes() {
        let state = app_state(0.0);
        send(&state, "POST", "/records", RECORD_A).await;

        let (status, body) = send(&state, "POST", "/snapshots", r#"{"name":"first"}"#).await;
        assert_eq!(status, StatusCode::CREATED);
        let snapshot: Snapshot = serde_json::from_str(&body).unwrap();

        send(&state, "POST", "/records", RECORD_A).await;
        let uri = format!("/snapshots/{}/restore", snapshot.id);
        let (status, _) = send(&state, "POST", &uri, "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(lock(&state.store).records().len(), 1);

        let uri = format!("/snapshots/{}/restore", Uuid::new_v4());
        let (status, _) = send(&state, "POST", &uri, "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(&state, "GET", "/history", "").await;
        let history: Vec<HistoryRecord> = serde_json::from_str(&body).unwrap();
        let actions: Vec<_> = history.iter().map(|h| h.action.as_str()).collect();
        assert_eq!(actions, vec!["save", "restore"]);
    }

    #[tokio::test]
    async fn test_retry_and_theme() {
        let state = app_state(1.0);
        let (_, body) = send(&state, "POST", "/retry", "").await;
        assert!(body.contains("Failed to update data"));
        assert_eq!(lock(&state.store).ui().retry_count, 1);

        let (status, _) = send(&state, "PUT", "/theme", r#"{"theme":"dark"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(lock(&state.store).ui().theme, Theme::Dark);
    }
}
