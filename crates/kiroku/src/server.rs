use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::app::{DayView, EntryModal, EntryTarget};
use crate::backend::Backend;
use crate::calendar::{compute_grid, CalendarGrid, MonthCursor};
use crate::config::Config;
use crate::html::{self, PageView};
use crate::store::{NewRecord, RecordStore, StoreError};
use crate::types::{calendar_day, now_timestamp, Record, RecordForm};

pub type SharedStore = RecordStore<Box<dyn Backend>>;

/// Application state shared across requests
pub struct AppState {
    /// Appends are a read-modify-write of the whole collection, so the lock
    /// is held for the full operation. Other processes writing the same
    /// store are not coordinated; the last write wins.
    pub store: Mutex<SharedStore>,
}

impl AppState {
    pub fn new(store: SharedStore) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
        })
    }
}

/// Start the web server on the configured store
pub async fn serve(port: u16, config: Config) -> anyhow::Result<()> {
    let store = RecordStore::new(config.open_backend()?);
    let count = store.load_all().map(|r| r.len()).unwrap_or_else(|e| {
        warn!(error = %e, "Stored records unreadable");
        0
    });
    info!(
        path = %config.store_path().display(),
        records = count,
        "Store opened"
    );

    let app = router(AppState::new(store));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!(url = %format!("http://{}", addr), "Server running");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/records", post(save_handler))
        .route("/api/calendar", get(calendar_handler))
        .route("/api/records", get(records_handler).post(create_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub date: Option<String>,
}

impl PageQuery {
    /// Month to show: explicit year/month, else the selected day's, else today's
    fn cursor(&self) -> MonthCursor {
        let today = MonthCursor::today();
        match (self.year, self.month) {
            (Some(year), Some(month)) => MonthCursor::new(year, month),
            (Some(year), None) => MonthCursor::new(year, today.month),
            (None, Some(month)) => MonthCursor::new(today.year, month),
            (None, None) => self
                .date
                .as_deref()
                .and_then(|d| calendar_day(d, &chrono::Local))
                .map(MonthCursor::containing)
                .unwrap_or(today),
        }
    }
}

/// Entry form as posted by the page or an API client
#[derive(Debug, Default, Deserialize)]
pub struct EntryRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub note: String,
    /// Target day; absent or empty means quick entry
    pub date: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
}

impl EntryRequest {
    fn form(&self) -> RecordForm {
        RecordForm::new(&self.content, &self.time, &self.note)
    }

    fn target(&self) -> EntryTarget {
        match self.date.as_deref().map(str::trim) {
            Some(date) if !date.is_empty() => EntryTarget::Day(date.to_string()),
            _ => EntryTarget::Now,
        }
    }

    fn page_query(&self) -> PageQuery {
        PageQuery {
            year: self.year,
            month: self.month,
            date: match self.target() {
                EntryTarget::Day(date) => Some(date),
                EntryTarget::Now => None,
            },
        }
    }
}

/// Store failure mapped onto an HTTP response
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            e if e.is_validation() => StatusCode::UNPROCESSABLE_ENTITY,
            StoreError::NoOpenEntry => StatusCode::CONFLICT,
            e => {
                error!(error = %e, "Store operation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

async fn append(state: &AppState, request: &EntryRequest) -> Result<Record, StoreError> {
    let date = match request.target() {
        EntryTarget::Day(date) => date,
        EntryTarget::Now => now_timestamp(),
    };
    let mut store = state.store.lock().await;
    store.append(NewRecord {
        form: request.form(),
        date,
    })
}

fn render_index(
    store: &SharedStore,
    query: &PageQuery,
    modal: &EntryModal,
    form: &RecordForm,
) -> Result<String, StoreError> {
    let grid: CalendarGrid = query.cursor().grid();
    let records = store.load_all()?;
    let counts = store.counts_by_day()?;

    let selected = match query.date.as_deref() {
        Some(date) => Some(DayView {
            date: date.to_string(),
            records: store.query_by_day(date)?,
        }),
        None => None,
    };

    let view = PageView {
        grid: &grid,
        counts: &counts,
        selected: selected.as_ref(),
        modal,
        form,
        records: &records,
    };
    Ok(html::render_page(&view).into_string())
}

fn page_error(e: StoreError) -> Response {
    error!(error = %e, "Failed to render page");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
}

/// Serve the calendar page; selecting a day opens its entry dialog
async fn index_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Response {
    let modal = match &query.date {
        Some(date) => EntryModal::Open {
            target: EntryTarget::Day(date.clone()),
            error: None,
        },
        None => EntryModal::Closed,
    };

    let store = state.store.lock().await;
    match render_index(&store, &query, &modal, &RecordForm::default()) {
        Ok(page) => Html(page).into_response(),
        Err(e) => page_error(e),
    }
}

/// Save a record from the page form
async fn save_handler(
    State(state): State<Arc<AppState>>,
    Form(request): Form<EntryRequest>,
) -> Response {
    let query = request.page_query();

    match append(&state, &request).await {
        Ok(_) => {
            let cursor = query.cursor();
            let location = match &query.date {
                Some(date) => html::day_link(cursor.year, cursor.month, date),
                None => html::month_link(cursor.year, cursor.month),
            };
            Redirect::to(&location).into_response()
        }
        Err(e) if e.is_validation() => {
            let modal = EntryModal::Open {
                target: request.target(),
                error: Some(e.to_string()),
            };
            let store = state.store.lock().await;
            match render_index(&store, &query, &modal, &request.form()) {
                Ok(page) => (StatusCode::UNPROCESSABLE_ENTITY, Html(page)).into_response(),
                Err(e) => page_error(e),
            }
        }
        Err(e) => page_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub date: Option<String>,
}

/// Grid for a month as JSON
async fn calendar_handler(Query(query): Query<PageQuery>) -> Json<CalendarGrid> {
    let cursor = query.cursor();
    Json(compute_grid(cursor.year, cursor.month))
}

/// Records of a day, or all records, as JSON
async fn records_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let store = state.store.lock().await;
    let records = match query.date.as_deref() {
        Some(date) => store.query_by_day(date)?,
        None => store.load_all()?,
    };
    Ok(Json(records))
}

/// Append a record, answering with the stored record
async fn create_handler(
    State(state): State<Arc<AppState>>,
    Form(request): Form<EntryRequest>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    let record = append(&state, &request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::store::RECORDS_KEY;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let backend: Box<dyn Backend> = Box::new(MemoryBackend::default());
        router(AppState::new(RecordStore::new(backend)))
    }

    fn post_form(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    // ========== API tests ==========

    #[tokio::test]
    async fn test_create_then_query_by_day() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(post_form(
                "/api/records",
                "content=Reading&time=30&note=&date=2024-03-15",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(get("/api/records?date=2024-03-15"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let records: Vec<Record> = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "Reading");
        assert_eq!(records[0].time, 30.0);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(post_form("/api/records", "content=&time=30&date=2024-03-15"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_string(response).await.contains("content must not be empty"));

        let response = app
            .clone()
            .oneshot(post_form("/api/records", "content=Reading&time=0&date=2024-03-15"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = app.oneshot(get("/api/records")).await.unwrap();
        assert_eq!(body_string(response).await, "[]");
    }

    #[tokio::test]
    async fn test_quick_entry_without_date() {
        let app = test_app();

        let response = app
            .oneshot(post_form("/api/records", "content=Vocabulary&time=15"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let record: Record = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(record.date.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_records_empty_day() {
        let app = test_app();
        let response = app
            .oneshot(get("/api/records?date=2024-03-16"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "[]");
    }

    #[tokio::test]
    async fn test_corrupt_store_is_server_error() {
        let mut backend = MemoryBackend::default();
        backend.set(RECORDS_KEY, "not json").unwrap();
        let backend: Box<dyn Backend> = Box::new(backend);
        let app = router(AppState::new(RecordStore::new(backend)));

        let response = app.oneshot(get("/api/records")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(response).await.contains("corrupt"));
    }

    #[test]
    fn test_api_error_status_codes() {
        let status = |e: StoreError| ApiError::from(e).into_response().status();

        assert_eq!(status(StoreError::EmptyContent), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            status(StoreError::InvalidDuration("0".to_string())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status(StoreError::NoOpenEntry), StatusCode::CONFLICT);
        assert_eq!(
            status(StoreError::Backend(anyhow::anyhow!("disk full"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_calendar_json() {
        let app = test_app();
        let response = app
            .oneshot(get("/api/calendar?year=2024&month=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let grid: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(grid["total_days"], 29);
        assert_eq!(grid["start_weekday"], 4);
        assert_eq!(grid["rows"].as_array().unwrap().len(), 6);
        assert_eq!(grid["rows"][0][4]["kind"], "day");
        assert_eq!(grid["rows"][0][4]["iso_date"], "2024-02-01");
        assert_eq!(grid["rows"][0][0]["kind"], "empty");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_not_lost() {
        let app = test_app();

        let mut handles = Vec::new();
        for i in 0..20 {
            let app = app.clone();
            handles.push(tokio::spawn(async move {
                app.oneshot(post_form(
                    "/api/records",
                    &format!("content=Session+{}&time=10&date=2024-03-15", i),
                ))
                .await
                .unwrap()
                .status()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), StatusCode::CREATED);
        }

        let response = app
            .oneshot(get("/api/records?date=2024-03-15"))
            .await
            .unwrap();
        let records: Vec<Record> = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(records.len(), 20);
    }

    // ========== page tests ==========

    #[tokio::test]
    async fn test_index_renders_month() {
        let app = test_app();
        let response = app.oneshot(get("/?year=2024&month=2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_string(response).await;
        assert!(body.contains("March 2024"));
        assert!(!body.contains("calendar-modal"));
    }

    #[tokio::test]
    async fn test_index_selected_day_opens_dialog() {
        let app = test_app();
        let response = app.oneshot(get("/?date=2024-03-15")).await.unwrap();

        let body = body_string(response).await;
        assert!(body.contains("March 2024"));
        assert!(body.contains("Selected: 2024-03-15"));
        assert!(body.contains("No learning records for this day."));
        assert!(body.contains("calendar-modal"));
    }

    #[tokio::test]
    async fn test_form_save_redirects_back_to_day() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(post_form(
                "/records",
                "content=Reading&time=30&note=ch.+2&date=2024-03-15&year=2024&month=2",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/?year=2024&month=2&date=2024-03-15"
        );

        let response = app.oneshot(get("/?year=2024&month=2&date=2024-03-15")).await.unwrap();
        let body = body_string(response).await;
        assert!(body.contains("Reading (30 min) - ch. 2"));
    }

    #[tokio::test]
    async fn test_form_redirect_encodes_date() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(post_form(
                "/records",
                "content=Reading&time=30&date=2024-03-15%26year%3D1999&year=2024&month=2",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/?year=2024&month=2&date=2024-03-15%26year%3D1999"
        );

        let response = app.oneshot(get("/api/records")).await.unwrap();
        let records: Vec<Record> = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, "2024-03-15&year=1999");
    }

    #[tokio::test]
    async fn test_form_redirect_with_control_character_in_date() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(post_form(
                "/records",
                "content=Reading&time=30&date=2024-03-15%01&year=2024&month=2",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/?year=2024&month=2&date=2024-03-15%01"
        );

        let response = app.oneshot(get("/api/records")).await.unwrap();
        let records: Vec<Record> = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_create_accepts_fractional_minutes() {
        let app = test_app();

        let response = app
            .oneshot(post_form(
                "/api/records",
                "content=Reading&time=1.5&date=2024-03-15",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let record: Record = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(record.time, 1.5);
    }

    #[tokio::test]
    async fn test_form_validation_failure_keeps_dialog_open() {
        let app = test_app();

        let response = app
            .oneshot(post_form(
                "/records",
                "content=Reading&time=abc&note=&date=2024-03-15&year=2024&month=2",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_string(response).await;
        assert!(body.contains("calendar-modal"));
        assert!(body.contains("duration must be a positive number of minutes"));
        assert!(body.contains(r#"value="Reading""#));
    }
}
