//! HTTP front end: upload page, result and chart views, and a JSON API.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;
use log::{error, info, warn};
use serde_json::json;
use uuid::Uuid;

use crate::classifier::{Classifier, ClassifierError, ImageMetadata, Prediction, ScanImage};
use crate::labels::Diagnosis;

pub mod render;
pub mod session;

pub use session::{SessionState, SessionStore, StoredResult};

/// Header clients may use to pick their own session identifier.
pub const SESSION_HEADER: &str = "x-session-id";
/// Cookie carrying the session identifier for browser clients.
pub const SESSION_COOKIE: &str = "lungscan_session";

/// Shared state injected into every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    classifier: Arc<Classifier>,
    sessions: SessionStore,
}

impl AppState {
    pub fn new(classifier: Classifier) -> Self {
        Self::with_sessions(classifier, SessionStore::new())
    }

    pub fn with_sessions(classifier: Classifier, sessions: SessionStore) -> Self {
        Self {
            classifier: Arc::new(classifier),
            sessions,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

/// Builds the application router.
pub fn router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/predict", post(predict_page))
        .route("/results", get(results_page))
        .route("/about", get(about))
        .route("/api/predict", post(api_predict))
        .route("/api/results", get(api_results))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Request-scoped failures of the predict endpoints.
#[derive(Debug)]
enum ApiError {
    MissingFile,
    Multipart { status: StatusCode, message: String },
    Classifier(ClassifierError),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile => StatusCode::BAD_REQUEST,
            ApiError::Multipart { status, .. } => *status,
            ApiError::Classifier(ClassifierError::UnsupportedFormat(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ApiError::Classifier(e) if e.is_bad_input() => StatusCode::BAD_REQUEST,
            ApiError::Classifier(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::MissingFile => "No file uploaded".to_string(),
            ApiError::Multipart { message, .. } => format!("Invalid upload: {}", message),
            ApiError::Classifier(e) => e.to_string(),
            ApiError::Internal(msg) => format!("Internal error: {}", msg),
        }
    }
}

/// Keeps the status axum assigns, e.g. 413 when the body limit is exceeded.
impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Multipart {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<ClassifierError> for ApiError {
    fn from(err: ClassifierError) -> Self {
        ApiError::Classifier(err)
    }
}

/// Session identifier resolved for a request; `is_new` when one was issued.
struct SessionId {
    id: String,
    is_new: bool,
}

fn valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn resolve_session(headers: &HeaderMap) -> SessionId {
    let from_header = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| valid_session_id(id));

    let from_cookie = || {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
            .find(|id| valid_session_id(id))
    };

    match from_header.or_else(from_cookie) {
        Some(id) => SessionId {
            id: id.to_string(),
            is_new: false,
        },
        None => SessionId {
            id: Uuid::new_v4().to_string(),
            is_new: true,
        },
    }
}

fn with_session(mut response: Response, session: &SessionId) -> Response {
    if session.is_new {
        let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, session.id);
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(SET_COOKIE, value);
        }
    }
    response
}

struct Upload {
    bytes: Bytes,
    file_name: Option<String>,
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await?;
            if bytes.is_empty() {
                return Err(ApiError::MissingFile);
            }
            return Ok(Upload { bytes, file_name });
        }
    }
    Err(ApiError::MissingFile)
}

/// A classified upload, ready to render.
struct Outcome {
    image: ImageMetadata,
    preview: Option<String>,
    prediction: Prediction,
}

fn preview_uri(format: Option<ImageFormat>, bytes: &[u8]) -> Option<String> {
    let mime = match format? {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        _ => return None,
    };
    Some(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}

/// Drives one upload through decode, preprocessing and inference, keeping the
/// session state machine in step.
async fn run_prediction(
    state: &AppState,
    session: &str,
    multipart: &mut Multipart,
) -> Result<Outcome, ApiError> {
    let result = classify_upload(state, session, multipart).await;
    match &result {
        Ok(outcome) => {
            state
                .sessions
                .record_prediction(
                    session,
                    StoredResult {
                        image: outcome.image.clone(),
                        prediction: outcome.prediction.clone(),
                    },
                )
                .await;
        }
        Err(e) => {
            if e.status().is_server_error() {
                error!("Prediction failed for session {}: {}", session, e.message());
            } else {
                warn!("Rejected upload for session {}: {}", session, e.message());
            }
            state.sessions.record_rejection(session).await;
        }
    }
    result
}

async fn classify_upload(
    state: &AppState,
    session: &str,
    multipart: &mut Multipart,
) -> Result<Outcome, ApiError> {
    let upload = read_upload(multipart).await?;
    state.sessions.upload_received(session).await;
    info!(
        "Session {} uploaded {:?} ({} bytes)",
        session,
        upload.file_name,
        upload.bytes.len()
    );

    let bytes = upload.bytes.clone();
    let image = tokio::task::spawn_blocking(move || {
        ScanImage::decode_upload(&bytes, upload.file_name.as_deref())
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    let metadata = image.metadata();
    let preview = preview_uri(image.format(), &upload.bytes);
    state.sessions.preprocessing_started(session).await;

    let classifier = Arc::clone(&state.classifier);
    let prediction = tokio::task::spawn_blocking(move || classifier.classify(&image))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Outcome {
        image: metadata,
        preview,
        prediction,
    })
}

async fn home(headers: HeaderMap) -> Response {
    let session = resolve_session(&headers);
    with_session(Html(render::home_page()).into_response(), &session)
}

async fn predict_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let session = resolve_session(&headers);
    let response = match run_prediction(&state, &session.id, &mut multipart).await {
        Ok(outcome) => Html(render::result_page(
            &outcome.image,
            outcome.preview.as_deref(),
            &outcome.prediction,
        ))
        .into_response(),
        Err(e) => (e.status(), Html(render::error_page(&e.message()))).into_response(),
    };
    with_session(response, &session)
}

async fn results_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = resolve_session(&headers);
    let last = state.sessions.last_result(&session.id).await;
    let html = render::chart_page(last.as_ref().map(|r| &r.prediction));
    with_session(Html(html).into_response(), &session)
}

async fn about(State(state): State<AppState>) -> Html<String> {
    let info = state.classifier.info();
    Html(render::about_page(info.input_width, info.input_height))
}

fn prediction_json(prediction: &Prediction) -> serde_json::Value {
    let scores: Vec<_> = prediction
        .scores()
        .map(|(class, probability)| json!({ "label": class, "probability": probability }))
        .collect();
    json!({
        "label": prediction.label,
        "confidence": prediction.confidence,
        "probabilities": prediction.probabilities,
        "scores": scores,
    })
}

async fn api_predict(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let session = resolve_session(&headers);
    let response = match run_prediction(&state, &session.id, &mut multipart).await {
        Ok(outcome) => Json(json!({
            "session_id": session.id,
            "image": outcome.image,
            "prediction": prediction_json(&outcome.prediction),
        }))
        .into_response(),
        Err(e) => (
            e.status(),
            Json(json!({ "session_id": session.id, "error": e.message() })),
        )
            .into_response(),
    };
    with_session(response, &session)
}

async fn api_results(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = resolve_session(&headers);
    let session_state = state.sessions.state(&session.id).await;
    let response = match state.sessions.last_result(&session.id).await {
        Some(result) => Json(json!({
            "session_id": session.id,
            "state": session_state,
            "labels": Diagnosis::labels(),
            "image": result.image,
            "prediction": prediction_json(&result.prediction),
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "session_id": session.id,
                "state": session_state,
                "error": "No predictions yet",
            })),
        )
            .into_response(),
    };
    with_session(response, &session)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "status": "OK", "model": state.classifier.info() }))
}
