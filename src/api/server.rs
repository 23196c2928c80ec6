use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use opencv::core::{Mat, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;
use serde::Serialize;

use crate::classifier::Classifier;
use crate::session::{CategorySet, FrameResult, Probabilities};
use crate::storage::SummaryLog;

pub type SharedClassifier = Arc<Mutex<dyn Classifier<Mat> + Send>>;

#[derive(Clone)]
pub struct AppState {
    pub classifier: SharedClassifier,
    pub categories: Arc<CategorySet>,
    pub summary_log: Option<SummaryLog>,
}

impl AppState {
    pub fn new(
        classifier: SharedClassifier,
        categories: CategorySet,
        summary_log: Option<SummaryLog>,
    ) -> Self {
        Self {
            classifier,
            categories: Arc::new(categories),
            summary_log,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct AnalyzeResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    dominant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    probabilities: Option<Probabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl AnalyzeResponse {
    fn error(message: impl Into<String>) -> Self {
        Self {
            dominant: None,
            probabilities: None,
            error: Some(message.into()),
        }
    }
}

pub async fn start_server(
    state: AppState,
    port: u16,
    max_body_bytes: usize,
) -> Result<(), std::io::Error> {
    let app = Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/categories", get(categories_handler))
        .route("/api/sessions", get(sessions_handler))
        .route("/api/analyze", post(analyze_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("starting HTTP server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health_handler() -> impl IntoResponse {
    "ok"
}

async fn categories_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.categories.labels().to_vec())
}

async fn sessions_handler(State(state): State<AppState>) -> Response {
    let log = match state.summary_log {
        Some(log) => log,
        None => return (StatusCode::NOT_FOUND, "session log not enabled").into_response(),
    };

    match tokio::task::spawn_blocking(move || log.load()).await {
        Ok(Ok(records)) => Json(records).into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "failed to read session log");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to read session log").into_response()
        }
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "task failed").into_response(),
    }
}

async fn analyze_handler(State(state): State<AppState>, request: Request) -> Response {
    let body = match read_image(request, &state).await {
        Ok(body) if !body.is_empty() => body,
        Ok(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(AnalyzeResponse::error("empty image")),
            )
                .into_response()
        }
        Err((status, message)) => {
            return (status, Json(AnalyzeResponse::error(message))).into_response()
        }
    };

    let categories = Arc::clone(&state.categories);
    let classifier = Arc::clone(&state.classifier);

    let outcome = tokio::task::spawn_blocking(move || {
        decode_image(&body).map(|frame| classify_shared(&classifier, &frame))
    })
    .await;

    match outcome {
        Ok(Some(result)) => {
            let (status, response) = analysis_response(result, &categories);
            (status, Json(response)).into_response()
        }
        Ok(None) => (
            StatusCode::BAD_REQUEST,
            Json(AnalyzeResponse::error("could not decode image")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "analysis task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AnalyzeResponse::error("analysis task failed")),
            )
                .into_response()
        }
    }
}

/// Image bytes from either a raw body or the `file` field of a multipart form.
async fn read_image<S>(request: Request, state: &S) -> Result<Bytes, (StatusCode, String)>
where
    S: Send + Sync,
{
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if !is_multipart {
        return Bytes::from_request(request, state)
            .await
            .map_err(|e| (e.status(), e.body_text()));
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| (e.status(), e.body_text()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (e.status(), e.body_text()))?
    {
        if field.name() == Some("file") {
            return field.bytes().await.map_err(|e| (e.status(), e.body_text()));
        }
    }
    Err((
        StatusCode::BAD_REQUEST,
        "multipart form has no file field".to_string(),
    ))
}

/// Runs one inference on the shared classifier. A panic in an earlier
/// inference poisons the lock; the classifier holds no state that such a
/// panic could leave half-updated, so the guard is recovered.
fn classify_shared<F>(classifier: &Mutex<dyn Classifier<F> + Send>, frame: &F) -> FrameResult {
    let mut classifier = classifier.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("classifier lock poisoned by an earlier panic, recovering");
        PoisonError::into_inner(poisoned)
    });
    FrameResult::from_inference(classifier.infer(frame))
}

fn decode_image(bytes: &[u8]) -> Option<Mat> {
    let buf = Vector::<u8>::from_slice(bytes);
    let frame = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR).ok()?;
    if frame.empty() {
        return None;
    }
    Some(frame)
}

fn analysis_response(result: FrameResult, categories: &CategorySet) -> (StatusCode, AnalyzeResponse) {
    match result {
        FrameResult::Scored(probabilities) => {
            let dominant = categories.dominant(&probabilities).map(str::to_string);
            (
                StatusCode::OK,
                AnalyzeResponse {
                    dominant,
                    probabilities: Some(probabilities),
                    error: None,
                },
            )
        }
        FrameResult::NoSubject => (
            StatusCode::UNPROCESSABLE_ENTITY,
            AnalyzeResponse::error("no subject detected in the image"),
        ),
        FrameResult::ClassifierError { message } => {
            tracing::warn!(error = %message, "single-frame analysis failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                AnalyzeResponse::error(message),
            )
        }
    }
}
