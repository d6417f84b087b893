//! Axum HTTP API.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use starlens_core::LabelCatalog;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::dto::*;
use crate::engine::EngineHandle;

const NO_IMAGE: &str = "No image provided. Send base64 JSON or multipart file.";
const MISSING_IMAGE_FIELD: &str = "Missing \"image\" field in JSON body";

/// Startup resources shared read-only by every handler.
pub struct AppState {
    pub catalog: Arc<LabelCatalog>,
    pub engine: EngineHandle,
}

/// Per-request failure, mapped to a fixed status code.
#[derive(Debug)]
pub enum ApiError {
    /// The request carries no usable image payload.
    BadRequest(String),
    /// Decoding, preprocessing or inference failed.
    Inference(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            ApiError::BadRequest(msg) | ApiError::Inference(msg) => msg,
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Build the router with CORS, tracing and the body size limit.
pub fn create_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/celebrities", get(celebrities_handler))
        .route("/predict", post(predict_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.engine.is_running(),
        device: state.engine.device().to_string(),
    })
}

async fn celebrities_handler(State(state): State<Arc<AppState>>) -> Json<CelebritiesResponse> {
    Json(CelebritiesResponse {
        celebrities: state.catalog.names().to_vec(),
        total: state.catalog.len(),
    })
}

async fn predict_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<PredictResponse>, ApiError> {
    let image = extract_image(request).await.map_err(|e| {
        tracing::warn!(error = ?e, "rejected prediction request");
        e
    })?;

    let prediction = state.engine.predict(image).await.map_err(|e| {
        tracing::error!(error = %e, "prediction failed");
        ApiError::Inference(e.to_string())
    })?;

    Ok(Json(PredictResponse::from(prediction)))
}

/// Pull the image bytes out of a JSON (`image`, base64) or multipart (`file`) body.
async fn extract_image(request: Request) -> Result<Vec<u8>, ApiError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if is_json(&content_type) {
        let body = Bytes::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        return image_from_json(&body);
    }

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?
        {
            if field.name() == Some("file") {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                return Ok(data.to_vec());
            }
        }
    }

    Err(ApiError::BadRequest(NO_IMAGE.into()))
}

fn is_json(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

/// Decode the `image` field of a JSON body.
///
/// A body that is not JSON at all is an undecodable payload (500); a JSON
/// body without the field is a missing payload (400).
fn image_from_json(body: &[u8]) -> Result<Vec<u8>, ApiError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::Inference(format!("invalid JSON body: {e}")))?;

    let field = value
        .get("image")
        .ok_or_else(|| ApiError::BadRequest(MISSING_IMAGE_FIELD.into()))?;
    let encoded = field
        .as_str()
        .ok_or_else(|| ApiError::Inference("\"image\" must be a base64 string".into()))?;

    decode_base64(encoded).map_err(|e| ApiError::Inference(format!("invalid base64 image: {e}")))
}

/// Standard base64, tolerating a `data:<mime>;base64,` prefix and whitespace.
fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact)
}
