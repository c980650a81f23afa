use crate::app::AppState;
use crate::auth::Caller;
use crate::catalog::ModelInfo;
use crate::error::{AppError, AppResult};
use crate::generation::{GenerationRequest, ImageRequest, NormalizedResult, ValidationError};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// The request id assigned by the request-id layer, or a fresh one when the
/// handler runs outside it.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SuccessEnvelope<T> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    request_id: String,
    data: T,
}

pub(crate) fn success<T: Serialize>(
    status: StatusCode,
    request_id: String,
    message: Option<&'static str>,
    data: T,
) -> Response {
    let body = SuccessEnvelope {
        status: "success",
        message,
        request_id,
        data,
    };
    (status, Json(body)).into_response()
}

pub(crate) fn bad_request(request_id: &str, message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "invalid_request", message).with_request_id(request_id)
}

pub(crate) fn parse_body<T>(
    payload: Result<Json<T>, JsonRejection>,
    request_id: &str,
) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| bad_request(request_id, rejection.body_text()))
}

fn validation_error(request_id: &str, err: ValidationError) -> AppError {
    bad_request(request_id, err.to_string())
}

pub async fn root(headers: HeaderMap) -> Response {
    let body = serde_json::json!({
        "status": "success",
        "message": "Welcome to Fortec AI API",
        "documentation": "/api/docs",
        "version": env!("CARGO_PKG_VERSION"),
        "requestId": request_id(&headers),
    });
    Json(body).into_response()
}

pub async fn health(headers: HeaderMap) -> Response {
    let body = serde_json::json!({
        "status": "success",
        "message": "Server is healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "requestId": request_id(&headers),
    });
    Json(body).into_response()
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

pub async fn not_found(headers: HeaderMap) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", "Endpoint not found")
        .with_request_id(request_id(&headers))
}

#[derive(Debug, Deserialize)]
pub struct TextGenerationBody {
    prompt: Option<String>,
    model: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<i64>,
    voice: Option<String>,
}

#[derive(Debug, Serialize)]
struct TextGenerationData {
    #[serde(flatten)]
    result: NormalizedResult,
    model: String,
}

pub async fn generate_text(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    headers: HeaderMap,
    payload: Result<Json<TextGenerationBody>, JsonRejection>,
) -> AppResult<Response> {
    let request_id = request_id(&headers);
    let body = parse_body(payload, &request_id)?;
    let model = body
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.pipeline.config().baseline_model.clone());

    let mut request = GenerationRequest::new(body.prompt.unwrap_or_default(), model)
        .map_err(|err| validation_error(&request_id, err))?
        .with_voice(body.voice);
    if let Some(temperature) = body.temperature {
        request = request
            .with_temperature(temperature)
            .map_err(|err| validation_error(&request_id, err))?;
    }
    if let Some(max_tokens) = body.max_tokens {
        request = request
            .with_max_tokens(max_tokens)
            .map_err(|err| validation_error(&request_id, err))?;
    }

    tracing::info!(
        request_id = %request_id,
        model = request.model(),
        tier = caller.tier.as_str(),
        user_id = caller.user_id.as_deref().unwrap_or("-"),
        "text generation requested"
    );
    tracing::debug!(prompt = request.prompt(), "text generation prompt");

    let result = state.pipeline.generate(&request).await;
    let data = TextGenerationData {
        model: result.resolved_model.clone(),
        result,
    };
    Ok(success(StatusCode::OK, request_id, None, data))
}

#[derive(Debug, Deserialize)]
pub struct ImageGenerationBody {
    prompt: Option<String>,
    model: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
    seed: Option<u64>,
}

pub async fn generate_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ImageGenerationBody>, JsonRejection>,
) -> AppResult<Response> {
    let request_id = request_id(&headers);
    let body = parse_body(payload, &request_id)?;
    let model = body
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.pipeline.config().default_image_model.clone());
    let request = ImageRequest::new(body.prompt.unwrap_or_default(), model)
        .and_then(|req| {
            req.with_size(
                body.width.unwrap_or(i64::from(ImageRequest::DEFAULT_SIZE)),
                body.height.unwrap_or(i64::from(ImageRequest::DEFAULT_SIZE)),
            )
        })
        .map_err(|err| validation_error(&request_id, err))?
        .with_seed(body.seed);

    tracing::info!(
        request_id = %request_id,
        model = request.model(),
        width = request.width(),
        height = request.height(),
        "image generation requested"
    );
    let result = state.pipeline.generate_image(&request).await;
    Ok(success(StatusCode::OK, request_id, None, result))
}

#[derive(Debug, Serialize)]
struct ModelList<'a> {
    models: &'a [ModelInfo],
}

#[derive(Debug, Serialize)]
struct ModelDetail<'a> {
    model: &'a ModelInfo,
}

pub async fn list_models(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let data = ModelList {
        models: state.catalog.all(),
    };
    success(StatusCode::OK, request_id(&headers), None, data)
}

pub async fn get_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let request_id = request_id(&headers);
    let model = state.catalog.get(&id).ok_or_else(|| {
        AppError::new(
            StatusCode::NOT_FOUND,
            "model_not_found",
            format!("Model with ID {id} not found"),
        )
        .with_request_id(request_id.clone())
    })?;
    Ok(success(StatusCode::OK, request_id, None, ModelDetail { model }))
}
