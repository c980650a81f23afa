use crate::app::AppState;
use crate::auth::Tier;
use crate::error::{AppError, AppResult};
use crate::handlers::{bad_request, parse_body, request_id, success};
use crate::store::{StoreError, User};
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiKeyBody {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyBody {
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct UserResponse {
    id: String,
    name: String,
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
}

impl UserResponse {
    fn full(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            created_at: Some(user.created_at),
        }
    }

    fn summary(user: User) -> Self {
        Self {
            created_at: None,
            ..Self::full(user)
        }
    }
}

#[derive(Debug, Serialize)]
struct SessionData {
    user: UserResponse,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiKeyData {
    api_key: String,
}

#[derive(Debug, Serialize)]
struct VerifyData {
    valid: bool,
    user: UserResponse,
    tier: Tier,
    models: Vec<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn store_error(request_id: &str, err: StoreError) -> AppError {
    let app_err = match err {
        StoreError::DuplicateEmail => bad_request(request_id, err.to_string()),
        StoreError::UnknownUser => {
            AppError::new(StatusCode::NOT_FOUND, "user_not_found", err.to_string())
        }
        StoreError::Hash(_) => {
            tracing::error!("identity store failure: {err}");
            AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            )
        }
    };
    app_err.with_request_id(request_id)
}

pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RegisterBody>, JsonRejection>,
) -> AppResult<Response> {
    let request_id = request_id(&headers);
    let body = parse_body(payload, &request_id)?;
    let (Some(name), Some(email), Some(password)) = (
        non_empty(body.name),
        non_empty(body.email),
        non_empty(body.password),
    ) else {
        return Err(bad_request(
            &request_id,
            "Please provide name, email, and password",
        ));
    };

    let user = state
        .identity
        .create_user(&name, &email, &password)
        .await
        .map_err(|err| store_error(&request_id, err))?;
    let key = state
        .identity
        .create_api_key(&user.id)
        .await
        .map_err(|err| store_error(&request_id, err))?;
    tracing::info!(user_id = %user.id, "user registered");

    let data = SessionData {
        user: UserResponse::full(user),
        api_key: Some(key.key),
    };
    Ok(success(
        StatusCode::CREATED,
        request_id,
        Some("User registered successfully"),
        data,
    ))
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<LoginBody>, JsonRejection>,
) -> AppResult<Response> {
    let request_id = request_id(&headers);
    let body = parse_body(payload, &request_id)?;
    let (Some(email), Some(password)) = (non_empty(body.email), non_empty(body.password)) else {
        return Err(bad_request(&request_id, "Please provide email and password"));
    };

    let user = state
        .identity
        .verify_credentials(&email, &password)
        .await
        .ok_or_else(|| {
            AppError::new(
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid credentials",
            )
            .with_request_id(request_id.clone())
        })?;
    let api_key = state
        .identity
        .first_key_for_user(&user.id)
        .await
        .map(|k| k.key);

    let data = SessionData {
        user: UserResponse::full(user),
        api_key,
    };
    Ok(success(
        StatusCode::OK,
        request_id,
        Some("Login successful"),
        data,
    ))
}

pub async fn create_api_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ApiKeyBody>, JsonRejection>,
) -> AppResult<Response> {
    let request_id = request_id(&headers);
    let body = parse_body(payload, &request_id)?;
    let Some(user_id) = non_empty(body.user_id) else {
        return Err(bad_request(&request_id, "User ID is required"));
    };

    let key = state
        .identity
        .create_api_key(&user_id)
        .await
        .map_err(|err| store_error(&request_id, err))?;
    tracing::info!(user_id = %user_id, "api key issued");

    Ok(success(
        StatusCode::OK,
        request_id,
        Some("API key generated successfully"),
        ApiKeyData { api_key: key.key },
    ))
}

pub async fn verify_api_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<VerifyBody>, JsonRejection>,
) -> AppResult<Response> {
    let request_id = request_id(&headers);
    let body = parse_body(payload, &request_id)?;
    let Some(api_key) = non_empty(body.api_key) else {
        return Err(bad_request(&request_id, "API key is required"));
    };

    let invalid = || {
        AppError::new(StatusCode::UNAUTHORIZED, "api_key_invalid", "Invalid API key")
            .with_request_id(request_id.clone())
    };
    let record = state
        .identity
        .find_api_key(&api_key)
        .await
        .ok_or_else(invalid)?;
    let user = state
        .identity
        .find_user_by_id(&record.user_id)
        .await
        .ok_or_else(invalid)?;
    let caller = state
        .auth
        .resolve(&api_key, state.identity.as_ref())
        .await
        .map_err(|_| invalid())?;

    let data = VerifyData {
        valid: true,
        user: UserResponse::summary(user),
        tier: caller.tier,
        models: caller.models,
    };
    Ok(success(
        StatusCode::OK,
        request_id,
        Some("API key is valid"),
        data,
    ))
}
