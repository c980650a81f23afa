use crate::auth::DemoTierResolver;
use crate::catalog::ModelCatalog;
use crate::config::{RateLimitConfig, UpstreamConfig, env_parse, env_string};
use crate::error::{AppError, AppResult};
use crate::generation::GenerationPipeline;
use crate::rate_limit::TierRateLimiter;
use crate::store::{IdentityStore, MemoryIdentityStore};
use crate::upstream::HttpTransport;
use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_SECURITY_POLICY, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::{Arc, Once, OnceLock};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeConfig>,
    pub auth: DemoTierResolver,
    pub catalog: ModelCatalog,
    pub pipeline: Arc<GenerationPipeline>,
    pub identity: Arc<dyn IdentityStore>,
    pub rate_limiter: TierRateLimiter,
    pub metrics: PrometheusHandle,
}

const BODY_LIMIT_BYTES: usize = 1024 * 1024;
const LIMITER_PURGE_INTERVAL: Duration = Duration::from_secs(60);
const RESERVED_PATHS: [&str; 2] = ["/", "/health"];
const CONTENT_SECURITY_POLICY_VALUE: &str = "default-src 'self' *.fortecai.vercel.app *.onrender.com; connect-src 'self' *; img-src 'self' *; script-src 'self' 'unsafe-inline'; style-src 'self' 'unsafe-inline'";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static METRICS_ERROR: OnceLock<AppError> = OnceLock::new();
static METRICS_INIT: Once = Once::new();

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: String,
    pub metrics_path: String,
    /// Reject generation requests that carry no bearer token.
    pub require_api_key: bool,
    pub upstream: UpstreamConfig,
    pub rate_limits: RateLimitConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:5000".to_string(),
            metrics_path: "/metrics".to_string(),
            require_api_key: false,
            upstream: UpstreamConfig::default(),
            rate_limits: RateLimitConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let listen = env_string("FORTEC_LISTEN")
            .or_else(|| env_string("PORT").map(|port| format!("0.0.0.0:{}", port.trim())))
            .unwrap_or(defaults.listen);
        let metrics_path = env_string("FORTEC_METRICS_PATH").unwrap_or(defaults.metrics_path);
        let require_api_key =
            env_parse("FORTEC_REQUIRE_API_KEY").unwrap_or(defaults.require_api_key);
        Self {
            listen,
            metrics_path,
            require_api_key,
            upstream: UpstreamConfig::from_env(),
            rate_limits: RateLimitConfig::from_env(),
        }
    }

    /// The metrics route shares the root router, so it must not collide with
    /// the fixed routes or the `/api` tree.
    pub fn validate(&self) -> Result<(), String> {
        let path = self.metrics_path.as_str();
        let reserved =
            RESERVED_PATHS.contains(&path) || path == "/api" || path.starts_with("/api/");
        if !path.starts_with('/') || reserved || path.contains(['{', '}', '*']) {
            return Err(format!("metrics path {path:?} is not usable"));
        }
        Ok(())
    }
}

pub async fn load_state() -> AppResult<AppState> {
    load_state_with_runtime(RuntimeConfig::from_env()).await
}

pub async fn load_state_with_runtime(runtime: RuntimeConfig) -> AppResult<AppState> {
    load_state_with_identity(runtime, Arc::new(MemoryIdentityStore::new())).await
}

pub async fn load_state_with_identity(
    runtime: RuntimeConfig,
    identity: Arc<dyn IdentityStore>,
) -> AppResult<AppState> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("fortec/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|err| {
            AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "http_client_init_failed",
                err.to_string(),
            )
        })?;

    let transport = Arc::new(HttpTransport::new(http));
    let pipeline = GenerationPipeline::new(runtime.upstream.clone(), transport).map_err(|err| {
        AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "upstream_config_invalid",
            err,
        )
    })?;

    runtime.validate().map_err(|err| {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "metrics_path_invalid", err)
    })?;
    let rate_limiter = TierRateLimiter::new(&runtime.rate_limits);
    rate_limiter.spawn_purge(LIMITER_PURGE_INTERVAL);
    let metrics = init_metrics()?;
    tracing::debug!(
        text_base = %runtime.upstream.text_base_url,
        baseline = %runtime.upstream.baseline_model,
        require_api_key = runtime.require_api_key,
        "state loaded"
    );

    Ok(AppState {
        runtime: Arc::new(runtime),
        auth: DemoTierResolver::new(),
        catalog: ModelCatalog::builtin(),
        pipeline: Arc::new(pipeline),
        identity,
        rate_limiter,
        metrics,
    })
}

fn init_metrics() -> AppResult<PrometheusHandle> {
    METRICS_INIT.call_once(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(err) => {
                let _ = METRICS_ERROR.set(AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "metrics_init_failed",
                    err.to_string(),
                ));
            }
        }
    });

    if let Some(err) = METRICS_ERROR.get() {
        return Err(err.clone());
    }
    METRICS_HANDLE.get().cloned().ok_or_else(|| {
        AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "metrics_init_failed",
            "metrics recorder not available",
        )
    })
}

pub fn build_app(state: AppState) -> Router {
    let metrics_path = state.runtime.metrics_path.clone();
    let generate_router = build_generate_router(state.clone());
    Router::<AppState>::new()
        .route("/", get(crate::handlers::root))
        .route("/health", get(crate::handlers::health))
        .route(&metrics_path, get(crate::handlers::metrics))
        .nest("/api/v1/generate", generate_router)
        .nest("/api/v1/models", build_models_router())
        .nest("/api/v1/auth", build_auth_router())
        .fallback(crate::handlers::not_found)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(SetResponseHeaderLayer::if_not_present(
            CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY_VALUE),
        ))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            MakeRequestUuid,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

fn build_generate_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/text", post(crate::handlers::generate_text))
        .route("/image", post(crate::handlers::generate_image))
        .route_layer(from_fn_with_state(
            state,
            crate::rate_limit::limit_generation,
        ))
}

fn build_models_router() -> Router<AppState> {
    Router::new()
        .route("/", get(crate::handlers::list_models))
        .route("/{id}", get(crate::handlers::get_model))
}

fn build_auth_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(crate::auth_handlers::register))
        .route("/login", post(crate::auth_handlers::login))
        .route("/api-key", post(crate::auth_handlers::create_api_key))
        .route("/verify", post(crate::auth_handlers::verify_api_key))
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
}
