use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_SECURITY_POLICY, CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use fortec::generation::{AttemptShape, UpstreamAttempt};
use fortec::upstream::{HttpTransport, UpstreamErrorKind, UpstreamTransport};
use tower::ServiceExt;

type Hits = Arc<Mutex<Vec<String>>>;

struct TestContext {
    router: Router,
    hits: Hits,
}

impl TestContext {
    fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

async fn text_endpoint(
    State(hits): State<Hits>,
    Path(prompt): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let model = query.get("model").cloned().unwrap_or_default();
    hits.lock()
        .unwrap()
        .push(if model.is_empty() { "plain".to_string() } else { model.clone() });
    match model.as_str() {
        "openai" => Json(json!({
            "text": format!("Echo: {prompt}"),
            "model": "openai",
            "usage": { "total_tokens": 42 }
        }))
        .into_response(),
        "obscure-model" => Json(json!({ "model": "obscure-model" })).into_response(),
        "openai-audio" => ([(CONTENT_TYPE, "audio/mpeg")], b"ID3fake".to_vec()).into_response(),
        "stringy" => Json(json!(r#"{"response":"from a string"}"#)).into_response(),
        "sleepy" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!({ "text": "too late", "model": "sleepy" })).into_response()
        }
        "" => format!("Plain echo: {prompt}").into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response(),
    }
}

async fn image_endpoint(State(hits): State<Hits>, Path(prompt): Path<String>) -> Response {
    hits.lock().unwrap().push(format!("image:{prompt}"));
    ([(CONTENT_TYPE, "image/jpeg")], vec![0xFF, 0xD8]).into_response()
}

async fn start_upstream() -> (SocketAddr, Hits) {
    let hits: Hits = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .route("/prompt/{prompt}", get(image_endpoint))
        .route("/{prompt}", get(text_endpoint))
        .with_state(Arc::clone(&hits));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, hits)
}

async fn dead_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn runtime_for(addr: SocketAddr) -> fortec::app::RuntimeConfig {
    let base_url = format!("http://{addr}");
    let mut runtime = fortec::app::RuntimeConfig {
        listen: "127.0.0.1:0".to_string(),
        ..fortec::app::RuntimeConfig::default()
    };
    runtime.upstream.text_base_url = base_url.clone();
    runtime.upstream.image_base_url = base_url;
    runtime.upstream.primary_timeout_ms = 5_000;
    runtime.upstream.fallback_timeout_ms = 5_000;
    runtime.upstream.check_timeout_ms = 5_000;
    runtime
}

async fn setup_with(configure: impl FnOnce(&mut fortec::app::RuntimeConfig)) -> TestContext {
    let (addr, hits) = start_upstream().await;
    let mut runtime = runtime_for(addr);
    configure(&mut runtime);
    let state = fortec::app::load_state_with_runtime(runtime)
        .await
        .expect("load state");
    TestContext {
        router: fortec::app::build_app(state),
        hits,
    }
}

async fn setup() -> TestContext {
    setup_with(|_| {}).await
}

async fn send(ctx: &TestContext, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let resp = ctx.router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

async fn json_post(ctx: &TestContext, path: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(path)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, _, body) = send(ctx, req).await;
    (status, body)
}

async fn json_post_with_key(
    ctx: &TestContext,
    path: &str,
    key: &str,
    body: Value,
) -> (StatusCode, HeaderMap, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(path)
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, format!("Bearer {key}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    send(ctx, req).await
}

async fn get_json(ctx: &TestContext, path: &str) -> (StatusCode, HeaderMap, Value) {
    let req = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    send(ctx, req).await
}

#[tokio::test]
async fn missing_prompt_is_rejected_without_upstream_calls() {
    let ctx = setup().await;
    let (status, body) = json_post(&ctx, "/api/v1/generate/text", json!({"model": "openai"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Prompt is required");
    assert!(body["requestId"].as_str().is_some());

    let (status, _) = json_post(&ctx, "/api/v1/generate/text", json!({"prompt": "   "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = json_post(&ctx, "/api/v1/generate/image", json!({"model": "dalle"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(ctx.hits().is_empty());
}

#[tokio::test]
async fn invalid_parameters_are_rejected() {
    let ctx = setup().await;
    let (status, body) = json_post(
        &ctx,
        "/api/v1/generate/text",
        json!({"prompt": "Hello", "max_tokens": 0}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");

    let (status, _) = json_post(
        &ctx,
        "/api/v1/generate/image",
        json!({"prompt": "fox", "width": -1}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(ctx.hits().is_empty());
}

#[tokio::test]
async fn malformed_json_gets_error_envelope() {
    let ctx = setup().await;
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/generate/text")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, body) = send(&ctx, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(ctx.hits().is_empty());
}

#[tokio::test]
async fn baseline_model_answers_directly() {
    let ctx = setup().await;
    let (status, body) = json_post(
        &ctx,
        "/api/v1/generate/text",
        json!({"prompt": "Hello", "model": "openai"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    let data = &body["data"];
    assert_eq!(data["text"], "Echo: Hello");
    assert_eq!(data["model"], "openai");
    assert_eq!(data["resolved_model"], "openai");
    assert_eq!(data["requested_model"], "openai");
    assert_eq!(data["used_fallback"], false);
    assert_eq!(data["degraded"], false);
    assert_eq!(data["tokens_used"], 42);
    assert_eq!(ctx.hits(), vec!["openai"]);
}

#[tokio::test]
async fn model_defaults_to_baseline() {
    let ctx = setup().await;
    let (status, body) =
        json_post(&ctx, "/api/v1/generate/text", json!({"prompt": "Hi there"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["requested_model"], "openai");
    assert_eq!(body["data"]["temperature"], 0.7);
}

#[tokio::test]
async fn incomplete_reply_falls_back_to_baseline() {
    let ctx = setup().await;
    let (status, body) = json_post(
        &ctx,
        "/api/v1/generate/text",
        json!({"prompt": "Hello", "model": "obscure-model"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["resolved_model"], "openai");
    assert_eq!(data["requested_model"], "obscure-model");
    assert_eq!(data["used_fallback"], true);
    assert_eq!(data["model_name"], "openai (fallback from obscure-model)");
    let text = data["text"].as_str().unwrap();
    assert!(text.starts_with("Echo: Hello"));
    assert!(text.contains("obscure-model"));
    assert_eq!(ctx.hits(), vec!["obscure-model", "openai"]);
}

#[tokio::test]
async fn upstream_error_falls_back_to_baseline() {
    let ctx = setup().await;
    let (status, body) = json_post(
        &ctx,
        "/api/v1/generate/text",
        json!({"prompt": "Hello", "model": "broken"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["used_fallback"], true);
    assert_eq!(body["data"]["resolved_model"], "openai");
    assert!(!body["data"]["text"].as_str().unwrap().contains("exploded"));
    assert_eq!(ctx.hits(), vec!["broken", "openai"]);
}

#[tokio::test]
async fn slow_upstream_times_out_and_falls_back() {
    let ctx = setup_with(|runtime| runtime.upstream.primary_timeout_ms = 300).await;
    let started = std::time::Instant::now();
    let (status, body) = json_post(
        &ctx,
        "/api/v1/generate/text",
        json!({"prompt": "Hello", "model": "sleepy"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["used_fallback"], true);
    assert_eq!(body["data"]["resolved_model"], "openai");
    assert!(
        body["data"]["text"]
            .as_str()
            .unwrap()
            .starts_with("Echo: Hello")
    );
    assert_eq!(ctx.hits(), vec!["sleepy", "openai"]);
    assert!(started.elapsed() < Duration::from_secs(2));
}

fn direct_attempt(addr: SocketAddr, model: &str, timeout: Duration) -> UpstreamAttempt {
    let url = format!("http://{addr}/Hello?model={model}&json=true");
    UpstreamAttempt {
        target_model: model.to_string(),
        shape: AttemptShape::TextJson,
        url: reqwest::Url::parse(&url).unwrap(),
        timeout,
    }
}

#[tokio::test]
async fn http_transport_reports_status_and_timeout() {
    let (addr, _hits) = start_upstream().await;
    let transport = HttpTransport::new(reqwest::Client::new());

    let err = transport
        .fetch(&direct_attempt(addr, "broken", Duration::from_secs(5)))
        .await
        .unwrap_err();
    assert_eq!(err.kind, UpstreamErrorKind::Http);
    assert_eq!(err.status, Some(StatusCode::INTERNAL_SERVER_ERROR));

    let err = transport
        .fetch(&direct_attempt(addr, "sleepy", Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert_eq!(err.kind, UpstreamErrorKind::Timeout);
    assert_eq!(err.status, None);
}

#[tokio::test]
async fn plain_fallback_shape_uses_bare_endpoint() {
    let ctx = setup_with(|runtime| {
        runtime.upstream.fallback_shape = fortec::config::FallbackShape::TextPlain;
    })
    .await;
    let (status, body) = json_post(
        &ctx,
        "/api/v1/generate/text",
        json!({"prompt": "Hello", "model": "broken"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        body["data"]["text"]
            .as_str()
            .unwrap()
            .starts_with("Plain echo: Hello")
    );
    assert_eq!(ctx.hits(), vec!["broken", "plain"]);
}

#[tokio::test]
async fn json_encoded_string_reply_is_unwrapped() {
    let ctx = setup().await;
    let (status, body) = json_post(
        &ctx,
        "/api/v1/generate/text",
        json!({"prompt": "Hello", "model": "stringy", "max_tokens": 77}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["text"], "from a string");
    assert_eq!(body["data"]["used_fallback"], false);
    assert_eq!(body["data"]["tokens_used"], 77);
}

#[tokio::test]
async fn unreachable_upstream_degrades_without_leaking_errors() {
    let dead = dead_addr().await;
    let ctx = setup_with(|runtime| {
        runtime.upstream.text_base_url = format!("http://{dead}");
    })
    .await;
    let (status, body) = json_post(
        &ctx,
        "/api/v1/generate/text",
        json!({"prompt": "Hello", "model": "mistral"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    let data = &body["data"];
    let text = data["text"].as_str().unwrap();
    assert!(text.contains("mistral"));
    assert!(!text.to_lowercase().contains("connection"));
    assert!(!text.contains(&dead.port().to_string()));
    assert_eq!(data["degraded"], true);
    assert_eq!(data["used_fallback"], true);
}

#[tokio::test]
async fn audio_model_returns_data_uri() {
    let ctx = setup().await;
    let (status, body) = json_post(
        &ctx,
        "/api/v1/generate/text",
        json!({"prompt": "Say hi", "model": "openai-audio"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["text"], "Audio generated successfully");
    assert_eq!(data["voice"], "alloy");
    let audio = data["audio_data"].as_str().unwrap();
    assert!(audio.starts_with("data:audio/mpeg;base64,"));
    assert!(audio.len() > "data:audio/mpeg;base64,".len());
    assert_eq!(ctx.hits(), vec!["openai-audio"]);
}

#[tokio::test]
async fn image_generation_returns_url_and_checks_it() {
    let ctx = setup().await;
    let (status, body) = json_post(
        &ctx,
        "/api/v1/generate/image",
        json!({"prompt": "a red fox", "model": "dalle", "width": 640, "height": 480}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    let url = data["image_url"].as_str().unwrap();
    assert!(url.contains("/prompt/a%20red%20fox?model=dalle&width=640&height=480"));
    assert_eq!(data["model"], "dalle");
    assert_eq!(data["width"], 640);
    assert!(data.get("seed").is_none());
    assert_eq!(ctx.hits(), vec!["image:a red fox"]);
}

#[tokio::test]
async fn image_defaults_omit_model_parameter() {
    let ctx = setup_with(|runtime| runtime.upstream.image_check = false).await;
    let (status, body) =
        json_post(&ctx, "/api/v1/generate/image", json!({"prompt": "fox"})).await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["model"], "stable-diffusion");
    assert!(
        data["image_url"]
            .as_str()
            .unwrap()
            .ends_with("/prompt/fox?width=512&height=512")
    );
    assert!(ctx.hits().is_empty());
}

#[tokio::test]
async fn free_tier_is_rate_limited() {
    let ctx = setup_with(|runtime| runtime.rate_limits.free = 2).await;
    for _ in 0..2 {
        let (status, _, _) = json_post_with_key(
            &ctx,
            "/api/v1/generate/text",
            "FORTEC_FREE_TIER",
            json!({"prompt": "Hello"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, headers, body) = json_post_with_key(
        &ctx,
        "/api/v1/generate/text",
        "FORTEC_FREE_TIER",
        json!({"prompt": "Hello"}),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["message"], "Free tier rate limit exceeded");
    assert!(headers.get(RETRY_AFTER).is_some());

    let (status, _, _) = json_post_with_key(
        &ctx,
        "/api/v1/generate/text",
        "FORTEC_PRO_abcdef",
        json!({"prompt": "Hello"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ctx.hits().len(), 3);
}

#[tokio::test]
async fn required_api_key_is_enforced() {
    let ctx = setup_with(|runtime| runtime.require_api_key = true).await;
    let (status, body) =
        json_post(&ctx, "/api/v1/generate/text", json!({"prompt": "Hello"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");

    let (status, _, body) = json_post_with_key(
        &ctx,
        "/api/v1/generate/text",
        "short",
        json!({"prompt": "Hello"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid API key format");

    let (status, _, _) = json_post_with_key(
        &ctx,
        "/api/v1/generate/text",
        "FORTEC_PREMIUM_key",
        json!({"prompt": "Hello"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ctx.hits(), vec!["openai"]);
}

#[tokio::test]
async fn register_login_and_verify_flow() {
    let ctx = setup().await;
    let (status, body) = json_post(
        &ctx,
        "/api/v1/auth/register",
        json!({"name": "Ada", "email": "ada@example.com", "password": "hunter22"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "User registered successfully");
    let user_id = body["data"]["user"]["id"].as_str().unwrap().to_string();
    let api_key = body["data"]["api_key"].as_str().unwrap().to_string();
    assert!(body["data"]["user"].get("password").is_none());
    assert!(body["data"]["user"].get("password_hash").is_none());

    let (status, body) = json_post(
        &ctx,
        "/api/v1/auth/register",
        json!({"name": "Ada", "email": "ada@example.com", "password": "other"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "User with this email already exists");

    let (status, body) = json_post(
        &ctx,
        "/api/v1/auth/login",
        json!({"email": "ada@example.com", "password": "wrong"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");

    let (status, body) = json_post(
        &ctx,
        "/api/v1/auth/login",
        json!({"email": "ada@example.com", "password": "hunter22"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["api_key"], api_key.as_str());

    let (status, body) = json_post(
        &ctx,
        "/api/v1/auth/api-key",
        json!({"user_id": user_id.as_str()}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["data"]["api_key"], api_key.as_str());

    let (status, body) = json_post(
        &ctx,
        "/api/v1/auth/verify",
        json!({"api_key": api_key.as_str()}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], true);
    assert_eq!(body["data"]["user"]["id"], user_id.as_str());
    assert_eq!(body["data"]["tier"], "standard");
    assert_eq!(body["data"]["models"], json!(["fortec-lite"]));
}

#[tokio::test]
async fn auth_endpoints_validate_input() {
    let ctx = setup().await;
    let (status, body) = json_post(
        &ctx,
        "/api/v1/auth/register",
        json!({"email": "x@example.com"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Please provide name, email, and password");

    let (status, _) = json_post(&ctx, "/api/v1/auth/login", json!({"email": "x"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = json_post(&ctx, "/api/v1/auth/api-key", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) =
        json_post(&ctx, "/api/v1/auth/api-key", json!({"user_id": "nobody"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User not found");

    let (status, _) = json_post(&ctx, "/api/v1/auth/verify", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = json_post(
        &ctx,
        "/api/v1/auth/verify",
        json!({"api_key": "not-a-real-key"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid API key");
}

#[tokio::test]
async fn models_are_listed_and_looked_up() {
    let ctx = setup().await;
    let (status, _, body) = get_json(&ctx, "/api/v1/models").await;
    assert_eq!(status, StatusCode::OK);
    let models = body["data"]["models"].as_array().unwrap();
    assert_eq!(models.len(), 6);
    assert_eq!(models[0]["id"], "fortec-7");

    let (status, _, body) = get_json(&ctx, "/api/v1/models/fortec-code").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["model"]["name"], "Fortec Code");

    let (status, _, body) = get_json(&ctx, "/api/v1/models/gpt-9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Model with ID gpt-9 not found");
}

#[tokio::test]
async fn health_and_root_report_success() {
    let ctx = setup().await;
    let (status, headers, body) = get_json(&ctx, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(body["timestamp"].as_str().is_some());
    assert!(headers.get(CONTENT_SECURITY_POLICY).is_some());

    let (status, _, body) = get_json(&ctx, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Welcome to Fortec AI API");
}

#[tokio::test]
async fn unknown_route_returns_json_404() {
    let ctx = setup().await;
    let (status, _, body) = get_json(&ctx, "/api/v1/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Endpoint not found");
}

#[tokio::test]
async fn request_id_is_propagated_into_envelope() {
    let ctx = setup().await;
    let req = Request::builder()
        .method("GET")
        .uri("/api/v1/models")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&ctx, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requestId"], "req-123");
    assert_eq!(headers.get("x-request-id").unwrap(), "req-123");

    let (_, headers, body) = get_json(&ctx, "/missing").await;
    let generated = headers.get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(body["requestId"], generated);
}

#[tokio::test]
async fn metrics_endpoint_renders() {
    let ctx = setup().await;
    json_post(&ctx, "/api/v1/generate/text", json!({"prompt": "Hello"})).await;
    let req = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let resp = ctx.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("fortec_generation_requests_total"));
}
