//! Outbound generation pipeline.
//!
//! A request is mapped to one primary upstream attempt. Its reply is
//! interpreted into content, an incomplete (model identity only) reply, or
//! nothing at all. Transport failures and incomplete replies for a non-baseline
//! model trigger exactly one fallback attempt against the baseline model.
//! Every path ends in a [`NormalizedResult`] whose `text` is non-empty.

use crate::config::{FallbackShape, UpstreamConfig};
use crate::upstream::{UpstreamCallError, UpstreamReply, UpstreamTransport};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Url;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

pub const AUDIO_CONFIRMATION: &str = "Audio generated successfully";
pub const EMPTY_RESPONSE_MESSAGE: &str = "No response generated. The model may be unavailable.";

const CONTENT_FIELDS: [&str; 4] = ["text", "content", "response", "message"];
const MODEL_FIELDS: [&str; 2] = ["model_name", "model"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Prompt is required")]
    MissingPrompt,
    #[error("max_tokens must be a positive integer")]
    InvalidMaxTokens,
    #[error("temperature must be a non-negative number")]
    InvalidTemperature,
    #[error("width and height must be positive integers")]
    InvalidDimensions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    voice: Option<String>,
}

impl GenerationRequest {
    pub const DEFAULT_TEMPERATURE: f64 = 0.7;
    pub const DEFAULT_MAX_TOKENS: u32 = 150;

    pub fn new(
        prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(ValidationError::MissingPrompt);
        }
        Ok(Self {
            prompt,
            model: model.into(),
            temperature: Self::DEFAULT_TEMPERATURE,
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            voice: None,
        })
    }

    pub fn with_temperature(mut self, temperature: f64) -> Result<Self, ValidationError> {
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(ValidationError::InvalidTemperature);
        }
        self.temperature = temperature;
        Ok(self)
    }

    pub fn with_max_tokens(mut self, max_tokens: i64) -> Result<Self, ValidationError> {
        self.max_tokens = u32::try_from(max_tokens)
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ValidationError::InvalidMaxTokens)?;
        Ok(self)
    }

    /// Blank voices are treated as unset.
    pub fn with_voice(mut self, voice: Option<String>) -> Self {
        self.voice = voice.filter(|v| !v.trim().is_empty());
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptShape {
    TextJson,
    TextAudio,
    TextPlainFallback,
}

impl AttemptShape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextJson => "text_json",
            Self::TextAudio => "text_audio",
            Self::TextPlainFallback => "text_plain_fallback",
        }
    }

    pub fn accept(self) -> &'static str {
        match self {
            Self::TextJson => "application/json",
            Self::TextAudio => "audio/mpeg",
            Self::TextPlainFallback => "*/*",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamAttempt {
    pub target_model: String,
    pub shape: AttemptShape,
    pub url: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResult {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    pub resolved_model: String,
    pub requested_model: String,
    pub model_name: String,
    pub used_fallback: bool,
    pub degraded: bool,
    pub tokens_used: u64,
    pub temperature: f64,
}

impl NormalizedResult {
    fn degraded(request: &GenerationRequest, text: String) -> Self {
        Self {
            text,
            audio_data: None,
            voice: None,
            resolved_model: request.model().to_string(),
            requested_model: request.model().to_string(),
            model_name: request.model().to_string(),
            used_fallback: false,
            degraded: true,
            tokens_used: u64::from(request.max_tokens()),
            temperature: request.temperature(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub text: String,
    pub reported_model: Option<String>,
    pub tokens_used: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    Content(Content),
    /// The reply names a model but carries no content.
    Incomplete { reported_model: String },
    Empty,
}

pub fn interpret(reply: UpstreamReply) -> Interpretation {
    match reply {
        UpstreamReply::Object(map) => interpret_object(&map),
        UpstreamReply::Text(text) => interpret_text(text),
        UpstreamReply::Audio(bytes) => {
            interpret_text(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

fn interpret_text(text: String) -> Interpretation {
    if text.trim().is_empty() {
        return Interpretation::Empty;
    }
    Interpretation::Content(Content {
        text,
        reported_model: None,
        tokens_used: None,
    })
}

fn interpret_object(map: &Map<String, Value>) -> Interpretation {
    let reported_model = MODEL_FIELDS
        .iter()
        .filter_map(|field| map.get(*field))
        .filter_map(|v| v.as_str())
        .find(|s| !s.trim().is_empty())
        .map(|s| s.to_string());
    let text = CONTENT_FIELDS
        .iter()
        .filter_map(|field| map.get(*field))
        .find_map(content_as_text);
    match (text, reported_model) {
        (Some(text), reported_model) => Interpretation::Content(Content {
            text,
            reported_model,
            tokens_used: map
                .get("usage")
                .and_then(|u| u.get("total_tokens"))
                .and_then(|v| v.as_u64())
                .filter(|n| *n > 0),
        }),
        (None, Some(reported_model)) => Interpretation::Incomplete { reported_model },
        (None, None) => Interpretation::Empty,
    }
}

fn content_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug)]
enum AttemptFailure {
    Transport(UpstreamCallError),
    Incomplete { reported_model: String },
}

impl AttemptFailure {
    fn reason(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Incomplete { .. } => "incomplete",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    prompt: String,
    model: String,
    width: u32,
    height: u32,
    seed: Option<u64>,
}

impl ImageRequest {
    pub const DEFAULT_SIZE: u32 = 512;

    pub fn new(
        prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(ValidationError::MissingPrompt);
        }
        Ok(Self {
            prompt,
            model: model.into(),
            width: Self::DEFAULT_SIZE,
            height: Self::DEFAULT_SIZE,
            seed: None,
        })
    }

    pub fn with_size(mut self, width: i64, height: i64) -> Result<Self, ValidationError> {
        let dim = |v: i64| u32::try_from(v).ok().filter(|n| *n > 0);
        match (dim(width), dim(height)) {
            (Some(width), Some(height)) => {
                self.width = width;
                self.height = height;
                Ok(self)
            }
            _ => Err(ValidationError::InvalidDimensions),
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageResult {
    pub image_url: String,
    pub model: String,
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

pub struct GenerationPipeline {
    config: UpstreamConfig,
    text_base: Url,
    image_base: Url,
    transport: Arc<dyn UpstreamTransport>,
}

impl GenerationPipeline {
    pub fn new(
        config: UpstreamConfig,
        transport: Arc<dyn UpstreamTransport>,
    ) -> Result<Self, String> {
        let text_base = parse_base_url(&config.text_base_url)?;
        let image_base = parse_base_url(&config.image_base_url)?;
        Ok(Self {
            config,
            text_base,
            image_base,
            transport,
        })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    pub fn primary_attempt(&self, request: &GenerationRequest) -> UpstreamAttempt {
        if self.config.is_audio_model(request.model()) {
            let mut url = endpoint(&self.text_base, &[request.prompt()]);
            url.query_pairs_mut()
                .append_pair("model", request.model())
                .append_pair("voice", self.voice_for(request));
            return UpstreamAttempt {
                target_model: request.model().to_string(),
                shape: AttemptShape::TextAudio,
                url,
                timeout: Duration::from_millis(self.config.primary_timeout_ms),
            };
        }
        self.json_attempt(request, request.model(), self.config.primary_timeout_ms)
    }

    pub fn fallback_attempt(&self, request: &GenerationRequest) -> UpstreamAttempt {
        let baseline = self.config.baseline_model.as_str();
        match self.config.fallback_shape {
            FallbackShape::TextJson => {
                self.json_attempt(request, baseline, self.config.fallback_timeout_ms)
            }
            FallbackShape::TextPlain => UpstreamAttempt {
                target_model: baseline.to_string(),
                shape: AttemptShape::TextPlainFallback,
                url: endpoint(&self.text_base, &[request.prompt()]),
                timeout: Duration::from_millis(self.config.fallback_timeout_ms),
            },
        }
    }

    fn json_attempt(
        &self,
        request: &GenerationRequest,
        model: &str,
        timeout_ms: u64,
    ) -> UpstreamAttempt {
        let mut url = endpoint(&self.text_base, &[request.prompt()]);
        url.query_pairs_mut()
            .append_pair("model", model)
            .append_pair("json", "true")
            .append_pair("referrer", &self.config.referrer)
            .append_pair("temperature", &request.temperature().to_string())
            .append_pair("max_tokens", &request.max_tokens().to_string());
        UpstreamAttempt {
            target_model: model.to_string(),
            shape: AttemptShape::TextJson,
            url,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn voice_for<'a>(&'a self, request: &'a GenerationRequest) -> &'a str {
        request.voice().unwrap_or(&self.config.default_voice)
    }

    fn should_fall_back(&self, request: &GenerationRequest) -> bool {
        request.model() != self.config.baseline_model
    }

    pub async fn generate(&self, request: &GenerationRequest) -> NormalizedResult {
        let primary = self.primary_attempt(request);
        metrics::counter!("fortec_generation_requests_total", "kind" => primary.shape.as_str())
            .increment(1);
        tracing::debug!(
            model = %primary.target_model,
            shape = primary.shape.as_str(),
            "issuing primary upstream attempt"
        );
        let outcome = self.transport.fetch(&primary).await;

        if primary.shape == AttemptShape::TextAudio {
            return self.finish_audio(request, outcome);
        }

        let failure = match outcome.map(interpret) {
            Ok(Interpretation::Content(content)) => {
                let model_name = content
                    .reported_model
                    .unwrap_or_else(|| request.model().to_string());
                return NormalizedResult {
                    text: content.text,
                    model_name,
                    degraded: false,
                    tokens_used: content
                        .tokens_used
                        .unwrap_or(u64::from(request.max_tokens())),
                    ..NormalizedResult::degraded(request, String::new())
                };
            }
            Ok(Interpretation::Empty) => {
                metrics::counter!("fortec_generation_degraded_total").increment(1);
                return NormalizedResult::degraded(request, EMPTY_RESPONSE_MESSAGE.to_string());
            }
            Ok(Interpretation::Incomplete { reported_model }) => {
                AttemptFailure::Incomplete { reported_model }
            }
            Err(err) => AttemptFailure::Transport(err),
        };

        if !self.should_fall_back(request) {
            return self.surface(request, failure);
        }
        self.fall_back(request, failure).await
    }

    fn finish_audio(
        &self,
        request: &GenerationRequest,
        outcome: Result<UpstreamReply, UpstreamCallError>,
    ) -> NormalizedResult {
        let voice = self.voice_for(request).to_string();
        match outcome {
            Ok(UpstreamReply::Audio(bytes)) if !bytes.is_empty() => NormalizedResult {
                text: AUDIO_CONFIRMATION.to_string(),
                audio_data: Some(format!("data:audio/mpeg;base64,{}", BASE64.encode(&bytes))),
                voice: Some(voice),
                degraded: false,
                ..NormalizedResult::degraded(request, String::new())
            },
            Ok(_) => {
                metrics::counter!("fortec_generation_degraded_total").increment(1);
                NormalizedResult {
                    voice: Some(voice),
                    ..NormalizedResult::degraded(
                        request,
                        format!(
                            "The {} model returned no audio for this prompt.",
                            request.model()
                        ),
                    )
                }
            }
            Err(err) => {
                tracing::warn!(
                    model = request.model(),
                    kind = ?err.kind,
                    status = ?err.status,
                    error = %err,
                    "audio attempt failed"
                );
                metrics::counter!("fortec_generation_degraded_total").increment(1);
                NormalizedResult {
                    voice: Some(voice),
                    ..NormalizedResult::degraded(
                        request,
                        format!(
                            "Audio generation with {} is currently unavailable. Please try again shortly.",
                            request.model()
                        ),
                    )
                }
            }
        }
    }

    fn surface(&self, request: &GenerationRequest, failure: AttemptFailure) -> NormalizedResult {
        metrics::counter!("fortec_generation_degraded_total").increment(1);
        match failure {
            AttemptFailure::Transport(err) => {
                tracing::warn!(
                    model = request.model(),
                    kind = ?err.kind,
                    status = ?err.status,
                    error = %err,
                    "upstream attempt failed"
                );
                NormalizedResult::degraded(
                    request,
                    format!(
                        "The {} model is currently unavailable because the upstream service could not be reached. Please try again shortly.",
                        request.model()
                    ),
                )
            }
            AttemptFailure::Incomplete { reported_model } => {
                tracing::warn!(
                    model = request.model(),
                    reported_model = %reported_model,
                    "upstream reply carried no content"
                );
                NormalizedResult {
                    model_name: reported_model,
                    ..NormalizedResult::degraded(
                        request,
                        format!(
                            "The {} model responded without any content for this prompt. Please try again or choose a different model.",
                            request.model()
                        ),
                    )
                }
            }
        }
    }

    async fn fall_back(
        &self,
        request: &GenerationRequest,
        failure: AttemptFailure,
    ) -> NormalizedResult {
        let baseline = self.config.baseline_model.as_str();
        if let AttemptFailure::Transport(err) = &failure {
            tracing::warn!(
                model = request.model(),
                kind = ?err.kind,
                status = ?err.status,
                error = %err,
                "upstream attempt failed"
            );
        }
        tracing::info!(
            requested = request.model(),
            baseline,
            reason = failure.reason(),
            "falling back to baseline model"
        );
        metrics::counter!("fortec_generation_fallbacks_total").increment(1);

        let attempt = self.fallback_attempt(request);
        match self.transport.fetch(&attempt).await.map(interpret) {
            Ok(Interpretation::Content(content)) => {
                let display = content
                    .reported_model
                    .unwrap_or_else(|| baseline.to_string());
                let model_name = format!("{display} (fallback from {})", request.model());
                NormalizedResult {
                    text: format!("{}\n\n[Generated by {model_name}]", content.text),
                    resolved_model: baseline.to_string(),
                    model_name,
                    used_fallback: true,
                    degraded: false,
                    tokens_used: content
                        .tokens_used
                        .unwrap_or(u64::from(request.max_tokens())),
                    ..NormalizedResult::degraded(request, String::new())
                }
            }
            Ok(_) => {
                tracing::warn!(baseline, "fallback attempt returned no usable content");
                self.exhausted(request)
            }
            Err(err) => {
                tracing::warn!(
                    baseline,
                    kind = ?err.kind,
                    status = ?err.status,
                    error = %err,
                    "fallback attempt failed"
                );
                self.exhausted(request)
            }
        }
    }

    fn exhausted(&self, request: &GenerationRequest) -> NormalizedResult {
        metrics::counter!("fortec_generation_degraded_total").increment(1);
        NormalizedResult {
            used_fallback: true,
            ..NormalizedResult::degraded(
                request,
                format!(
                    "Neither the requested model ({}) nor the fallback model ({}) produced a response. The upstream service may be experiencing issues, please try again shortly.",
                    request.model(),
                    self.config.baseline_model
                ),
            )
        }
    }

    pub fn image_url(&self, request: &ImageRequest) -> Url {
        let mut url = endpoint(&self.image_base, &["prompt", request.prompt()]);
        {
            let mut query = url.query_pairs_mut();
            if self.config.image_model_in_url(request.model()) {
                query.append_pair("model", request.model());
            }
            query
                .append_pair("width", &request.width().to_string())
                .append_pair("height", &request.height().to_string());
            if let Some(seed) = request.seed() {
                query.append_pair("seed", &seed.to_string());
            }
        }
        url
    }

    pub async fn generate_image(&self, request: &ImageRequest) -> ImageResult {
        let url = self.image_url(request);
        metrics::counter!("fortec_generation_requests_total", "kind" => "image").increment(1);
        if self.config.image_check {
            let timeout = Duration::from_millis(self.config.check_timeout_ms);
            match self.transport.check_exists(&url, timeout).await {
                Ok(()) => {
                    tracing::debug!(model = request.model(), "image existence check succeeded")
                }
                Err(err) => tracing::debug!(
                    model = request.model(),
                    error = %err,
                    "image existence check failed, returning url anyway"
                ),
            }
        }
        ImageResult {
            image_url: url.to_string(),
            model: request.model().to_string(),
            prompt: request.prompt().to_string(),
            width: request.width(),
            height: request.height(),
            seed: request.seed(),
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|err| format!("invalid upstream url {raw}: {err}"))?;
    if url.cannot_be_a_base() {
        return Err(format!("upstream url {raw} cannot be a base"));
    }
    Ok(url)
}

fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    url.set_query(None);
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}
