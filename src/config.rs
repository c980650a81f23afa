use crate::auth::Tier;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Shape of the single attempt issued against the baseline model when the
/// primary attempt fails.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackShape {
    #[default]
    TextJson,
    TextPlain,
}

impl FromStr for FallbackShape {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "text_json" => Ok(Self::TextJson),
            "text_plain" => Ok(Self::TextPlain),
            other => Err(format!("unknown fallback shape: {other}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    #[serde(default = "default_text_base_url")]
    pub text_base_url: String,
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,
    #[serde(default = "default_baseline_model")]
    pub baseline_model: String,
    /// Provenance tag sent with every JSON text attempt.
    #[serde(default = "default_referrer")]
    pub referrer: String,
    #[serde(default = "default_audio_models")]
    pub audio_models: Vec<String>,
    #[serde(default = "default_voice")]
    pub default_voice: String,
    /// Image models whose id is passed through to the upstream URL.
    #[serde(default = "default_image_model_param_models")]
    pub image_model_param_models: Vec<String>,
    #[serde(default = "default_image_model")]
    pub default_image_model: String,
    #[serde(default = "default_primary_timeout_ms")]
    pub primary_timeout_ms: u64,
    #[serde(default = "default_fallback_timeout_ms")]
    pub fallback_timeout_ms: u64,
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,
    #[serde(default = "default_image_check")]
    pub image_check: bool,
    #[serde(default)]
    pub fallback_shape: FallbackShape,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            text_base_url: default_text_base_url(),
            image_base_url: default_image_base_url(),
            baseline_model: default_baseline_model(),
            referrer: default_referrer(),
            audio_models: default_audio_models(),
            default_voice: default_voice(),
            image_model_param_models: default_image_model_param_models(),
            default_image_model: default_image_model(),
            primary_timeout_ms: default_primary_timeout_ms(),
            fallback_timeout_ms: default_fallback_timeout_ms(),
            check_timeout_ms: default_check_timeout_ms(),
            image_check: default_image_check(),
            fallback_shape: FallbackShape::default(),
        }
    }
}

impl UpstreamConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_string("FORTEC_TEXT_BASE_URL") {
            config.text_base_url = v;
        }
        if let Some(v) = env_string("FORTEC_IMAGE_BASE_URL") {
            config.image_base_url = v;
        }
        if let Some(v) = env_string("FORTEC_BASELINE_MODEL") {
            config.baseline_model = v;
        }
        if let Some(v) = env_string("FORTEC_REFERRER") {
            config.referrer = v;
        }
        if let Some(v) = env_parse("FORTEC_PRIMARY_TIMEOUT_MS") {
            config.primary_timeout_ms = v;
        }
        if let Some(v) = env_parse("FORTEC_FALLBACK_TIMEOUT_MS") {
            config.fallback_timeout_ms = v;
        }
        if let Some(v) = env_parse("FORTEC_CHECK_TIMEOUT_MS") {
            config.check_timeout_ms = v;
        }
        if let Some(v) = env_parse("FORTEC_IMAGE_CHECK") {
            config.image_check = v;
        }
        if let Some(v) = env_parse("FORTEC_FALLBACK_SHAPE") {
            config.fallback_shape = v;
        }
        config
    }

    pub fn is_audio_model(&self, model: &str) -> bool {
        self.audio_models.iter().any(|m| m == model)
    }

    pub fn image_model_in_url(&self, model: &str) -> bool {
        self.image_model_param_models.iter().any(|m| m == model)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_free_limit")]
    pub free: u32,
    #[serde(default = "default_standard_limit")]
    pub standard: u32,
    #[serde(default = "default_pro_limit")]
    pub pro: u32,
    #[serde(default = "default_premium_limit")]
    pub premium: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            free: default_free_limit(),
            standard: default_standard_limit(),
            pro: default_pro_limit(),
            premium: default_premium_limit(),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse("FORTEC_RATE_LIMIT_WINDOW_SECS") {
            config.window_secs = v;
        }
        config
    }

    pub fn limit_for(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Free => self.free,
            Tier::Standard => self.standard,
            Tier::Pro => self.pro,
            Tier::Premium => self.premium,
        }
    }
}

pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.trim().parse::<T>().ok())
}

fn default_text_base_url() -> String {
    "https://text.pollinations.ai".to_string()
}

fn default_image_base_url() -> String {
    "https://image.pollinations.ai".to_string()
}

fn default_baseline_model() -> String {
    "openai".to_string()
}

fn default_referrer() -> String {
    "fortecai.vercel.app".to_string()
}

fn default_audio_models() -> Vec<String> {
    vec!["openai-audio".to_string()]
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_image_model_param_models() -> Vec<String> {
    vec![
        "midjourney".to_string(),
        "dalle".to_string(),
        "playground".to_string(),
    ]
}

fn default_image_model() -> String {
    "stable-diffusion".to_string()
}

fn default_primary_timeout_ms() -> u64 {
    60_000
}

fn default_fallback_timeout_ms() -> u64 {
    15_000
}

fn default_check_timeout_ms() -> u64 {
    10_000
}

fn default_image_check() -> bool {
    true
}

fn default_window_secs() -> u64 {
    15 * 60
}

fn default_free_limit() -> u32 {
    50
}

fn default_standard_limit() -> u32 {
    200
}

fn default_pro_limit() -> u32 {
    500
}

fn default_premium_limit() -> u32 {
    1000
}
