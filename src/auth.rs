use crate::error::AppError;
use crate::store::IdentityStore;
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;

pub const FREE_TIER_KEY: &str = "FORTEC_FREE_TIER";
const PREMIUM_PREFIX: &str = "FORTEC_PREMIUM_";
const PRO_PREFIX: &str = "FORTEC_PRO_";
const MIN_KEY_LEN: usize = 10;

const FREE_MODELS: [&str; 2] = ["fortec-lite", "fortec-business"];
const STANDARD_MODELS: [&str; 1] = ["fortec-lite"];
const PRO_MODELS: [&str; 3] = ["fortec-code", "fortec-lite", "fortec-business"];
const PREMIUM_MODELS: [&str; 6] = [
    "fortec-7",
    "fortec-code",
    "fortec-expert",
    "fortec-lite",
    "fortec-business",
    "fortec-vision",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Standard,
    Pro,
    Premium,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Standard, Tier::Pro, Tier::Premium];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Standard => "standard",
            Self::Pro => "pro",
            Self::Premium => "premium",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::Standard => "Standard",
            Self::Pro => "Pro",
            Self::Premium => "Premium",
        }
    }

    fn models(self) -> Vec<String> {
        let models: &[&str] = match self {
            Self::Free => &FREE_MODELS,
            Self::Standard => &STANDARD_MODELS,
            Self::Pro => &PRO_MODELS,
            Self::Premium => &PREMIUM_MODELS,
        };
        models.iter().map(|m| m.to_string()).collect()
    }
}

/// Identity attached to a request after tier resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub tier: Tier,
    pub models: Vec<String>,
    pub user_id: Option<String>,
    pub api_key: Option<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self {
            tier: Tier::Free,
            models: Tier::Free.models(),
            user_id: None,
            api_key: None,
        }
    }

    fn with_key(tier: Tier, key: &str) -> Self {
        Self {
            tier,
            models: tier.models(),
            user_id: None,
            api_key: Some(key.to_string()),
        }
    }

    pub fn permits(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    pub fn restrict_to(&self, tiers: &[Tier]) -> Result<(), AppError> {
        if tiers.contains(&self.tier) {
            return Ok(());
        }
        Err(AppError::new(
            StatusCode::FORBIDDEN,
            "tier_forbidden",
            format!(
                "Access denied. Your tier ({}) is not authorized to perform this action.",
                self.tier.as_str()
            ),
        ))
    }

    pub fn require_model(&self, model: &str) -> Result<(), AppError> {
        if self.permits(model) {
            return Ok(());
        }
        Err(AppError::new(
            StatusCode::FORBIDDEN,
            "model_forbidden",
            format!("Access denied. Your tier does not have access to the {model} model."),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error(
        "API key is required. Please provide an API key in the Authorization header as Bearer token."
    )]
    Missing,
    #[error("Invalid API key format")]
    Malformed,
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let code = match err {
            AuthError::Missing => "api_key_required",
            AuthError::Malformed => "api_key_invalid",
        };
        AppError::new(StatusCode::UNAUTHORIZED, code, err.to_string())
    }
}

/// Maps bearer tokens to tiers by key shape. Demo-only: well-formed keys that
/// the identity store does not know are still accepted as standard callers.
#[derive(Clone, Default)]
pub struct DemoTierResolver;

impl DemoTierResolver {
    pub fn new() -> Self {
        Self
    }

    pub async fn resolve(
        &self,
        token: &str,
        store: &dyn IdentityStore,
    ) -> Result<Caller, AuthError> {
        if token.len() < MIN_KEY_LEN {
            return Err(AuthError::Malformed);
        }
        if token == FREE_TIER_KEY {
            return Ok(Caller::with_key(Tier::Free, token));
        }
        if token.starts_with(PREMIUM_PREFIX) {
            return Ok(Caller::with_key(Tier::Premium, token));
        }
        if token.starts_with(PRO_PREFIX) {
            return Ok(Caller::with_key(Tier::Pro, token));
        }
        let mut caller = Caller::with_key(Tier::Standard, token);
        if let Some(record) = store.find_api_key(token).await {
            caller.user_id = Some(record.user_id);
        }
        Ok(caller)
    }

    /// Resolves the caller from the `Authorization` header. Requests without a
    /// bearer token are anonymous free-tier callers unless a key is required.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        store: &dyn IdentityStore,
        require_key: bool,
    ) -> Result<Caller, AuthError> {
        let token = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());
        match token {
            Some(token) => self.resolve(token, store).await,
            None if require_key => Err(AuthError::Missing),
            None => Ok(Caller::anonymous()),
        }
    }
}
