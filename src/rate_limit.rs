use crate::app::AppState;
use crate::auth::{Caller, Tier};
use crate::config::RateLimitConfig;
use crate::error::AppError;
use crate::handlers::request_id;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

type KeyedLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;

/// One keyed limiter per tier, each allowing the tier's full budget as a
/// burst and refilling evenly across the window.
#[derive(Clone)]
pub struct TierRateLimiter {
    limiters: Arc<HashMap<Tier, KeyedLimiter>>,
}

impl TierRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let limiters = Tier::ALL
            .into_iter()
            .map(|tier| {
                let quota = tier_quota(config.limit_for(tier), config.window_secs);
                (tier, RateLimiter::dashmap(quota))
            })
            .collect();
        Self {
            limiters: Arc::new(limiters),
        }
    }

    /// Records one request for `key` under `tier`; on rejection returns how
    /// long the caller should wait.
    pub fn check(&self, tier: Tier, key: &str) -> Result<(), Duration> {
        let Some(limiter) = self.limiters.get(&tier) else {
            return Ok(());
        };
        limiter
            .check_key(&key.to_string())
            .map_err(|negative| negative.wait_time_from(DefaultClock::default().now()))
    }

    /// Drops keys whose budget has fully refilled, so idle clients stop
    /// holding memory.
    pub fn purge(&self) {
        for limiter in self.limiters.values() {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.limiters.values().map(|limiter| limiter.len()).sum()
    }

    /// Purges on a fixed interval until every clone of this limiter is gone.
    pub fn spawn_purge(&self, every: Duration) -> JoinHandle<()> {
        let limiters = Arc::downgrade(&self.limiters);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiters) = limiters.upgrade() else {
                    break;
                };
                let limiter = TierRateLimiter { limiters };
                let before = limiter.tracked_keys();
                limiter.purge();
                tracing::debug!(before, after = limiter.tracked_keys(), "rate limiter purged");
            }
        })
    }
}

fn tier_quota(limit: u32, window_secs: u64) -> Quota {
    let burst = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);
    let period = Duration::from_millis((window_secs * 1000) / u64::from(burst.get()))
        .max(Duration::from_millis(1));
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

fn client_key(request: &Request, caller: &Caller) -> String {
    if let Some(key) = &caller.api_key {
        return key.clone();
    }
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Authenticates the caller, charges the tier limiter and hands the resolved
/// [`Caller`] to the handler as a request extension.
pub async fn limit_generation(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let headers = request.headers().clone();
    let request_id = request_id(&headers);
    let caller = state
        .auth
        .authenticate(
            &headers,
            state.identity.as_ref(),
            state.runtime.require_api_key,
        )
        .await
        .map_err(|err| AppError::from(err).with_request_id(request_id.clone()))?;

    let key = client_key(&request, &caller);
    if let Err(wait) = state.rate_limiter.check(caller.tier, &key) {
        metrics::counter!("fortec_rate_limited_total", "tier" => caller.tier.as_str())
            .increment(1);
        tracing::info!(tier = caller.tier.as_str(), "rate limit exceeded");
        let retry_after = wait.as_secs_f64().ceil().max(1.0) as u64;
        return Err(AppError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            format!("{} tier rate limit exceeded", caller.tier.label()),
        )
        .with_request_id(request_id)
        .with_retry_after(retry_after));
    }

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(free: u32) -> RateLimitConfig {
        RateLimitConfig {
            free,
            ..RateLimitConfig::default()
        }
    }

    #[test]
    fn burst_matches_tier_limit() {
        let limiter = TierRateLimiter::new(&config(3));
        for _ in 0..3 {
            assert!(limiter.check(Tier::Free, "1.2.3.4").is_ok());
        }
        let wait = limiter.check(Tier::Free, "1.2.3.4").unwrap_err();
        assert!(wait > Duration::ZERO);
    }

    #[test]
    fn keys_and_tiers_are_isolated() {
        let limiter = TierRateLimiter::new(&config(1));
        assert!(limiter.check(Tier::Free, "a").is_ok());
        assert!(limiter.check(Tier::Free, "a").is_err());
        assert!(limiter.check(Tier::Free, "b").is_ok());
        assert!(limiter.check(Tier::Standard, "a").is_ok());
    }

    #[test]
    fn purge_drops_refilled_keys() {
        let limiter = TierRateLimiter::new(&RateLimitConfig {
            window_secs: 1,
            free: 1000,
            ..RateLimitConfig::default()
        });
        for n in 0..100 {
            assert!(limiter.check(Tier::Free, &format!("10.0.0.{n}")).is_ok());
        }
        assert_eq!(limiter.tracked_keys(), 100);

        std::thread::sleep(Duration::from_millis(50));
        limiter.purge();
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn purge_keeps_recently_charged_keys() {
        let limiter = TierRateLimiter::new(&config(3));
        assert!(limiter.check(Tier::Free, "a").is_ok());
        limiter.purge();
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn purge_task_stops_with_the_limiter() {
        let limiter = TierRateLimiter::new(&config(3));
        let task = limiter.spawn_purge(Duration::from_millis(5));
        drop(limiter);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("purge task should exit")
            .expect("purge task panicked");
    }

    #[test]
    fn zero_limit_still_admits_one_request() {
        let limiter = TierRateLimiter::new(&config(0));
        assert!(limiter.check(Tier::Free, "a").is_ok());
        assert!(limiter.check(Tier::Free, "a").is_err());
    }
}
