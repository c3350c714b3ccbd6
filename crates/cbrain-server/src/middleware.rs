use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::ApiError;

/// Request id carried as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Bearer keys accepted by the job API.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<HashSet<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Reads `CBRAIN_API_KEYS` (comma-separated bearer tokens).
    ///
    /// Missing keys disable auth in development and fail startup elsewhere.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        Self::from_keys(
            &std::env::var("CBRAIN_API_KEYS").unwrap_or_default(),
            is_development,
        )
    }

    pub fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let keys: HashSet<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        if keys.is_empty() {
            if !is_development {
                anyhow::bail!("CBRAIN_API_KEYS is required outside development");
            }
            tracing::warn!("CBRAIN_API_KEYS not set; bearer auth disabled in development");
        }

        Ok(Self {
            enabled: !keys.is_empty(),
            api_keys: Arc::new(keys),
        })
    }

    fn allows(&self, token: &str) -> bool {
        self.api_keys.contains(token)
    }
}

#[derive(Debug)]
struct Window {
    started_at: Instant,
    count: usize,
}

/// Fixed-window request limiter shared by every protected route.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    state: Arc<Mutex<Window>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Arc::new(Mutex::new(Window {
                started_at: Instant::now(),
                count: 0,
            })),
        }
    }

    /// Count one request at `now`; `false` once the window is full.
    async fn try_acquire(&self, now: Instant) -> bool {
        let mut window = self.state.lock().await;
        if now.saturating_duration_since(window.started_at) >= self.window {
            window.started_at = now;
            window.count = 0;
        }
        if window.count >= self.max_requests {
            return false;
        }
        window.count += 1;
        true
    }
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map_or_else(String::new, |id| id.0.clone())
}

/// Propagates `x-request-id`, generating a `UUIDv4` when the caller sent none.
/// The id is stored as a [`RequestId`] extension and echoed on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }
    res
}

pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    match extract_bearer_token(req.headers().get(AUTHORIZATION)) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => ApiError::new(
            request_id_of(&req),
            "unauthorized",
            "missing or invalid bearer token",
        )
        .into_response(),
    }
}

pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    if rate_limit.try_acquire(Instant::now()).await {
        next.run(req).await
    } else {
        ApiError::new(request_id_of(&req), "rate_limited", "rate limit exceeded").into_response()
    }
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
