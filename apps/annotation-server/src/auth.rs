/// Shared-password login and bearer-token checks
use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{api::ApiError, AppState};

/// Tokens handed out by `/api/login`, kept in memory until they expire.
pub struct TokenStore {
    ttl: Duration,
    tokens: Mutex<HashMap<String, Instant>>,
}

impl TokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn issue(&self) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let now = Instant::now();
        let mut tokens = self.tokens.lock();
        tokens.retain(|_, expires| *expires > now);
        tokens.insert(token.clone(), now + self.ttl);
        token
    }

    pub fn is_valid(&self, token: &str) -> bool {
        let mut tokens = self.tokens.lock();
        match tokens.get(token) {
            Some(expires) if *expires > Instant::now() => true,
            Some(_) => {
                debug!("token expired");
                tokens.remove(token);
                false
            }
            None => false,
        }
    }

    pub fn revoke(&self, token: &str) {
        self.tokens.lock().remove(token);
    }
}

pub fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Rejects requests without a live bearer token.
pub async fn require_token(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorized = bearer_token(&req).is_some_and(|token| state.tokens.is_valid(token));
    if !authorized {
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(req).await)
}
