/// Signed, short-lived video URLs and the route that serves them
use std::path::{Component, Path as FsPath};

use axum::{
    extract::{Path, Query, Request, State},
    response::{IntoResponse, Response},
};
use hmac::{digest::InvalidLength, Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, warn};

use crate::{api::ApiError, AppState};

type HmacSha256 = Hmac<Sha256>;

/// Seconds a signed URL stays valid.
pub const SIGNED_URL_TTL_SECS: i64 = 180;

/// HMAC-SHA256 over `key`, a newline and `expires`. The expiry never contains
/// a newline, so the split between key and expiry is unambiguous.
pub struct UrlSigner {
    mac: HmacSha256,
}

impl UrlSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret.as_ref())?,
        })
    }

    /// Signer with a secret that lives as long as the process.
    pub fn random() -> Result<Self, InvalidLength> {
        Self::new(format!("{}{}", uuid::Uuid::new_v4(), uuid::Uuid::new_v4()))
    }

    fn keyed(&self, key: &str, expires: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(format!("{key}\n{expires}").as_bytes());
        mac
    }

    /// Lowercase hex tag for `key` valid until `expires`.
    pub fn signature(&self, key: &str, expires: i64) -> String {
        hex::encode(self.keyed(key, expires).finalize().into_bytes())
    }

    /// `/media/<key>?expires=..&signature=..`, valid from `now` for
    /// [`SIGNED_URL_TTL_SECS`].
    pub fn signed_path(&self, key: &str, now: i64) -> String {
        let expires = now + SIGNED_URL_TTL_SECS;
        format!(
            "/media/{}?expires={}&signature={}",
            key,
            expires,
            self.signature(key, expires)
        )
    }

    pub fn verify(&self, key: &str, expires: i64, signature: &str, now: i64) -> bool {
        if expires < now {
            return false;
        }
        let Ok(tag) = hex::decode(signature) else {
            return false;
        };
        self.keyed(key, expires).verify_slice(&tag).is_ok()
    }
}

#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    expires: Option<i64>,
    signature: Option<String>,
}

/// Only plain relative paths may address the video directory.
fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && FsPath::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// GET /media/*path - Stream a video file if the signature checks out
pub async fn serve_media(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<MediaQuery>,
    req: Request,
) -> Result<Response, ApiError> {
    let key = key.trim_start_matches('/');
    let now = chrono::Utc::now().timestamp();
    let (Some(expires), Some(signature)) = (query.expires, query.signature.as_deref()) else {
        return Err(ApiError::Forbidden);
    };
    if !state.signer.verify(key, expires, signature, now) {
        warn!("rejected media request for {}", key);
        return Err(ApiError::Forbidden);
    }
    if !is_safe_key(key) {
        return Err(ApiError::BadRequest(format!("invalid media path: {key}")));
    }

    let file = state.config.video_dir.join(key);
    debug!("serving {}", file.display());
    match ServeFile::new(file).oneshot(req).await {
        Ok(response) => Ok(response.into_response()),
        Err(never) => match never {},
    }
}
