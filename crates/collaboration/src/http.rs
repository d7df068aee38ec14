/// REST client for the annotation store
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{
    Annotation, AnnotationStore, Category, CollaborationError, LoginRequest, LoginResponse,
    Result, SignedVideoUrl, StatusRequest, StatusUpdate, TaskStatus,
};

/// Bearer-authenticated HTTP access to the store.
///
/// Any 401/403 discards the held token; callers must [`HttpStore::login`] again.
pub struct HttpStore {
    base_url: Url,
    client: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl HttpStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| CollaborationError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            base_url,
            client: reqwest::Client::new(),
            token: RwLock::new(None),
        })
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        *self.token.write() = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn clear_token(&self) {
        self.token.write().take();
    }

    /// Exchange the shared password for a token and keep it for later calls.
    pub async fn login(&self, password: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url("/api/login")?)
            .json(&LoginRequest {
                password: password.to_string(),
            })
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(CollaborationError::Unauthorized);
        }
        let LoginResponse { token } = Self::check(response).await?.json().await?;
        *self.token.write() = Some(token.clone());
        debug!("logged in to {}", self.base_url);
        Ok(token)
    }

    /// WebSocket address of the push channel, carrying the current token.
    pub fn push_url(&self) -> Result<String> {
        let mut url = self.url("/api/ws")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| CollaborationError::InvalidUrl(url.to_string()))?;
        if let Some(token) = self.token() {
            url.query_pairs_mut().append_pair("token", &token);
        }
        Ok(url.to_string())
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| CollaborationError::InvalidUrl(e.to_string()))
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match self.token.read().as_deref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let response = self.dispatch(req).await?;
        Ok(response.json().await?)
    }

    async fn send_empty(&self, req: RequestBuilder) -> Result<()> {
        self.dispatch(req).await.map(|_| ())
    }

    async fn dispatch(&self, req: RequestBuilder) -> Result<Response> {
        let response = self.authorized(req).send().await?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            warn!("store rejected token ({}), dropping it", response.status());
            self.clear_token();
            return Err(CollaborationError::Unauthorized);
        }
        Self::check(response).await
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(CollaborationError::HttpError {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl AnnotationStore for HttpStore {
    async fn fetch_tasks(&self) -> Result<Vec<Category>> {
        let req = self.client.get(self.url("/api/tasks")?);
        self.send_json(req).await
    }

    async fn fetch_annotations(&self) -> Result<Vec<Annotation>> {
        let req = self.client.get(self.url("/api/annotations")?);
        self.send_json(req).await
    }

    async fn import_annotations(&self, annotations: &[Annotation]) -> Result<()> {
        let req = self
            .client
            .post(self.url("/api/annotations/import")?)
            .json(annotations);
        self.send_empty(req).await
    }

    async fn delete_task_annotations(&self, task_id: &str) -> Result<()> {
        let req = self
            .client
            .delete(self.url(&format!("/api/tasks/{task_id}/annotations"))?);
        self.send_empty(req).await
    }

    async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> Result<StatusUpdate> {
        let req = self
            .client
            .put(self.url(&format!("/api/tasks/{task_id}/status"))?)
            .json(&StatusRequest { status });
        self.send_json(req).await
    }

    async fn signed_video_url(&self, task_id: &str) -> Result<SignedVideoUrl> {
        let req = self
            .client
            .get(self.url(&format!("/api/signed-video-url/{task_id}"))?);
        self.send_json(req).await
    }
}
