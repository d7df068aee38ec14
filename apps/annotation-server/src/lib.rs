//! Gloss Annotation Server
//! Task catalog, annotation storage, change push channel and signed video URLs
pub mod api;
pub mod auth;
pub mod config;
pub mod media;
pub mod push;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use protocol::PushMessage;
use parking_lot::Mutex;
use store::{AnnotationDb, TaskCatalog};
use tokio::sync::broadcast;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

pub use auth::TokenStore;
pub use config::ServerConfig;
pub use media::UrlSigner;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<AnnotationDb>>,
    pub catalog: Arc<TaskCatalog>,
    pub tokens: Arc<TokenStore>,
    pub signer: Arc<UrlSigner>,
    pub events: broadcast::Sender<PushMessage>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        db: AnnotationDb,
        catalog: TaskCatalog,
    ) -> anyhow::Result<Self> {
        let (events, _) = broadcast::channel(1000);
        let signer = match &config.signing_secret {
            Some(secret) => UrlSigner::new(secret)?,
            None => {
                warn!("no signing secret configured, signed URLs will not survive a restart");
                UrlSigner::random()?
            }
        };
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            catalog: Arc::new(catalog),
            tokens: Arc::new(TokenStore::new(config.token_ttl())),
            signer: Arc::new(signer),
            events,
            config: Arc::new(config),
        })
    }

    /// Open the database and load the task catalog named by `config`.
    pub fn open(config: ServerConfig) -> anyhow::Result<Self> {
        let db_path = config.db_path();
        let db = AnnotationDb::open_or_create(&db_path)?;
        info!("Database at: {}", db_path.display());
        let catalog = TaskCatalog::load(&config.tasks)?;
        Self::new(config, db, catalog)
    }

    /// Tell every push subscriber to refetch.
    pub fn notify(&self) {
        match self.events.send(PushMessage::AnnotationsUpdated) {
            Ok(n) => debug!("notified {} push subscribers", n),
            Err(_) => debug!("no push subscribers to notify"),
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim()) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/tasks", get(api::list_tasks))
        .route(
            "/annotations",
            get(api::list_annotations).post(api::create_annotation),
        )
        .route("/annotations/import", post(api::import_annotations))
        .route(
            "/annotations/:id",
            put(api::update_annotation).delete(api::delete_annotation),
        )
        .route(
            "/tasks/:task_id/annotations",
            delete(api::delete_task_annotations),
        )
        .route("/tasks/:task_id/status", put(api::update_task_status))
        .route("/signed-video-url/:task_id", get(api::signed_video_url))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ));

    let api_routes = Router::new()
        .route("/login", post(api::login))
        .route("/ws", get(push::ws_handler))
        .merge(protected);

    let mut app = Router::new()
        .nest("/api", api_routes)
        .route("/media/*path", get(media::serve_media));

    if let Some(dir) = &state.config.static_dir {
        info!("Serving frontend from: {}", dir.display());
        app = app.fallback_service(
            ServeDir::new(dir).not_found_service(ServeFile::new(dir.join("index.html"))),
        );
    }

    app.layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.allowed_origins))
        .with_state(state)
}
