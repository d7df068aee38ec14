use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "annotation-server")]
#[command(about = "Shared store for gloss annotations: REST API, push channel and signed video URLs")]
#[command(version)]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "GLOSS_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    /// Shared password every annotator logs in with
    #[arg(long, env = "GLOSS_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// SQLite database file (defaults to the platform data dir)
    #[arg(long, env = "GLOSS_DB")]
    pub db: Option<PathBuf>,

    /// JSON file listing task categories
    #[arg(long, env = "GLOSS_TASKS", default_value = "tasks.json")]
    pub tasks: PathBuf,

    /// Directory holding the task videos
    #[arg(long, env = "GLOSS_VIDEO_DIR", default_value = "videos")]
    pub video_dir: PathBuf,

    /// Secret for signing video URLs (random per process if unset)
    #[arg(long, env = "GLOSS_SIGNING_SECRET", hide_env_values = true)]
    pub signing_secret: Option<String>,

    /// Base URL clients reach this server at, used in signed video URLs
    #[arg(long, env = "GLOSS_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Comma-separated CORS origins
    #[arg(
        long,
        env = "GLOSS_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:5173"
    )]
    pub allowed_origins: Vec<String>,

    /// Built frontend to serve for non-API paths
    #[arg(long, env = "GLOSS_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// Lifetime of login tokens in seconds
    #[arg(long, env = "GLOSS_TOKEN_TTL", default_value_t = 12 * 60 * 60)]
    pub token_ttl_secs: u64,
}

impl ServerConfig {
    /// Defaults for everything but the password, for embedding the server.
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3001,
            password: password.into(),
            db: None,
            tasks: PathBuf::from("tasks.json"),
            video_dir: PathBuf::from("videos"),
            signing_secret: None,
            public_url: None,
            allowed_origins: vec!["http://localhost:5173".to_string()],
            static_dir: None,
            token_ttl_secs: 12 * 60 * 60,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn public_base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.port),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.db.clone().unwrap_or_else(store::default_db_path)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}
