use std::path::PathBuf;

use thiserror::Error;

mod db;
pub use db::*;

mod catalog;
pub use catalog::*;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid task catalog: {0}")]
    Catalog(#[from] serde_json::Error),

    #[error("annotation not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

pub fn app_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    base.join("gloss_annotator")
}

pub fn default_db_path() -> PathBuf {
    app_data_dir().join("annotations.sqlite3")
}
