use thiserror::Error;

mod segments;
pub use segments::*;
mod editor;
pub use editor::*;
mod render;
pub use render::*;

#[derive(Debug, Error, PartialEq)]
pub enum TimelineError {
    #[error("split index {split} out of range for {segments} segments")]
    SplitOutOfRange { split: usize, segments: usize },
    #[error("invalid segment layout: {0}")]
    InvalidLayout(String),
}

pub type Result<T> = std::result::Result<T, TimelineError>;

/// Seconds on the video clock.
pub type Seconds = f64;
