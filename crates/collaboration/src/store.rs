use crate::{Annotation, Category, Result, SignedVideoUrl, StatusUpdate, TaskStatus};

/// Access to the annotation store, the source of truth for tasks and
/// persisted segments.
#[async_trait::async_trait]
pub trait AnnotationStore: Send + Sync {
    /// Task catalog with current statuses.
    async fn fetch_tasks(&self) -> Result<Vec<Category>>;

    /// Every persisted annotation of every task.
    async fn fetch_annotations(&self) -> Result<Vec<Annotation>>;

    /// Append `annotations` in one transaction.
    async fn import_annotations(&self, annotations: &[Annotation]) -> Result<()>;

    /// Remove every persisted annotation of `task_id`.
    async fn delete_task_annotations(&self, task_id: &str) -> Result<()>;

    async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> Result<StatusUpdate>;

    /// Short-lived URL for the task's video.
    async fn signed_video_url(&self, task_id: &str) -> Result<SignedVideoUrl>;
}
