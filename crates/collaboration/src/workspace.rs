/// Per-task editing session on top of the annotation store
///
/// The workspace owns the editing set for the selected task, feeds it to the
/// timeline editor as plain data, and turns save/reset into ordered store calls.
/// Cross-client consistency comes from the push channel: every store mutation
/// is broadcast and each client answers with [`Workspace::refresh`].
use std::time::{Duration, Instant};

use thiserror::Error;
use timeline::{
    even_split, move_split, sorted_by_start, validate, EditorMessage, PointerEvent, Seconds,
    TimelineEditor, TimelineError, TimelineLayout,
};
use tracing::{debug, info, warn};

use crate::{
    all_tasks, Annotation, AnnotationStore, Category, CollaborationError, PushMessage, Task,
    TaskStatus,
};

/// Lifetime the store grants a signed video URL.
pub const VIDEO_URL_TTL: Duration = Duration::from_secs(180);
/// Re-request a signed URL this long before it would expire.
pub const VIDEO_URL_REFRESH_MARGIN: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("no task selected")]
    NoTaskSelected,

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("no unsaved changes")]
    NothingToSave,

    #[error("no segment {0}")]
    SegmentNotFound(usize),

    #[error(transparent)]
    Store(#[from] CollaborationError),

    #[error(transparent)]
    Timeline(#[from] TimelineError),
}

impl WorkspaceError {
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Store(e) if e.requires_login())
    }
}

pub type WorkspaceResult<T> = std::result::Result<T, WorkspaceError>;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Loading,
    Ready,
    /// Load failed; stays here until the next successful refresh.
    Failed(String),
    LoginRequired,
}

/// The two destructive actions behind "delete annotations".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmPrompt {
    /// Saved segments exist and will be destroyed.
    DeleteAnnotations,
    /// Nothing is saved; only the status goes back to pending.
    ResetStatus,
}

impl ConfirmPrompt {
    pub fn message(&self) -> &'static str {
        match self {
            Self::DeleteAnnotations => {
                "Delete every saved annotation of this task? The task goes back to \
                 pending and this cannot be undone."
            }
            Self::ResetStatus => "Reset this task's status to pending?",
        }
    }
}

/// Asks the user before a destructive action.
pub trait Confirm {
    fn confirm(&self, prompt: ConfirmPrompt) -> bool;
}

impl<F: Fn(ConfirmPrompt) -> bool> Confirm for F {
    fn confirm(&self, prompt: ConfirmPrompt) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Cancelled,
    StatusReset,
    AnnotationsDeleted,
}

/// Time range the player should run through, then pause.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayRange {
    pub start: Seconds,
    pub end: Seconds,
}

#[derive(Debug, Clone)]
struct CachedVideoUrl {
    url: String,
    fetched_at: Instant,
}

impl CachedVideoUrl {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) + VIDEO_URL_REFRESH_MARGIN < VIDEO_URL_TTL
    }
}

/// Editing state of the selected task.
#[derive(Debug)]
pub struct EditSession {
    task: Task,
    duration: Option<Seconds>,
    editing: Vec<Annotation>,
    /// `editing` mirrors segments the store holds.
    persisted: bool,
    dirty: bool,
    synthesis_checked: bool,
    pending_status: Option<TaskStatus>,
    layout_issue: Option<TimelineError>,
    editor: TimelineEditor,
    playhead: Seconds,
    playback: Option<PlayRange>,
    video_url: Option<CachedVideoUrl>,
}

impl EditSession {
    fn new(task: Task, saved: Vec<Annotation>, container_width: f32) -> Self {
        Self {
            task,
            duration: None,
            persisted: !saved.is_empty(),
            editing: saved,
            dirty: false,
            synthesis_checked: false,
            pending_status: None,
            layout_issue: None,
            editor: TimelineEditor::new(container_width),
            playhead: 0.0,
            playback: None,
            video_url: None,
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn duration(&self) -> Option<Seconds> {
        self.duration
    }

    pub fn segments(&self) -> &[Annotation] {
        &self.editing
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn playhead(&self) -> Seconds {
        self.playhead
    }

    pub fn layout(&self) -> Option<TimelineLayout> {
        self.editor.layout(&self.editing, self.duration)
    }

    /// Why the segments do not partition the video, if they don't.
    pub fn layout_issue(&self) -> Option<&TimelineError> {
        self.layout_issue.as_ref()
    }

    pub fn playback(&self) -> Option<PlayRange> {
        self.playback
    }

    /// The one-shot check that fills an empty editing set with an even split.
    /// Complete tasks are never synthesized over.
    fn check_synthesis(&mut self) {
        let Some(duration) = self.duration else {
            return;
        };
        if self.synthesis_checked {
            return;
        }
        self.synthesis_checked = true;

        if !self.editing.is_empty() || self.task.status == TaskStatus::Complete {
            return;
        }
        self.editing = even_split(&self.task.id, &self.task.glosses, duration);
        self.persisted = false;
        debug!(
            task = %self.task.id,
            segments = self.editing.len(),
            "synthesized default segments"
        );
    }

    /// Segments loaded from the store may come from another client or a file,
    /// so they are checked against this video before the editor trusts them.
    fn check_layout(&mut self) {
        let Some(duration) = self.duration else {
            return;
        };
        self.layout_issue = validate(&self.editing, duration).err();
        if let Some(issue) = &self.layout_issue {
            warn!(task = %self.task.id, "saved segments do not fit the video: {}", issue);
        }
    }

    fn adopt(&mut self, saved: Vec<Annotation>) {
        self.editing = saved;
        self.persisted = true;
        self.check_layout();
    }

    /// Drop the editing set and run the synthesis check again.
    fn resynthesize(&mut self) {
        self.editor.cancel();
        self.editing.clear();
        self.persisted = false;
        self.layout_issue = None;
        self.synthesis_checked = false;
        self.check_synthesis();
    }

    fn mark_edited(&mut self) {
        if self.dirty {
            return;
        }
        self.dirty = true;
        if self.task.status == TaskStatus::Pending {
            self.pending_status = Some(TaskStatus::Partial);
        }
    }
}

pub struct Workspace<S> {
    store: S,
    categories: Vec<Category>,
    annotations: Vec<Annotation>,
    state: LoadState,
    session: Option<EditSession>,
    container_width: f32,
}

impl<S: AnnotationStore> Workspace<S> {
    pub fn new(store: S, container_width: f32) -> Self {
        Self {
            store,
            categories: Vec::new(),
            annotations: Vec::new(),
            state: LoadState::Loading,
            session: None,
            container_width,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    pub fn find_task(&self, task_id: &str) -> Option<&Task> {
        all_tasks(&self.categories).find(|t| t.id == task_id)
    }

    /// Persisted segments of `task_id`, ordered by start time.
    pub fn saved_segments(&self, task_id: &str) -> Vec<Annotation> {
        sorted_by_start(
            self.annotations
                .iter()
                .filter(|a| a.task_id == task_id)
                .cloned()
                .collect(),
        )
    }

    pub fn set_container_width(&mut self, width: f32) {
        self.container_width = width;
        if let Some(session) = self.session.as_mut() {
            session.editor.set_container_width(width);
        }
    }

    /// Fetch the task list, then the annotation list.
    pub async fn refresh(&mut self) -> WorkspaceResult<()> {
        let result = self.load().await;
        match &result {
            Ok(()) => self.state = LoadState::Ready,
            Err(e) if e.requires_login() => self.state = LoadState::LoginRequired,
            Err(e) => {
                warn!("failed to load tasks: {}", e);
                self.state = LoadState::Failed(e.to_string());
            }
        }
        result
    }

    async fn load(&mut self) -> WorkspaceResult<()> {
        let categories = self.store.fetch_tasks().await?;
        let annotations = self.store.fetch_annotations().await?;
        self.categories = categories;
        self.annotations = annotations;

        let Some(task_id) = self.session.as_ref().map(|s| s.task.id.clone()) else {
            return Ok(());
        };
        let Some(task) = self.find_task(&task_id).cloned() else {
            info!(task = %task_id, "selected task disappeared from catalog");
            self.session = None;
            return Ok(());
        };
        let saved = self.saved_segments(&task_id);

        if let Some(session) = self.session.as_mut() {
            session.task = task;
            if !session.dirty && !session.editor.is_dragging() {
                if !saved.is_empty() {
                    session.adopt(saved);
                } else if session.persisted {
                    info!(task = %task_id, "saved segments removed elsewhere");
                    session.resynthesize();
                }
            }
        }
        Ok(())
    }

    /// React to a push-channel message.
    pub async fn handle_push(&mut self, message: PushMessage) -> WorkspaceResult<()> {
        match message {
            PushMessage::AnnotationsUpdated => {
                debug!("annotations updated elsewhere, refetching");
                self.refresh().await
            }
        }
    }

    /// Open `task_id` for editing, discarding the previous session and any
    /// drag in progress.
    pub fn select_task(&mut self, task_id: &str) -> WorkspaceResult<&EditSession> {
        let task = self
            .find_task(task_id)
            .cloned()
            .ok_or_else(|| WorkspaceError::TaskNotFound(task_id.to_string()))?;
        if let Some(old) = self.session.as_ref() {
            if old.dirty {
                info!(task = %old.task.id, "discarding unsaved edits");
            }
        }

        let saved = self.saved_segments(task_id);
        let session = EditSession::new(task, saved, self.container_width);
        Ok(self.session.insert(session))
    }

    /// The video player learned the duration of the current task's video.
    pub fn set_duration(&mut self, duration: Seconds) -> WorkspaceResult<()> {
        let session = self.session_mut()?;
        session.duration = (duration.is_finite() && duration > 0.0).then_some(duration);
        session.check_synthesis();
        session.check_layout();
        Ok(())
    }

    /// Feed one pointer event to the timeline editor. Returns the time the
    /// video should seek to, if any. Performs no I/O.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> Option<Seconds> {
        let session = self.session.as_mut()?;
        let messages = session
            .editor
            .handle_pointer(&session.editing, session.duration, event);

        let mut seek = None;
        for message in messages {
            match message {
                EditorMessage::SegmentsChanged(next) => {
                    session.editing = next;
                    session.mark_edited();
                }
                EditorMessage::Seek(time) => {
                    session.playhead = time;
                    session.playback = None;
                    seek = Some(time);
                }
            }
        }
        seek
    }

    /// Move split point `split` to exactly `time`, as a finished drag would:
    /// clamped to the neighbours, the first change marks the session edited.
    pub fn set_split(&mut self, split: usize, time: Seconds) -> WorkspaceResult<Seconds> {
        let session = self.session_mut()?;
        let next = move_split(&session.editing, split, time)?;
        let landed = next[split].end_time;
        if next != session.editing {
            session.editing = next;
            session.mark_edited();
        }
        session.playhead = landed;
        session.playback = None;
        Ok(landed)
    }

    /// Move the playhead, clamped to the video. Cancels segment playback.
    pub fn seek(&mut self, time: Seconds) -> WorkspaceResult<Seconds> {
        let session = self.session_mut()?;
        let upper = session.duration.unwrap_or(0.0);
        session.playhead = time.max(0.0).min(upper);
        session.playback = None;
        Ok(session.playhead)
    }

    /// Seek to the start of segment `index` and arm a stop at its end.
    pub fn play_segment(&mut self, index: usize) -> WorkspaceResult<PlayRange> {
        let range = {
            let segment = self
                .session_mut()?
                .editing
                .get(index)
                .ok_or(WorkspaceError::SegmentNotFound(index))?;
            PlayRange {
                start: segment.start_time,
                end: segment.end_time,
            }
        };
        self.seek(range.start)?;
        self.session_mut()?.playback = Some(range);
        Ok(range)
    }

    /// The player reports its clock. Returns `true` once an armed segment
    /// playback reaches its end and the player should pause there.
    pub fn advance_playhead(&mut self, time: Seconds) -> WorkspaceResult<bool> {
        let session = self.session_mut()?;
        match session.playback {
            Some(range) if time >= range.end => {
                session.playhead = range.end;
                session.playback = None;
                Ok(true)
            }
            _ => {
                session.playhead = time;
                Ok(false)
            }
        }
    }

    /// Send the status change queued by the first edit, if any.
    pub async fn flush_status(&mut self) -> WorkspaceResult<()> {
        let result = self.flush_status_inner().await;
        self.track(&result);
        result
    }

    async fn flush_status_inner(&mut self) -> WorkspaceResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let Some(status) = session.pending_status.take() else {
            return Ok(());
        };
        info!(task = %session.task.id, %status, "first edit, updating status");
        let update = self
            .store
            .update_task_status(&session.task.id, status)
            .await?;
        session.task.status = update.status;
        Ok(())
    }

    /// Replace the task's persisted segments with the editing set, then mark the
    /// task complete. Stops at the first failing call. Returns how many
    /// segments were saved.
    pub async fn save(&mut self) -> WorkspaceResult<usize> {
        let result = self.save_inner().await;
        self.track(&result);
        result
    }

    async fn save_inner(&mut self) -> WorkspaceResult<usize> {
        let session = self
            .session
            .as_mut()
            .ok_or(WorkspaceError::NoTaskSelected)?;
        if !session.dirty {
            return Err(WorkspaceError::NothingToSave);
        }

        let task_id = session.task.id.clone();
        let fresh: Vec<Annotation> = session
            .editing
            .iter()
            .map(|s| Annotation {
                task_id: task_id.clone(),
                ..s.with_new_id()
            })
            .collect();

        info!(task = %task_id, segments = fresh.len(), "saving annotations");
        self.store.delete_task_annotations(&task_id).await?;
        self.store.import_annotations(&fresh).await?;
        self.store
            .update_task_status(&task_id, TaskStatus::Complete)
            .await?;

        session.editing = fresh.clone();
        session.persisted = true;
        session.dirty = false;
        session.pending_status = None;
        session.task.status = TaskStatus::Complete;

        self.annotations.retain(|a| a.task_id != task_id);
        self.annotations.extend(fresh);
        Ok(session.editing.len())
    }

    /// Delete the task's saved segments (if any) and put it back to pending,
    /// after asking `confirm`.
    pub async fn reset(&mut self, confirm: &dyn Confirm) -> WorkspaceResult<ResetOutcome> {
        let result = self.reset_inner(confirm).await;
        self.track(&result);
        result
    }

    async fn reset_inner(&mut self, confirm: &dyn Confirm) -> WorkspaceResult<ResetOutcome> {
        let task_id = self
            .session
            .as_ref()
            .map(|s| s.task.id.clone())
            .ok_or(WorkspaceError::NoTaskSelected)?;
        let has_saved = self.annotations.iter().any(|a| a.task_id == task_id);

        let prompt = if has_saved {
            ConfirmPrompt::DeleteAnnotations
        } else {
            ConfirmPrompt::ResetStatus
        };
        if !confirm.confirm(prompt) {
            return Ok(ResetOutcome::Cancelled);
        }

        if has_saved {
            info!(task = %task_id, "deleting saved annotations");
            self.store.delete_task_annotations(&task_id).await?;
        }
        self.store
            .update_task_status(&task_id, TaskStatus::Pending)
            .await?;

        self.annotations.retain(|a| a.task_id != task_id);
        if let Some(session) = self.session.as_mut() {
            session.task.status = TaskStatus::Pending;
            session.dirty = false;
            session.pending_status = None;
            session.resynthesize();
        }

        Ok(if has_saved {
            ResetOutcome::AnnotationsDeleted
        } else {
            ResetOutcome::StatusReset
        })
    }

    /// Signed URL of the current task's video, re-requested once the cached
    /// one is about to expire.
    pub async fn video_url(&mut self) -> WorkspaceResult<String> {
        let result = self.video_url_inner().await;
        self.track(&result);
        result
    }

    async fn video_url_inner(&mut self) -> WorkspaceResult<String> {
        let session = self
            .session
            .as_mut()
            .ok_or(WorkspaceError::NoTaskSelected)?;
        if let Some(cached) = &session.video_url {
            if cached.is_fresh(Instant::now()) {
                return Ok(cached.url.clone());
            }
        }

        let signed = self.store.signed_video_url(&session.task.id).await?;
        session.video_url = Some(CachedVideoUrl {
            url: signed.url.clone(),
            fetched_at: Instant::now(),
        });
        Ok(signed.url)
    }

    fn session_mut(&mut self) -> WorkspaceResult<&mut EditSession> {
        self.session.as_mut().ok_or(WorkspaceError::NoTaskSelected)
    }

    fn track<T>(&mut self, result: &WorkspaceResult<T>) {
        if let Err(e) = result {
            if e.requires_login() {
                self.state = LoadState::LoginRequired;
            }
        }
    }
}
