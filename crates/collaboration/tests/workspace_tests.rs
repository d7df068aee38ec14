/// Workspace behaviour against an in-memory store
/// Save ordering, first-edit status, synthesis and reset confirmation
use std::sync::Arc;

use async_trait::async_trait;
use collaboration::*;
use parking_lot::Mutex;
use timeline::{PointerEvent, Segment};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    FetchTasks,
    FetchAnnotations,
    Import(Vec<Annotation>),
    DeleteTask(String),
    Status(String, TaskStatus),
    SignedUrl(String),
}

#[derive(Default)]
struct MockState {
    categories: Vec<Category>,
    annotations: Vec<Annotation>,
    calls: Vec<Call>,
    fail_import: bool,
    fail_fetch: bool,
    unauthorized: bool,
}

#[derive(Clone, Default)]
struct MockStore {
    state: Arc<Mutex<MockState>>,
}

impl MockStore {
    fn with_tasks(tasks: Vec<Task>) -> Self {
        let store = Self::default();
        store.state.lock().categories = vec![Category {
            category_name: "Daily".into(),
            tasks,
        }];
        store
    }

    fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Calls made after the initial refresh.
    fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::FetchTasks | Call::FetchAnnotations))
            .collect()
    }

    fn check(&self) -> Result<()> {
        if self.state.lock().unauthorized {
            return Err(CollaborationError::Unauthorized);
        }
        Ok(())
    }
}

#[async_trait]
impl AnnotationStore for MockStore {
    async fn fetch_tasks(&self) -> Result<Vec<Category>> {
        self.check()?;
        let mut state = self.state.lock();
        state.calls.push(Call::FetchTasks);
        if state.fail_fetch {
            return Err(CollaborationError::NetworkError("connection refused".into()));
        }
        Ok(state.categories.clone())
    }

    async fn fetch_annotations(&self) -> Result<Vec<Annotation>> {
        self.check()?;
        let mut state = self.state.lock();
        state.calls.push(Call::FetchAnnotations);
        Ok(state.annotations.clone())
    }

    async fn import_annotations(&self, annotations: &[Annotation]) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock();
        state.calls.push(Call::Import(annotations.to_vec()));
        if state.fail_import {
            return Err(CollaborationError::HttpError {
                status: 500,
                message: "disk full".into(),
            });
        }
        state.annotations.extend_from_slice(annotations);
        Ok(())
    }

    async fn delete_task_annotations(&self, task_id: &str) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock();
        state.calls.push(Call::DeleteTask(task_id.to_string()));
        state.annotations.retain(|a| a.task_id != task_id);
        Ok(())
    }

    async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> Result<StatusUpdate> {
        self.check()?;
        let mut state = self.state.lock();
        state.calls.push(Call::Status(task_id.to_string(), status));
        for task in state.categories.iter_mut().flat_map(|c| c.tasks.iter_mut()) {
            if task.id == task_id {
                task.status = status;
            }
        }
        Ok(StatusUpdate {
            task_id: task_id.to_string(),
            status,
        })
    }

    async fn signed_video_url(&self, task_id: &str) -> Result<SignedVideoUrl> {
        self.check()?;
        let mut state = self.state.lock();
        state.calls.push(Call::SignedUrl(task_id.to_string()));
        Ok(SignedVideoUrl {
            url: format!("http://media/{task_id}.mp4?expires=1&signature=x"),
        })
    }
}

fn task(id: &str, glosses: &[&str], status: TaskStatus) -> Task {
    Task {
        id: id.into(),
        video: format!("daily/{id}.mp4"),
        glosses: glosses.iter().map(|g| g.to_string()).collect(),
        status,
    }
}

/// Three glosses over 9 s in a 900 px container: 100 px per second,
/// handles at x = 300 and x = 600.
async fn ready_workspace(store: MockStore) -> Workspace<MockStore> {
    let mut ws = Workspace::new(store, 900.0);
    ws.refresh().await.unwrap();
    ws.select_task("t1").unwrap();
    ws.set_duration(9.0).unwrap();
    ws
}

fn drag(ws: &mut Workspace<MockStore>, from: f32, to: f32) {
    ws.handle_pointer(PointerEvent::Down { x: from });
    ws.handle_pointer(PointerEvent::Move { x: to });
    ws.handle_pointer(PointerEvent::Up);
}

#[tokio::test]
async fn test_refresh_loads_tasks_then_annotations() {
    let store = MockStore::with_tasks(vec![task("t1", &["A"], TaskStatus::Pending)]);
    let mut ws = Workspace::new(store.clone(), 600.0);
    assert_eq!(ws.state(), &LoadState::Loading);

    ws.refresh().await.unwrap();
    assert_eq!(ws.state(), &LoadState::Ready);
    assert_eq!(store.calls(), vec![Call::FetchTasks, Call::FetchAnnotations]);
    assert!(ws.find_task("t1").is_some());
}

#[tokio::test]
async fn test_refresh_failure_is_reported() {
    let store = MockStore::with_tasks(vec![]);
    store.state.lock().fail_fetch = true;
    let mut ws = Workspace::new(store, 600.0);

    assert!(ws.refresh().await.is_err());
    assert!(matches!(ws.state(), LoadState::Failed(msg) if msg.contains("connection refused")));
}

#[tokio::test]
async fn test_synthesizes_even_split_once() {
    let store = MockStore::with_tasks(vec![task("t1", &["A", "B", "C"], TaskStatus::Pending)]);
    let mut ws = ready_workspace(store.clone()).await;

    let session = ws.session().unwrap();
    let ends: Vec<f64> = session.segments().iter().map(|s| s.end_time).collect();
    assert_eq!(ends, vec![3.0, 6.0, 9.0]);
    assert!(!session.is_dirty());

    // A second duration report does not re-synthesize.
    let ids: Vec<_> = session.segments().iter().map(|s| s.id).collect();
    ws.set_duration(9.0).unwrap();
    let again: Vec<_> = ws.session().unwrap().segments().iter().map(|s| s.id).collect();
    assert_eq!(ids, again);

    assert!(store.mutations().is_empty());
}

#[tokio::test]
async fn test_complete_task_is_not_synthesized() {
    let store = MockStore::with_tasks(vec![task("t1", &["A", "B"], TaskStatus::Complete)]);
    let ws = ready_workspace(store).await;
    assert!(ws.session().unwrap().segments().is_empty());
}

#[tokio::test]
async fn test_saved_annotations_are_loaded_in_start_order() {
    let store = MockStore::with_tasks(vec![task("t1", &["A", "B"], TaskStatus::Complete)]);
    store.state.lock().annotations = vec![
        Segment::new("t1", "B", 4.0, 9.0),
        Segment::new("t1", "A", 0.0, 4.0),
        Segment::new("t2", "Z", 0.0, 1.0),
    ];
    let ws = ready_workspace(store).await;

    let labels: Vec<&str> = ws
        .session()
        .unwrap()
        .segments()
        .iter()
        .map(|s| s.label.as_str())
        .collect();
    assert_eq!(labels, vec!["A", "B"]);
}

#[tokio::test]
async fn test_first_drag_queues_partial_once() {
    let store = MockStore::with_tasks(vec![task("t1", &["A", "B", "C"], TaskStatus::Pending)]);
    let mut ws = ready_workspace(store.clone()).await;

    ws.handle_pointer(PointerEvent::Down { x: 300.0 });
    let seek = ws.handle_pointer(PointerEvent::Move { x: 400.0 });
    assert_eq!(seek, Some(4.0));
    let seek = ws.handle_pointer(PointerEvent::Move { x: 450.0 });
    assert_eq!(seek, Some(4.5));
    ws.handle_pointer(PointerEvent::Up);

    // Dragging itself performs no store calls.
    assert!(store.mutations().is_empty());

    ws.flush_status().await.unwrap();
    drag(&mut ws, 600.0, 500.0);
    ws.flush_status().await.unwrap();

    assert_eq!(
        store.mutations(),
        vec![Call::Status("t1".into(), TaskStatus::Partial)]
    );
    let session = ws.session().unwrap();
    assert!(session.is_dirty());
    assert_eq!(session.segments()[0].end_time, 4.5);
    assert_eq!(session.segments()[1].end_time, 5.0);
}

#[tokio::test]
async fn test_save_replaces_then_completes() {
    let store = MockStore::with_tasks(vec![task("t1", &["A", "B", "C"], TaskStatus::Pending)]);
    let mut ws = ready_workspace(store.clone()).await;
    let before: Vec<_> = ws.session().unwrap().segments().iter().map(|s| s.id).collect();

    drag(&mut ws, 300.0, 200.0);
    let saved = ws.save().await.unwrap();
    assert_eq!(saved, 3);

    let calls = store.mutations();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], Call::DeleteTask("t1".into()));
    let Call::Import(imported) = &calls[1] else {
        panic!("expected import, got {:?}", calls[1]);
    };
    assert_eq!(imported.len(), 3);
    assert!(imported.iter().all(|a| a.task_id == "t1"));
    assert!(imported.iter().all(|a| !before.contains(&a.id)));
    assert_eq!(imported[0].end_time, 2.0);
    assert_eq!(calls[2], Call::Status("t1".into(), TaskStatus::Complete));

    let session = ws.session().unwrap();
    assert!(!session.is_dirty());
    assert_eq!(session.task().status, TaskStatus::Complete);
    assert_eq!(ws.saved_segments("t1").len(), 3);
}

#[tokio::test]
async fn test_save_stops_at_first_failure() {
    let store = MockStore::with_tasks(vec![task("t1", &["A", "B"], TaskStatus::Partial)]);
    store.state.lock().fail_import = true;
    let mut ws = ready_workspace(store.clone()).await;

    drag(&mut ws, 450.0, 300.0);
    let err = ws.save().await.unwrap_err();
    assert!(matches!(
        err,
        WorkspaceError::Store(CollaborationError::HttpError { status: 500, .. })
    ));

    let calls = store.mutations();
    assert_eq!(calls.len(), 2);
    assert!(!calls
        .iter()
        .any(|c| matches!(c, Call::Status(_, TaskStatus::Complete))));
    assert!(ws.session().unwrap().is_dirty());
}

#[tokio::test]
async fn test_save_without_edits_is_rejected() {
    let store = MockStore::with_tasks(vec![task("t1", &["A"], TaskStatus::Pending)]);
    let mut ws = ready_workspace(store.clone()).await;
    assert!(matches!(ws.save().await, Err(WorkspaceError::NothingToSave)));
    assert!(store.mutations().is_empty());
}

#[tokio::test]
async fn test_reset_prompts_depend_on_saved_data() {
    let store = MockStore::with_tasks(vec![task("t1", &["A", "B"], TaskStatus::Partial)]);
    let mut ws = ready_workspace(store.clone()).await;

    let seen = Mutex::new(Vec::new());
    let record = |prompt: ConfirmPrompt| {
        seen.lock().push(prompt);
        true
    };

    let outcome = ws.reset(&record).await.unwrap();
    assert_eq!(outcome, ResetOutcome::StatusReset);
    assert_eq!(
        store.mutations(),
        vec![Call::Status("t1".into(), TaskStatus::Pending)]
    );

    drag(&mut ws, 450.0, 300.0);
    ws.save().await.unwrap();
    let outcome = ws.reset(&record).await.unwrap();
    assert_eq!(outcome, ResetOutcome::AnnotationsDeleted);

    assert_eq!(
        *seen.lock(),
        vec![ConfirmPrompt::ResetStatus, ConfirmPrompt::DeleteAnnotations]
    );
    let tail: Vec<Call> = store.mutations().into_iter().rev().take(2).collect();
    assert_eq!(
        tail,
        vec![
            Call::Status("t1".into(), TaskStatus::Pending),
            Call::DeleteTask("t1".into()),
        ]
    );
    assert!(ws.saved_segments("t1").is_empty());
    // Back to pending with nothing saved: the default split reappears.
    assert_eq!(ws.session().unwrap().segments().len(), 2);
}

#[tokio::test]
async fn test_declined_reset_makes_no_calls() {
    let store = MockStore::with_tasks(vec![task("t1", &["A"], TaskStatus::Partial)]);
    let mut ws = ready_workspace(store.clone()).await;

    let outcome = ws.reset(&|_: ConfirmPrompt| false).await.unwrap();
    assert_eq!(outcome, ResetOutcome::Cancelled);
    assert!(store.mutations().is_empty());
}

#[tokio::test]
async fn test_rejected_token_requires_login() {
    let store = MockStore::with_tasks(vec![task("t1", &["A", "B"], TaskStatus::Pending)]);
    let mut ws = ready_workspace(store.clone()).await;
    drag(&mut ws, 450.0, 300.0);

    store.state.lock().unauthorized = true;
    let err = ws.save().await.unwrap_err();
    assert!(err.requires_login());
    assert_eq!(ws.state(), &LoadState::LoginRequired);
}

#[tokio::test]
async fn test_video_url_is_cached() {
    let store = MockStore::with_tasks(vec![task("t1", &["A"], TaskStatus::Pending)]);
    let mut ws = ready_workspace(store.clone()).await;

    let first = ws.video_url().await.unwrap();
    let second = ws.video_url().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(store.mutations(), vec![Call::SignedUrl("t1".into())]);
}

#[tokio::test]
async fn test_push_triggers_refetch() {
    let store = MockStore::with_tasks(vec![task("t1", &["A", "B"], TaskStatus::Pending)]);
    let mut ws = ready_workspace(store.clone()).await;

    store.state.lock().annotations = vec![
        Segment::new("t1", "A", 0.0, 2.0),
        Segment::new("t1", "B", 2.0, 9.0),
    ];
    ws.handle_push(PushMessage::AnnotationsUpdated).await.unwrap();

    assert_eq!(ws.annotations().len(), 2);
    // The open session had no local edits, so it follows the store.
    assert_eq!(ws.session().unwrap().segments()[0].end_time, 2.0);
}

#[tokio::test]
async fn test_select_unknown_task() {
    let store = MockStore::with_tasks(vec![]);
    let mut ws = Workspace::new(store, 600.0);
    ws.refresh().await.unwrap();
    assert!(matches!(
        ws.select_task("nope"),
        Err(WorkspaceError::TaskNotFound(_))
    ));
}

fn bounds(ws: &Workspace<MockStore>) -> Vec<(f64, f64)> {
    ws.session()
        .unwrap()
        .segments()
        .iter()
        .map(|s| (s.start_time, s.end_time))
        .collect()
}

#[tokio::test]
async fn test_remote_reset_resynthesizes_clean_session() {
    let store = MockStore::with_tasks(vec![task("t1", &["A", "B"], TaskStatus::Complete)]);
    store.state.lock().annotations = vec![
        Segment::new("t1", "A", 0.0, 2.0),
        Segment::new("t1", "B", 2.0, 9.0),
    ];
    let mut ws = ready_workspace(store.clone()).await;
    assert_eq!(bounds(&ws), vec![(0.0, 2.0), (2.0, 9.0)]);

    // Another annotator deletes the segments and puts the task back to pending.
    {
        let mut state = store.state.lock();
        state.annotations.clear();
        state.categories[0].tasks[0].status = TaskStatus::Pending;
    }
    ws.handle_push(PushMessage::AnnotationsUpdated).await.unwrap();

    let session = ws.session().unwrap();
    assert_eq!(session.task().status, TaskStatus::Pending);
    assert!(!session.is_dirty());
    assert_eq!(bounds(&ws), vec![(0.0, 4.5), (4.5, 9.0)]);
    assert!(store.mutations().is_empty());
}

#[tokio::test]
async fn test_remote_reset_keeps_local_edits() {
    let store = MockStore::with_tasks(vec![task("t1", &["A", "B"], TaskStatus::Partial)]);
    store.state.lock().annotations = vec![
        Segment::new("t1", "A", 0.0, 2.0),
        Segment::new("t1", "B", 2.0, 9.0),
    ];
    let mut ws = ready_workspace(store.clone()).await;
    drag(&mut ws, 200.0, 300.0);

    store.state.lock().annotations.clear();
    ws.handle_push(PushMessage::AnnotationsUpdated).await.unwrap();

    assert!(ws.session().unwrap().is_dirty());
    assert_eq!(bounds(&ws), vec![(0.0, 3.0), (3.0, 9.0)]);
}

#[tokio::test]
async fn test_completed_elsewhere_before_duration_is_not_synthesized() {
    let store = MockStore::with_tasks(vec![task("t1", &["A", "B", "C"], TaskStatus::Pending)]);
    let mut ws = Workspace::new(store.clone(), 900.0);
    ws.refresh().await.unwrap();
    ws.select_task("t1").unwrap();

    // The task is marked complete by someone else while the video is still loading.
    store.state.lock().categories[0].tasks[0].status = TaskStatus::Complete;
    ws.handle_push(PushMessage::AnnotationsUpdated).await.unwrap();
    assert_eq!(ws.session().unwrap().task().status, TaskStatus::Complete);

    ws.set_duration(9.0).unwrap();
    assert!(ws.session().unwrap().segments().is_empty());
    ws.set_duration(9.0).unwrap();
    assert!(ws.session().unwrap().segments().is_empty());
    assert!(store.mutations().is_empty());
}

#[tokio::test]
async fn test_set_split_lands_on_requested_time() {
    let store = MockStore::with_tasks(vec![task("t1", &["A", "B", "C"], TaskStatus::Pending)]);
    let mut ws = ready_workspace(store.clone()).await;

    assert_eq!(ws.set_split(0, 2.0).unwrap(), 2.0);
    assert_eq!(ws.set_split(1, 20.0).unwrap(), 9.0);
    assert_eq!(bounds(&ws), vec![(0.0, 2.0), (2.0, 9.0), (9.0, 9.0)]);
    assert_eq!(ws.session().unwrap().playhead(), 9.0);
    assert!(matches!(
        ws.set_split(2, 1.0),
        Err(WorkspaceError::Timeline(_))
    ));

    ws.flush_status().await.unwrap();
    assert_eq!(
        store.mutations(),
        vec![Call::Status("t1".into(), TaskStatus::Partial)]
    );
}

#[tokio::test]
async fn test_play_segment_stops_at_its_end() {
    let store = MockStore::with_tasks(vec![task("t1", &["A", "B", "C"], TaskStatus::Pending)]);
    let mut ws = ready_workspace(store).await;

    let range = ws.play_segment(1).unwrap();
    assert_eq!(range, PlayRange { start: 3.0, end: 6.0 });
    assert_eq!(ws.session().unwrap().playhead(), 3.0);

    assert!(!ws.advance_playhead(4.5).unwrap());
    assert_eq!(ws.session().unwrap().playhead(), 4.5);
    assert!(ws.advance_playhead(6.04).unwrap());
    assert_eq!(ws.session().unwrap().playhead(), 6.0);
    assert!(ws.session().unwrap().playback().is_none());
    assert!(!ws.advance_playhead(7.0).unwrap());

    // A seek abandons the range.
    ws.play_segment(0).unwrap();
    ws.seek(5.0).unwrap();
    assert!(!ws.advance_playhead(8.0).unwrap());

    assert!(matches!(
        ws.play_segment(3),
        Err(WorkspaceError::SegmentNotFound(3))
    ));
}

#[tokio::test]
async fn test_saved_layout_is_checked_against_duration() {
    let store = MockStore::with_tasks(vec![task("t1", &["A", "B"], TaskStatus::Complete)]);
    store.state.lock().annotations = vec![
        Segment::new("t1", "A", 0.0, 2.0),
        Segment::new("t1", "B", 3.0, 9.0),
    ];
    let ws = ready_workspace(store).await;
    assert!(matches!(
        ws.session().unwrap().layout_issue(),
        Some(timeline::TimelineError::InvalidLayout(_))
    ));

    let store = MockStore::with_tasks(vec![task("t1", &["A", "B"], TaskStatus::Complete)]);
    store.state.lock().annotations = vec![
        Segment::new("t1", "A", 0.0, 3.0),
        Segment::new("t1", "B", 3.0, 9.0),
    ];
    let ws = ready_workspace(store).await;
    assert!(ws.session().unwrap().layout_issue().is_none());
}

#[tokio::test]
async fn test_container_width_rescales_handles() {
    let store = MockStore::with_tasks(vec![task("t1", &["A", "B", "C"], TaskStatus::Pending)]);
    let mut ws = ready_workspace(store).await;

    ws.set_container_width(450.0);
    let layout = ws.session().unwrap().layout().unwrap();
    let xs: Vec<f32> = layout.handles.iter().map(|h| h.x).collect();
    assert_eq!(xs, vec![150.0, 300.0]);
}
