//! Ordered, contiguous partition of `[0, duration]` into labeled segments.
//!
//! A segment list is edited only through [`move_split`]: moving the boundary
//! shared by two neighbours can never open a gap or create an overlap.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, Seconds, TimelineError};

/// Float slack allowed when checking contiguity and bounds.
pub const TIME_EPSILON: Seconds = 1e-6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SegmentId(pub Uuid);

impl SegmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One labeled time range of a task's video. This is also the wire shape of
/// an annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: SegmentId,
    pub task_id: String,
    #[serde(rename = "gloss")]
    pub label: String,
    pub start_time: Seconds,
    pub end_time: Seconds,
}

impl Segment {
    pub fn new(
        task_id: impl Into<String>,
        label: impl Into<String>,
        start_time: Seconds,
        end_time: Seconds,
    ) -> Self {
        Self {
            id: SegmentId::new(),
            task_id: task_id.into(),
            label: label.into(),
            start_time,
            end_time,
        }
    }

    pub fn length(&self) -> Seconds {
        self.end_time - self.start_time
    }

    pub fn contains(&self, time: Seconds) -> bool {
        time >= self.start_time && time <= self.end_time
    }

    /// Same segment under a fresh identity.
    pub fn with_new_id(&self) -> Self {
        Self {
            id: SegmentId::new(),
            ..self.clone()
        }
    }
}

/// Even split of `[0, duration]` across `labels`, in label order.
///
/// Returns an empty list when there is nothing to split or no usable duration.
pub fn even_split<S: AsRef<str>>(task_id: &str, labels: &[S], duration: Seconds) -> Vec<Segment> {
    if labels.is_empty() || !duration.is_finite() || duration <= 0.0 {
        return Vec::new();
    }

    let n = labels.len();
    let step = duration / n as f64;
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let start = step * i as f64;
            // Pin the outer edge so float error never leaves the last segment short.
            let end = if i + 1 == n {
                duration
            } else {
                step * (i + 1) as f64
            };
            Segment::new(task_id, label.as_ref(), start, end)
        })
        .collect()
}

/// Move split point `split` (the boundary between `segments[split]` and
/// `segments[split + 1]`) to `time`, returning the new list.
///
/// `time` is clamped to `[segments[split].start_time, segments[split + 1].end_time]`;
/// dragging past a limit stops at the limit. Only the two neighbours change.
pub fn move_split(segments: &[Segment], split: usize, time: Seconds) -> Result<Vec<Segment>> {
    if split >= segments.len().saturating_sub(1) {
        return Err(TimelineError::SplitOutOfRange {
            split,
            segments: segments.len(),
        });
    }

    let mut next = segments.to_vec();
    if time.is_nan() {
        return Ok(next);
    }

    let lo = segments[split].start_time;
    let hi = segments[split + 1].end_time;
    let clamped = time.max(lo).min(hi);

    next[split].end_time = clamped;
    next[split + 1].start_time = clamped;
    Ok(next)
}

/// Times of the internal boundaries, one per adjacent pair.
pub fn split_points(segments: &[Segment]) -> Vec<Seconds> {
    segments
        .iter()
        .take(segments.len().saturating_sub(1))
        .map(|s| s.end_time)
        .collect()
}

pub fn total_length(segments: &[Segment]) -> Seconds {
    segments.iter().map(Segment::length).sum()
}

pub fn sorted_by_start(mut segments: Vec<Segment>) -> Vec<Segment> {
    segments.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    segments
}

/// Check every layout invariant of a segment list covering `[0, duration]`.
pub fn validate(segments: &[Segment], duration: Seconds) -> Result<()> {
    let (Some(first), Some(last)) = (segments.first(), segments.last()) else {
        return Ok(());
    };

    if first.start_time.abs() > TIME_EPSILON {
        return Err(TimelineError::InvalidLayout(format!(
            "first segment starts at {} instead of 0",
            first.start_time
        )));
    }
    if (last.end_time - duration).abs() > TIME_EPSILON {
        return Err(TimelineError::InvalidLayout(format!(
            "last segment ends at {} instead of {}",
            last.end_time, duration
        )));
    }

    for (i, seg) in segments.iter().enumerate() {
        if seg.start_time > seg.end_time {
            return Err(TimelineError::InvalidLayout(format!(
                "segment {} ({}) has negative length",
                i, seg.label
            )));
        }
        if seg.start_time < -TIME_EPSILON || seg.end_time > duration + TIME_EPSILON {
            return Err(TimelineError::InvalidLayout(format!(
                "segment {} ({}) leaves [0, {}]",
                i, seg.label, duration
            )));
        }
    }

    for (i, pair) in segments.windows(2).enumerate() {
        if (pair[0].end_time - pair[1].start_time).abs() > TIME_EPSILON {
            return Err(TimelineError::InvalidLayout(format!(
                "gap or overlap at split {}: {} vs {}",
                i, pair[0].end_time, pair[1].start_time
            )));
        }
    }

    Ok(())
}
