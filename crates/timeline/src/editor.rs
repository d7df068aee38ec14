//! Headless timeline segmentation editor.
//!
//! The editor lays segments out as proportional blocks with a draggable handle
//! on every internal split point, and turns pointer input into
//! [`EditorMessage`]s. It never owns the segment list: callers pass the current
//! list on every call and apply the messages they get back.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{move_split, Segment, Seconds};

/// Above this many segments the timeline stops fitting its container and scrolls.
pub const SCROLL_THRESHOLD: usize = 20;
/// Width each segment gets in scroll mode.
pub const MIN_SEGMENT_WIDTH_PX: f32 = 60.0;
/// Hit width of a split handle, centered on the split point.
pub const HANDLE_WIDTH_PX: f32 = 8.0;
/// Above this many segments labels use the small font.
pub const SMALL_FONT_THRESHOLD: usize = 25;

pub const LABEL_FONT_REM: f32 = 0.85;
pub const SMALL_LABEL_FONT_REM: f32 = 0.7;

/// Block colors, cycled by segment index.
pub const SEGMENT_COLORS: [&str; 19] = [
    "#F44336", "#E91E63", "#9C27B0", "#673AB7", "#3F51B5", "#2196F3", "#03A9F4", "#00BCD4",
    "#009688", "#4CAF50", "#8BC34A", "#CDDC39", "#FFEB3B", "#FFC107", "#FF9800", "#FF5722",
    "#795548", "#9E9E9E", "#607D8B",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    FitToContainer,
    Scroll,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockLayout {
    pub index: usize,
    pub x: f32,
    pub width: f32,
    pub label: String,
    pub color: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HandleLayout {
    pub split: usize,
    /// Center of the handle.
    pub x: f32,
}

/// Pixel geometry of one frame of the timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineLayout {
    pub mode: LayoutMode,
    pub content_width: f32,
    pub px_per_second: f64,
    pub font_size_rem: f32,
    pub blocks: Vec<BlockLayout>,
    pub handles: Vec<HandleLayout>,
}

impl TimelineLayout {
    /// `None` when there is no duration to scale by or nothing to draw.
    pub fn compute(segments: &[Segment], duration: Seconds, container_width: f32) -> Option<Self> {
        if segments.is_empty() || !duration.is_finite() || duration <= 0.0 {
            return None;
        }

        let (mode, content_width) = if segments.len() > SCROLL_THRESHOLD {
            (
                LayoutMode::Scroll,
                segments.len() as f32 * MIN_SEGMENT_WIDTH_PX,
            )
        } else {
            (LayoutMode::FitToContainer, container_width.max(0.0))
        };
        if content_width <= 0.0 {
            return None;
        }

        let px_per_second = content_width as f64 / duration;
        let to_x = |t: Seconds| (t * px_per_second) as f32;

        let blocks = segments
            .iter()
            .enumerate()
            .map(|(index, seg)| BlockLayout {
                index,
                x: to_x(seg.start_time),
                width: to_x(seg.end_time) - to_x(seg.start_time),
                label: seg.label.clone(),
                color: SEGMENT_COLORS[index % SEGMENT_COLORS.len()],
            })
            .collect();

        let handles = segments
            .iter()
            .take(segments.len() - 1)
            .enumerate()
            .map(|(split, seg)| HandleLayout {
                split,
                x: to_x(seg.end_time),
            })
            .collect();

        let font_size_rem = if segments.len() > SMALL_FONT_THRESHOLD {
            SMALL_LABEL_FONT_REM
        } else {
            LABEL_FONT_REM
        };

        Some(Self {
            mode,
            content_width,
            px_per_second,
            font_size_rem,
            blocks,
            handles,
        })
    }

    pub fn x_to_time(&self, x: f32) -> Seconds {
        x as f64 / self.px_per_second
    }

    pub fn time_to_x(&self, time: Seconds) -> f32 {
        (time * self.px_per_second) as f32
    }

    /// Split under `x`. Overlapping handles resolve to the later one, which is
    /// drawn on top.
    pub fn handle_at(&self, x: f32) -> Option<usize> {
        let half = HANDLE_WIDTH_PX / 2.0;
        let mut best: Option<(usize, f32)> = None;
        for handle in &self.handles {
            let dist = (x - handle.x).abs();
            if dist > half {
                continue;
            }
            match best {
                Some((_, d)) if dist > d => {}
                _ => best = Some((handle.split, dist)),
            }
        }
        best.map(|(split, _)| split)
    }

    pub fn block_at(&self, x: f32) -> Option<usize> {
        if x < 0.0 || x > self.content_width {
            return None;
        }
        self.blocks
            .iter()
            .find(|b| b.width > 0.0 && x >= b.x && x <= b.x + b.width)
            .or_else(|| self.blocks.iter().rev().find(|b| x >= b.x && x <= b.x + b.width))
            .map(|b| b.index)
    }
}

/// Pointer input in content coordinates: container-relative x plus the
/// current horizontal scroll offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointerEvent {
    Down { x: f32 },
    Move { x: f32 },
    Up,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorMessage {
    SegmentsChanged(Vec<Segment>),
    Seek(Seconds),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        split: usize,
        origin_x: f32,
        origin_time: Seconds,
    },
}

/// Interaction state of one timeline widget.
///
/// Move and up events are accepted wherever the pointer is, so a drag keeps
/// tracking after the pointer leaves the widget.
#[derive(Debug, Clone)]
pub struct TimelineEditor {
    container_width: f32,
    state: DragState,
}

impl TimelineEditor {
    pub fn new(container_width: f32) -> Self {
        Self {
            container_width,
            state: DragState::Idle,
        }
    }

    pub fn container_width(&self) -> f32 {
        self.container_width
    }

    pub fn set_container_width(&mut self, width: f32) {
        self.container_width = width;
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Drop any drag in progress without emitting anything.
    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }

    pub fn layout(&self, segments: &[Segment], duration: Option<Seconds>) -> Option<TimelineLayout> {
        TimelineLayout::compute(segments, duration?, self.container_width)
    }

    pub fn handle_pointer(
        &mut self,
        segments: &[Segment],
        duration: Option<Seconds>,
        event: PointerEvent,
    ) -> Vec<EditorMessage> {
        if let PointerEvent::Up = event {
            if let DragState::Dragging { split, .. } = self.state {
                trace!(split, "drag finished");
            }
            self.state = DragState::Idle;
            return Vec::new();
        }

        let Some(layout) = self.layout(segments, duration) else {
            return Vec::new();
        };

        match (self.state, event) {
            (DragState::Idle, PointerEvent::Down { x }) => {
                if let Some(split) = layout.handle_at(x) {
                    let origin_time = segments[split].end_time;
                    trace!(split, origin_time, "drag started");
                    self.state = DragState::Dragging {
                        split,
                        origin_x: x,
                        origin_time,
                    };
                    return Vec::new();
                }

                match layout.block_at(x) {
                    Some(index) => {
                        let seg = &segments[index];
                        let time = layout
                            .x_to_time(x)
                            .max(seg.start_time)
                            .min(seg.end_time);
                        vec![EditorMessage::Seek(time)]
                    }
                    None => Vec::new(),
                }
            }
            (
                DragState::Dragging {
                    split,
                    origin_x,
                    origin_time,
                },
                PointerEvent::Move { x },
            ) => {
                let target = origin_time + layout.x_to_time(x - origin_x);
                match move_split(segments, split, target) {
                    Ok(next) => {
                        let at = next[split].end_time;
                        vec![EditorMessage::SegmentsChanged(next), EditorMessage::Seek(at)]
                    }
                    Err(_) => {
                        // The list shrank under the drag.
                        self.state = DragState::Idle;
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        }
    }
}
