//! Selection of the segments that cover a requested time window.

use std::collections::HashSet;

/// One entry of a media playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Segment URI as it appears in the playlist.
    pub id: String,
    /// Duration in seconds.
    pub duration: f64,
}

impl Segment {
    #[must_use]
    pub fn new(id: impl Into<String>, duration: f64) -> Self {
        Self {
            id: id.into(),
            duration,
        }
    }
}

/// Returns the unique segment ids overlapping `[start, end)`, in playlist order.
///
/// A segment is kept when it ends after `start` and begins before `end`, so
/// both boundary segments are included whole. An unset bound is open. Repeated
/// ids keep only their first occurrence. `start >= end` yields an empty plan.
#[must_use]
pub fn plan(segments: &[Segment], start: Option<f64>, end: Option<f64>) -> Vec<String> {
    if let (Some(s), Some(e)) = (start, end)
        && s >= e
    {
        log::debug!("Empty window {s}..{e}, nothing to plan");
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut planned = Vec::new();
    let mut cursor = 0.0;

    for segment in segments {
        let segment_end = cursor + segment.duration;
        let after_start = start.is_none_or(|s| segment_end > s);
        let before_end = end.is_none_or(|e| cursor < e);

        if after_start && before_end && seen.insert(segment.id.as_str()) {
            planned.push(segment.id.clone());
        }
        cursor = segment_end;
    }

    log::debug!(
        "Planned {} of {} segments for window {start:?}..{end:?}",
        planned.len(),
        segments.len()
    );
    planned
}
