//! Linked scrolling between the editor and the preview.
//!
//! While drawing, the preview records a [`BlockMapping`] per block: its
//! source line range and the y range it occupies. Editor positions are
//! fractional line numbers (line 3.5 is halfway down line 3), so a long
//! paragraph that wraps over many rows still scrolls smoothly.
//!
//! A scroll origin token stops the two panes from chasing each other: once
//! one side drives a scroll, the other side's resulting scroll is ignored
//! until things settle.
//!
//! ```ignore
//! if sync.should_sync_from(ScrollOrigin::Editor) {
//!     let line = editor_lines.line_at(editor_offset);
//!     preview_target = sync.line_to_rendered_offset(line);
//!     sync.mark_scroll(ScrollOrigin::Editor);
//! }
//! ```

use eframe::egui::Galley;
use std::time::{Duration, Instant};

use super::render::BlockKind;

const SETTLE_TIME: Duration = Duration::from_millis(120);

/// Scrolls smaller than this (in points) are treated as jitter.
pub const MIN_SCROLL_DELTA: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollOrigin {
    Editor,
    Preview,
    None,
}

// ─────────────────────────────────────────────────────────────────────────────
// Block mapping
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct BlockMapping {
    /// 1-based inclusive source lines
    pub source_lines: (usize, usize),
    /// Rendered y range relative to the preview content top
    pub rendered_range: (f32, f32),
    pub kind: BlockKind,
}

impl BlockMapping {
    pub fn new(lines: (usize, usize), rendered_range: (f32, f32), kind: BlockKind) -> Self {
        Self {
            source_lines: lines,
            rendered_range,
            kind,
        }
    }

    /// Fractional line span `[start, end + 1)`.
    fn line_span(&self) -> (f32, f32) {
        (
            self.source_lines.0 as f32,
            (self.source_lines.1 + 1) as f32,
        )
    }
}

fn lerp(from: (f32, f32), to: (f32, f32), value: f32) -> f32 {
    let width = from.1 - from.0;
    if width <= f32::EPSILON {
        return to.0;
    }
    let t = ((value - from.0) / width).clamp(0.0, 1.0);
    to.0 + t * (to.1 - to.0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Editor geometry
// ─────────────────────────────────────────────────────────────────────────────

/// Top y of every logical line in the editor's laid-out text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditorLines {
    tops: Vec<f32>,
    total_height: f32,
}

impl EditorLines {
    #[cfg(test)]
    pub fn from_tops(tops: Vec<f32>, total_height: f32) -> Self {
        Self { tops, total_height }
    }

    /// Collect line tops from a text edit galley; wrapped rows belong to
    /// the line that started them.
    pub fn from_galley(galley: &Galley) -> Self {
        let mut tops = Vec::new();
        let mut at_line_start = true;
        for row in &galley.rows {
            if at_line_start {
                tops.push(row.rect.min.y);
            }
            at_line_start = row.ends_with_newline;
        }
        Self {
            tops,
            total_height: galley.rect.height(),
        }
    }

    fn bottom_of(&self, index: usize) -> f32 {
        self.tops.get(index + 1).copied().unwrap_or(self.total_height)
    }

    /// Fractional 1-based line at offset `y`.
    pub fn line_at(&self, y: f32) -> f32 {
        if self.tops.is_empty() {
            return 1.0;
        }
        let index = self
            .tops
            .partition_point(|&top| top <= y)
            .saturating_sub(1);
        let top = self.tops[index];
        let bottom = self.bottom_of(index);
        let fraction = if bottom > top {
            ((y - top) / (bottom - top)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        index as f32 + 1.0 + fraction
    }

    /// Offset of a fractional 1-based line.
    pub fn offset_of(&self, line: f32) -> f32 {
        if self.tops.is_empty() {
            return 0.0;
        }
        let index = ((line.max(1.0) - 1.0).floor() as usize).min(self.tops.len() - 1);
        let fraction = (line.max(1.0) - 1.0 - index as f32).clamp(0.0, 1.0);
        let top = self.tops[index];
        top + fraction * (self.bottom_of(index) - top)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct SyncScrollState {
    pub enabled: bool,
    mappings: Vec<BlockMapping>,
    scroll_origin: ScrollOrigin,
    last_scroll_time: Option<Instant>,
    source_line_count: usize,
    rendered_total_height: f32,
    /// Last offsets seen on each side, to detect user scrolling
    pub last_editor_offset: f32,
    pub last_preview_offset: f32,
}

impl Default for SyncScrollState {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SyncScrollState {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            mappings: Vec::new(),
            scroll_origin: ScrollOrigin::None,
            last_scroll_time: None,
            source_line_count: 0,
            rendered_total_height: 0.0,
            last_editor_offset: 0.0,
            last_preview_offset: 0.0,
        }
    }

    pub fn set_mappings(
        &mut self,
        mut mappings: Vec<BlockMapping>,
        line_count: usize,
        rendered_height: f32,
    ) {
        mappings.sort_by_key(|m| m.source_lines.0);
        self.mappings = mappings;
        self.source_line_count = line_count;
        self.rendered_total_height = rendered_height;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Origin
    // ─────────────────────────────────────────────────────────────────────────

    pub fn should_sync_from(&self, origin: ScrollOrigin) -> bool {
        self.should_sync_from_at(origin, Instant::now())
    }

    fn should_sync_from_at(&self, origin: ScrollOrigin, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }
        if self.scroll_origin == ScrollOrigin::None || self.scroll_origin == origin {
            return true;
        }
        match self.last_scroll_time {
            Some(last) => now.duration_since(last) >= SETTLE_TIME,
            None => true,
        }
    }

    pub fn mark_scroll(&mut self, origin: ScrollOrigin) {
        self.scroll_origin = origin;
        self.last_scroll_time = Some(Instant::now());
    }

    /// Drop the origin once the last synced scroll has settled.
    pub fn clear_origin(&mut self) {
        if let Some(last) = self.last_scroll_time {
            if last.elapsed() >= SETTLE_TIME {
                self.scroll_origin = ScrollOrigin::None;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Conversion
    // ─────────────────────────────────────────────────────────────────────────

    /// Preview offset for a fractional editor line.
    pub fn line_to_rendered_offset(&self, line: f32) -> f32 {
        if self.mappings.is_empty() {
            return self.proportional_line_to_rendered(line);
        }

        if let Some(mapping) = self.mappings.iter().find(|m| {
            let (start, end) = m.line_span();
            line >= start && line < end
        }) {
            return lerp(mapping.line_span(), mapping.rendered_range, line);
        }

        let before = self
            .mappings
            .iter()
            .filter(|m| m.line_span().1 <= line)
            .next_back();
        let after = self.mappings.iter().find(|m| m.line_span().0 > line);

        match (before, after) {
            (Some(b), Some(a)) => lerp(
                (b.line_span().1, a.line_span().0),
                (b.rendered_range.1, a.rendered_range.0),
                line,
            ),
            (Some(b), None) => lerp(
                (b.line_span().1, (self.source_line_count + 1) as f32),
                (b.rendered_range.1, self.rendered_total_height),
                line,
            ),
            (None, Some(a)) => lerp((1.0, a.line_span().0), (0.0, a.rendered_range.0), line),
            (None, None) => self.proportional_line_to_rendered(line),
        }
    }

    /// Fractional editor line for a preview offset.
    pub fn rendered_offset_to_line(&self, y: f32) -> f32 {
        if self.mappings.is_empty() {
            return self.proportional_rendered_to_line(y);
        }

        if let Some(mapping) = self
            .mappings
            .iter()
            .find(|m| y >= m.rendered_range.0 && y < m.rendered_range.1)
        {
            return lerp(mapping.rendered_range, mapping.line_span(), y);
        }

        let before = self
            .mappings
            .iter()
            .filter(|m| m.rendered_range.1 <= y)
            .next_back();
        let after = self.mappings.iter().find(|m| m.rendered_range.0 > y);

        match (before, after) {
            (Some(b), Some(a)) => lerp(
                (b.rendered_range.1, a.rendered_range.0),
                (b.line_span().1, a.line_span().0),
                y,
            ),
            (Some(b), None) => lerp(
                (b.rendered_range.1, self.rendered_total_height),
                (b.line_span().1, (self.source_line_count + 1) as f32),
                y,
            ),
            (None, Some(a)) => lerp((0.0, a.rendered_range.0), (1.0, a.line_span().0), y),
            (None, None) => self.proportional_rendered_to_line(y),
        }
    }

    fn proportional_line_to_rendered(&self, line: f32) -> f32 {
        if self.source_line_count == 0 || self.rendered_total_height <= 0.0 {
            return 0.0;
        }
        ((line - 1.0) / self.source_line_count as f32).clamp(0.0, 1.0)
            * self.rendered_total_height
    }

    fn proportional_rendered_to_line(&self, y: f32) -> f32 {
        if self.rendered_total_height <= 0.0 || self.source_line_count == 0 {
            return 1.0;
        }
        1.0 + (y / self.rendered_total_height).clamp(0.0, 1.0) * self.source_line_count as f32
    }
}
