//! Live preview: block model, incremental updates, egui rendering and
//! linked scrolling with the editor.

mod diff;
mod render;
mod sync_scroll;
mod widget;

pub use diff::{apply, Patch};
pub use render::{build_blocks, PreviewBlock};
pub use sync_scroll::{EditorLines, ScrollOrigin, SyncScrollState, MIN_SCROLL_DELTA};
pub use widget::{PreviewOutput, PreviewView};

use log::debug;
use std::time::{Duration, Instant};

use crate::markdown::{MarkdownOptions, MathRenderer};

/// Preview blocks plus the debounce and scroll-sync bookkeeping around them.
#[derive(Debug)]
pub struct PreviewState {
    pub blocks: Vec<PreviewBlock>,
    pub sync: SyncScrollState,
    /// Lines in the editor text the blocks were built from
    pub source_line_count: usize,
    pub options: MarkdownOptions,
    /// Time of the first edit not yet reflected in the preview
    dirty_since: Option<Instant>,
    /// Time of the latest edit
    last_edit: Option<Instant>,
}

impl Default for PreviewState {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PreviewState {
    pub fn new(sync_enabled: bool) -> Self {
        Self {
            blocks: Vec::new(),
            sync: SyncScrollState::new(sync_enabled),
            source_line_count: 0,
            options: MarkdownOptions::default(),
            dirty_since: None,
            last_edit: None,
        }
    }

    /// Record an edit; the rebuild waits until edits pause.
    pub fn mark_dirty(&mut self, now: Instant) {
        self.dirty_since.get_or_insert(now);
        self.last_edit = Some(now);
    }

    /// Time left before a pending rebuild is due.
    pub fn time_until_due(&self, now: Instant, debounce: Duration) -> Option<Duration> {
        let last_edit = self.last_edit?;
        self.dirty_since?;
        Some((last_edit + debounce).saturating_duration_since(now))
    }

    /// Rebuild when the debounce period since the latest edit has passed.
    pub fn update_if_due(
        &mut self,
        text: &str,
        now: Instant,
        debounce: Duration,
        renderer: &dyn MathRenderer,
    ) -> Option<Patch> {
        match self.time_until_due(now, debounce) {
            Some(left) if left.is_zero() => Some(self.rebuild(text, renderer)),
            _ => None,
        }
    }

    /// Rebuild right away (file open, theme change).
    pub fn rebuild(&mut self, text: &str, renderer: &dyn MathRenderer) -> Patch {
        let fresh = build_blocks(text, &self.options, renderer);
        let patch = apply(&mut self.blocks, fresh);
        self.source_line_count = text.lines().count().max(1);
        self.dirty_since = None;
        debug!(
            "Preview patch at block {}: -{} +{} ({} blocks)",
            patch.start,
            patch.removed,
            patch.inserted,
            self.blocks.len()
        );
        patch
    }

    /// Drop cached highlighting, e.g. after a theme switch.
    pub fn clear_highlight_cache(&mut self) {
        for block in &mut self.blocks {
            block.highlighted = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::PlainTex;

    const DEBOUNCE: Duration = Duration::from_millis(300);

    #[test]
    fn test_rebuild_waits_for_pause() {
        let mut state = PreviewState::new(true);
        let start = Instant::now();
        state.mark_dirty(start);
        assert!(state
            .update_if_due("# a", start + Duration::from_millis(100), DEBOUNCE, &PlainTex)
            .is_none());

        // Another edit pushes the deadline back
        state.mark_dirty(start + Duration::from_millis(200));
        assert!(state
            .update_if_due("# ab", start + Duration::from_millis(400), DEBOUNCE, &PlainTex)
            .is_none());

        let patch = state
            .update_if_due("# ab", start + Duration::from_millis(500), DEBOUNCE, &PlainTex)
            .unwrap();
        assert_eq!(patch.inserted, 1);
        assert_eq!(state.time_until_due(Instant::now(), DEBOUNCE), None);
        assert_eq!(state.blocks.len(), 1);
    }

    #[test]
    fn test_clean_state_never_rebuilds() {
        let mut state = PreviewState::new(true);
        let now = Instant::now();
        assert!(state.time_until_due(now, DEBOUNCE).is_none());
        assert!(state.update_if_due("x", now, DEBOUNCE, &PlainTex).is_none());
    }

    #[test]
    fn test_time_until_due() {
        let mut state = PreviewState::new(true);
        let now = Instant::now();
        state.mark_dirty(now);
        assert_eq!(
            state.time_until_due(now + Duration::from_millis(100), DEBOUNCE),
            Some(Duration::from_millis(200))
        );
        assert_eq!(
            state.time_until_due(now + Duration::from_secs(5), DEBOUNCE),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_rebuild_patches_incrementally() {
        let mut state = PreviewState::new(true);
        state.rebuild("# 标题\n\n段落\n\n结尾\n", &PlainTex);
        let patch = state.rebuild("# 标题\n\n段落，已修改\n\n结尾\n", &PlainTex);
        assert_eq!(
            patch,
            Patch {
                start: 1,
                removed: 1,
                inserted: 1
            }
        );
        assert_eq!(state.source_line_count, 5);
    }
}
