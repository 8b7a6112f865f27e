//! Markdown source editor
//!
//! A multiline `TextEdit` bound to the [`Document`] buffer. Enter continues
//! list items, a click on a task box flips it, and command results can move
//! the caret through [`Document::place_cursor`].

use eframe::egui::{
    self,
    text::{CCursor, CCursorRange},
    text_edit::TextEditState,
    FontFamily, FontId, Key, Modifiers, ScrollArea, TextEdit, Ui,
};
use log::debug;
use std::sync::Arc;

use crate::markdown::{continue_list, toggle_task_at};
use crate::preview::EditorLines;
use crate::state::Document;

#[derive(Debug, Clone, Default)]
pub struct EditorOutput {
    /// Content differs from what it was before this frame
    pub changed: bool,
    pub scroll_offset: f32,
    /// Logical line tops, relative to the first text row
    pub lines: EditorLines,
    /// Distance from the scroll content top to the first text row
    pub text_top: f32,
}

impl EditorOutput {
    /// Fractional 1-based line at the top of the viewport.
    pub fn top_line(&self) -> f32 {
        self.lines.line_at((self.scroll_offset - self.text_top).max(0.0))
    }

    /// Scroll offset that puts `line` at the top.
    pub fn offset_for_line(&self, line: f32) -> f32 {
        (self.lines.offset_of(line) + self.text_top).max(0.0)
    }
}

pub struct EditorWidget<'a> {
    doc: &'a mut Document,
    font_size: f32,
    word_wrap: bool,
    scroll_to: Option<f32>,
}

impl<'a> EditorWidget<'a> {
    pub fn new(doc: &'a mut Document) -> Self {
        Self {
            doc,
            font_size: 15.0,
            word_wrap: true,
            scroll_to: None,
        }
    }

    pub fn font_size(mut self, size: f32) -> Self {
        self.font_size = size;
        self
    }

    pub fn word_wrap(mut self, wrap: bool) -> Self {
        self.word_wrap = wrap;
        self
    }

    pub fn scroll_to(mut self, offset: Option<f32>) -> Self {
        self.scroll_to = offset;
        self
    }

    pub fn show(self, ui: &mut Ui) -> EditorOutput {
        let id = ui.id().with("markdown_editor");
        let doc = self.doc;
        let font_size = self.font_size;
        let word_wrap = self.word_wrap;
        let original_content = doc.content.clone();

        // Enter on a list line continues the list
        let has_focus = ui.memory(|m| m.has_focus(id));
        if has_focus
            && doc.selection.is_none()
            && ui.input_mut(|i| i.consume_key(Modifiers::NONE, Key::Enter))
        {
            let result = continue_list(&doc.content, doc.cursor);
            doc.apply_result(result.text, result.cursor, result.selection);
        }

        if let Some((cursor, selection)) = doc.take_pending_cursor() {
            let mut state = TextEditState::load(ui.ctx(), id).unwrap_or_default();
            let range = match selection {
                Some((start, end)) => CCursorRange::two(CCursor::new(start), CCursor::new(end)),
                None => CCursorRange::one(CCursor::new(cursor)),
            };
            state.cursor.set_char_range(Some(range));
            state.store(ui.ctx(), id);
        }

        let needs_focus = std::mem::take(&mut doc.needs_focus);
        let before_widget = doc.content.clone();

        let mut layouter = move |ui: &Ui, text: &str, wrap_width: f32| -> Arc<egui::Galley> {
            let font_id = FontId::new(font_size, FontFamily::Proportional);
            let job = if word_wrap {
                egui::text::LayoutJob::simple(text.to_owned(), font_id, ui.visuals().text_color(), wrap_width)
            } else {
                egui::text::LayoutJob::simple_singleline(text.to_owned(), font_id, ui.visuals().text_color())
            };
            ui.fonts(|f| f.layout_job(job))
        };

        let mut scroll_area = ScrollArea::vertical()
            .id_source("editor_scroll")
            .auto_shrink([false, false]);
        if let Some(offset) = self.scroll_to {
            scroll_area = scroll_area.vertical_scroll_offset(offset.max(0.0));
        }

        let content = &mut doc.content;
        let scroll_output = scroll_area.show(ui, |ui| {
            let content_top = ui.min_rect().top();
            let output = TextEdit::multiline(content)
                .id(id)
                .frame(false)
                .lock_focus(true)
                .hint_text("在这里输入 Markdown…")
                .font(FontId::new(font_size, FontFamily::Proportional))
                .desired_width(f32::INFINITY)
                .min_size(egui::vec2(0.0, ui.available_height()))
                .layouter(&mut layouter)
                .show(ui);
            if needs_focus {
                output.response.request_focus();
            }
            let text_top = output.galley_pos.y - content_top;
            (output, text_top)
        });

        let (text_output, text_top) = scroll_output.inner;

        if doc.content != before_widget {
            doc.record_edit(before_widget);
        }

        if let Some(range) = text_output.cursor_range {
            let primary = range.primary.ccursor.index;
            let secondary = range.secondary.ccursor.index;
            doc.cursor = primary;
            doc.selection = if primary == secondary {
                None
            } else {
                Some((primary.min(secondary), primary.max(secondary)))
            };
        }

        if text_output.response.clicked() && doc.selection.is_none() {
            if let Some(result) = toggle_task_at(&doc.content, doc.cursor) {
                debug!("Toggled task at char {}", doc.cursor);
                doc.apply_result(result.text, result.cursor, None);
            }
        }

        EditorOutput {
            changed: doc.content != original_content,
            scroll_offset: scroll_output.state.offset.y,
            lines: EditorLines::from_galley(&text_output.galley),
            text_top,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_account_for_text_top() {
        let output = EditorOutput {
            scroll_offset: 44.0,
            lines: EditorLines::from_tops(vec![0.0, 20.0, 40.0], 60.0),
            text_top: 4.0,
            ..EditorOutput::default()
        };
        assert_eq!(output.top_line(), 3.0);
        assert_eq!(output.offset_for_line(2.5), 34.0);
    }

    #[test]
    fn test_empty_lines_map_to_top() {
        let output = EditorOutput::default();
        assert_eq!(output.top_line(), 1.0);
        assert_eq!(output.offset_for_line(10.0), 0.0);
    }
}
