//! The Markdown source pane.

mod widget;

pub use widget::{EditorOutput, EditorWidget};
