//! Document export.
//!
//! # Outputs
//!
//! - **HTML**: standalone page for the browser or the clipboard
//! - **Word**: pandoc, then post-processing of `word/document.xml`
//! - **PDF**: pandoc with a LaTeX engine, or LibreOffice from the processed Word file
//!
//! # Layout
//!
//! - `html.rs` / `clipboard.rs` - HTML rendering of the document
//! - `converter.rs` - external tools behind the `Converter` trait
//! - `ooxml.rs` / `docx.rs` - Word post-processor
//! - `pipeline.rs` - temp files, atomic save and the background job

pub mod clipboard;
pub mod converter;
pub mod docx;
pub mod html;
mod ooxml;
pub mod pipeline;

pub use clipboard::copy_html_to_clipboard;
pub use converter::DocumentFormat;
pub use html::{generate_html_document, HtmlOptions};
pub use pipeline::{Converters, ExportJob, ExportOptions, ExportRequest};
