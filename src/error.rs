//! Error type shared by the editor, the settings store and the export pipeline.
//!
//! Export failures carry enough detail (tool name, exit status, captured
//! diagnostic) for the UI to show the converter's own message instead of a
//! generic "export failed".

use log::warn;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Where users are sent when pandoc cannot be found.
pub const PANDOC_INSTALL_URL: &str = "https://pandoc.org/installing.html";

// ─────────────────────────────────────────────────────────────────────────────
// Result alias
// ─────────────────────────────────────────────────────────────────────────────

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // File I/O
    // ─────────────────────────────────────────────────────────────────────────
    Io(io::Error),

    /// Reading a document from disk failed
    FileRead { path: PathBuf, source: io::Error },

    /// Writing a document or an export artifact failed
    FileWrite { path: PathBuf, source: io::Error },

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────────────────
    ConfigParse {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    ConfigDirNotFound,

    // ─────────────────────────────────────────────────────────────────────────
    // Export
    // ─────────────────────────────────────────────────────────────────────────
    /// Nothing to export
    EmptyDocument,

    /// The external converter binary is not installed or not on PATH
    ConverterNotFound { tool: String, hint: String },

    /// The converter ran and exited unsuccessfully
    ConverterFailed {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },

    /// The converter did not finish within the configured timeout
    ConverterTimeout { tool: String, seconds: u64 },

    /// The user cancelled a running export
    Cancelled,

    /// The generated document had a structure the post-processor could not handle
    PostProcess(String),

    Zip(zip::result::ZipError),

    /// `word/document.xml` is not well-formed
    Xml(roxmltree::Error),

    // ─────────────────────────────────────────────────────────────────────────
    // Misc
    // ─────────────────────────────────────────────────────────────────────────
    Clipboard(String),

    Application(String),
}

impl Error {
    pub fn converter_not_found(tool: impl Into<String>) -> Self {
        let tool = tool.into();
        let hint = if tool == "pandoc" {
            format!(
                "Install pandoc from {} or use \"Locate pandoc…\" to pick the executable.",
                PANDOC_INSTALL_URL
            )
        } else {
            format!("Install {} or add it to your PATH.", tool)
        };
        Error::ConverterNotFound { tool, hint }
    }

    /// A short sentence suitable for a dialog title or toast.
    pub fn user_message(&self) -> String {
        match self {
            Error::EmptyDocument => "The document is empty, nothing to export.".to_string(),
            Error::ConverterNotFound { tool, .. } => format!("{} was not found.", tool),
            Error::ConverterFailed { tool, .. } => format!("{} reported an error.", tool),
            Error::ConverterTimeout { tool, .. } => format!("{} took too long.", tool),
            Error::Cancelled => "Export cancelled.".to_string(),
            Error::PostProcess(_) | Error::Zip(_) | Error::Xml(_) => {
                "The exported Word file could not be post-processed.".to_string()
            }
            Error::FileRead { path, .. } => format!("Could not open {}", path.display()),
            Error::FileWrite { path, .. } => format!("Could not write {}", path.display()),
            other => other.to_string(),
        }
    }

    /// The actionable follow-up for a missing converter, if any.
    pub fn install_hint(&self) -> Option<&str> {
        match self {
            Error::ConverterNotFound { hint, .. } => Some(hint),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigParse {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Zip(err)
    }
}

impl From<roxmltree::Error> for Error {
    fn from(err: roxmltree::Error) -> Self {
        Error::Xml(err)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Display
// ─────────────────────────────────────────────────────────────────────────────
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::FileRead { path, source } => {
                write!(f, "Failed to read '{}': {}", path.display(), source)
            }
            Error::FileWrite { path, source } => {
                write!(f, "Failed to write '{}': {}", path.display(), source)
            }

            Error::ConfigParse { message, .. } => {
                write!(f, "Invalid configuration format: {}", message)
            }
            Error::ConfigDirNotFound => write!(f, "Configuration directory not found"),

            Error::EmptyDocument => write!(f, "Document is empty"),
            Error::ConverterNotFound { tool, hint } => {
                write!(f, "{} not found. {}", tool, hint)
            }
            Error::ConverterFailed {
                tool,
                status,
                stderr,
            } => {
                match status {
                    Some(code) => write!(f, "{} exited with status {}", tool, code)?,
                    None => write!(f, "{} was terminated", tool)?,
                }
                let detail = stderr.trim();
                if !detail.is_empty() {
                    write!(f, ":\n{}", detail)?;
                }
                Ok(())
            }
            Error::ConverterTimeout { tool, seconds } => {
                write!(f, "{} did not finish within {} seconds", tool, seconds)
            }
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::PostProcess(msg) => write!(f, "Word post-processing failed: {}", msg),
            Error::Zip(err) => write!(f, "Invalid document archive: {}", err),
            Error::Xml(err) => write!(f, "Malformed document.xml: {}", err),

            Error::Clipboard(msg) => write!(f, "Clipboard error: {}", msg),
            Error::Application(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::FileRead { source, .. } | Error::FileWrite { source, .. } => Some(source),
            Error::ConfigParse { source, .. } => source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn std::error::Error + 'static)),
            Error::Zip(err) => Some(err),
            Error::Xml(err) => Some(err),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Graceful degradation
// ─────────────────────────────────────────────────────────────────────────────

pub trait ResultExt<T> {
    /// Log the error at warning level and return `default` instead.
    fn unwrap_or_warn_default(self, default: T, context: &str) -> T;
}

impl<T> ResultExt<T> for Result<T> {
    fn unwrap_or_warn_default(self, default: T, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                warn!("{}: {}. Using default.", context, err);
                default
            }
        }
    }
}
