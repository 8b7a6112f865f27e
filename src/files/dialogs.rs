//! Native file dialogs using the rfd crate, and export file name suggestions.

use chrono::{DateTime, Local};
use rfd::FileDialog;
use std::path::{Path, PathBuf};

use crate::export::DocumentFormat;

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];
const MAX_NAME_CHARS: usize = 50;

fn with_directory(dialog: FileDialog, initial_dir: Option<&Path>) -> FileDialog {
    match initial_dir.filter(|d| d.is_dir()) {
        Some(dir) => dialog.set_directory(dir),
        None => dialog,
    }
}

/// Pick a Markdown file to open.
pub fn open_file_dialog(initial_dir: Option<&Path>) -> Option<PathBuf> {
    let dialog = FileDialog::new()
        .set_title("打开 Markdown")
        .add_filter("Markdown", MARKDOWN_EXTENSIONS)
        .add_filter("All Files", &["*"]);
    with_directory(dialog, initial_dir).pick_file()
}

/// "Save As": Markdown, Word or PDF, chosen by the extension.
pub fn save_as_dialog(initial_dir: Option<&Path>, default_name: &str) -> Option<PathBuf> {
    let dialog = FileDialog::new()
        .set_title("另存为")
        .add_filter("Markdown", MARKDOWN_EXTENSIONS)
        .add_filter("Word", &["docx"])
        .add_filter("PDF", &["pdf"])
        .set_file_name(default_name);
    with_directory(dialog, initial_dir).save_file()
}

/// Target for an export of `format`, with the extension enforced.
pub fn export_dialog(initial_dir: Option<&Path>, default_name: &str, format: DocumentFormat) -> Option<PathBuf> {
    let title = format!("导出 {}", format.label());
    let dialog = FileDialog::new()
        .set_title(&title)
        .add_filter(format.label(), &[format.extension()])
        .set_file_name(default_name);
    with_directory(dialog, initial_dir)
        .save_file()
        .map(|path| ensure_extension(path, format))
}

pub fn pick_executable_dialog(title: &str) -> Option<PathBuf> {
    let dialog = FileDialog::new().set_title(title);
    #[cfg(windows)]
    let dialog = dialog.add_filter("Programs", &["exe"]);
    dialog.pick_file()
}

pub fn pick_file_dialog(title: &str, name: &str, extensions: &[&str]) -> Option<PathBuf> {
    FileDialog::new()
        .set_title(title)
        .add_filter(name, extensions)
        .pick_file()
}

pub fn pick_folder_dialog(initial_dir: Option<&Path>) -> Option<PathBuf> {
    with_directory(FileDialog::new().set_title("选择默认导出目录"), initial_dir).pick_folder()
}

/// Append the format's extension unless the path already has it.
pub fn ensure_extension(path: PathBuf, format: DocumentFormat) -> PathBuf {
    let matches = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(format.extension()));
    if matches {
        path
    } else {
        let mut name = path.into_os_string();
        name.push(".");
        name.push(format.extension());
        PathBuf::from(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Suggested names
// ─────────────────────────────────────────────────────────────────────────────

fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    replaced.trim().chars().take(MAX_NAME_CHARS).collect::<String>().trim().to_string()
}

fn first_heading(markdown: &str) -> Option<&str> {
    let mut in_fence = false;
    for line in markdown.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let hashes = trimmed.chars().take_while(|&c| c == '#').count();
        if (1..=6).contains(&hashes) {
            let rest = &trimmed[hashes..];
            if rest.is_empty() || rest.starts_with(' ') {
                let title = rest.trim().trim_end_matches('#').trim();
                if !title.is_empty() {
                    return Some(title);
                }
            }
        }
    }
    None
}

/// File name for an export: the source file's stem, else the first heading,
/// else a timestamp.
pub fn suggested_filename(
    source: Option<&Path>,
    markdown: &str,
    format: DocumentFormat,
    now: DateTime<Local>,
) -> String {
    let stem = source
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .map(sanitize_file_name)
        .filter(|s| !s.is_empty())
        .or_else(|| first_heading(markdown).map(sanitize_file_name).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| format!("Export_{}", now.format("%Y%m%d_%H%M")));
    format!("{}.{}", stem, format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 12, 7, 0).unwrap()
    }

    #[test]
    fn test_name_from_source_file() {
        let name = suggested_filename(
            Some(Path::new("/docs/周报.md")),
            "# 其他标题",
            DocumentFormat::Docx,
            at_noon(),
        );
        assert_eq!(name, "周报.docx");
    }

    #[test]
    fn test_name_from_heading() {
        let name = suggested_filename(None, "\n## 项目: 计划/草稿 ##\n正文", DocumentFormat::Pdf, at_noon());
        assert_eq!(name, "项目_ 计划_草稿.pdf");
    }

    #[test]
    fn test_heading_inside_fence_is_ignored() {
        let markdown = "```\n# not a heading\n```\n正文";
        let name = suggested_filename(None, markdown, DocumentFormat::Docx, at_noon());
        assert_eq!(name, "Export_20240305_1207.docx");
    }

    #[test]
    fn test_long_heading_is_truncated() {
        let heading = "长".repeat(80);
        let name = suggested_filename(None, &format!("# {}", heading), DocumentFormat::Pdf, at_noon());
        assert_eq!(name.chars().count(), MAX_NAME_CHARS + ".pdf".len());
    }

    #[test]
    fn test_hashtag_is_not_heading() {
        assert_eq!(first_heading("#标签\n# 真标题"), Some("真标题"));
    }

    #[test]
    fn test_ensure_extension() {
        assert_eq!(
            ensure_extension(PathBuf::from("/a/报告"), DocumentFormat::Docx),
            PathBuf::from("/a/报告.docx")
        );
        assert_eq!(
            ensure_extension(PathBuf::from("/a/b.PDF"), DocumentFormat::Pdf),
            PathBuf::from("/a/b.PDF")
        );
        assert_eq!(
            ensure_extension(PathBuf::from("v1.2"), DocumentFormat::Pdf),
            PathBuf::from("v1.2.pdf")
        );
    }
}
