//! Export pipeline: Markdown → converter → post-processing → target file.
//!
//! All intermediate files are temporary and live next to the target, so the
//! final step is a rename on the same volume. A failure at any step drops
//! the temporaries; the target is only ever created by that last rename and
//! the Markdown source on disk is never written.

use log::{debug, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempPath;

use super::converter::{CancelFlag, Converter, DocumentFormat, OfficeConverter, PandocConverter, PandocOptions};
use super::docx::{post_process_docx, PostProcessOptions, PostProcessReport};
use crate::config::{PdfBackend, Settings};
use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Request and configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub markdown: String,
    pub target: PathBuf,
    pub format: DocumentFormat,
    /// Folder of the source document; relative image paths resolve here
    pub source_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportOptions {
    pub post_process: PostProcessOptions,
    pub pdf_backend: PdfBackend,
}

impl ExportOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            post_process: PostProcessOptions {
                margin_v: settings.margin_v,
                margin_h: settings.margin_h,
            },
            pdf_backend: settings.pdf_backend,
        }
    }
}

/// The converters an export may need.
#[derive(Clone)]
pub struct Converters {
    pub pandoc: Arc<dyn Converter>,
    pub office: Arc<dyn Converter>,
}

impl Converters {
    pub fn from_settings(settings: &Settings) -> Self {
        let pandoc = PandocConverter::new(PandocOptions::from_settings(settings));
        let office = OfficeConverter::new(Duration::from_secs(settings.converter_timeout_secs));
        Self {
            pandoc: Arc::new(pandoc),
            office: Arc::new(office),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Converting,
    PostProcessing,
    RenderingPdf,
    Saving,
}

impl ExportStage {
    pub fn label(&self) -> &'static str {
        match self {
            ExportStage::Preparing => "准备中…",
            ExportStage::Converting => "正在运行 pandoc…",
            ExportStage::PostProcessing => "正在调整 Word 格式…",
            ExportStage::RenderingPdf => "正在生成 PDF…",
            ExportStage::Saving => "正在保存…",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub format: DocumentFormat,
    pub report: Option<PostProcessReport>,
    pub elapsed: Duration,
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

fn temp_in(dir: &Path, extension: &str) -> Result<TempPath> {
    tempfile::Builder::new()
        .prefix(".papersmith-")
        .suffix(&format!(".{}", extension))
        .tempfile_in(dir)
        .map(|file| file.into_temp_path())
        .map_err(|source| Error::FileWrite {
            path: dir.to_path_buf(),
            source,
        })
}

/// Write the Markdown to a temporary file, in the source folder when possible.
fn write_markdown(markdown: &str, source_dir: Option<&Path>) -> Result<TempPath> {
    let builder = {
        let mut builder = tempfile::Builder::new();
        builder.prefix(".papersmith-").suffix(".md");
        builder
    };
    let beside_source = source_dir.and_then(|dir| match builder.tempfile_in(dir) {
        Ok(file) => Some(file),
        Err(e) => {
            debug!("Cannot write next to the source ({}), using the temp dir", e);
            None
        }
    });
    let mut file = match beside_source {
        Some(file) => file,
        None => builder.tempfile()?,
    };
    file.write_all(markdown.as_bytes())?;
    file.flush()?;
    Ok(file.into_temp_path())
}

/// Run one export to completion on the current thread.
pub fn run_export(
    request: &ExportRequest,
    converters: &Converters,
    options: &ExportOptions,
    cancel: &CancelFlag,
    progress: &mut dyn FnMut(ExportStage),
) -> Result<ExportOutcome> {
    let started = Instant::now();
    if request.markdown.trim().is_empty() {
        return Err(Error::EmptyDocument);
    }
    if request.format == DocumentFormat::Markdown {
        return Err(Error::Application("Markdown is saved, not exported".to_string()));
    }

    progress(ExportStage::Preparing);
    cancel.check()?;
    let target_dir = request
        .target
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let input = write_markdown(&request.markdown, request.source_dir.as_deref())?;

    let via_word = request.format == DocumentFormat::Docx || options.pdf_backend == PdfBackend::Office;
    let mut report = None;

    let artifact = if via_word {
        let docx = temp_in(target_dir, DocumentFormat::Docx.extension())?;
        progress(ExportStage::Converting);
        converters
            .pandoc
            .convert(&input, &docx, DocumentFormat::Docx, cancel)?;
        cancel.check()?;

        progress(ExportStage::PostProcessing);
        report = Some(post_process_docx(&docx, &options.post_process)?);
        cancel.check()?;

        if request.format == DocumentFormat::Pdf {
            let pdf = temp_in(target_dir, DocumentFormat::Pdf.extension())?;
            progress(ExportStage::RenderingPdf);
            converters
                .office
                .convert(&docx, &pdf, DocumentFormat::Pdf, cancel)?;
            pdf
        } else {
            docx
        }
    } else {
        let pdf = temp_in(target_dir, DocumentFormat::Pdf.extension())?;
        progress(ExportStage::Converting);
        converters
            .pandoc
            .convert(&input, &pdf, DocumentFormat::Pdf, cancel)?;
        pdf
    };
    cancel.check()?;

    let produced = std::fs::metadata(&artifact).map(|m| m.len()).unwrap_or(0);
    if produced == 0 {
        let last_tool = if request.format == DocumentFormat::Pdf && via_word {
            &converters.office
        } else {
            &converters.pandoc
        };
        return Err(Error::ConverterFailed {
            tool: last_tool.name().to_string(),
            status: None,
            stderr: "the converter produced an empty file".to_string(),
        });
    }

    progress(ExportStage::Saving);
    artifact.persist(&request.target).map_err(|e| Error::FileWrite {
        path: request.target.clone(),
        source: e.error,
    })?;

    let outcome = ExportOutcome {
        path: request.target.clone(),
        format: request.format,
        report,
        elapsed: started.elapsed(),
    };
    info!(
        "Exported {} to {} in {:?}",
        outcome.format.label(),
        outcome.path.display(),
        outcome.elapsed
    );
    Ok(outcome)
}

// ─────────────────────────────────────────────────────────────────────────────
// Background job
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum ExportEvent {
    Stage(ExportStage),
    Finished(Result<ExportOutcome>),
}

/// An export running on a worker thread. The UI polls it every frame.
#[derive(Debug)]
pub struct ExportJob {
    receiver: Receiver<ExportEvent>,
    cancel: CancelFlag,
    stage: ExportStage,
    target: PathBuf,
    format: DocumentFormat,
    started: Instant,
    finished: bool,
}

impl ExportJob {
    pub fn spawn(request: ExportRequest, converters: Converters, options: ExportOptions) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let cancel = CancelFlag::new();
        let worker_cancel = cancel.clone();
        let target = request.target.clone();
        let format = request.format;

        thread::Builder::new()
            .name("papersmith-export".to_string())
            .spawn(move || {
                let stage_sender = sender.clone();
                let mut progress = |stage: ExportStage| {
                    let _ = stage_sender.send(ExportEvent::Stage(stage));
                };
                let result = run_export(&request, &converters, &options, &worker_cancel, &mut progress);
                if let Err(e) = &result {
                    if e.is_cancelled() {
                        info!("Export to {} cancelled", request.target.display());
                    } else {
                        warn!("Export to {} failed: {}", request.target.display(), e);
                    }
                }
                let _ = sender.send(ExportEvent::Finished(result));
            })?;

        Ok(Self {
            receiver,
            cancel,
            stage: ExportStage::Preparing,
            target,
            format,
            started: Instant::now(),
            finished: false,
        })
    }

    /// Drain pending events without blocking; `Some` once the job is done.
    pub fn poll(&mut self) -> Option<Result<ExportOutcome>> {
        if self.finished {
            return None;
        }
        loop {
            match self.receiver.try_recv() {
                Ok(ExportEvent::Stage(stage)) => self.stage = stage,
                Ok(ExportEvent::Finished(result)) => {
                    self.finished = true;
                    return Some(result);
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    self.finished = true;
                    return Some(Err(Error::Application(
                        "The export worker stopped unexpectedly".to_string(),
                    )));
                }
            }
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelling(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn stage(&self) -> ExportStage {
        self.stage
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Read;
    use std::sync::Mutex;
    use zip::write::FileOptions;
    use zip::{ZipArchive, ZipWriter};

    /// Writes a small docx (or a fake PDF) built from the input Markdown.
    struct FakeConverter {
        calls: Mutex<Vec<(PathBuf, DocumentFormat)>>,
        fail: bool,
    }

    impl FakeConverter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn calls(&self) -> Vec<(PathBuf, DocumentFormat)> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn docx_from_markdown(markdown: &str) -> String {
        let mut body = String::new();
        for line in markdown.lines() {
            let (text, list) = match line.strip_prefix("- [ ] ") {
                Some(rest) => (format!("☐ {}", rest), true),
                None => (line.to_string(), false),
            };
            let ppr = if list {
                r#"<w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr></w:pPr>"#
            } else {
                ""
            };
            if text.is_empty() {
                body.push_str("<w:p/>");
            } else {
                body.push_str(&format!("<w:p>{}<w:r><w:t>{}</w:t></w:r></w:p>", ppr, text));
            }
        }
        format!(
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}<w:sectPr/></w:body></w:document>"#,
            body
        )
    }

    impl Converter for FakeConverter {
        fn name(&self) -> &str {
            "fake"
        }

        fn locate(&self) -> Result<PathBuf> {
            Ok(PathBuf::from("fake"))
        }

        fn convert(
            &self,
            input: &Path,
            output: &Path,
            format: DocumentFormat,
            cancel: &CancelFlag,
        ) -> Result<PathBuf> {
            cancel.check()?;
            self.calls
                .lock()
                .unwrap()
                .push((input.to_path_buf(), format));
            if self.fail {
                std::fs::write(output, b"partial").unwrap();
                return Err(Error::ConverterFailed {
                    tool: "fake".to_string(),
                    status: Some(1),
                    stderr: "pandoc: cannot parse".to_string(),
                });
            }
            match format {
                DocumentFormat::Docx => {
                    let markdown = std::fs::read_to_string(input).unwrap();
                    let mut zip = ZipWriter::new(File::create(output).unwrap());
                    zip.start_file("word/document.xml", FileOptions::default())
                        .unwrap();
                    zip.write_all(docx_from_markdown(&markdown).as_bytes())
                        .unwrap();
                    zip.finish().unwrap();
                }
                _ => std::fs::write(output, b"%PDF-1.4 fake").unwrap(),
            }
            Ok(output.to_path_buf())
        }
    }

    fn converters(pandoc: Arc<FakeConverter>, office: Arc<FakeConverter>) -> Converters {
        Converters { pandoc, office }
    }

    fn options(pdf_backend: PdfBackend) -> ExportOptions {
        ExportOptions {
            post_process: PostProcessOptions::default(),
            pdf_backend,
        }
    }

    fn request(dir: &Path, markdown: &str, name: &str, format: DocumentFormat) -> ExportRequest {
        ExportRequest {
            markdown: markdown.to_string(),
            target: dir.join(name),
            format,
            source_dir: Some(dir.to_path_buf()),
        }
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_empty_document_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let pandoc = FakeConverter::new();
        let req = request(dir.path(), "  \n\n", "out.docx", DocumentFormat::Docx);
        let err = run_export(
            &req,
            &converters(pandoc.clone(), FakeConverter::new()),
            &options(PdfBackend::Pandoc),
            &CancelFlag::new(),
            &mut |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, Error::EmptyDocument));
        assert!(pandoc.calls().is_empty());
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_docx_export_post_processes() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path(), "标题\n\n- [ ] 任务\n", "报告.docx", DocumentFormat::Docx);
        let mut stages = Vec::new();
        let outcome = run_export(
            &req,
            &converters(FakeConverter::new(), FakeConverter::new()),
            &options(PdfBackend::Pandoc),
            &CancelFlag::new(),
            &mut |stage| stages.push(stage),
        )
        .unwrap();

        assert_eq!(outcome.path, dir.path().join("报告.docx"));
        let report = outcome.report.unwrap();
        assert_eq!(report.task_items, 1);
        assert_eq!(report.removed_paragraphs, 1);
        assert_eq!(
            stages,
            vec![
                ExportStage::Preparing,
                ExportStage::Converting,
                ExportStage::PostProcessing,
                ExportStage::Saving
            ]
        );

        let mut archive = ZipArchive::new(File::open(&outcome.path).unwrap()).unwrap();
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        assert!(xml.contains("w14:checkbox"));
        // Only the result remains, no temporaries
        assert_eq!(dir_entries(dir.path()), vec!["报告.docx".to_string()]);
    }

    #[test]
    fn test_pdf_via_pandoc_skips_post_processing() {
        let dir = tempfile::tempdir().unwrap();
        let office = FakeConverter::new();
        let req = request(dir.path(), "# 标题", "out.pdf", DocumentFormat::Pdf);
        let outcome = run_export(
            &req,
            &converters(FakeConverter::new(), office.clone()),
            &options(PdfBackend::Pandoc),
            &CancelFlag::new(),
            &mut |_| {},
        )
        .unwrap();
        assert!(outcome.report.is_none());
        assert!(office.calls().is_empty());
        assert_eq!(std::fs::read(&outcome.path).unwrap(), b"%PDF-1.4 fake");
    }

    #[test]
    fn test_pdf_via_office_uses_processed_docx() {
        let dir = tempfile::tempdir().unwrap();
        let office = FakeConverter::new();
        let req = request(dir.path(), "- [ ] 任务", "out.pdf", DocumentFormat::Pdf);
        let outcome = run_export(
            &req,
            &converters(FakeConverter::new(), office.clone()),
            &options(PdfBackend::Office),
            &CancelFlag::new(),
            &mut |_| {},
        )
        .unwrap();
        assert_eq!(outcome.report.map(|r| r.task_items), Some(1));
        let calls = office.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, DocumentFormat::Pdf);
        assert_eq!(calls[0].0.extension().unwrap(), "docx");
        assert_eq!(dir_entries(dir.path()), vec!["out.pdf".to_string()]);
    }

    #[test]
    fn test_converter_failure_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path(), "正文", "out.docx", DocumentFormat::Docx);
        let err = run_export(
            &req,
            &converters(FakeConverter::failing(), FakeConverter::new()),
            &options(PdfBackend::Pandoc),
            &CancelFlag::new(),
            &mut |_| {},
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot parse"));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_existing_target_survives_failure() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.docx");
        std::fs::write(&target, b"previous export").unwrap();
        let req = request(dir.path(), "正文", "out.docx", DocumentFormat::Docx);
        assert!(run_export(
            &req,
            &converters(FakeConverter::failing(), FakeConverter::new()),
            &options(PdfBackend::Pandoc),
            &CancelFlag::new(),
            &mut |_| {},
        )
        .is_err());
        assert_eq!(std::fs::read(&target).unwrap(), b"previous export");
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let pandoc = FakeConverter::new();
        let req = request(dir.path(), "正文", "out.docx", DocumentFormat::Docx);
        let err = run_export(
            &req,
            &converters(pandoc.clone(), FakeConverter::new()),
            &options(PdfBackend::Pandoc),
            &cancel,
            &mut |_| {},
        )
        .unwrap_err();
        assert!(err.is_cancelled());
        assert!(pandoc.calls().is_empty());
    }

    #[test]
    fn test_markdown_input_written_to_source_dir() {
        let dir = tempfile::tempdir().unwrap();
        let pandoc = FakeConverter::new();
        let req = request(dir.path(), "正文", "out.pdf", DocumentFormat::Pdf);
        run_export(
            &req,
            &converters(pandoc.clone(), FakeConverter::new()),
            &options(PdfBackend::Pandoc),
            &CancelFlag::new(),
            &mut |_| {},
        )
        .unwrap();
        let (input, _) = &pandoc.calls()[0];
        assert_eq!(input.parent(), Some(dir.path()));
        assert!(!input.exists());
    }

    #[test]
    fn test_job_reports_result() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path(), "# 标题", "out.docx", DocumentFormat::Docx);
        let mut job = ExportJob::spawn(
            req,
            converters(FakeConverter::new(), FakeConverter::new()),
            options(PdfBackend::Pandoc),
        )
        .unwrap();
        assert_eq!(job.format(), DocumentFormat::Docx);

        let deadline = Instant::now() + Duration::from_secs(10);
        let result = loop {
            if let Some(result) = job.poll() {
                break result;
            }
            assert!(Instant::now() < deadline, "export job did not finish");
            thread::sleep(Duration::from_millis(10));
        };
        assert!(result.is_ok());
        assert_eq!(job.stage(), ExportStage::Saving);
        assert!(job.poll().is_none());
        assert!(job.target().exists());
    }
}
