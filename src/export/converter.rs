//! External document converters.
//!
//! Everything that turns Markdown into Word or PDF goes through the
//! [`Converter`] trait, so the pipeline can be tested with a fake and the
//! PDF step can use pandoc or an office suite interchangeably.
//!
//! Tools run with piped output on the calling thread, which is the export
//! worker, never the UI thread. They are polled so a cancel request or the
//! timeout can kill them.

use log::{debug, warn};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Twips per centimetre, for Word page geometry.
pub const TWIPS_PER_CM: f32 = 567.0;

// ─────────────────────────────────────────────────────────────────────────────
// Formats and cancellation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Markdown,
    Docx,
    Pdf,
}

impl DocumentFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Markdown => "md",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Pdf => "pdf",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentFormat::Markdown => "Markdown",
            DocumentFormat::Docx => "Word",
            DocumentFormat::Pdf => "PDF",
        }
    }

    /// Format implied by a file extension, case-insensitive.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "md" | "markdown" | "txt" => Some(DocumentFormat::Markdown),
            "docx" => Some(DocumentFormat::Docx),
            "pdf" => Some(DocumentFormat::Pdf),
            _ => None,
        }
    }
}

/// Shared cancel request between the UI and an export worker.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once a cancel was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Converter trait
// ─────────────────────────────────────────────────────────────────────────────

pub trait Converter: Send + Sync {
    /// Tool name for messages
    fn name(&self) -> &str;

    /// Path of the executable, or `ConverterNotFound`.
    fn locate(&self) -> Result<PathBuf>;

    /// Convert `input` into `output` as `format`, returning the written path.
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        format: DocumentFormat,
        cancel: &CancelFlag,
    ) -> Result<PathBuf>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Pandoc
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct PandocOptions {
    /// Explicit executable; PATH is searched when unset or missing
    pub pandoc_path: Option<PathBuf>,
    pub input_format: String,
    pub reference_doc: Option<PathBuf>,
    pub pdf_engine: String,
    pub cjk_main_font: String,
    /// Page margins in cm (vertical, horizontal)
    pub margins: (f32, f32),
    pub timeout: Duration,
}

impl PandocOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            pandoc_path: settings.pandoc_path.clone(),
            input_format: settings.pandoc_input_format.clone(),
            reference_doc: settings.reference_docx.clone(),
            pdf_engine: settings.pdf_engine.clone(),
            cjk_main_font: settings.cjk_main_font.clone(),
            margins: (settings.margin_v, settings.margin_h),
            timeout: Duration::from_secs(settings.converter_timeout_secs),
        }
    }
}

impl Default for PandocOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PandocConverter {
    pub options: PandocOptions,
}

impl PandocConverter {
    pub fn new(options: PandocOptions) -> Self {
        Self { options }
    }

    /// Command-line arguments for one conversion.
    pub fn arguments(&self, input: &Path, output: &Path, format: DocumentFormat) -> Vec<OsString> {
        let opts = &self.options;
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            opts.input_format.clone().into(),
            "-t".into(),
            format.extension().into(),
            "-o".into(),
            output.as_os_str().to_owned(),
            input.as_os_str().to_owned(),
        ];

        // Relative image paths resolve against the document's folder
        if let Some(dir) = input.parent().filter(|d| !d.as_os_str().is_empty()) {
            let mut resource = OsString::from("--resource-path=");
            resource.push(dir.as_os_str());
            args.push(resource);
        }

        match format {
            DocumentFormat::Docx => {
                if let Some(reference) = opts.reference_doc.as_ref().filter(|p| p.is_file()) {
                    let mut flag = OsString::from("--reference-doc=");
                    flag.push(reference.as_os_str());
                    args.push(flag);
                }
            }
            DocumentFormat::Pdf => {
                let (v, h) = opts.margins;
                args.push(format!("--pdf-engine={}", opts.pdf_engine).into());
                args.push("-V".into());
                args.push(format!("geometry:top={v}cm,bottom={v}cm,left={h}cm,right={h}cm").into());
                args.push("-V".into());
                args.push("papersize=a4".into());
                if !opts.cjk_main_font.trim().is_empty() {
                    args.push("-V".into());
                    args.push(format!("CJKmainfont={}", opts.cjk_main_font.trim()).into());
                }
            }
            DocumentFormat::Markdown => {}
        }
        args
    }
}

impl Converter for PandocConverter {
    fn name(&self) -> &str {
        "pandoc"
    }

    fn locate(&self) -> Result<PathBuf> {
        if let Some(path) = &self.options.pandoc_path {
            if path.is_file() {
                return Ok(path.clone());
            }
            warn!(
                "Configured pandoc path {} does not exist, searching PATH",
                path.display()
            );
        }
        which::which("pandoc").map_err(|_| Error::converter_not_found("pandoc"))
    }

    fn convert(
        &self,
        input: &Path,
        output: &Path,
        format: DocumentFormat,
        cancel: &CancelFlag,
    ) -> Result<PathBuf> {
        let program = self.locate()?;
        let mut command = Command::new(&program);
        command.args(self.arguments(input, output, format));
        if let Some(dir) = input.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        run_tool(self.name(), command, self.options.timeout, cancel)?;
        Ok(output.to_path_buf())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Office suite (PDF from the processed Word file)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OfficeConverter {
    pub program: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for OfficeConverter {
    fn default() -> Self {
        Self {
            program: None,
            timeout: Duration::from_secs(Settings::default().converter_timeout_secs),
        }
    }
}

impl OfficeConverter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: None,
            timeout,
        }
    }
}

impl Converter for OfficeConverter {
    fn name(&self) -> &str {
        "LibreOffice"
    }

    fn locate(&self) -> Result<PathBuf> {
        if let Some(program) = self.program.as_ref().filter(|p| p.is_file()) {
            return Ok(program.clone());
        }
        if let Ok(path) = which::which("soffice").or_else(|_| which::which("libreoffice")) {
            return Ok(path);
        }
        #[cfg(windows)]
        {
            let default = PathBuf::from(r"C:\Program Files\LibreOffice\program\soffice.exe");
            if default.is_file() {
                return Ok(default);
            }
        }
        Err(Error::converter_not_found("LibreOffice"))
    }

    fn convert(
        &self,
        input: &Path,
        output: &Path,
        format: DocumentFormat,
        cancel: &CancelFlag,
    ) -> Result<PathBuf> {
        if format != DocumentFormat::Pdf {
            return Err(Error::Application(format!(
                "{} can only produce PDF here, not {}",
                self.name(),
                format.label()
            )));
        }
        let program = self.locate()?;
        let out_dir = output
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut command = Command::new(&program);
        command
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(out_dir)
            .arg(input);
        run_tool(self.name(), command, self.timeout, cancel)?;

        // The suite names the result after the input file
        let produced = out_dir.join(input.with_extension("pdf").file_name().unwrap_or_default());
        if produced != output {
            std::fs::rename(&produced, output).map_err(|source| Error::FileWrite {
                path: output.to_path_buf(),
                source,
            })?;
        }
        Ok(output.to_path_buf())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Process runner
// ─────────────────────────────────────────────────────────────────────────────

/// Captured output of a successful run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut source) = source {
            if let Err(e) = source.read_to_end(&mut buffer) {
                debug!("Failed to read tool output: {}", e);
            }
        }
        buffer
    })
}

/// Run `command`, killing it on cancel or after `timeout`.
///
/// A non-zero exit becomes `ConverterFailed` carrying stderr, or stdout when
/// the tool wrote its diagnostic there.
pub fn run_tool(
    tool: &str,
    mut command: Command,
    timeout: Duration,
    cancel: &CancelFlag,
) -> Result<ToolOutput> {
    cancel.check()?;
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    debug!("Running {:?}", command);
    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::converter_not_found(tool)
        } else {
            Error::Io(e)
        }
    })?;

    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());
    let started = Instant::now();

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if cancel.is_cancelled() {
            kill(&mut child, tool);
            return Err(Error::Cancelled);
        }
        if started.elapsed() >= timeout {
            kill(&mut child, tool);
            return Err(Error::ConverterTimeout {
                tool: tool.to_string(),
                seconds: timeout.as_secs(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let output = ToolOutput {
        stdout: String::from_utf8_lossy(&stdout.join().unwrap_or_default()).into_owned(),
        stderr: String::from_utf8_lossy(&stderr.join().unwrap_or_default()).into_owned(),
    };
    debug!("{} finished in {:?} with {}", tool, started.elapsed(), status);

    if status.success() {
        if !output.stderr.trim().is_empty() {
            debug!("{} stderr: {}", tool, output.stderr.trim());
        }
        return Ok(output);
    }

    let detail = if output.stderr.trim().is_empty() {
        output.stdout
    } else {
        output.stderr
    };
    warn!("{} failed with {}: {}", tool, status, detail.trim());
    Err(Error::ConverterFailed {
        tool: tool.to_string(),
        status: status.code(),
        stderr: detail,
    })
}

fn kill(child: &mut std::process::Child, tool: &str) {
    if let Err(e) = child.kill() {
        debug!("Failed to kill {}: {}", tool, e);
    }
    // Reap so no zombie is left behind
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a/报告.DOCX")),
            Some(DocumentFormat::Docx)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("x.markdown")),
            Some(DocumentFormat::Markdown)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("x.pdf")), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_path(Path::new("x.html")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_docx_arguments() {
        let converter = PandocConverter::default();
        let args = strings(&converter.arguments(
            Path::new("/docs/in.md"),
            Path::new("/out/result.docx"),
            DocumentFormat::Docx,
        ));
        assert_eq!(
            &args[..7],
            &["-f", "gfm+tex_math_dollars", "-t", "docx", "-o", "/out/result.docx", "/docs/in.md"]
        );
        assert!(args.contains(&"--resource-path=/docs".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--pdf-engine")));
        // No reference doc configured
        assert!(!args.iter().any(|a| a.starts_with("--reference-doc")));
    }

    #[test]
    fn test_pdf_arguments() {
        let converter = PandocConverter::new(PandocOptions {
            margins: (2.5, 3.0),
            ..PandocOptions::default()
        });
        let args = strings(&converter.arguments(
            Path::new("in.md"),
            Path::new("out.pdf"),
            DocumentFormat::Pdf,
        ));
        assert!(args.contains(&"--pdf-engine=xelatex".to_string()));
        assert!(args.contains(&"geometry:top=2.5cm,bottom=2.5cm,left=3cm,right=3cm".to_string()));
        assert!(args.contains(&"papersize=a4".to_string()));
        assert!(args.contains(&"CJKmainfont=Microsoft YaHei".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--resource-path")));
    }

    #[test]
    fn test_reference_doc_only_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.docx");
        std::fs::write(&reference, b"x").unwrap();
        let converter = PandocConverter::new(PandocOptions {
            reference_doc: Some(reference.clone()),
            ..PandocOptions::default()
        });
        let args = strings(&converter.arguments(
            Path::new("in.md"),
            Path::new("out.docx"),
            DocumentFormat::Docx,
        ));
        assert!(args.contains(&format!("--reference-doc={}", reference.display())));
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(flag.check().is_ok());
        clone.cancel();
        assert!(flag.is_cancelled());
        assert!(matches!(flag.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_missing_tool_is_not_found() {
        let command = Command::new("papersmith-no-such-tool-7f3a");
        let err = run_tool("pandoc", command, Duration::from_secs(5), &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, Error::ConverterNotFound { .. }));
        assert!(err.install_hint().is_some());
    }

    #[test]
    fn test_already_cancelled_does_not_spawn() {
        let flag = CancelFlag::new();
        flag.cancel();
        let command = Command::new("papersmith-no-such-tool-7f3a");
        let err = run_tool("x", command, Duration::from_secs(5), &flag).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_carries_stderr() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo 'pandoc: bad input' >&2; exit 3"]);
        let err = run_tool("pandoc", command, Duration::from_secs(10), &CancelFlag::new())
            .unwrap_err();
        match err {
            Error::ConverterFailed { status, stderr, .. } => {
                assert_eq!(status, Some(3));
                assert!(stderr.contains("bad input"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_falls_back_to_stdout() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo 'only stdout'; exit 1"]);
        let err = run_tool("tool", command, Duration::from_secs(10), &CancelFlag::new())
            .unwrap_err();
        assert!(err.to_string().contains("only stdout"));
    }

    #[cfg(unix)]
    #[test]
    fn test_success_captures_output() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo ok"]);
        let output = run_tool("sh", command, Duration::from_secs(10), &CancelFlag::new()).unwrap();
        assert_eq!(output.stdout.trim(), "ok");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_tool() {
        let mut command = Command::new("sleep");
        command.arg("5");
        let started = Instant::now();
        let err = run_tool("sleep", command, Duration::from_millis(200), &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, Error::ConverterTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_kills_tool() {
        let flag = CancelFlag::new();
        let canceller = flag.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            canceller.cancel();
        });
        let mut command = Command::new("sleep");
        command.arg("5");
        let err = run_tool("sleep", command, Duration::from_secs(30), &flag).unwrap_err();
        handle.join().unwrap();
        assert!(err.is_cancelled());
    }
}
