//! Tool registry and handlers
//!
//! One handler per tool id. A handler is a pure function from local input
//! paths and an options envelope to an output buffer; it never touches the
//! job repository except through the progress sink handed to it. Handlers
//! that shell out capture stderr into a structured error carrying the tool
//! name and exit code.

pub mod compress;
mod images;
mod office;
mod overlay;
mod pdf_ops;
mod security;

pub use compress::{CompressionLevel, CompressOptions};
pub use pdf_ops::{parse_page_range, PageRange};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Enumerated tool tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolId {
    #[serde(rename = "merge")]
    Merge,
    #[serde(rename = "split")]
    Split,
    #[serde(rename = "rotate")]
    Rotate,
    #[serde(rename = "remove")]
    Remove,
    #[serde(rename = "img2pdf")]
    Img2Pdf,
    #[serde(rename = "pdf2img")]
    Pdf2Img,
    #[serde(rename = "pdfToWord")]
    PdfToWord,
    #[serde(rename = "docxToPdf")]
    DocxToPdf,
    #[serde(rename = "protectPdf")]
    ProtectPdf,
    #[serde(rename = "unlockPdf")]
    UnlockPdf,
    #[serde(rename = "addWatermark")]
    AddWatermark,
    #[serde(rename = "addPageNumbers")]
    AddPageNumbers,
    #[serde(rename = "repairPdf")]
    RepairPdf,
    #[serde(rename = "compress")]
    Compress,
    #[serde(rename = "extractText")]
    ExtractText,
}

impl ToolId {
    pub const ALL: &'static [ToolId] = &[
        ToolId::Merge,
        ToolId::Split,
        ToolId::Rotate,
        ToolId::Remove,
        ToolId::Img2Pdf,
        ToolId::Pdf2Img,
        ToolId::PdfToWord,
        ToolId::DocxToPdf,
        ToolId::ProtectPdf,
        ToolId::UnlockPdf,
        ToolId::AddWatermark,
        ToolId::AddPageNumbers,
        ToolId::RepairPdf,
        ToolId::Compress,
        ToolId::ExtractText,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::Merge => "merge",
            ToolId::Split => "split",
            ToolId::Rotate => "rotate",
            ToolId::Remove => "remove",
            ToolId::Img2Pdf => "img2pdf",
            ToolId::Pdf2Img => "pdf2img",
            ToolId::PdfToWord => "pdfToWord",
            ToolId::DocxToPdf => "docxToPdf",
            ToolId::ProtectPdf => "protectPdf",
            ToolId::UnlockPdf => "unlockPdf",
            ToolId::AddWatermark => "addWatermark",
            ToolId::AddPageNumbers => "addPageNumbers",
            ToolId::RepairPdf => "repairPdf",
            ToolId::Compress => "compress",
            ToolId::ExtractText => "extractText",
        }
    }

    /// Office conversions get the longer soft timeout
    pub fn is_office_conversion(&self) -> bool {
        matches!(self, ToolId::PdfToWord | ToolId::DocxToPdf)
    }

    /// Base of the final output name (`DocSmart_{base}_{id8}{ext}`); split
    /// overrides this per range when it emits a bare PDF.
    pub fn output_base(&self) -> &'static str {
        match self {
            ToolId::Merge => "merged_documents",
            ToolId::Split => "split_documents",
            ToolId::Rotate => "rotated_document",
            ToolId::Remove => "removed_pages",
            ToolId::Img2Pdf => "converted_images",
            ToolId::Pdf2Img => "pdf_images",
            ToolId::PdfToWord => "converted_document",
            ToolId::DocxToPdf => "converted_document",
            ToolId::ProtectPdf => "protected_document",
            ToolId::UnlockPdf => "unlocked_document",
            ToolId::AddWatermark => "watermarked_document",
            ToolId::AddPageNumbers => "numbered_document",
            ToolId::RepairPdf => "repaired_document",
            ToolId::Compress => "compressed_document",
            ToolId::ExtractText => "extracted_text",
        }
    }
}

impl FromStr for ToolId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ToolId::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::invalid(format!("unknown toolId '{}'", s)))
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handler output: bytes plus the metadata needed for upload and naming
#[derive(Debug)]
pub struct ToolOutput {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
    pub file_name_base: String,
    /// Extension including the dot, e.g. ".pdf"
    pub extension: &'static str,
}

/// Per-invocation context: scratch workspace, soft deadline and a monotone
/// progress sink into the repository
pub struct ToolContext {
    scratch_dir: PathBuf,
    timeout: Duration,
    progress: Box<dyn Fn(u8) + Send + Sync>,
}

impl ToolContext {
    pub fn new(
        scratch_dir: PathBuf,
        timeout: Duration,
        progress: Box<dyn Fn(u8) + Send + Sync>,
    ) -> Self {
        Self {
            scratch_dir,
            timeout,
            progress,
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Report handler progress (20-80 band); the worker's sink keeps the
    /// sequence monotone
    pub fn progress(&self, pct: u8) {
        (self.progress)(pct);
    }
}

/// Final artifact name: `DocSmart_{base}_{first 8 of job id}{extension}`
pub fn final_output_name(job_id: Uuid, base: &str, extension: &str) -> String {
    let id = job_id.to_string();
    format!("DocSmart_{}_{}{}", base, &id[..8], extension)
}

/// Validate a submission before anything is stored: tool arity plus
/// tool-specific options. Rejections never reach the worker.
pub fn validate_submission(tool: ToolId, file_count: usize, options: &Value) -> Result<()> {
    match tool {
        ToolId::Merge => {
            if file_count < 2 {
                return Err(Error::invalid("merge requires at least 2 input files"));
            }
        }
        ToolId::Img2Pdf => {
            if file_count < 1 {
                return Err(Error::invalid("img2pdf requires at least 1 input file"));
            }
        }
        _ => {
            if file_count != 1 {
                return Err(Error::invalid(format!(
                    "{} requires exactly 1 input file",
                    tool
                )));
            }
        }
    }

    match tool {
        ToolId::Split => {
            let opts: SplitOptions = parse_options(tool, options)?;
            parse_page_range(&opts.page_range)?;
        }
        ToolId::Rotate => {
            let opts: RotateOptions = parse_options(tool, options)?;
            if !matches!(opts.angle, 90 | 180 | 270) {
                return Err(Error::invalid(format!(
                    "rotate angle must be 90, 180 or 270 (got {})",
                    opts.angle
                )));
            }
        }
        ToolId::Remove => {
            let opts: RemoveOptions = parse_options(tool, options)?;
            if opts.pages.is_empty() {
                return Err(Error::invalid("remove requires a non-empty pages list"));
            }
            if opts.pages.iter().any(|&p| p < 1) {
                return Err(Error::invalid("page numbers are 1-based"));
            }
        }
        ToolId::ProtectPdf => {
            let opts: ProtectOptions = parse_options(tool, options)?;
            if opts.password.is_empty() {
                return Err(Error::invalid("protectPdf requires a non-empty password"));
            }
        }
        ToolId::UnlockPdf => {
            // Password may be empty; only the envelope shape is checked
            let _: UnlockOptions = parse_options(tool, options)?;
        }
        ToolId::Compress => {
            let _: CompressOptions = parse_options(tool, options)?;
        }
        _ => {}
    }

    Ok(())
}

/// Dispatch a claimed job to its handler. The registry is a match on the
/// tool tag; every arm returns the uniform [`ToolOutput`] contract.
pub fn dispatch(
    tool: ToolId,
    ctx: &ToolContext,
    inputs: &[PathBuf],
    options: &Value,
) -> Result<ToolOutput> {
    match tool {
        ToolId::Merge => pdf_ops::merge(ctx, inputs),
        ToolId::Split => {
            let opts: SplitOptions = parse_options(tool, options)?;
            pdf_ops::split(ctx, &inputs[0], &opts.page_range)
        }
        ToolId::Rotate => {
            let opts: RotateOptions = parse_options(tool, options)?;
            pdf_ops::rotate(ctx, &inputs[0], opts.angle, &opts.pages.unwrap_or_default())
        }
        ToolId::Remove => {
            let opts: RemoveOptions = parse_options(tool, options)?;
            pdf_ops::remove_pages(ctx, &inputs[0], &opts.pages)
        }
        ToolId::Img2Pdf => images::images_to_pdf(ctx, inputs),
        ToolId::Pdf2Img => images::pdf_to_images(ctx, &inputs[0]),
        ToolId::PdfToWord => office::pdf_to_word(ctx, &inputs[0]),
        ToolId::DocxToPdf => office::docx_to_pdf(ctx, &inputs[0]),
        ToolId::ProtectPdf => {
            let opts: ProtectOptions = parse_options(tool, options)?;
            security::protect(ctx, &inputs[0], &opts.password)
        }
        ToolId::UnlockPdf => {
            let opts: UnlockOptions = parse_options(tool, options)?;
            security::unlock(ctx, &inputs[0], &opts.password)
        }
        ToolId::AddWatermark => overlay::add_watermark(ctx, &inputs[0]),
        ToolId::AddPageNumbers => overlay::add_page_numbers(ctx, &inputs[0]),
        ToolId::RepairPdf => security::repair(ctx, &inputs[0]),
        ToolId::Compress => {
            let opts: CompressOptions = parse_options(tool, options)?;
            compress::compress(ctx, &inputs[0], &opts)
        }
        ToolId::ExtractText => office::extract_text(ctx, &inputs[0]),
    }
}

/// Tool option envelopes (wire names are camelCase)

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitOptions {
    pub page_range: String,
}

#[derive(Debug, Deserialize)]
pub struct RotateOptions {
    pub angle: i64,
    /// 1-based page numbers; empty or absent rotates every page
    #[serde(default)]
    pub pages: Option<Vec<u32>>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveOptions {
    pub pages: Vec<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ProtectOptions {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UnlockOptions {
    #[serde(default)]
    pub password: String,
}

fn parse_options<T: DeserializeOwned>(tool: ToolId, options: &Value) -> Result<T> {
    serde_json::from_value(options.clone())
        .map_err(|e| Error::invalid(format!("invalid options for {}: {}", tool, e)))
}

// ---- subprocess plumbing shared by the shelling-out handlers ----

pub(crate) struct ToolProcessOutput {
    pub stdout: Vec<u8>,
}

/// Run an external tool with a kill-on-deadline guard, treating exit code 0
/// as success.
pub(crate) fn run_tool(
    tool: &str,
    command: &mut Command,
    timeout: Duration,
) -> Result<ToolProcessOutput> {
    run_tool_with_ok_codes(tool, command, timeout, &[0])
}

/// Run an external tool accepting the given exit codes. The child's stderr
/// goes into the error (truncated); the command line itself never does,
/// since options may carry passwords.
pub(crate) fn run_tool_with_ok_codes(
    tool: &str,
    command: &mut Command,
    timeout: Duration,
    ok_codes: &[i32],
) -> Result<ToolProcessOutput> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::tool(tool, format!("failed to spawn: {}", e)))?;

    // Drain pipes on side threads so a chatty child cannot deadlock against
    // the deadline poll below.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::tool(tool, "stdout pipe missing"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::tool(tool, "stderr pipe missing"))?;
    let stdout_reader = std::thread::spawn(move || read_all(stdout));
    let stderr_reader = std::thread::spawn(move || read_all(stderr));

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child
            .try_wait()
            .map_err(|e| Error::tool(tool, format!("failed to wait: {}", e)))?
        {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Timeout {
                    tool: tool.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
            None => std::thread::sleep(Duration::from_millis(100)),
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    let code = status.code().unwrap_or(-1);
    if !ok_codes.contains(&code) {
        let stderr = String::from_utf8_lossy(&stderr);
        return Err(Error::tool(
            tool,
            format!("exit code {}: {}", code, truncate(&stderr, 500)),
        ));
    }

    Ok(ToolProcessOutput { stdout })
}

fn read_all(mut source: impl Read) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = source.read_to_end(&mut buf);
    buf
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.trim().to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", s[..end].trim())
    }
}

pub(crate) fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::Internal(format!("non-UTF-8 path: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_id_round_trip() {
        for tool in ToolId::ALL {
            assert_eq!(tool.as_str().parse::<ToolId>().unwrap(), *tool);
        }
        assert!("shred".parse::<ToolId>().is_err());
    }

    #[test]
    fn test_final_output_name() {
        let id = Uuid::parse_str("a1b2c3d4-0000-0000-0000-000000000000").unwrap();
        assert_eq!(
            final_output_name(id, "merged_documents", ".pdf"),
            "DocSmart_merged_documents_a1b2c3d4.pdf"
        );
    }

    #[test]
    fn test_validate_arity() {
        assert!(validate_submission(ToolId::Merge, 1, &json!({})).is_err());
        assert!(validate_submission(ToolId::Merge, 2, &json!({})).is_ok());
        assert!(validate_submission(ToolId::Rotate, 2, &json!({"angle": 90})).is_err());
        assert!(validate_submission(ToolId::Img2Pdf, 0, &json!({})).is_err());
        assert!(validate_submission(ToolId::Img2Pdf, 3, &json!({})).is_ok());
    }

    #[test]
    fn test_validate_options() {
        assert!(validate_submission(ToolId::Split, 1, &json!({"pageRange": "1-3,5"})).is_ok());
        assert!(validate_submission(ToolId::Split, 1, &json!({"pageRange": "5-3"})).is_err());
        assert!(validate_submission(ToolId::Split, 1, &json!({})).is_err());

        assert!(validate_submission(ToolId::Rotate, 1, &json!({"angle": 90})).is_ok());
        assert!(validate_submission(ToolId::Rotate, 1, &json!({"angle": 45})).is_err());

        assert!(validate_submission(ToolId::Remove, 1, &json!({"pages": [1, 2]})).is_ok());
        assert!(validate_submission(ToolId::Remove, 1, &json!({"pages": []})).is_err());
        assert!(validate_submission(ToolId::Remove, 1, &json!({"pages": [0]})).is_err());

        assert!(validate_submission(ToolId::ProtectPdf, 1, &json!({"password": "s3cret"})).is_ok());
        assert!(validate_submission(ToolId::ProtectPdf, 1, &json!({"password": ""})).is_err());
        assert!(validate_submission(ToolId::UnlockPdf, 1, &json!({"password": ""})).is_ok());
        assert!(validate_submission(ToolId::UnlockPdf, 1, &json!({})).is_ok());

        assert!(
            validate_submission(ToolId::Compress, 1, &json!({"compressionLevel": "extreme"}))
                .is_ok()
        );
        assert!(
            validate_submission(ToolId::Compress, 1, &json!({"compressionLevel": "maximal"}))
                .is_err()
        );
        assert!(validate_submission(ToolId::Compress, 1, &json!({})).is_ok());
    }

    #[test]
    fn test_truncate_keeps_short_strings() {
        assert_eq!(truncate("short", 500), "short");
        let long = "x".repeat(600);
        let out = truncate(&long, 500);
        assert!(out.len() < 510);
        assert!(out.ends_with('…'));
    }
}
