//! Office conversions via LibreOffice and text extraction via pdftotext

use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

use super::{path_str, run_tool, ToolContext, ToolOutput};

const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Convert a DOCX to PDF with headless LibreOffice
pub fn docx_to_pdf(ctx: &ToolContext, input: &Path) -> Result<ToolOutput> {
    let data = convert_with_libreoffice(ctx, "docxToPdf", input, "pdf", None)?;
    Ok(ToolOutput {
        data,
        mime_type: "application/pdf",
        file_name_base: "converted_document".to_string(),
        extension: ".pdf",
    })
}

/// Convert a PDF to DOCX with headless LibreOffice (writer PDF import)
pub fn pdf_to_word(ctx: &ToolContext, input: &Path) -> Result<ToolOutput> {
    let data = convert_with_libreoffice(
        ctx,
        "pdfToWord",
        input,
        "docx",
        Some("--infilter=writer_pdf_import"),
    )?;
    Ok(ToolOutput {
        data,
        mime_type: DOCX_MIME,
        file_name_base: "converted_document".to_string(),
        extension: ".docx",
    })
}

fn convert_with_libreoffice(
    ctx: &ToolContext,
    tool: &str,
    input: &Path,
    target_ext: &str,
    infilter: Option<&str>,
) -> Result<Vec<u8>> {
    ctx.progress(30);

    let outdir = ctx.scratch_dir().join("lo-out");
    std::fs::create_dir_all(&outdir)?;

    let mut command = Command::new("libreoffice");
    command.arg("--headless");
    if let Some(filter) = infilter {
        command.arg(filter);
    }
    command.args([
        "--convert-to",
        target_ext,
        "--outdir",
        path_str(&outdir)?,
        path_str(input)?,
    ]);

    run_tool(tool, &mut command, ctx.timeout())?;
    ctx.progress(70);

    // LibreOffice names the output after the input stem
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let output_path = outdir.join(format!("{}.{}", stem, target_ext));

    std::fs::read(&output_path).map_err(|e| {
        Error::tool(
            tool,
            format!("conversion produced no output ({}): {}", output_path.display(), e),
        )
    })
}

/// Extract plain text from a PDF with pdftotext (poppler-utils)
pub fn extract_text(ctx: &ToolContext, input: &Path) -> Result<ToolOutput> {
    ctx.progress(30);

    let output_path = ctx.scratch_dir().join("extracted.txt");

    run_tool(
        "extractText",
        Command::new("pdftotext").args([
            "-layout",
            "-nopgbrk",
            "-enc",
            "UTF-8",
            path_str(input)?,
            path_str(&output_path)?,
        ]),
        ctx.timeout(),
    )?;

    ctx.progress(70);

    let data = std::fs::read(&output_path)
        .map_err(|e| Error::tool("extractText", format!("no text output: {}", e)))?;
    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(Error::tool(
            "extractText",
            "pdftotext produced no output - PDF may be image-based",
        ));
    }

    Ok(ToolOutput {
        data,
        mime_type: "text/plain",
        file_name_base: "extracted_text".to_string(),
        extension: ".txt",
    })
}
