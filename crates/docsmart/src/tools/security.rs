//! PDF security and repair via qpdf

use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

use super::{path_str, run_tool, run_tool_with_ok_codes, ToolContext, ToolOutput};

/// Encrypt a PDF with AES-256, same user and owner password
pub fn protect(ctx: &ToolContext, input: &Path, password: &str) -> Result<ToolOutput> {
    ctx.progress(30);

    let output = ctx.scratch_dir().join("protected.pdf");
    run_tool(
        "protectPdf",
        Command::new("qpdf").args([
            "--encrypt",
            password,
            password,
            "256",
            "--",
            path_str(input)?,
            path_str(&output)?,
        ]),
        ctx.timeout(),
    )?;

    ctx.progress(70);

    Ok(ToolOutput {
        data: read_output("protectPdf", &output)?,
        mime_type: "application/pdf",
        file_name_base: "protected_document".to_string(),
        extension: ".pdf",
    })
}

/// Decrypt a PDF, saving it without encryption
pub fn unlock(ctx: &ToolContext, input: &Path, password: &str) -> Result<ToolOutput> {
    ctx.progress(30);

    let output = ctx.scratch_dir().join("unlocked.pdf");
    run_tool(
        "unlockPdf",
        Command::new("qpdf")
            .arg(format!("--password={}", password))
            .args(["--decrypt", path_str(input)?, path_str(&output)?]),
        ctx.timeout(),
    )?;

    ctx.progress(70);

    Ok(ToolOutput {
        data: read_output("unlockPdf", &output)?,
        mime_type: "application/pdf",
        file_name_base: "unlocked_document".to_string(),
        extension: ".pdf",
    })
}

/// Repair a damaged PDF by re-serializing it through qpdf. Exit code 3
/// means qpdf recovered with warnings and still wrote the output, which is
/// exactly the repair case.
pub fn repair(ctx: &ToolContext, input: &Path) -> Result<ToolOutput> {
    ctx.progress(30);

    let output = ctx.scratch_dir().join("repaired.pdf");
    run_tool_with_ok_codes(
        "repairPdf",
        Command::new("qpdf").args([path_str(input)?, path_str(&output)?]),
        ctx.timeout(),
        &[0, 3],
    )?;

    ctx.progress(70);

    Ok(ToolOutput {
        data: read_output("repairPdf", &output)?,
        mime_type: "application/pdf",
        file_name_base: "repaired_document".to_string(),
        extension: ".pdf",
    })
}

fn read_output(tool: &str, path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| Error::tool(tool, format!("no output produced: {}", e)))
}
