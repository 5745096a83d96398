//! PDF compression with server-inferred Ghostscript quality profiles
//!
//! Each level binds a pdfwrite preset, a JPEG quality and downsampling
//! resolutions. The parameter sets are fixed: for the same input,
//! size(extreme) <= size(medium) <= size(low).

use serde::Deserialize;
use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

use super::{path_str, run_tool, ToolContext, ToolOutput};

/// Client-selectable compression level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Low,
    #[default]
    Medium,
    Extreme,
}

impl CompressionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionLevel::Low => "low",
            CompressionLevel::Medium => "medium",
            CompressionLevel::Extreme => "extreme",
        }
    }
}

/// `compress` options envelope
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressOptions {
    #[serde(default)]
    pub compression_level: CompressionLevel,
    #[serde(default)]
    pub grayscale: bool,
}

/// Ghostscript parameters bound to a level
struct Profile {
    preset: &'static str,
    jpeg_quality: u32,
    color_dpi: u32,
    gray_dpi: u32,
    mono_dpi: u32,
}

fn profile(level: CompressionLevel) -> Profile {
    match level {
        CompressionLevel::Low => Profile {
            preset: "printer",
            jpeg_quality: 100,
            color_dpi: 300,
            gray_dpi: 300,
            mono_dpi: 300,
        },
        CompressionLevel::Medium => Profile {
            preset: "ebook",
            jpeg_quality: 70,
            color_dpi: 120,
            gray_dpi: 120,
            mono_dpi: 300,
        },
        CompressionLevel::Extreme => Profile {
            preset: "screen",
            jpeg_quality: 25,
            color_dpi: 36,
            gray_dpi: 36,
            mono_dpi: 100,
        },
    }
}

/// Full Ghostscript argument list for one invocation, input and output last
pub fn ghostscript_args(
    level: CompressionLevel,
    grayscale: bool,
    input: &Path,
    output: &Path,
) -> Result<Vec<String>> {
    let p = profile(level);

    let mut args: Vec<String> = vec![
        "-sDEVICE=pdfwrite".into(),
        "-dCompatibilityLevel=1.4".into(),
        "-dNOPAUSE".into(),
        "-dQUIET".into(),
        "-dBATCH".into(),
        format!("-dPDFSETTINGS=/{}", p.preset),
        format!("-dJPEGQ={}", p.jpeg_quality),
        format!("-dColorImageResolution={}", p.color_dpi),
        format!("-dGrayImageResolution={}", p.gray_dpi),
        format!("-dMonoImageResolution={}", p.mono_dpi),
        "-dAutoFilterColorImages=false".into(),
        "-dAutoFilterGrayImages=false".into(),
        "-sColorImageFilter=/DCTEncode".into(),
        "-sGrayImageFilter=/DCTEncode".into(),
        "-dDownsampleColorImages=true".into(),
        "-dColorImageDownsampleType=/Bicubic".into(),
        "-dDownsampleGrayImages=true".into(),
        "-dGrayImageDownsampleType=/Bicubic".into(),
        "-dDownsampleMonoImages=true".into(),
        "-dMonoImageDownsampleType=/Subsample".into(),
        "-dDetectDuplicateImages=true".into(),
        "-dCompressFonts=true".into(),
        "-dSubsetFonts=true".into(),
        "-dFastWebView=true".into(),
    ];

    if grayscale {
        args.push("-sProcessColorModel=DeviceGray".into());
        args.push("-sColorConversionStrategy=Gray".into());
        args.push("-dOverrideICC".into());
    }

    args.push(format!("-sOutputFile={}", path_str(output)?));
    args.push(path_str(input)?.to_string());

    Ok(args)
}

/// Compress a PDF with Ghostscript under the selected profile
pub fn compress(ctx: &ToolContext, input: &Path, options: &CompressOptions) -> Result<ToolOutput> {
    ctx.progress(30);

    let output = ctx.scratch_dir().join("compressed.pdf");
    let args = ghostscript_args(options.compression_level, options.grayscale, input, &output)?;

    tracing::debug!(
        level = options.compression_level.as_str(),
        grayscale = options.grayscale,
        "running ghostscript"
    );

    run_tool("compress", Command::new("gs").args(&args), ctx.timeout())?;
    ctx.progress(70);

    let data = std::fs::read(&output)
        .map_err(|e| Error::tool("compress", format!("no output produced: {}", e)))?;

    Ok(ToolOutput {
        data,
        mime_type: "application/pdf",
        file_name_base: "compressed_document".to_string(),
        extension: ".pdf",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args_for(level: CompressionLevel, grayscale: bool) -> Vec<String> {
        ghostscript_args(
            level,
            grayscale,
            &PathBuf::from("/tmp/in.pdf"),
            &PathBuf::from("/tmp/out.pdf"),
        )
        .unwrap()
    }

    #[test]
    fn test_level_profiles() {
        let low = args_for(CompressionLevel::Low, false);
        assert!(low.contains(&"-dPDFSETTINGS=/printer".to_string()));
        assert!(low.contains(&"-dJPEGQ=100".to_string()));
        assert!(low.contains(&"-dColorImageResolution=300".to_string()));
        assert!(low.contains(&"-dGrayImageResolution=300".to_string()));
        assert!(low.contains(&"-dMonoImageResolution=300".to_string()));

        let medium = args_for(CompressionLevel::Medium, false);
        assert!(medium.contains(&"-dPDFSETTINGS=/ebook".to_string()));
        assert!(medium.contains(&"-dJPEGQ=70".to_string()));
        assert!(medium.contains(&"-dColorImageResolution=120".to_string()));
        assert!(medium.contains(&"-dGrayImageResolution=120".to_string()));
        assert!(medium.contains(&"-dMonoImageResolution=300".to_string()));

        let extreme = args_for(CompressionLevel::Extreme, false);
        assert!(extreme.contains(&"-dPDFSETTINGS=/screen".to_string()));
        assert!(extreme.contains(&"-dJPEGQ=25".to_string()));
        assert!(extreme.contains(&"-dColorImageResolution=36".to_string()));
        assert!(extreme.contains(&"-dGrayImageResolution=36".to_string()));
        assert!(extreme.contains(&"-dMonoImageResolution=100".to_string()));
    }

    #[test]
    fn test_common_flags_on_every_invocation() {
        for level in [
            CompressionLevel::Low,
            CompressionLevel::Medium,
            CompressionLevel::Extreme,
        ] {
            let args = args_for(level, false);
            for flag in [
                "-sDEVICE=pdfwrite",
                "-dCompatibilityLevel=1.4",
                "-dNOPAUSE",
                "-dQUIET",
                "-dBATCH",
                "-dAutoFilterColorImages=false",
                "-dAutoFilterGrayImages=false",
                "-sColorImageFilter=/DCTEncode",
                "-sGrayImageFilter=/DCTEncode",
                "-dDownsampleColorImages=true",
                "-dColorImageDownsampleType=/Bicubic",
                "-dDownsampleGrayImages=true",
                "-dGrayImageDownsampleType=/Bicubic",
                "-dDownsampleMonoImages=true",
                "-dMonoImageDownsampleType=/Subsample",
                "-dDetectDuplicateImages=true",
                "-dCompressFonts=true",
                "-dSubsetFonts=true",
                "-dFastWebView=true",
            ] {
                assert!(args.contains(&flag.to_string()), "missing {}", flag);
            }
        }
    }

    #[test]
    fn test_grayscale_suffix() {
        let args = args_for(CompressionLevel::Medium, true);
        assert!(args.contains(&"-sProcessColorModel=DeviceGray".to_string()));
        assert!(args.contains(&"-sColorConversionStrategy=Gray".to_string()));
        assert!(args.contains(&"-dOverrideICC".to_string()));

        let plain = args_for(CompressionLevel::Medium, false);
        assert!(!plain.iter().any(|a| a.contains("DeviceGray")));
    }

    #[test]
    fn test_input_and_output_last() {
        let args = args_for(CompressionLevel::Low, false);
        assert_eq!(args[args.len() - 2], "-sOutputFile=/tmp/out.pdf");
        assert_eq!(args[args.len() - 1], "/tmp/in.pdf");
    }

    #[test]
    fn test_default_level_is_medium() {
        let opts: CompressOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.compression_level, CompressionLevel::Medium);
        assert!(!opts.grayscale);

        let opts: CompressOptions =
            serde_json::from_str(r#"{"compressionLevel": "extreme", "grayscale": true}"#).unwrap();
        assert_eq!(opts.compression_level, CompressionLevel::Extreme);
        assert!(opts.grayscale);
    }
}
