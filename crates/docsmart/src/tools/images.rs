//! Image conversions: images to PDF and PDF to page images

use image::GenericImageView;
use lopdf::{dictionary, Document, Object, Stream};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

use super::pdf_ops::save_pdf;
use super::{path_str, run_tool, ToolContext, ToolOutput};

// US Letter page with a half-inch margin
const PAGE_WIDTH: f64 = 612.0;
const PAGE_HEIGHT: f64 = 792.0;
const PAGE_MARGIN: f64 = 36.0;

const PDF2IMG_DPI: &str = "150";

/// Build a PDF with one page per input image, centered and scaled to fit
pub fn images_to_pdf(ctx: &ToolContext, inputs: &[PathBuf]) -> Result<ToolOutput> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(inputs.len());
    let total = inputs.len();
    for (i, path) in inputs.iter().enumerate() {
        let page_id = add_image_page(&mut doc, pages_id, path, i)?;
        kids.push(Object::Reference(page_id));
        ctx.progress(20 + ((i + 1) * 60 / total) as u8);
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => total as u32,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    Ok(ToolOutput {
        data: save_pdf("img2pdf", &mut doc)?,
        mime_type: "application/pdf",
        file_name_base: "converted_images".to_string(),
        extension: ".pdf",
    })
}

fn add_image_page(
    doc: &mut Document,
    pages_id: lopdf::ObjectId,
    path: &Path,
    index: usize,
) -> Result<lopdf::ObjectId> {
    let image_data = std::fs::read(path)
        .map_err(|e| Error::tool("img2pdf", format!("failed to read input: {}", e)))?;
    let img = image::load_from_memory(&image_data)
        .map_err(|e| Error::tool("img2pdf", format!("failed to decode image: {}", e)))?;

    let (width, height) = img.dimensions();

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    // JPEG passes through as DCTDecode; everything else is flattened to raw RGB
    let image_stream = if extension == "jpg" || extension == "jpeg" {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            image_data,
        )
    } else {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            img.to_rgb8().into_raw(),
        )
    };

    let image_id = doc.add_object(Object::Stream(image_stream));
    let image_name = format!("Im{}", index + 1);

    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! {
            image_name.as_str() => image_id,
        },
    });

    // Scale to fit inside the margins, centered
    let available_width = PAGE_WIDTH - 2.0 * PAGE_MARGIN;
    let available_height = PAGE_HEIGHT - 2.0 * PAGE_MARGIN;
    let scale = (available_width / width as f64).min(available_height / height as f64);

    let img_width = width as f64 * scale;
    let img_height = height as f64 * scale;
    let x = (PAGE_WIDTH - img_width) / 2.0;
    let y = (PAGE_HEIGHT - img_height) / 2.0;

    let content = format!(
        "q\n{:.2} 0 0 {:.2} {:.2} {:.2} cm\n/{} Do\nQ\n",
        img_width, img_height, x, y, image_name
    );
    let content_id = doc.add_object(Object::Stream(Stream::new(
        dictionary! {},
        content.into_bytes(),
    )));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Resources" => resources_id,
        "Contents" => content_id,
    }))
}

/// Render every PDF page to a PNG via pdftoppm and pack them into a ZIP
pub fn pdf_to_images(ctx: &ToolContext, input: &Path) -> Result<ToolOutput> {
    let prefix = ctx.scratch_dir().join("page");

    run_tool(
        "pdf2img",
        Command::new("pdftoppm").args([
            "-png",
            "-r",
            PDF2IMG_DPI,
            path_str(input)?,
            path_str(&prefix)?,
        ]),
        ctx.timeout(),
    )?;

    ctx.progress(60);

    // pdftoppm writes page-1.png .. page-N.png (zero-padded above 9 pages);
    // order by the parsed page number, not the raw filename
    let mut pages: Vec<(u32, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(ctx.scratch_dir())? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(number) = name
            .strip_prefix("page-")
            .and_then(|rest| rest.strip_suffix(".png"))
            .and_then(|digits| digits.parse().ok())
        {
            pages.push((number, path));
        }
    }
    pages.sort_by_key(|(n, _)| *n);

    if pages.is_empty() {
        return Err(Error::tool("pdf2img", "pdftoppm produced no images"));
    }

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default();
        for (number, path) in &pages {
            zip.start_file(format!("page_{}.png", number), options)
                .map_err(|e| Error::tool("pdf2img", format!("zip write failed: {}", e)))?;
            zip.write_all(&std::fs::read(path)?)
                .map_err(|e| Error::tool("pdf2img", format!("zip write failed: {}", e)))?;
        }
        zip.finish()
            .map_err(|e| Error::tool("pdf2img", format!("zip finalize failed: {}", e)))?;
    }

    Ok(ToolOutput {
        data: cursor.into_inner(),
        mime_type: "application/zip",
        file_name_base: "pdf_images".to_string(),
        extension: ".zip",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::time::Duration;
    use uuid::Uuid;

    fn test_ctx() -> (ToolContext, PathBuf) {
        let dir = std::env::temp_dir().join(format!("docsmart-images-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let ctx = ToolContext::new(dir.clone(), Duration::from_secs(60), Box::new(|_| {}));
        (ctx, dir)
    }

    fn write_image(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
        let mut img = RgbImage::new(w, h);
        for p in img.pixels_mut() {
            *p = Rgb([200, 30, 60]);
        }
        let path = dir.join(name);
        // Format is inferred from the extension
        img.save(&path).unwrap();
        path
    }

    /// Filter names of every Image XObject in the document
    fn image_filters(doc: &lopdf::Document) -> Vec<Option<Vec<u8>>> {
        doc.objects
            .values()
            .filter_map(|obj| match obj {
                Object::Stream(stream) => {
                    let dict = &stream.dict;
                    let is_image = dict
                        .get(b"Subtype")
                        .ok()
                        .and_then(|s| s.as_name().ok())
                        .map(|n| n == b"Image")
                        .unwrap_or(false);
                    is_image.then(|| {
                        dict.get(b"Filter")
                            .ok()
                            .and_then(|f| f.as_name().ok())
                            .map(|n| n.to_vec())
                    })
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_images_to_pdf_one_page_per_image() {
        let (ctx, dir) = test_ctx();
        let a = write_image(&dir, "a.png", 100, 80);
        let b = write_image(&dir, "b.png", 640, 480);
        let c = write_image(&dir, "c.png", 32, 32);

        let out = images_to_pdf(&ctx, &[a, b, c]).unwrap();
        assert_eq!(out.mime_type, "application/pdf");

        let doc = lopdf::Document::load_mem(&out.data).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn test_jpeg_passes_through_as_dctdecode() {
        let (ctx, dir) = test_ctx();
        let jpeg = write_image(&dir, "photo.jpg", 120, 90);
        let jpeg_bytes = std::fs::read(&jpeg).unwrap();

        let out = images_to_pdf(&ctx, &[jpeg]).unwrap();
        let doc = lopdf::Document::load_mem(&out.data).unwrap();
        assert_eq!(doc.get_pages().len(), 1);

        // The JPEG is embedded as-is under the standard DCTDecode filter
        let filters = image_filters(&doc);
        assert_eq!(filters, vec![Some(b"DCTDecode".to_vec())]);

        let embedded = doc
            .objects
            .values()
            .find_map(|obj| match obj {
                Object::Stream(stream)
                    if stream
                        .dict
                        .get(b"Subtype")
                        .ok()
                        .and_then(|s| s.as_name().ok())
                        .map(|n| n == b"Image")
                        .unwrap_or(false) =>
                {
                    Some(stream.content.clone())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(embedded, jpeg_bytes);
    }

    #[test]
    fn test_png_is_flattened_to_raw_rgb() {
        let (ctx, dir) = test_ctx();
        let png = write_image(&dir, "flat.png", 10, 10);

        let out = images_to_pdf(&ctx, &[png]).unwrap();
        let doc = lopdf::Document::load_mem(&out.data).unwrap();

        // No filter entry: raw RGB samples, 3 bytes per pixel
        assert_eq!(image_filters(&doc), vec![None]);
    }

    #[test]
    fn test_images_to_pdf_rejects_non_image() {
        let (ctx, dir) = test_ctx();
        let bogus = dir.join("not-an-image.png");
        std::fs::write(&bogus, b"plain text").unwrap();

        let err = images_to_pdf(&ctx, &[bogus]).unwrap_err().to_string();
        assert!(err.contains("img2pdf"));
    }
}
