//! Content-stream overlays: watermark and page numbers
//!
//! Both append a second content stream to each page rather than rewriting
//! the existing one, so the original page content is untouched.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::path::Path;

use crate::error::{Error, Result};

use super::pdf_ops::{load_pdf, save_pdf};
use super::{ToolContext, ToolOutput};

const WATERMARK_TEXT: &str = "Processed by DocSmart";
const WATERMARK_FONT_SIZE: f64 = 40.0;
const WATERMARK_OPACITY: f64 = 0.2;
// cos/sin of the 45 degree diagonal
const DIAG: f64 = 0.7071;

const PAGE_NUMBER_FONT_SIZE: f64 = 14.0;
const PAGE_NUMBER_MARGIN: f64 = 30.0;

// Approximate Helvetica advance width as a fraction of the font size;
// close enough for centering and right-aligning short strings.
const HELVETICA_AVG_WIDTH: f64 = 0.5;
const HELVETICA_DIGIT_WIDTH: f64 = 0.556;

/// Stamp a translucent diagonal watermark across the center of every page
pub fn add_watermark(ctx: &ToolContext, input: &Path) -> Result<ToolOutput> {
    let mut doc = load_pdf("addWatermark", input)?;

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let gstate_id = doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "ca" => Object::Real(WATERMARK_OPACITY as f32),
        "CA" => Object::Real(WATERMARK_OPACITY as f32),
    });

    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    let total = pages.len();
    for (i, page_id) in pages.into_iter().enumerate() {
        let (width, height) = page_size(&doc, page_id);
        let content = watermark_content(width, height);
        let stream_id = doc.add_object(Object::Stream(Stream::new(
            dictionary! {},
            content.into_bytes(),
        )));

        append_page_content(&mut doc, page_id, stream_id)?;
        add_page_resource(&mut doc, page_id, "Font", "FDW", font_id)?;
        add_page_resource(&mut doc, page_id, "ExtGState", "GDW", gstate_id)?;

        ctx.progress(20 + ((i + 1) * 60 / total.max(1)) as u8);
    }

    Ok(ToolOutput {
        data: save_pdf("addWatermark", &mut doc)?,
        mime_type: "application/pdf",
        file_name_base: "watermarked_document".to_string(),
        extension: ".pdf",
    })
}

/// Print the 1-based page index in the top-right corner of every page
pub fn add_page_numbers(ctx: &ToolContext, input: &Path) -> Result<ToolOutput> {
    let mut doc = load_pdf("addPageNumbers", input)?;

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
    let total = pages.len();
    for (i, (page_no, page_id)) in pages.into_iter().enumerate() {
        let (width, height) = page_size(&doc, page_id);
        let label = page_no.to_string();
        let text_width = HELVETICA_DIGIT_WIDTH * PAGE_NUMBER_FONT_SIZE * label.len() as f64;
        let x = width - PAGE_NUMBER_MARGIN - text_width;
        let y = height - PAGE_NUMBER_MARGIN - PAGE_NUMBER_FONT_SIZE;

        let content = format!(
            "q\nBT\n/FDN {:.0} Tf\n{:.2} {:.2} Td\n({}) Tj\nET\nQ\n",
            PAGE_NUMBER_FONT_SIZE,
            x,
            y,
            escape_pdf_string(&label)
        );
        let stream_id = doc.add_object(Object::Stream(Stream::new(
            dictionary! {},
            content.into_bytes(),
        )));

        append_page_content(&mut doc, page_id, stream_id)?;
        add_page_resource(&mut doc, page_id, "Font", "FDN", font_id)?;

        ctx.progress(20 + ((i + 1) * 60 / total.max(1)) as u8);
    }

    Ok(ToolOutput {
        data: save_pdf("addPageNumbers", &mut doc)?,
        mime_type: "application/pdf",
        file_name_base: "numbered_document".to_string(),
        extension: ".pdf",
    })
}

fn watermark_content(width: f64, height: f64) -> String {
    let text_width = HELVETICA_AVG_WIDTH * WATERMARK_FONT_SIZE * WATERMARK_TEXT.len() as f64;
    let (cx, cy) = (width / 2.0, height / 2.0);

    // Place the string so its center lands on the page center after the
    // 45 degree rotation: offset (-w/2, -fs/2) rotated into page space.
    let (ox, oy) = (-text_width / 2.0, -WATERMARK_FONT_SIZE / 2.0);
    let tx = cx + ox * DIAG - oy * DIAG;
    let ty = cy + ox * DIAG + oy * DIAG;

    format!(
        "q\n/GDW gs\nBT\n/FDW {:.0} Tf\n{d} {d} -{d} {d} {:.2} {:.2} Tm\n({}) Tj\nET\nQ\n",
        WATERMARK_FONT_SIZE,
        tx,
        ty,
        escape_pdf_string(WATERMARK_TEXT),
        d = DIAG,
    )
}

/// Append a content stream to a page, preserving whatever is already there
fn append_page_content(doc: &mut Document, page_id: ObjectId, stream_id: ObjectId) -> Result<()> {
    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| Error::tool("overlay", format!("unreadable page object: {}", e)))?;

    let mut contents: Vec<Object> = match page.get(b"Contents") {
        Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    contents.push(Object::Reference(stream_id));
    page.set("Contents", contents);

    Ok(())
}

/// Register an object under the page's resources, materializing an inline
/// copy of inherited or shared resource dictionaries first so sibling pages
/// are not affected.
fn add_page_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    name: &str,
    target: ObjectId,
) -> Result<()> {
    let mut resources = resolve_inherited_dict(doc, page_id, b"Resources")
        .and_then(|obj| dict_of(doc, &obj))
        .unwrap_or_default();

    let mut entries = resources
        .get(category.as_bytes())
        .ok()
        .cloned()
        .and_then(|obj| dict_of(doc, &obj))
        .unwrap_or_default();
    entries.set(name, target);
    resources.set(category, Object::Dictionary(entries));

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| Error::tool("overlay", format!("unreadable page object: {}", e)))?;
    page.set("Resources", Object::Dictionary(resources));

    Ok(())
}

/// Width and height from the page's (possibly inherited) MediaBox;
/// US Letter when absent
fn page_size(doc: &Document, page_id: ObjectId) -> (f64, f64) {
    let rect = resolve_inherited_dict(doc, page_id, b"MediaBox")
        .and_then(|obj| match obj {
            Object::Array(items) if items.len() == 4 => {
                let nums: Vec<f64> = items.iter().filter_map(|o| as_number(doc, o)).collect();
                (nums.len() == 4).then(|| (nums[0], nums[1], nums[2], nums[3]))
            }
            _ => None,
        })
        .unwrap_or((0.0, 0.0, 612.0, 792.0));

    (rect.2 - rect.0, rect.3 - rect.1)
}

/// Look up a page attribute, walking the Parent chain for inheritable keys
fn resolve_inherited_dict(doc: &Document, mut node_id: ObjectId, key: &[u8]) -> Option<Object> {
    for _ in 0..32 {
        let dict = doc.get_dictionary(node_id).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => node_id = *parent,
            _ => return None,
        }
    }
    None
}

fn dict_of(doc: &Document, obj: &Object) -> Option<Dictionary> {
    match obj {
        Object::Dictionary(d) => Some(d.clone()),
        Object::Reference(id) => doc.get_dictionary(*id).ok().cloned(),
        _ => None,
    }
}

fn as_number(doc: &Document, obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        Object::Reference(id) => doc.get_object(*id).ok().and_then(|o| as_number(doc, o)),
        _ => None,
    }
}

fn escape_pdf_string(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '(' => "\\(".to_string(),
            ')' => "\\)".to_string(),
            '\\' => "\\\\".to_string(),
            c if c.is_ascii() && !c.is_control() => c.to_string(),
            _ => " ".to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::pdf_ops::test_support::{page_count, write_test_pdf};
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use uuid::Uuid;

    fn test_ctx() -> (ToolContext, PathBuf) {
        let dir = std::env::temp_dir().join(format!("docsmart-overlay-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let ctx = ToolContext::new(dir.clone(), Duration::from_secs(60), Box::new(|_| {}));
        (ctx, dir)
    }

    #[test]
    fn test_watermark_keeps_page_count() {
        let (ctx, dir) = test_ctx();
        let input = write_test_pdf(&dir, "wm.pdf", 3);

        let out = add_watermark(&ctx, &input).unwrap();
        assert_eq!(out.mime_type, "application/pdf");
        assert_eq!(page_count(&out.data), 3);
    }

    #[test]
    fn test_watermark_appends_second_content_stream() {
        let (ctx, dir) = test_ctx();
        let input = write_test_pdf(&dir, "wm2.pdf", 1);

        let out = add_watermark(&ctx, &input).unwrap();
        let doc = Document::load_mem(&out.data).unwrap();
        let (_, page_id) = doc.get_pages().into_iter().next().unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        match page.get(b"Contents").unwrap() {
            Object::Array(items) => assert_eq!(items.len(), 2),
            other => panic!("expected Contents array, got {:?}", other),
        }
    }

    #[test]
    fn test_page_numbers_keep_page_count_and_text() {
        let (ctx, dir) = test_ctx();
        let input = write_test_pdf(&dir, "pn.pdf", 2);

        let out = add_page_numbers(&ctx, &input).unwrap();
        assert_eq!(page_count(&out.data), 2);

        let doc = Document::load_mem(&out.data).unwrap();
        let text = doc.extract_text(&[2]).unwrap_or_default();
        assert!(text.contains('2'), "page 2 overlay should print '2': {}", text);
    }

    #[test]
    fn test_escape_pdf_string() {
        assert_eq!(escape_pdf_string("a(b)c\\"), "a\\(b\\)c\\\\");
    }
}
