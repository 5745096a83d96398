//! PDF page manipulation: merge, split, rotate, remove
//!
//! All four operate in-process on the parsed document; no external tools.

use lopdf::{Document, Object, ObjectId};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::{ToolContext, ToolOutput};

/// One 1-based inclusive page range from a `pageRange` expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn is_single_page(&self) -> bool {
        self.start == self.end
    }

    /// Entry name inside the split ZIP
    pub fn entry_name(&self) -> String {
        if self.is_single_page() {
            format!("split_page_{}.pdf", self.start)
        } else {
            format!("pages_{}-{}.pdf", self.start, self.end)
        }
    }

    /// Stem used when a single range is emitted as a bare PDF
    pub fn file_stem(&self) -> String {
        if self.is_single_page() {
            format!("split_page_{}", self.start)
        } else {
            format!("pages_{}-{}", self.start, self.end)
        }
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

/// Parse a `pageRange` expression: a comma list of `N` or `A-B`, 1-based,
/// each range ascending. A single `N` is equivalent to `N-N`. Evaluated in
/// submission order.
pub fn parse_page_range(expr: &str) -> Result<Vec<PageRange>> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(Error::invalid("empty page range"));
    }

    let mut ranges = Vec::new();
    for part in expr.split(',') {
        let part = part.trim();
        let (start, end) = match part.split_once('-') {
            Some((a, b)) => (parse_page_number(part, a)?, parse_page_number(part, b)?),
            None => {
                let n = parse_page_number(part, part)?;
                (n, n)
            }
        };

        if start < 1 {
            return Err(Error::invalid(format!(
                "invalid page range '{}': pages are 1-based",
                part
            )));
        }
        if end < start {
            return Err(Error::invalid(format!(
                "invalid page range '{}': end before start",
                part
            )));
        }

        ranges.push(PageRange { start, end });
    }

    Ok(ranges)
}

fn parse_page_number(range: &str, token: &str) -> Result<u32> {
    token.trim().parse().map_err(|_| {
        Error::invalid(format!("invalid page range '{}': not a number", range))
    })
}

/// Merge two or more PDFs into one, pages ordered as submitted
pub fn merge(ctx: &ToolContext, inputs: &[PathBuf]) -> Result<ToolOutput> {
    let mut max_id = 1;
    // Page objects in submission-then-page order, plus the combined object set
    let mut all_pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut all_objects = std::collections::BTreeMap::new();

    let total = inputs.len();
    for (i, path) in inputs.iter().enumerate() {
        let mut doc = load_pdf("merge", path)?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for (_, page_id) in doc.get_pages() {
            let page = doc
                .get_object(page_id)
                .map_err(|e| Error::tool("merge", format!("unreadable page object: {}", e)))?
                .to_owned();
            all_pages.push((page_id, page));
        }
        all_objects.extend(doc.objects);

        ctx.progress(20 + ((i + 1) * 40 / total) as u8);
    }

    let mut document = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Object)> = None;
    let mut pages_node: Option<(ObjectId, Object)> = None;

    for (object_id, object) in &all_objects {
        match object_type(object) {
            b"Catalog" => {
                // Keep the first catalog encountered
                if catalog.is_none() {
                    catalog = Some((*object_id, object.clone()));
                }
            }
            b"Pages" => {
                // Fold every Pages node into one, keeping the first id
                if let Ok(dict) = object.as_dict() {
                    let mut merged = dict.clone();
                    if let Some((_, ref existing)) = pages_node {
                        if let Ok(existing) = existing.as_dict() {
                            merged.extend(existing);
                        }
                    }
                    let id = pages_node.as_ref().map(|(id, _)| *id).unwrap_or(*object_id);
                    pages_node = Some((id, Object::Dictionary(merged)));
                }
            }
            b"Page" | b"Outlines" | b"Outline" => {}
            _ => {
                document.objects.insert(*object_id, object.clone());
            }
        }
    }

    let (pages_id, pages_object) =
        pages_node.ok_or_else(|| Error::tool("merge", "no Pages node in any input"))?;
    let (catalog_id, catalog_object) =
        catalog.ok_or_else(|| Error::tool("merge", "no Catalog in any input"))?;

    for (page_id, page) in &all_pages {
        if let Ok(dict) = page.as_dict() {
            let mut dict = dict.clone();
            dict.set("Parent", pages_id);
            document.objects.insert(*page_id, Object::Dictionary(dict));
        }
    }

    if let Ok(dict) = pages_object.as_dict() {
        let mut dict = dict.clone();
        dict.set("Count", all_pages.len() as u32);
        dict.set(
            "Kids",
            all_pages
                .iter()
                .map(|(id, _)| Object::Reference(*id))
                .collect::<Vec<_>>(),
        );
        document.objects.insert(pages_id, Object::Dictionary(dict));
    }

    if let Ok(dict) = catalog_object.as_dict() {
        let mut dict = dict.clone();
        dict.set("Pages", pages_id);
        dict.remove(b"Outlines");
        document.objects.insert(catalog_id, Object::Dictionary(dict));
    }

    document.trailer.set("Root", catalog_id);
    document.max_id = document.objects.len() as u32;
    document.renumber_objects();
    document.compress();

    Ok(ToolOutput {
        data: save_pdf("merge", &mut document)?,
        mime_type: "application/pdf",
        file_name_base: "merged_documents".to_string(),
        extension: ".pdf",
    })
}

/// Split a PDF by page ranges. Exactly one range yields a bare PDF; more
/// yield a ZIP of named parts.
pub fn split(ctx: &ToolContext, input: &Path, page_range: &str) -> Result<ToolOutput> {
    let ranges = parse_page_range(page_range)?;
    let source = load_pdf("split", input)?;
    let page_count = source.get_pages().len() as u32;

    for range in &ranges {
        if range.end > page_count {
            return Err(Error::invalid(format!(
                "invalid page range '{}-{}': document has {} pages",
                range.start, range.end, page_count
            )));
        }
    }

    ctx.progress(40);

    let mut parts = Vec::with_capacity(ranges.len());
    for range in &ranges {
        let mut part = source.clone();
        let delete: Vec<u32> = (1..=page_count)
            .filter(|p| *p < range.start || *p > range.end)
            .collect();
        if !delete.is_empty() {
            part.delete_pages(&delete);
        }
        part.prune_objects();
        parts.push((range, save_pdf("split", &mut part)?));
    }

    ctx.progress(70);

    if parts.len() == 1 {
        let (range, data) = parts.remove(0);
        return Ok(ToolOutput {
            data,
            mime_type: "application/pdf",
            file_name_base: range.file_stem(),
            extension: ".pdf",
        });
    }

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default();
        for (range, data) in &parts {
            zip.start_file(range.entry_name(), options)
                .map_err(|e| Error::tool("split", format!("zip write failed: {}", e)))?;
            zip.write_all(data)
                .map_err(|e| Error::tool("split", format!("zip write failed: {}", e)))?;
        }
        zip.finish()
            .map_err(|e| Error::tool("split", format!("zip finalize failed: {}", e)))?;
    }

    Ok(ToolOutput {
        data: cursor.into_inner(),
        mime_type: "application/zip",
        file_name_base: "split_documents".to_string(),
        extension: ".zip",
    })
}

/// Rotate pages by 90/180/270 degrees, accumulating onto any existing
/// rotation. An empty page list rotates the whole document.
pub fn rotate(ctx: &ToolContext, input: &Path, angle: i64, pages: &[u32]) -> Result<ToolOutput> {
    let mut doc = load_pdf("rotate", input)?;
    let page_map = doc.get_pages();

    for (page_no, page_id) in page_map {
        if !pages.is_empty() && !pages.contains(&page_no) {
            continue;
        }
        let dict = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| Error::tool("rotate", format!("unreadable page {}: {}", page_no, e)))?;

        let current = dict
            .get(b"Rotate")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(0);
        dict.set("Rotate", (current + angle).rem_euclid(360));
    }

    ctx.progress(70);

    Ok(ToolOutput {
        data: save_pdf("rotate", &mut doc)?,
        mime_type: "application/pdf",
        file_name_base: "rotated_document".to_string(),
        extension: ".pdf",
    })
}

/// Remove the given 1-based pages
pub fn remove_pages(ctx: &ToolContext, input: &Path, pages: &[u32]) -> Result<ToolOutput> {
    let mut doc = load_pdf("remove", input)?;
    let page_count = doc.get_pages().len() as u32;

    for &page in pages {
        if page < 1 || page > page_count {
            return Err(Error::invalid(format!(
                "page {} out of bounds (document has {} pages)",
                page, page_count
            )));
        }
    }
    let distinct: std::collections::BTreeSet<u32> = pages.iter().copied().collect();
    if distinct.len() as u32 == page_count {
        return Err(Error::invalid("cannot remove every page"));
    }

    doc.delete_pages(pages);
    doc.prune_objects();

    ctx.progress(70);

    Ok(ToolOutput {
        data: save_pdf("remove", &mut doc)?,
        mime_type: "application/pdf",
        file_name_base: "removed_pages".to_string(),
        extension: ".pdf",
    })
}

pub(crate) fn load_pdf(tool: &str, path: &Path) -> Result<Document> {
    Document::load(path).map_err(|e| Error::tool(tool, format!("failed to parse PDF: {}", e)))
}

pub(crate) fn save_pdf(tool: &str, doc: &mut Document) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| Error::tool(tool, format!("failed to serialize PDF: {}", e)))?;
    Ok(buf)
}

fn object_type(object: &Object) -> &[u8] {
    object
        .as_dict()
        .ok()
        .and_then(|d| d.get(b"Type").ok())
        .and_then(|t| t.as_name().ok())
        .unwrap_or(b"")
}

#[cfg(test)]
pub(crate) mod test_support {
    use lopdf::{dictionary, Document, Object, Stream};
    use std::path::PathBuf;

    /// Build a minimal PDF with `page_count` pages, each drawing its index,
    /// and write it into `dir`
    pub fn write_test_pdf(dir: &std::path::Path, name: &str, page_count: usize) -> PathBuf {
        let mut doc = Document::with_version("1.5");

        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for i in 0..page_count {
            let content = format!("BT /F1 24 Tf 72 720 Td (page {}) Tj ET", i + 1);
            let content_id =
                doc.add_object(Object::Stream(Stream::new(dictionary! {}, content.into_bytes())));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count as u32,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let path = dir.join(name);
        doc.save(&path).unwrap();
        path
    }

    pub fn page_count(data: &[u8]) -> usize {
        Document::load_mem(data).unwrap().get_pages().len()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{page_count, write_test_pdf};
    use super::*;
    use lopdf::Document;
    use std::io::Read;
    use std::time::Duration;
    use uuid::Uuid;

    fn test_ctx() -> (ToolContext, PathBuf) {
        let dir = std::env::temp_dir().join(format!("docsmart-pdfops-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let ctx = ToolContext::new(dir.clone(), Duration::from_secs(60), Box::new(|_| {}));
        (ctx, dir)
    }

    #[test]
    fn test_parse_page_range() {
        assert_eq!(
            parse_page_range("1-3,5,8-10").unwrap(),
            vec![
                PageRange { start: 1, end: 3 },
                PageRange { start: 5, end: 5 },
                PageRange { start: 8, end: 10 },
            ]
        );
        assert_eq!(
            parse_page_range(" 2 - 4 ").unwrap(),
            vec![PageRange { start: 2, end: 4 }]
        );

        for bad in ["", "a-b", "5-3", "0", "0-2", "1,,3"] {
            let err = parse_page_range(bad).unwrap_err().to_string();
            assert!(err.contains("range"), "error for '{}' should mention range: {}", bad, err);
        }
    }

    #[test]
    fn test_range_entry_names() {
        assert_eq!(PageRange { start: 5, end: 5 }.entry_name(), "split_page_5.pdf");
        assert_eq!(PageRange { start: 1, end: 3 }.entry_name(), "pages_1-3.pdf");
    }

    #[test]
    fn test_merge_preserves_page_count_and_order() {
        let (ctx, dir) = test_ctx();
        let a = write_test_pdf(&dir, "a.pdf", 2);
        let b = write_test_pdf(&dir, "b.pdf", 3);

        let out = merge(&ctx, &[a, b]).unwrap();
        assert_eq!(out.extension, ".pdf");
        assert_eq!(page_count(&out.data), 5);

        // Page order: a1 a2 b1 b2 b3, checked via the page text
        let doc = Document::load_mem(&out.data).unwrap();
        let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
        let texts: Vec<String> = pages
            .iter()
            .map(|p| doc.extract_text(&[*p]).unwrap_or_default())
            .collect();
        assert!(texts[0].contains("page 1"));
        assert!(texts[1].contains("page 2"));
        assert!(texts[2].contains("page 1"));
        assert!(texts[4].contains("page 3"));
    }

    #[test]
    fn test_split_multiple_ranges_yields_zip() {
        let (ctx, dir) = test_ctx();
        let input = write_test_pdf(&dir, "c.pdf", 10);

        let out = split(&ctx, &input, "1-3,5,8-10").unwrap();
        assert_eq!(out.mime_type, "application/zip");
        assert_eq!(out.extension, ".zip");

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(out.data)).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["pages_1-3.pdf", "pages_8-10.pdf", "split_page_5.pdf"]);

        let mut entry = archive.by_name("pages_1-3.pdf").unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        assert_eq!(page_count(&data), 3);
    }

    #[test]
    fn test_split_single_range_yields_bare_pdf() {
        let (ctx, dir) = test_ctx();
        let input = write_test_pdf(&dir, "d.pdf", 4);

        let out = split(&ctx, &input, "2-3").unwrap();
        assert_eq!(out.mime_type, "application/pdf");
        assert_eq!(out.file_name_base, "pages_2-3");
        assert_eq!(page_count(&out.data), 2);
    }

    #[test]
    fn test_split_out_of_bounds_range() {
        let (ctx, dir) = test_ctx();
        let input = write_test_pdf(&dir, "e.pdf", 3);

        let err = split(&ctx, &input, "2-9").unwrap_err().to_string();
        assert!(err.contains("range"));
    }

    #[test]
    fn test_rotate_accumulates_mod_360() {
        let (ctx, dir) = test_ctx();
        let input = write_test_pdf(&dir, "f.pdf", 2);

        let once = rotate(&ctx, &input, 180, &[]).unwrap();
        let tmp = dir.join("once.pdf");
        std::fs::write(&tmp, &once.data).unwrap();
        let twice = rotate(&ctx, &tmp, 180, &[]).unwrap();

        let doc = Document::load_mem(&twice.data).unwrap();
        for (_, page_id) in doc.get_pages() {
            let rotate = doc
                .get_dictionary(page_id)
                .unwrap()
                .get(b"Rotate")
                .unwrap()
                .as_i64()
                .unwrap();
            assert_eq!(rotate, 0);
        }
    }

    #[test]
    fn test_rotate_specific_pages() {
        let (ctx, dir) = test_ctx();
        let input = write_test_pdf(&dir, "g.pdf", 3);

        let out = rotate(&ctx, &input, 90, &[2]).unwrap();
        let doc = Document::load_mem(&out.data).unwrap();
        for (page_no, page_id) in doc.get_pages() {
            let rotate = doc
                .get_dictionary(page_id)
                .unwrap()
                .get(b"Rotate")
                .ok()
                .and_then(|o| o.as_i64().ok())
                .unwrap_or(0);
            assert_eq!(rotate, if page_no == 2 { 90 } else { 0 });
        }
    }

    #[test]
    fn test_remove_pages() {
        let (ctx, dir) = test_ctx();
        let input = write_test_pdf(&dir, "h.pdf", 5);

        let out = remove_pages(&ctx, &input, &[2, 4]).unwrap();
        assert_eq!(page_count(&out.data), 3);

        assert!(remove_pages(&ctx, &input, &[9]).is_err());
        assert!(remove_pages(&ctx, &input, &[1, 2, 3, 4, 5]).is_err());
    }
}
