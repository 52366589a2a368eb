//! Direct PDF generation and merging.
//!
//! The generator is the last-resort strategy when no office suite is
//! available: plain Helvetica text layout, good enough for letters and
//! record dumps. Merging rebuilds one page tree over the renumbered
//! objects of every input document.

use std::path::{Path, PathBuf};

use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use super::error::ConvertError;

const LINES_PER_PAGE: usize = 50;

/// Renders plain text into a single-column PDF, one page per 50 lines.
pub fn text_to_pdf(text: &str) -> Result<Vec<u8>, ConvertError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.new_object_id();
    let resources_id = doc.new_object_id();

    doc.objects.insert(
        font_id,
        Object::Dictionary(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        }),
    );

    doc.objects.insert(
        resources_id,
        Object::Dictionary(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        }),
    );

    let lines: Vec<&str> = text.lines().collect();
    let page_count = lines.len().div_ceil(LINES_PER_PAGE).max(1);

    let mut page_ids = Vec::new();
    for page_num in 0..page_count {
        let start = page_num * LINES_PER_PAGE;
        let end = ((page_num + 1) * LINES_PER_PAGE).min(lines.len());
        let page_lines = if start < lines.len() {
            &lines[start..end]
        } else {
            &[]
        };

        let content_id = doc.new_object_id();
        let page_id = doc.new_object_id();

        let content = layout_page(page_lines);
        doc.objects.insert(
            content_id,
            Object::Stream(Stream::new(dictionary! {}, content.into_bytes())),
        );

        doc.objects.insert(
            page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
                "Contents" => content_id,
            }),
        );
        page_ids.push(page_id);
    }

    let kids: Vec<Object> = page_ids.iter().map(|id| (*id).into()).collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_ids.len() as i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| ConvertError::Pdf(e.to_string()))?;
    Ok(buffer)
}

fn layout_page(lines: &[&str]) -> String {
    let mut content = String::new();
    content.push_str("BT\n");
    content.push_str("/F1 11 Tf\n");
    content.push_str("50 742 Td\n");
    content.push_str("14 TL\n");
    for line in lines {
        content.push_str(&format!("({}) Tj T*\n", escape_pdf_string(line)));
    }
    content.push_str("ET\n");
    content
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

/// Concatenates `inputs` into one document at `output`, pages in input
/// order.
pub fn merge_pdfs(inputs: &[PathBuf], output: &Path) -> Result<(), ConvertError> {
    if inputs.is_empty() {
        return Err(ConvertError::Pdf("no documents to merge".to_string()));
    }

    let mut max_id = 1u32;
    let mut page_objects: Vec<(ObjectId, Object)> = Vec::new();
    let mut objects = std::collections::BTreeMap::new();

    for path in inputs {
        let mut doc = Document::load(path).map_err(|e| {
            ConvertError::Pdf(format!("failed to load '{}': {}", path.display(), e))
        })?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for (_, object_id) in doc.get_pages() {
            let object = doc
                .get_object(object_id)
                .map_err(|e| ConvertError::Pdf(e.to_string()))?
                .to_owned();
            page_objects.push((object_id, object));
        }
        objects.append(&mut doc.objects);
    }

    // One catalog and one pages root survive; the rest are dropped and
    // every page re-parented under the survivor.
    let mut catalog_id: Option<ObjectId> = None;
    let mut pages_root_id: Option<ObjectId> = None;
    for (id, object) in &objects {
        let Ok(dict) = object.as_dict() else { continue };
        let Ok(Object::Name(type_name)) = dict.get(b"Type") else {
            continue;
        };
        match type_name.as_slice() {
            b"Catalog" if catalog_id.is_none() => catalog_id = Some(*id),
            b"Pages" if pages_root_id.is_none() => pages_root_id = Some(*id),
            _ => {}
        }
    }
    let catalog_id =
        catalog_id.ok_or_else(|| ConvertError::Pdf("no catalog in inputs".to_string()))?;
    let pages_root_id =
        pages_root_id.ok_or_else(|| ConvertError::Pdf("no page tree in inputs".to_string()))?;

    objects.retain(|id, object| {
        let type_name = object
            .as_dict()
            .ok()
            .and_then(|d| d.get(b"Type").ok())
            .and_then(|t| match t {
                Object::Name(name) => Some(name.clone()),
                _ => None,
            });
        match type_name.as_deref() {
            Some(b"Catalog") => *id == catalog_id,
            Some(b"Pages") => *id == pages_root_id,
            _ => true,
        }
    });

    let kids: Vec<Object> = page_objects
        .iter()
        .map(|(id, _)| Object::Reference(*id))
        .collect();
    let page_count = page_objects.len();

    for (id, object) in page_objects {
        if let Object::Dictionary(mut dict) = object {
            dict.set("Parent", Object::Reference(pages_root_id));
            objects.insert(id, Object::Dictionary(dict));
        }
    }

    if let Some(Object::Dictionary(dict)) = objects.get_mut(&pages_root_id) {
        dict.set("Kids", kids);
        dict.set("Count", page_count as i64);
    }
    if let Some(Object::Dictionary(dict)) = objects.get_mut(&catalog_id) {
        dict.set("Pages", Object::Reference(pages_root_id));
        dict.remove(b"Outlines");
    }

    let mut merged = Document::with_version("1.5");
    merged.objects = objects;
    merged.max_id = max_id;
    merged.trailer.set("Root", catalog_id);
    merged.renumber_objects();
    merged.compress();
    merged
        .save(output)
        .map_err(|e| ConvertError::Pdf(e.to_string()))?;
    Ok(())
}

/// Splits `input` into parts of at most `pages_per_part` pages each,
/// written to `output_dir` as `<stem>_part_N.pdf` in page order.
pub fn split_pdf(
    input: &Path,
    output_dir: &Path,
    pages_per_part: usize,
) -> Result<Vec<PathBuf>, ConvertError> {
    if pages_per_part == 0 {
        return Err(ConvertError::Pdf(
            "pages per part must be positive".to_string(),
        ));
    }
    let doc = Document::load(input).map_err(|e| {
        ConvertError::Pdf(format!("failed to load '{}': {}", input.display(), e))
    })?;
    let total = doc.get_pages().len() as u32;
    let mut ranges = Vec::new();
    let mut first = 1u32;
    while first <= total {
        let last = (first + pages_per_part as u32 - 1).min(total);
        ranges.push((first, last));
        first = last + 1;
    }
    save_parts(&doc, input, output_dir, &ranges)
}

/// Splits `input` along explicit one-based `(first, last)` page ranges,
/// one output part per range.
pub fn split_pdf_ranges(
    input: &Path,
    output_dir: &Path,
    ranges: &[(u32, u32)],
) -> Result<Vec<PathBuf>, ConvertError> {
    if ranges.is_empty() {
        return Err(ConvertError::Pdf("no page ranges to split".to_string()));
    }
    let doc = Document::load(input).map_err(|e| {
        ConvertError::Pdf(format!("failed to load '{}': {}", input.display(), e))
    })?;
    let total = doc.get_pages().len() as u32;
    for &(first, last) in ranges {
        if first == 0 || first > last || last > total {
            return Err(ConvertError::Pdf(format!(
                "invalid page range {}-{} for a {}-page document",
                first, last, total
            )));
        }
    }
    save_parts(&doc, input, output_dir, ranges)
}

fn save_parts(
    doc: &Document,
    input: &Path,
    output_dir: &Path,
    ranges: &[(u32, u32)],
) -> Result<Vec<PathBuf>, ConvertError> {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    let mut parts = Vec::with_capacity(ranges.len());
    for (index, &(first, last)) in ranges.iter().enumerate() {
        let mut part = doc.clone();
        let total = part.get_pages().len() as u32;
        let dropped: Vec<u32> = (1..=total).filter(|p| *p < first || *p > last).collect();
        part.delete_pages(&dropped);
        part.renumber_objects();
        part.compress();

        let path = output_dir.join(format!("{}_part_{}.pdf", stem, index + 1));
        part.save(&path)
            .map_err(|e| ConvertError::Pdf(e.to_string()))?;
        parts.push(path);
    }
    Ok(parts)
}

/// Extracted text of a PDF, for verification in tests and diagnostics.
pub fn extract_text(path: &Path) -> Result<String, ConvertError> {
    let doc = Document::load(path).map_err(|e| ConvertError::Pdf(e.to_string()))?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    doc.extract_text(&pages)
        .map_err(|e| ConvertError::Pdf(e.to_string()))
}

pub fn page_count(path: &Path) -> Result<usize, ConvertError> {
    let doc = Document::load(path).map_err(|e| ConvertError::Pdf(e.to_string()))?;
    Ok(doc.get_pages().len())
}
