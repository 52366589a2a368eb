//! Word (docx) text extraction and minimal generation.

use std::io::{Read, Seek, Write};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::write::SimpleFileOptions;

use super::{xml_escape, OoxmlError};

/// Zip parts of a docx that carry substitutable text: the main document
/// plus any headers and footers.
pub fn text_parts<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> Vec<String> {
    let mut parts = Vec::new();
    for i in 0..archive.len() {
        if let Some(name) = archive.name_for_index(i) {
            let is_main = name == "word/document.xml";
            let is_margin = (name.starts_with("word/header") || name.starts_with("word/footer"))
                && name.ends_with(".xml");
            if is_main || is_margin {
                parts.push(name.to_string());
            }
        }
    }
    // Deterministic order, main document first.
    parts.sort_by_key(|p| (p != "word/document.xml", p.clone()));
    parts
}

/// Plain-text dump of every text run, one line per paragraph, across the
/// main document and its headers/footers.
pub fn extract_text(path: &Path) -> Result<String, OoxmlError> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| OoxmlError::Container(format!("failed to open docx: {}", e)))?;

    let mut text = String::new();
    for part in text_parts(&mut archive) {
        let xml = super::xlsx::read_part(&mut archive, &part)?;
        text.push_str(&paragraphs_from_xml(&xml, &part)?);
    }
    Ok(text)
}

pub(crate) fn paragraphs_from_xml(xml: &str, part: &str) -> Result<String, OoxmlError> {
    let mut reader = Reader::from_str(xml);

    let mut text = String::new();
    let mut in_text_element = false;
    let mut in_paragraph = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = true,
                b"p" => in_paragraph = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"p" => {
                    if in_paragraph {
                        text.push('\n');
                        in_paragraph = false;
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_element {
                    text.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(OoxmlError::Xml {
                    part: part.to_string(),
                    reason: e.to_string(),
                })
            }
            _ => {}
        }
    }
    Ok(text)
}

/// Writes a bare docx of one run per paragraph. The last-resort rendering
/// path when conversion into a word container has no richer source to
/// carry formatting from.
pub fn write_docx(paragraphs: &[String], output: &Path) -> Result<(), OoxmlError> {
    let file = std::fs::File::create(output)?;
    let mut zip = zip::ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#,
    )?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#,
    )?;

    let mut document = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>
"#,
    );
    for paragraph in paragraphs {
        document.push_str(&format!(
            "<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>\n",
            xml_escape(paragraph)
        ));
    }
    document.push_str("<w:sectPr/>\n</w:body>\n</w:document>");

    zip.start_file("word/document.xml", options)?;
    zip.write_all(document.as_bytes())?;
    zip.finish()?;
    Ok(())
}
