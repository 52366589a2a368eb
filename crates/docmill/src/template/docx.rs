//! Word template rendering.
//!
//! Word splits literal text into arbitrary runs, so a placeholder can
//! straddle several `<w:t>` nodes. Substitution therefore works per
//! paragraph: the paragraph's run text is concatenated, substituted as a
//! whole and, when it changed, written back into the paragraph's first
//! text node while the remaining ones are emptied. Run formatting of the
//! first node wins for substituted values.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::Path;

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use zip::write::SimpleFileOptions;

use super::RenderFailure;
use crate::ooxml::docx::{paragraphs_from_xml, text_parts};
use crate::placeholder::{extract_names as names_in_text, substitute, Record};

pub(super) fn extract_names(bytes: &[u8]) -> Result<Vec<String>, String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| format!("failed to open docx: {}", e))?;

    let mut text = String::new();
    for part in text_parts(&mut archive) {
        let xml = read_entry(&mut archive, &part)?;
        text.push_str(
            &paragraphs_from_xml(&xml, &part).map_err(|e| e.to_string())?,
        );
    }
    Ok(names_in_text(&text))
}

pub(super) fn render(
    bytes: &[u8],
    record: &Record,
    output: &Path,
) -> Result<BTreeSet<String>, RenderFailure> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| RenderFailure::Read(format!("failed to open docx: {}", e)))?;
    let rewrite_parts = text_parts(&mut archive);

    let out_file = std::fs::File::create(output).map_err(RenderFailure::Write)?;
    let mut writer = zip::ZipWriter::new(out_file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut missing = BTreeSet::new();
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| RenderFailure::Read(e.to_string()))?;
        let name = entry.name().to_string();

        if rewrite_parts.contains(&name) {
            let xml = read_to_string(entry)?;
            let rewritten = rewrite_part(&xml, record, &mut missing)?;
            writer
                .start_file(name, options)
                .map_err(|e| RenderFailure::Write(std::io::Error::other(e)))?;
            writer
                .write_all(rewritten.as_bytes())
                .map_err(RenderFailure::Write)?;
        } else {
            writer
                .raw_copy_file(entry)
                .map_err(|e| RenderFailure::Write(std::io::Error::other(e)))?;
        }
    }

    writer
        .finish()
        .map_err(|e| RenderFailure::Write(std::io::Error::other(e)))?;
    Ok(missing)
}

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    part: &str,
) -> Result<String, String> {
    let entry = archive
        .by_name(part)
        .map_err(|_| format!("missing part '{}'", part))?;
    let mut xml = String::new();
    let mut entry = entry;
    entry
        .read_to_string(&mut xml)
        .map_err(|e| e.to_string())?;
    Ok(xml)
}

fn read_to_string<R: Read>(mut entry: R) -> Result<String, RenderFailure> {
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| RenderFailure::Read(e.to_string()))?;
    Ok(xml)
}

/// Streams one XML part, buffering each paragraph and substituting its
/// combined run text. Everything outside paragraphs is echoed untouched.
fn rewrite_part(
    xml: &str,
    record: &Record,
    missing: &mut BTreeSet<String>,
) -> Result<String, RenderFailure> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());

    let mut paragraph: Option<Vec<Event<'static>>> = None;
    // Text boxes nest paragraphs inside paragraphs; buffer to the
    // outermost close.
    let mut depth = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| RenderFailure::Read(e.to_string()))?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) if e.local_name().as_ref() == b"p" => match paragraph {
                Some(ref mut buffer) => {
                    depth += 1;
                    buffer.push(event.into_owned());
                }
                None => paragraph = Some(vec![event.into_owned()]),
            },
            Event::End(ref e) if e.local_name().as_ref() == b"p" => match paragraph {
                Some(ref mut buffer) if depth > 0 => {
                    depth -= 1;
                    buffer.push(event.into_owned());
                }
                Some(_) => {
                    let mut buffer = paragraph.take().unwrap_or_default();
                    buffer.push(event.into_owned());
                    flush_paragraph(&mut writer, buffer, record, missing)?;
                }
                None => write_event(&mut writer, event)?,
            },
            other => match paragraph {
                Some(ref mut buffer) => buffer.push(other.into_owned()),
                None => write_event(&mut writer, other)?,
            },
        }
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| RenderFailure::Read(e.to_string()))
}

fn flush_paragraph(
    writer: &mut Writer<Vec<u8>>,
    buffer: Vec<Event<'static>>,
    record: &Record,
    missing: &mut BTreeSet<String>,
) -> Result<(), RenderFailure> {
    let mut combined = String::new();
    let mut in_text = false;
    for event in &buffer {
        match event {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) if e.local_name().as_ref() == b"t" => in_text = false,
            Event::Text(t) if in_text => {
                combined.push_str(&t.unescape().unwrap_or_default());
            }
            _ => {}
        }
    }

    let substituted = substitute(&combined, record, missing);
    if substituted == combined {
        for event in buffer {
            write_event(writer, event)?;
        }
        return Ok(());
    }

    let mut in_text = false;
    let mut text_written = false;
    for event in buffer {
        match event {
            Event::Start(ref e) if e.local_name().as_ref() == b"t" => {
                in_text = true;
                write_event(writer, Event::Start(with_space_preserve(e)))?;
            }
            Event::End(ref e) if e.local_name().as_ref() == b"t" => {
                in_text = false;
                write_event(writer, event)?;
            }
            Event::Text(_) if in_text => {
                if !text_written {
                    write_event(writer, Event::Text(BytesText::new(&substituted)))?;
                    text_written = true;
                }
                // Later run texts collapse to empty; their markup stays.
            }
            other => write_event(writer, other)?,
        }
    }
    Ok(())
}

/// Clone of a `<w:t>` start tag with `xml:space="preserve"` guaranteed,
/// so substituted values keep leading/trailing spaces.
fn with_space_preserve(e: &BytesStart) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    let mut has_space_attr = false;
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"xml:space" {
            has_space_attr = true;
        }
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().unwrap_or_default().into_owned();
        out.push_attribute((key.as_str(), value.as_str()));
    }
    if !has_space_attr {
        out.push_attribute(("xml:space", "preserve"));
    }
    out
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event) -> Result<(), RenderFailure> {
    writer
        .write_event(event)
        .map_err(|e| RenderFailure::Write(std::io::Error::other(e)))
}
