//! Spreadsheet template rendering.
//!
//! Shared strings are a workbook-wide table, so substituting one in place
//! would leak into sheets a selector excluded. Cells whose resolved text
//! changes are instead rewritten as self-contained `inlineStr` cells; the
//! shared-string table itself is carried through untouched.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::Path;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use zip::write::SimpleFileOptions;

use super::RenderFailure;
use crate::ooxml::xlsx::{read_shared_strings, sheet_parts, Workbook};
use crate::ooxml::xml_escape;
use crate::placeholder::{extract_names as names_in_text, substitute, Record};

pub(super) fn extract_names(bytes: &[u8]) -> Result<Vec<String>, String> {
    let workbook = Workbook::from_bytes(bytes).map_err(|e| e.to_string())?;

    let mut text = String::new();
    for sheet in &workbook.sheets {
        for row in &sheet.rows {
            for cell in row {
                if !cell.is_empty() {
                    text.push_str(cell);
                    text.push('\n');
                }
            }
        }
    }
    Ok(names_in_text(&text))
}

/// Worksheet part path for a named sheet, `Ok(None)` when absent.
pub(super) fn find_sheet_part(bytes: &[u8], name: &str) -> Result<Option<String>, String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| format!("failed to open xlsx: {}", e))?;
    let parts = sheet_parts(&mut archive).map_err(|e| e.to_string())?;
    Ok(parts
        .into_iter()
        .find(|(sheet_name, _)| sheet_name == name)
        .map(|(_, part)| part))
}

pub(super) fn render(
    bytes: &[u8],
    record: &Record,
    output: &Path,
    only_part: Option<&str>,
) -> Result<BTreeSet<String>, RenderFailure> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| RenderFailure::Read(format!("failed to open xlsx: {}", e)))?;

    let shared = read_shared_strings(&mut archive)
        .map_err(|e| RenderFailure::Read(e.to_string()))?;
    let worksheet_parts: Vec<String> = sheet_parts(&mut archive)
        .map_err(|e| RenderFailure::Read(e.to_string()))?
        .into_iter()
        .map(|(_, part)| part)
        .collect();

    let out_file = std::fs::File::create(output).map_err(RenderFailure::Write)?;
    let mut writer = zip::ZipWriter::new(out_file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut missing = BTreeSet::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| RenderFailure::Read(e.to_string()))?;
        let name = entry.name().to_string();

        let targeted = worksheet_parts.contains(&name)
            && only_part.map(|p| p == name).unwrap_or(true);
        if targeted {
            let mut xml = String::new();
            entry
                .read_to_string(&mut xml)
                .map_err(|e| RenderFailure::Read(e.to_string()))?;
            let rewritten = rewrite_sheet(&xml, record, &shared, &mut missing)?;
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

#[derive(Debug, Clone, Copy, PartialEq)]
enum CellKind {
    Plain,
    Shared,
    Inline,
    Formula,
}

/// Streams a worksheet, buffering each `<c>` element. Cells resolving to
/// text with a changed substitution are rebuilt as `inlineStr`.
fn rewrite_sheet(
    xml: &str,
    record: &Record,
    shared: &[String],
    missing: &mut BTreeSet<String>,
) -> Result<String, RenderFailure> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());

    let mut cell: Option<Vec<Event<'static>>> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| RenderFailure::Read(e.to_string()))?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) if e.local_name().as_ref() == b"c" => {
                cell = Some(vec![event.into_owned()]);
            }
            Event::End(ref e) if e.local_name().as_ref() == b"c" => match cell.take() {
                Some(mut buffer) => {
                    buffer.push(event.into_owned());
                    flush_cell(&mut writer, buffer, record, shared, missing)?;
                }
                None => write_event(&mut writer, event)?,
            },
            other => match cell {
                Some(ref mut buffer) => buffer.push(other.into_owned()),
                None => write_event(&mut writer, other)?,
            },
        }
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| RenderFailure::Read(e.to_string()))
}

fn flush_cell(
    writer: &mut Writer<Vec<u8>>,
    buffer: Vec<Event<'static>>,
    record: &Record,
    shared: &[String],
    missing: &mut BTreeSet<String>,
) -> Result<(), RenderFailure> {
    let start = match buffer.first() {
        Some(Event::Start(e)) => e.clone(),
        _ => return echo(writer, buffer),
    };

    let mut kind = CellKind::Plain;
    for attr in start.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"t" {
            kind = match attr.value.as_ref() {
                b"s" => CellKind::Shared,
                b"inlineStr" => CellKind::Inline,
                b"str" => CellKind::Formula,
                _ => CellKind::Plain,
            };
        }
    }
    if kind == CellKind::Plain {
        return echo(writer, buffer);
    }

    let resolved = resolve_cell_text(&buffer, kind, shared);
    let substituted = substitute(&resolved, record, missing);
    if substituted == resolved {
        return echo(writer, buffer);
    }

    // Rebuild as an inline string cell; style and reference attributes
    // carry over, the type does not.
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut new_start = BytesStart::new(name.clone());
    for attr in start.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"t" {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().unwrap_or_default().into_owned();
        new_start.push_attribute((key.as_str(), value.as_str()));
    }
    new_start.push_attribute(("t", "inlineStr"));

    write_event(writer, Event::Start(new_start))?;
    let inline = format!(
        "<is><t xml:space=\"preserve\">{}</t></is>",
        xml_escape(&substituted)
    );
    write_event(writer, Event::Text(BytesText::from_escaped(inline)))?;
    write_event(writer, Event::End(BytesEnd::new(name)))
}

fn resolve_cell_text(buffer: &[Event<'static>], kind: CellKind, shared: &[String]) -> String {
    let mut value = String::new();
    let mut in_value = false;
    let mut in_text = false;
    for event in buffer {
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"v" => in_value = true,
                b"t" => in_text = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"t" => in_text = false,
                _ => {}
            },
            Event::Text(t) if in_value || in_text => {
                value.push_str(&t.unescape().unwrap_or_default());
            }
            _ => {}
        }
    }

    match kind {
        CellKind::Shared => value
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i))
            .cloned()
            .unwrap_or_default(),
        _ => value,
    }
}

fn echo(writer: &mut Writer<Vec<u8>>, buffer: Vec<Event<'static>>) -> Result<(), RenderFailure> {
    for event in buffer {
        write_event(writer, event)?;
    }
    Ok(())
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event) -> Result<(), RenderFailure> {
    writer
        .write_event(event)
        .map_err(|e| RenderFailure::Write(std::io::Error::other(e)))
}
