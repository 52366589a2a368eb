//! Writes print settings into a spreadsheet's worksheets before it is
//! handed to a converter, since the page layout an office suite uses
//! comes from the workbook itself.

use std::io::{Read, Write};
use std::path::Path;

use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use zip::write::SimpleFileOptions;

use super::error::ConvertError;
use super::settings::{Orientation, PrintSettings, Scaling};

/// Copies `input` to `output` with every worksheet's page setup replaced
/// by `settings`. Existing page-setup elements are dropped first.
pub fn apply_to_workbook(
    input: &Path,
    output: &Path,
    settings: &PrintSettings,
) -> Result<(), ConvertError> {
    let map_err = |reason: String| ConvertError::PageSetup {
        path: input.to_path_buf(),
        reason,
    };

    let file = std::fs::File::open(input).map_err(|e| map_err(e.to_string()))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| map_err(e.to_string()))?;

    let out_file = std::fs::File::create(output).map_err(|e| map_err(e.to_string()))?;
    let mut writer = zip::ZipWriter::new(out_file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| map_err(e.to_string()))?;
        let name = entry.name().to_string();

        if name.starts_with("xl/worksheets/") && name.ends_with(".xml") {
            let mut xml = String::new();
            entry
                .read_to_string(&mut xml)
                .map_err(|e| map_err(e.to_string()))?;
            let rewritten = rewrite_sheet_xml(&xml, settings).map_err(map_err)?;
            writer
                .start_file(name, options)
                .map_err(|e| ConvertError::PageSetup {
                    path: output.to_path_buf(),
                    reason: e.to_string(),
                })?;
            writer
                .write_all(rewritten.as_bytes())
                .map_err(|e| ConvertError::PageSetup {
                    path: output.to_path_buf(),
                    reason: e.to_string(),
                })?;
        } else {
            writer
                .raw_copy_file(entry)
                .map_err(|e| map_err(e.to_string()))?;
        }
    }

    writer.finish().map_err(|e| map_err(e.to_string()))?;
    Ok(())
}

const DROPPED: [&[u8]; 4] = [b"sheetPr", b"printOptions", b"pageMargins", b"pageSetup"];

fn rewrite_sheet_xml(xml: &str, settings: &PrintSettings) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());

    let needs_fit_to_page = matches!(
        settings.scaling,
        Some(
            Scaling::FitTo { .. }
                | Scaling::FitSheetOnOnePage
                | Scaling::FitAllColumnsOnOnePage
                | Scaling::FitAllRowsOnOnePage
        )
    );
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| e.to_string())?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) => {
                if skip_depth > 0 {
                    skip_depth += 1;
                    continue;
                }
                if DROPPED.contains(&e.local_name().as_ref()) {
                    skip_depth = 1;
                    continue;
                }
                let is_worksheet = e.local_name().as_ref() == b"worksheet";
                write_event(&mut writer, event)?;
                if is_worksheet && needs_fit_to_page {
                    write_raw(
                        &mut writer,
                        "<sheetPr><pageSetUpPr fitToPage=\"1\"/></sheetPr>",
                    )?;
                }
            }
            Event::Empty(ref e) => {
                if skip_depth > 0 {
                    continue;
                }
                if DROPPED.contains(&e.local_name().as_ref()) {
                    continue;
                }
                let is_sheet_data = e.local_name().as_ref() == b"sheetData";
                write_event(&mut writer, event)?;
                if is_sheet_data {
                    write_raw(&mut writer, &layout_elements(settings))?;
                }
            }
            Event::End(ref e) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                    continue;
                }
                let is_sheet_data = e.local_name().as_ref() == b"sheetData";
                write_event(&mut writer, event)?;
                if is_sheet_data {
                    write_raw(&mut writer, &layout_elements(settings))?;
                }
            }
            other => {
                if skip_depth == 0 {
                    write_event(&mut writer, other)?;
                }
            }
        }
    }

    String::from_utf8(writer.into_inner()).map_err(|e| e.to_string())
}

/// `printOptions`, `pageMargins` and `pageSetup` XML for these settings.
fn layout_elements(settings: &PrintSettings) -> String {
    let mut out = String::new();

    if settings.center_horizontally || settings.center_vertically {
        out.push_str("<printOptions");
        if settings.center_horizontally {
            out.push_str(" horizontalCentered=\"1\"");
        }
        if settings.center_vertically {
            out.push_str(" verticalCentered=\"1\"");
        }
        out.push_str("/>");
    }

    let margins = settings.margins.unwrap_or_default();
    out.push_str(&format!(
        "<pageMargins left=\"{}\" right=\"{}\" top=\"{}\" bottom=\"{}\" header=\"0.3\" footer=\"0.3\"/>",
        margins.left, margins.right, margins.top, margins.bottom
    ));

    out.push_str("<pageSetup");
    if let Some(code) = settings.paper_size_code() {
        out.push_str(&format!(" paperSize=\"{}\"", code));
    }
    match settings.scaling {
        Some(Scaling::Percent { value }) => {
            out.push_str(&format!(" scale=\"{}\"", value.clamp(10, 400)));
        }
        Some(Scaling::FitTo { width, height }) => {
            out.push_str(&format!(
                " fitToWidth=\"{}\" fitToHeight=\"{}\"",
                width, height
            ));
        }
        Some(Scaling::FitSheetOnOnePage) => {
            out.push_str(" fitToWidth=\"1\" fitToHeight=\"1\"");
        }
        Some(Scaling::FitAllColumnsOnOnePage) => {
            out.push_str(" fitToWidth=\"1\" fitToHeight=\"0\"");
        }
        Some(Scaling::FitAllRowsOnOnePage) => {
            out.push_str(" fitToWidth=\"0\" fitToHeight=\"1\"");
        }
        None => {}
    }
    if let Some(orientation) = settings.orientation {
        let value = match orientation {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        };
        out.push_str(&format!(" orientation=\"{}\"", value));
    }
    out.push_str("/>");
    out
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event) -> Result<(), String> {
    writer.write_event(event).map_err(|e| e.to_string())
}

fn write_raw(writer: &mut Writer<Vec<u8>>, raw: &str) -> Result<(), String> {
    writer
        .write_event(Event::Text(BytesText::from_escaped(raw)))
        .map_err(|e| e.to_string())
}
