//! Spreadsheet (xlsx) reading and minimal writing.
//!
//! The reader resolves shared strings and number formats so callers see
//! plain display strings. Cell coercion is deterministic: dates become
//! ISO-8601, numbers lose trailing `.0` noise, booleans become
//! `TRUE`/`FALSE`. The writer emits inline-string workbooks only, which
//! is all the merge paths need.

use std::collections::HashMap;
use std::io::{Read, Seek, Write};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::write::SimpleFileOptions;

use super::{xml_escape, OoxmlError};

/// One worksheet with every cell coerced to its display string.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    /// Zip part path, e.g. `xl/worksheets/sheet1.xml`.
    pub part: String,
    /// Rows in file order, padded with empty strings up to the last
    /// populated column of each row.
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn open(path: &Path) -> Result<Self, OoxmlError> {
        let file = std::fs::File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| OoxmlError::Container(format!("failed to open xlsx: {}", e)))?;
        Self::from_archive(&mut archive)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, OoxmlError> {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
            .map_err(|e| OoxmlError::Container(format!("failed to open xlsx: {}", e)))?;
        Self::from_archive(&mut archive)
    }

    pub fn from_archive<R: Read + Seek>(
        archive: &mut zip::ZipArchive<R>,
    ) -> Result<Self, OoxmlError> {
        let shared = read_shared_strings(archive)?;
        let styles = read_styles(archive)?;
        let parts = sheet_parts(archive)?;

        let mut sheets = Vec::with_capacity(parts.len());
        for (name, part) in parts {
            let xml = read_part(archive, &part)?;
            let rows = parse_sheet_rows(&xml, &part, &shared, &styles)?;
            sheets.push(Sheet { name, part, rows });
        }
        Ok(Self { sheets })
    }

    pub fn sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

pub(crate) fn read_part<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    part: &str,
) -> Result<String, OoxmlError> {
    let mut entry = archive
        .by_name(part)
        .map_err(|_| OoxmlError::MissingPart(part.to_string()))?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Sheet name → worksheet part path pairs, in workbook (native) order.
pub fn sheet_parts<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<Vec<(String, String)>, OoxmlError> {
    let workbook_xml = read_part(archive, "xl/workbook.xml")?;
    let rels_xml = read_part(archive, "xl/_rels/workbook.xml.rels")?;

    let targets = parse_relationship_targets(&rels_xml)?;

    let mut reader = Reader::from_str(&workbook_xml);
    reader.config_mut().trim_text(true);

    let mut sheets = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"sheet" =>
            {
                let mut name = None;
                let mut rel_id = None;
                for attr in e.attributes().flatten() {
                    match attr.key.local_name().as_ref() {
                        b"name" => {
                            name = Some(attr.unescape_value().unwrap_or_default().into_owned())
                        }
                        b"id" => {
                            rel_id = Some(String::from_utf8_lossy(&attr.value).into_owned())
                        }
                        _ => {}
                    }
                }
                if let (Some(name), Some(rel_id)) = (name, rel_id) {
                    if let Some(target) = targets.get(&rel_id) {
                        sheets.push((name, resolve_target(target)));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(OoxmlError::Xml {
                    part: "xl/workbook.xml".to_string(),
                    reason: e.to_string(),
                })
            }
            _ => {}
        }
    }

    if sheets.is_empty() {
        return Err(OoxmlError::Container("workbook has no sheets".to_string()));
    }
    Ok(sheets)
}

fn parse_relationship_targets(rels_xml: &str) -> Result<HashMap<String, String>, OoxmlError> {
    let mut reader = Reader::from_str(rels_xml);
    reader.config_mut().trim_text(true);

    let mut targets = HashMap::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    match attr.key.local_name().as_ref() {
                        b"Id" => id = Some(String::from_utf8_lossy(&attr.value).into_owned()),
                        b"Target" => {
                            target = Some(attr.unescape_value().unwrap_or_default().into_owned())
                        }
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(OoxmlError::Xml {
                    part: "xl/_rels/workbook.xml.rels".to_string(),
                    reason: e.to_string(),
                })
            }
            _ => {}
        }
    }
    Ok(targets)
}

fn resolve_target(target: &str) -> String {
    if let Some(stripped) = target.strip_prefix('/') {
        stripped.to_string()
    } else {
        format!("xl/{}", target)
    }
}

/// Flattened shared-string table; each `<si>` collapses to one string
/// (phonetic runs excluded).
pub fn read_shared_strings<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<Vec<String>, OoxmlError> {
    let xml = match read_part(archive, "xl/sharedStrings.xml") {
        Ok(xml) => xml,
        Err(OoxmlError::MissingPart(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut reader = Reader::from_str(&xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si && !in_phonetic => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = false;
                    strings.push(std::mem::take(&mut current));
                }
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text {
                    current.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(OoxmlError::Xml {
                    part: "xl/sharedStrings.xml".to_string(),
                    reason: e.to_string(),
                })
            }
            _ => {}
        }
    }
    Ok(strings)
}

/// Number-format information needed to decide which numeric cells are
/// really dates.
#[derive(Debug, Clone, Default)]
pub struct Styles {
    /// numFmtId per cell-format (`xf`) index.
    xf_num_fmts: Vec<u32>,
    custom_formats: HashMap<u32, String>,
}

impl Styles {
    pub fn is_date_style(&self, style_index: usize) -> bool {
        let Some(&fmt_id) = self.xf_num_fmts.get(style_index) else {
            return false;
        };
        if matches!(fmt_id, 14..=22 | 45..=47) {
            return true;
        }
        match self.custom_formats.get(&fmt_id) {
            Some(code) => format_code_is_date(code),
            None => false,
        }
    }
}

/// A format code is a date format when, outside brackets and quoted
/// literals, it uses day/year/hour tokens. Month alone is ambiguous with
/// minutes and never appears without one of the others.
fn format_code_is_date(code: &str) -> bool {
    let mut in_bracket = false;
    let mut in_quote = false;
    for c in code.chars() {
        match c {
            '[' if !in_quote => in_bracket = true,
            ']' if !in_quote => in_bracket = false,
            '"' => in_quote = !in_quote,
            'y' | 'Y' | 'd' | 'D' | 'h' | 'H' if !in_bracket && !in_quote => return true,
            _ => {}
        }
    }
    false
}

pub fn read_styles<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<Styles, OoxmlError> {
    let xml = match read_part(archive, "xl/styles.xml") {
        Ok(xml) => xml,
        Err(OoxmlError::MissingPart(_)) => return Ok(Styles::default()),
        Err(e) => return Err(e),
    };

    let mut reader = Reader::from_str(&xml);
    let mut styles = Styles::default();
    let mut in_cell_xfs = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match e.local_name().as_ref() {
                    b"cellXfs" => in_cell_xfs = true,
                    b"numFmt" => {
                        let mut id = None;
                        let mut code = None;
                        for attr in e.attributes().flatten() {
                            match attr.key.local_name().as_ref() {
                                b"numFmtId" => {
                                    id = String::from_utf8_lossy(&attr.value).parse().ok()
                                }
                                b"formatCode" => {
                                    code = Some(
                                        attr.unescape_value().unwrap_or_default().into_owned(),
                                    )
                                }
                                _ => {}
                            }
                        }
                        if let (Some(id), Some(code)) = (id, code) {
                            styles.custom_formats.insert(id, code);
                        }
                    }
                    b"xf" if in_cell_xfs => {
                        let fmt_id = e
                            .attributes()
                            .flatten()
                            .find(|a| a.key.local_name().as_ref() == b"numFmtId")
                            .and_then(|a| String::from_utf8_lossy(&a.value).parse().ok())
                            .unwrap_or(0);
                        styles.xf_num_fmts.push(fmt_id);
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"cellXfs" => {
                in_cell_xfs = false;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(OoxmlError::Xml {
                    part: "xl/styles.xml".to_string(),
                    reason: e.to_string(),
                })
            }
            _ => {}
        }
    }
    Ok(styles)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CellType {
    Number,
    SharedString,
    InlineString,
    FormulaString,
    Boolean,
    Error,
}

fn parse_sheet_rows(
    xml: &str,
    part: &str,
    shared: &[String],
    styles: &Styles,
) -> Result<Vec<Vec<String>>, OoxmlError> {
    let mut reader = Reader::from_str(xml);

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut current_row: Vec<String> = Vec::new();
    let mut in_row = false;

    let mut cell_col = 0usize;
    let mut cell_type = CellType::Number;
    let mut cell_style = 0usize;
    let mut cell_value = String::new();
    let mut in_value = false;
    let mut in_inline_text = false;

    let xml_err = |e: quick_xml::Error| OoxmlError::Xml {
        part: part.to_string(),
        reason: e.to_string(),
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"row" =>
            {
                in_row = true;
                current_row.clear();
            }
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"c" && in_row =>
            {
                cell_type = CellType::Number;
                cell_style = 0;
                cell_value.clear();
                cell_col = current_row.len();
                for attr in e.attributes().flatten() {
                    match attr.key.local_name().as_ref() {
                        b"r" => {
                            let cell_ref = String::from_utf8_lossy(&attr.value);
                            cell_col = column_index(&cell_ref);
                        }
                        b"t" => {
                            cell_type = match attr.value.as_ref() {
                                b"s" => CellType::SharedString,
                                b"inlineStr" => CellType::InlineString,
                                b"str" => CellType::FormulaString,
                                b"b" => CellType::Boolean,
                                b"e" => CellType::Error,
                                _ => CellType::Number,
                            };
                        }
                        b"s" => {
                            cell_style = String::from_utf8_lossy(&attr.value)
                                .parse()
                                .unwrap_or(0);
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"v" => in_value = true,
                b"t" => in_inline_text = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_value || (in_inline_text && cell_type == CellType::InlineString) {
                    cell_value.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"t" => in_inline_text = false,
                b"c" => {
                    let display = coerce_cell(cell_type, &cell_value, cell_style, shared, styles);
                    if !display.is_empty() {
                        while current_row.len() < cell_col {
                            current_row.push(String::new());
                        }
                        current_row.push(display);
                    }
                    cell_value.clear();
                }
                b"row" => {
                    in_row = false;
                    rows.push(std::mem::take(&mut current_row));
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
    }
    Ok(rows)
}

fn coerce_cell(
    cell_type: CellType,
    raw: &str,
    style_index: usize,
    shared: &[String],
    styles: &Styles,
) -> String {
    match cell_type {
        CellType::SharedString => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i))
            .cloned()
            .unwrap_or_default(),
        CellType::InlineString | CellType::FormulaString | CellType::Error => raw.to_string(),
        CellType::Boolean => {
            if raw.trim() == "1" {
                "TRUE".to_string()
            } else {
                "FALSE".to_string()
            }
        }
        CellType::Number => {
            if raw.trim().is_empty() {
                return String::new();
            }
            if styles.is_date_style(style_index) {
                if let Some(date) = serial_to_iso(raw) {
                    return date;
                }
            }
            format_number(raw)
        }
    }
}

/// Excel serial date (1900 system) to ISO-8601. Fractional days become a
/// `T`-separated time component.
fn serial_to_iso(raw: &str) -> Option<String> {
    let serial: f64 = raw.trim().parse().ok()?;
    if !(0.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    // Base of 1899-12-30 absorbs Excel's phantom 1900-02-29.
    let base = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = base.checked_add_signed(chrono::Duration::days(serial.floor() as i64))?;

    let frac = serial - serial.floor();
    let secs = (frac * 86_400.0).round() as u32;
    if secs == 0 || secs >= 86_400 {
        Some(date.format("%Y-%m-%d").to_string())
    } else {
        let time = chrono::NaiveTime::from_num_seconds_from_midnight_opt(secs, 0)?;
        Some(format!(
            "{}T{}",
            date.format("%Y-%m-%d"),
            time.format("%H:%M:%S")
        ))
    }
}

/// Deterministic number display: integral values lose the decimal point,
/// everything else uses Rust's shortest round-trip form.
fn format_number(raw: &str) -> String {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => format!("{}", v as i64),
        Ok(v) => format!("{}", v),
        Err(_) => raw.trim().to_string(),
    }
}

/// `"A1"` → 0, `"AB7"` → 27.
pub fn column_index(cell_ref: &str) -> usize {
    let mut col = 0usize;
    for c in cell_ref.chars() {
        if c.is_ascii_alphabetic() {
            col = col * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
        } else {
            break;
        }
    }
    col.saturating_sub(1)
}

/// 0 → `"A"`, 27 → `"AB"`.
pub fn column_name(mut index: usize) -> String {
    let mut name = String::new();
    index += 1;
    while index > 0 {
        let rem = (index - 1) % 26;
        name.insert(0, (b'A' + rem as u8) as char);
        index = (index - 1) / 26;
    }
    name
}

/// Writes a workbook of inline-string sheets. Used for workbook merges
/// and fixture generation; cell styling is not preserved.
pub fn write_workbook(
    sheets: &[(String, Vec<Vec<String>>)],
    output: &Path,
) -> Result<(), OoxmlError> {
    if sheets.is_empty() {
        return Err(OoxmlError::Container(
            "cannot write a workbook with no sheets".to_string(),
        ));
    }

    let file = std::fs::File::create(output)?;
    let mut zip = zip::ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
"#,
    );
    for i in 0..sheets.len() {
        content_types.push_str(&format!(
            "<Override PartName=\"/xl/worksheets/sheet{}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>\n",
            i + 1
        ));
    }
    content_types.push_str("</Types>");
    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(content_types.as_bytes())?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#,
    )?;

    let mut workbook_xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets>
"#,
    );
    let mut rels_xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
"#,
    );
    for (i, (name, _)) in sheets.iter().enumerate() {
        workbook_xml.push_str(&format!(
            "<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>\n",
            xml_escape(name),
            i + 1,
            i + 1
        ));
        rels_xml.push_str(&format!(
            "<Relationship Id=\"rId{}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet{}.xml\"/>\n",
            i + 1,
            i + 1
        ));
    }
    workbook_xml.push_str("</sheets>\n</workbook>");
    rels_xml.push_str("</Relationships>");

    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(workbook_xml.as_bytes())?;
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(rels_xml.as_bytes())?;

    for (i, (_, rows)) in sheets.iter().enumerate() {
        let mut sheet_xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<sheetData>
"#,
        );
        for (row_idx, row) in rows.iter().enumerate() {
            sheet_xml.push_str(&format!("<row r=\"{}\">", row_idx + 1));
            for (col_idx, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                sheet_xml.push_str(&format!(
                    "<c r=\"{}{}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                    column_name(col_idx),
                    row_idx + 1,
                    xml_escape(value)
                ));
            }
            sheet_xml.push_str("</row>\n");
        }
        sheet_xml.push_str("</sheetData>\n</worksheet>");

        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
        zip.write_all(sheet_xml.as_bytes())?;
    }

    zip.finish()?;
    Ok(())
}

/// Reads every sheet of `input` and appends them to `sheets`, used when
/// collecting per-record outputs into one deliverable workbook.
pub fn append_workbook_sheets(
    input: &Path,
    label: &str,
    sheets: &mut Vec<(String, Vec<Vec<String>>)>,
) -> Result<(), OoxmlError> {
    let workbook = Workbook::open(input)?;
    if workbook.sheets.len() == 1 {
        let sheet = &workbook.sheets[0];
        sheets.push((label.to_string(), sheet.rows.clone()));
    } else {
        for sheet in &workbook.sheets {
            sheets.push((format!("{}_{}", label, sheet.name), sheet.rows.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn column_index_round_trips() {
        assert_eq!(column_index("A1"), 0);
        assert_eq!(column_index("B12"), 1);
        assert_eq!(column_index("Z3"), 25);
        assert_eq!(column_index("AA1"), 26);
        assert_eq!(column_index("AB7"), 27);
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(27), "AB");
    }

    #[test]
    fn number_formatting_is_deterministic() {
        assert_eq!(format_number("42"), "42");
        assert_eq!(format_number("42.0"), "42");
        assert_eq!(format_number("3.14"), "3.14");
        assert_eq!(format_number("1e3"), "1000");
        assert_eq!(format_number("-7.5"), "-7.5");
    }

    #[test]
    fn serial_dates_become_iso() {
        // 2024-01-15 is serial 45306 in the 1900 date system.
        assert_eq!(serial_to_iso("45306").as_deref(), Some("2024-01-15"));
        assert_eq!(serial_to_iso("45306.5").as_deref(), Some("2024-01-15T12:00:00"));
        assert_eq!(serial_to_iso("1").as_deref(), Some("1899-12-31"));
        assert_eq!(serial_to_iso("not a number"), None);
    }

    #[test]
    fn date_format_codes_are_detected() {
        assert!(format_code_is_date("dd/mm/yyyy"));
        assert!(format_code_is_date("[$-409]h:mm AM/PM"));
        assert!(!format_code_is_date("#,##0.00"));
        assert!(!format_code_is_date("0%"));
        assert!(!format_code_is_date("\"dy\" 0.0"));
    }

    #[test]
    fn written_workbook_reads_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.xlsx");
        let rows = vec![
            vec!["##name##".to_string(), "##email##".to_string()],
            vec!["Ann".to_string(), "a@x.com".to_string()],
            vec!["".to_string(), "b@x.com".to_string()],
        ];
        write_workbook(&[("Data".to_string(), rows.clone())], &path).unwrap();

        let workbook = Workbook::open(&path).unwrap();
        assert_eq!(workbook.sheets.len(), 1);
        assert_eq!(workbook.sheets[0].name, "Data");
        assert_eq!(workbook.sheets[0].rows[0], rows[0]);
        assert_eq!(workbook.sheets[0].rows[1], rows[1]);
        // Leading empty cell keeps its column position.
        assert_eq!(workbook.sheets[0].rows[2], rows[2]);
    }

    #[test]
    fn multi_sheet_workbook_keeps_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("multi.xlsx");
        write_workbook(
            &[
                ("First".to_string(), vec![vec!["a".to_string()]]),
                ("Second".to_string(), vec![vec!["b".to_string()]]),
            ],
            &path,
        )
        .unwrap();

        let workbook = Workbook::open(&path).unwrap();
        let names: Vec<&str> = workbook.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["First", "Second"]);
        assert_eq!(workbook.sheet_by_name("Second").unwrap().rows[0][0], "b");
    }

    #[test]
    fn escaped_cell_text_round_trips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("escape.xlsx");
        let rows = vec![vec!["a < b & \"c\"".to_string()]];
        write_workbook(&[("S".to_string(), rows.clone())], &path).unwrap();

        let workbook = Workbook::open(&path).unwrap();
        assert_eq!(workbook.sheets[0].rows, rows);
    }
}
