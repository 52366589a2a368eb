//! Turning a spreadsheet into ordered records.
//!
//! The first non-empty row of the chosen sheet is the header; only cells
//! carrying a `##name##` marker become variables. Every later non-empty
//! row becomes one record in file order.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::ParseError;
use crate::logging::redact_path;
use crate::ooxml::xlsx::{Sheet, Workbook};
use crate::placeholder::{contains_placeholder, Record, PLACEHOLDER_RE};

/// The named-variable contract a data source exposes to templates.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSet {
    names: Vec<String>,
}

impl VariableSet {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub variables: VariableSet,
    pub records: Vec<Record>,
    /// Name of the sheet the records came from.
    pub sheet_name: String,
}

/// Parses `path`, pinning the sheet when a selector is given and
/// auto-detecting otherwise.
pub fn parse(path: &Path, sheet_selector: Option<&str>) -> Result<ParsedSource, ParseError> {
    let workbook = Workbook::open(path).map_err(|e| ParseError::MalformedDataSource {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let sheet = match sheet_selector {
        Some(name) => {
            workbook
                .sheet_by_name(name)
                .ok_or_else(|| ParseError::MalformedDataSource {
                    path: path.to_path_buf(),
                    reason: format!("sheet '{}' not found", name),
                })?
        }
        None => detect_data_sheet(&workbook).ok_or_else(|| ParseError::NoMatchingSheet {
            path: path.to_path_buf(),
        })?,
    };
    debug!(
        file = %redact_path(path),
        sheet = %sheet.name,
        "reading records"
    );

    parse_sheet(sheet, path)
}

/// First sheet (native order) whose first non-empty row carries at least
/// one `##name##` cell.
fn detect_data_sheet(workbook: &Workbook) -> Option<&Sheet> {
    workbook.sheets.iter().find(|sheet| {
        header_row(sheet)
            .map(|(_, row)| row.iter().any(|cell| contains_placeholder(cell)))
            .unwrap_or(false)
    })
}

fn header_row(sheet: &Sheet) -> Option<(usize, &Vec<String>)> {
    sheet
        .rows
        .iter()
        .enumerate()
        .find(|(_, row)| row.iter().any(|cell| !cell.is_empty()))
}

fn parse_sheet(sheet: &Sheet, path: &Path) -> Result<ParsedSource, ParseError> {
    let (header_index, header) =
        header_row(sheet).ok_or_else(|| ParseError::MalformedDataSource {
            path: path.to_path_buf(),
            reason: format!("sheet '{}' is empty", sheet.name),
        })?;

    // Column index → variable name. Non-matching header cells are not
    // variables; their columns are simply unused.
    let mut columns: Vec<(usize, String)> = Vec::new();
    for (col, cell) in header.iter().enumerate() {
        let Some(caps) = PLACEHOLDER_RE.captures(cell) else {
            continue;
        };
        let name = caps[1].to_string();
        if columns.iter().any(|(_, existing)| *existing == name) {
            warn!(
                sheet = %sheet.name,
                name = %name,
                "duplicate header variable, keeping first column"
            );
            continue;
        }
        columns.push((col, name));
    }

    if columns.is_empty() {
        return Err(ParseError::MalformedDataSource {
            path: path.to_path_buf(),
            reason: format!(
                "header row of sheet '{}' has no ##variable## cells",
                sheet.name
            ),
        });
    }

    let mut records = Vec::new();
    for row in sheet.rows.iter().skip(header_index + 1) {
        if row.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        let mut record = Record::new();
        for (col, name) in &columns {
            let value = row.get(*col).cloned().unwrap_or_default();
            record.insert(name.clone(), value);
        }
        records.push(record);
    }

    if records.is_empty() {
        return Err(ParseError::MalformedDataSource {
            path: path.to_path_buf(),
            reason: format!("sheet '{}' has a header but no data rows", sheet.name),
        });
    }

    Ok(ParsedSource {
        variables: VariableSet {
            names: columns.into_iter().map(|(_, name)| name).collect(),
        },
        records,
        sheet_name: sheet.name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::xlsx::write_workbook;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn write_source(tmp: &TempDir, sheets: &[(&str, Vec<Vec<String>>)]) -> PathBuf {
        let path = tmp.path().join("data.xlsx");
        let named: Vec<(String, Vec<Vec<String>>)> = sheets
            .iter()
            .map(|(name, rows)| (name.to_string(), rows.clone()))
            .collect();
        write_workbook(&named, &path).unwrap();
        path
    }

    #[test]
    fn parses_records_in_row_order() {
        let tmp = TempDir::new().unwrap();
        let path = write_source(
            &tmp,
            &[(
                "Data",
                rows(&[
                    &["##name##", "##email##"],
                    &["Ann", "a@x.com"],
                    &["Bob", "b@x.com"],
                ]),
            )],
        );

        let parsed = parse(&path, None).unwrap();
        assert_eq!(parsed.variables.names(), ["name", "email"]);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0]["name"], "Ann");
        assert_eq!(parsed.records[1]["email"], "b@x.com");
        assert_eq!(parsed.sheet_name, "Data");
    }

    #[test]
    fn empty_rows_do_not_count() {
        let tmp = TempDir::new().unwrap();
        let path = write_source(
            &tmp,
            &[(
                "Data",
                rows(&[
                    &["##name##"],
                    &["Ann"],
                    &["", ""],
                    &["Bob"],
                ]),
            )],
        );

        let parsed = parse(&path, None).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[1]["name"], "Bob");
    }

    #[test]
    fn non_matching_header_cells_are_excluded() {
        let tmp = TempDir::new().unwrap();
        let path = write_source(
            &tmp,
            &[(
                "Data",
                rows(&[
                    &["##name##", "notes", "##amount##"],
                    &["Ann", "ignored", "12.5"],
                ]),
            )],
        );

        let parsed = parse(&path, None).unwrap();
        assert_eq!(parsed.variables.names(), ["name", "amount"]);
        assert_eq!(parsed.records[0]["amount"], "12.5");
        assert!(!parsed.records[0].contains_key("notes"));
    }

    #[test]
    fn autodetect_skips_sheets_without_variable_header() {
        let tmp = TempDir::new().unwrap();
        let path = write_source(
            &tmp,
            &[
                ("Notes", rows(&[&["just text"], &["more text"]])),
                ("Import", rows(&[&["##id##"], &["7"]])),
            ],
        );

        let parsed = parse(&path, None).unwrap();
        assert_eq!(parsed.sheet_name, "Import");
        assert_eq!(parsed.records[0]["id"], "7");
    }

    #[test]
    fn selector_pins_the_sheet() {
        let tmp = TempDir::new().unwrap();
        let path = write_source(
            &tmp,
            &[
                ("First", rows(&[&["##a##"], &["1"]])),
                ("Second", rows(&[&["##b##"], &["2"]])),
            ],
        );

        let parsed = parse(&path, Some("Second")).unwrap();
        assert_eq!(parsed.variables.names(), ["b"]);
    }

    #[test]
    fn missing_selected_sheet_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = write_source(&tmp, &[("Data", rows(&[&["##a##"], &["1"]]))]);

        let result = parse(&path, Some("Nope"));
        assert!(matches!(result, Err(ParseError::MalformedDataSource { .. })));
    }

    #[test]
    fn no_sheet_with_variables_is_no_matching_sheet() {
        let tmp = TempDir::new().unwrap();
        let path = write_source(&tmp, &[("Data", rows(&[&["plain"], &["1"]]))]);

        let result = parse(&path, None);
        assert!(matches!(result, Err(ParseError::NoMatchingSheet { .. })));
    }

    #[test]
    fn header_without_data_rows_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = write_source(&tmp, &[("Data", rows(&[&["##a##"]]))]);

        let result = parse(&path, None);
        assert!(matches!(result, Err(ParseError::MalformedDataSource { .. })));
    }

    #[test]
    fn not_a_spreadsheet_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.xlsx");
        std::fs::write(&path, b"definitely not a zip").unwrap();

        let result = parse(&path, None);
        assert!(matches!(result, Err(ParseError::MalformedDataSource { .. })));
    }

    #[test]
    fn short_rows_fill_missing_cells_with_empty_strings() {
        let tmp = TempDir::new().unwrap();
        let path = write_source(
            &tmp,
            &[(
                "Data",
                rows(&[&["##name##", "##email##"], &["Ann"]]),
            )],
        );

        let parsed = parse(&path, None).unwrap();
        assert_eq!(parsed.records[0]["email"], "");
    }
}
