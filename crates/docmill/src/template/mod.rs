//! Placeholder substitution for the supported template containers.
//!
//! Rendering never touches the original template: the container is copied
//! entry-for-entry into the output file and only text-bearing parts are
//! rewritten. Unmatched placeholders pass through verbatim and come back
//! as per-render warnings.

mod docx;
pub(crate) mod eml;
mod xlsx;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tracing::debug;

use crate::error::TemplateError;
use crate::logging::redact_path;
use crate::placeholder::Record;
use crate::store::hash_bytes;

/// Container formats the engine can substitute into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Docx,
    Xlsx,
    Eml,
}

impl ContainerKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "docx" => Some(Self::Docx),
            "xlsx" => Some(Self::Xlsx),
            "eml" => Some(Self::Eml),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
            Self::Eml => "eml",
        }
    }
}

/// Internal failure split: read problems map to `TemplateRead`, write
/// problems to `RenderWrite`.
pub(crate) enum RenderFailure {
    Read(String),
    Write(std::io::Error),
}

#[derive(Debug)]
pub struct RenderOutcome {
    pub output_path: PathBuf,
    /// Placeholder names the record had no value for, deduplicated.
    pub missing_names: Vec<String>,
}

struct CachedTemplate {
    content_hash: String,
    file_size: u64,
    modified: Option<SystemTime>,
    bytes: Arc<Vec<u8>>,
}

/// Stateless apart from a content-hash-keyed template byte cache, shared
/// across every record of a job.
pub struct TemplateEngine {
    cache: Mutex<HashMap<PathBuf, CachedTemplate>>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Every distinct placeholder name in the template's text-bearing
    /// units, in first-seen order.
    pub fn extract_variables(&self, template_path: &Path) -> Result<Vec<String>, TemplateError> {
        let kind = container_kind(template_path)?;
        let bytes = self.load_bytes(template_path)?;

        let result = match kind {
            ContainerKind::Docx => docx::extract_names(&bytes),
            ContainerKind::Xlsx => xlsx::extract_names(&bytes),
            ContainerKind::Eml => Ok(eml::extract_names(&bytes)),
        };
        result.map_err(|reason| TemplateError::TemplateRead {
            path: template_path.to_path_buf(),
            reason,
        })
    }

    /// Renders `template_path` against one record into `output_path`.
    ///
    /// `sheet_selector` narrows substitution to one named sheet for
    /// spreadsheet templates and is ignored for the other kinds.
    pub fn render(
        &self,
        template_path: &Path,
        record: &Record,
        output_path: &Path,
        sheet_selector: Option<&str>,
    ) -> Result<RenderOutcome, TemplateError> {
        let kind = container_kind(template_path)?;
        let bytes = self.load_bytes(template_path)?;

        let sheet_part = match (kind, sheet_selector) {
            (ContainerKind::Xlsx, Some(name)) => Some(
                xlsx::find_sheet_part(&bytes, name)
                    .map_err(|reason| TemplateError::TemplateRead {
                        path: template_path.to_path_buf(),
                        reason,
                    })?
                    .ok_or_else(|| TemplateError::SheetNotFound {
                        path: template_path.to_path_buf(),
                        sheet: name.to_string(),
                    })?,
            ),
            _ => None,
        };

        let result = match kind {
            ContainerKind::Docx => docx::render(&bytes, record, output_path),
            ContainerKind::Xlsx => xlsx::render(&bytes, record, output_path, sheet_part.as_deref()),
            ContainerKind::Eml => eml::render(&bytes, record, output_path),
        };

        let missing = result.map_err(|failure| match failure {
            RenderFailure::Read(reason) => TemplateError::TemplateRead {
                path: template_path.to_path_buf(),
                reason,
            },
            RenderFailure::Write(source) => TemplateError::RenderWrite {
                path: output_path.to_path_buf(),
                source,
            },
        })?;

        debug!(
            template = %redact_path(template_path),
            output = %redact_path(output_path),
            missing = missing.len(),
            "rendered template"
        );
        Ok(RenderOutcome {
            output_path: output_path.to_path_buf(),
            missing_names: missing.into_iter().collect(),
        })
    }

    /// Reads the template through the cache. Size and mtime serve as a
    /// fast-path hint; a hash check decides reuse when they differ.
    fn load_bytes(&self, path: &Path) -> Result<Arc<Vec<u8>>, TemplateError> {
        let metadata = std::fs::metadata(path).map_err(|e| TemplateError::TemplateRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let modified = metadata.modified().ok();

        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(entry) = cache.get(path) {
            if entry.file_size == metadata.len()
                && entry.modified == modified
                && entry.modified.is_some()
            {
                return Ok(Arc::clone(&entry.bytes));
            }
        }

        let bytes = std::fs::read(path).map_err(|e| TemplateError::TemplateRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let content_hash = hash_bytes(&bytes);

        if let Some(entry) = cache.get_mut(path) {
            if entry.content_hash == content_hash {
                entry.file_size = metadata.len();
                entry.modified = modified;
                return Ok(Arc::clone(&entry.bytes));
            }
        }

        let bytes = Arc::new(bytes);
        cache.insert(
            path.to_path_buf(),
            CachedTemplate {
                content_hash,
                file_size: metadata.len(),
                modified,
                bytes: Arc::clone(&bytes),
            },
        );
        Ok(bytes)
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn container_kind(path: &Path) -> Result<ContainerKind, TemplateError> {
    ContainerKind::from_path(path).ok_or_else(|| {
        TemplateError::UnsupportedFormat(
            path.extension()
                .and_then(|e| e.to_str())
                .unwrap_or("<none>")
                .to_string(),
        )
    })
}

/// Naming context a record-derived label is used in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelContext {
    /// Component of a generated filename.
    Filename,
    /// Worksheet tab name: 31 chars, no `\ / ? * [ ] :`.
    TabName,
}

/// Sanitizes one record value for use as an output label. Returns `None`
/// when the variable is absent or the value is empty after trimming.
pub fn resolve_label(record: &Record, variable: &str, context: LabelContext) -> Option<String> {
    let value = record.get(variable)?.trim();
    if value.is_empty() {
        return None;
    }

    let (illegal, limit): (&[char], usize) = match context {
        LabelContext::Filename => (&['<', '>', ':', '"', '/', '\\', '|', '?', '*'], 100),
        LabelContext::TabName => (&['\\', '/', '?', '*', '[', ']', ':'], 31),
    };

    let sanitized: String = value
        .chars()
        .map(|c| {
            if illegal.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let truncated: String = sanitized.chars().take(limit).collect();
    let truncated = truncated.trim().to_string();
    if truncated.is_empty() {
        None
    } else {
        Some(truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::docx::{extract_text, write_docx};
    use crate::ooxml::xlsx::{write_workbook, Workbook};
    use tempfile::TempDir;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn renders_docx_with_substitution() {
        let tmp = TempDir::new().unwrap();
        let template = tmp.path().join("letter.docx");
        write_docx(
            &["Hi ##name##, reach you at ##email##".to_string()],
            &template,
        )
        .unwrap();

        let engine = TemplateEngine::new();
        let output = tmp.path().join("out.docx");
        let outcome = engine
            .render(
                &template,
                &record(&[("name", "Ann"), ("email", "a@x.com")]),
                &output,
                None,
            )
            .unwrap();

        assert!(outcome.missing_names.is_empty());
        let text = extract_text(&output).unwrap();
        assert_eq!(text.trim_end(), "Hi Ann, reach you at a@x.com");
    }

    #[test]
    fn unmatched_placeholder_stays_verbatim_with_warning() {
        let tmp = TempDir::new().unwrap();
        let template = tmp.path().join("letter.docx");
        write_docx(&["##name## / ##unknown##".to_string()], &template).unwrap();

        let engine = TemplateEngine::new();
        let output = tmp.path().join("out.docx");
        let outcome = engine
            .render(&template, &record(&[("name", "Ann")]), &output, None)
            .unwrap();

        assert_eq!(outcome.missing_names, ["unknown"]);
        let text = extract_text(&output).unwrap();
        assert_eq!(text.trim_end(), "Ann / ##unknown##");
    }

    #[test]
    fn renders_xlsx_cells() {
        let tmp = TempDir::new().unwrap();
        let template = tmp.path().join("sheet.xlsx");
        write_workbook(
            &[(
                "Invoice".to_string(),
                vec![vec!["Amount due: ##amount##".to_string()]],
            )],
            &template,
        )
        .unwrap();

        let engine = TemplateEngine::new();
        let output = tmp.path().join("out.xlsx");
        engine
            .render(&template, &record(&[("amount", "12.50")]), &output, None)
            .unwrap();

        let workbook = Workbook::open(&output).unwrap();
        assert_eq!(workbook.sheets[0].rows[0][0], "Amount due: 12.50");
    }

    #[test]
    fn sheet_selector_narrows_substitution() {
        let tmp = TempDir::new().unwrap();
        let template = tmp.path().join("two.xlsx");
        write_workbook(
            &[
                ("One".to_string(), vec![vec!["##v##".to_string()]]),
                ("Two".to_string(), vec![vec!["##v##".to_string()]]),
            ],
            &template,
        )
        .unwrap();

        let engine = TemplateEngine::new();
        let output = tmp.path().join("out.xlsx");
        engine
            .render(&template, &record(&[("v", "set")]), &output, Some("Two"))
            .unwrap();

        let workbook = Workbook::open(&output).unwrap();
        assert_eq!(workbook.sheet_by_name("One").unwrap().rows[0][0], "##v##");
        assert_eq!(workbook.sheet_by_name("Two").unwrap().rows[0][0], "set");
    }

    #[test]
    fn unknown_sheet_selector_fails() {
        let tmp = TempDir::new().unwrap();
        let template = tmp.path().join("one.xlsx");
        write_workbook(
            &[("Only".to_string(), vec![vec!["x".to_string()]])],
            &template,
        )
        .unwrap();

        let engine = TemplateEngine::new();
        let result = engine.render(
            &template,
            &Record::new(),
            &tmp.path().join("out.xlsx"),
            Some("Missing"),
        );
        assert!(matches!(result, Err(TemplateError::SheetNotFound { .. })));
    }

    #[test]
    fn renders_eml_subject_and_body() {
        let tmp = TempDir::new().unwrap();
        let template = tmp.path().join("mail.eml");
        std::fs::write(
            &template,
            "Subject: Invoice for ##name##\r\n\r\nDear ##name##,\r\nAmount: ##amount##\r\n",
        )
        .unwrap();

        let engine = TemplateEngine::new();
        let output = tmp.path().join("out.eml");
        engine
            .render(
                &template,
                &record(&[("name", "Ann"), ("amount", "10")]),
                &output,
                None,
            )
            .unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.contains("Subject: Invoice for Ann"));
        assert!(text.contains("Dear Ann,"));
        assert!(text.contains("Amount: 10"));
    }

    #[test]
    fn extracts_variables_across_kinds() {
        let tmp = TempDir::new().unwrap();

        let docx = tmp.path().join("a.docx");
        write_docx(&["##x## and ##y## and ##x##".to_string()], &docx).unwrap();
        let engine = TemplateEngine::new();
        assert_eq!(engine.extract_variables(&docx).unwrap(), ["x", "y"]);

        let xlsx = tmp.path().join("b.xlsx");
        write_workbook(
            &[(
                "S".to_string(),
                vec![vec!["##a##".to_string(), "plain".to_string()]],
            )],
            &xlsx,
        )
        .unwrap();
        assert_eq!(engine.extract_variables(&xlsx).unwrap(), ["a"]);

        let eml = tmp.path().join("c.eml");
        std::fs::write(&eml, "Subject: ##s##\r\n\r\n##b##").unwrap();
        assert_eq!(engine.extract_variables(&eml).unwrap(), ["s", "b"]);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let engine = TemplateEngine::new();
        let result = engine.extract_variables(Path::new("/tmp/file.pdf"));
        assert!(matches!(result, Err(TemplateError::UnsupportedFormat(_))));
    }

    #[test]
    fn corrupt_container_is_template_read_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.docx");
        std::fs::write(&path, b"not a zip").unwrap();

        let engine = TemplateEngine::new();
        let result = engine.extract_variables(&path);
        assert!(matches!(result, Err(TemplateError::TemplateRead { .. })));
    }

    #[test]
    fn template_is_never_mutated_by_render() {
        let tmp = TempDir::new().unwrap();
        let template = tmp.path().join("t.docx");
        write_docx(&["##name##".to_string()], &template).unwrap();
        let before = std::fs::read(&template).unwrap();

        let engine = TemplateEngine::new();
        engine
            .render(
                &template,
                &record(&[("name", "Ann")]),
                &tmp.path().join("out.docx"),
                None,
            )
            .unwrap();

        assert_eq!(std::fs::read(&template).unwrap(), before);
    }

    #[test]
    fn resolve_label_sanitizes_filenames() {
        let record = record(&[("client", "  ACME Corp / West <1> "), ("empty", "  ")]);
        assert_eq!(
            resolve_label(&record, "client", LabelContext::Filename).as_deref(),
            Some("ACME Corp _ West _1_")
        );
        assert_eq!(resolve_label(&record, "empty", LabelContext::Filename), None);
        assert_eq!(resolve_label(&record, "absent", LabelContext::Filename), None);
    }

    #[test]
    fn resolve_label_truncates_tab_names() {
        let long = "x".repeat(40);
        let record = record(&[("tab", long.as_str()), ("bad", "a[b]c:d")]);
        let label = resolve_label(&record, "tab", LabelContext::TabName).unwrap();
        assert_eq!(label.len(), 31);
        assert_eq!(
            resolve_label(&record, "bad", LabelContext::TabName).as_deref(),
            Some("a_b_c_d")
        );
    }

    #[test]
    fn cache_serves_repeat_renders_and_notices_edits() {
        let tmp = TempDir::new().unwrap();
        let template = tmp.path().join("t.docx");
        write_docx(&["##v## one".to_string()], &template).unwrap();

        let engine = TemplateEngine::new();
        let rec = record(&[("v", "A")]);
        let out1 = tmp.path().join("1.docx");
        engine.render(&template, &rec, &out1, None).unwrap();

        // Replace the template content; the cache must not serve stale bytes.
        write_docx(&["##v## two, now with longer text".to_string()], &template).unwrap();
        let out2 = tmp.path().join("2.docx");
        engine.render(&template, &rec, &out2, None).unwrap();

        assert_eq!(extract_text(&out1).unwrap().trim_end(), "A one");
        assert_eq!(
            extract_text(&out2).unwrap().trim_end(),
            "A two, now with longer text"
        );
    }
}
