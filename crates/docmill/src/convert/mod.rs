//! Format conversion with ordered fallback strategies.
//!
//! A conversion succeeds only when a strategy reports success AND the
//! target file exists with non-zero size afterwards. All failures are
//! accumulated into a structured attempt log so an operator can see which
//! fallback step got how far.

pub mod error;
pub mod page_setup;
pub mod pdf;
pub mod settings;
pub mod strategy;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{info, warn};

pub use error::{AttemptFailure, AttemptReport, ConvertError};
pub use settings::{Margins, Orientation, PrintSettings, Scaling};

use crate::config::Config;
use crate::logging::redact_path;
use crate::template::ContainerKind;
use strategy::{
    ConversionRequest, ConversionStrategy, DirectDocxStrategy, DirectEmlStrategy,
    DirectPdfStrategy, DirectXlsxStrategy, HeadlessOfficeStrategy,
};

/// Deliverable formats a single rendered document can be converted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Pdf,
    Docx,
    Xlsx,
    Eml,
}

impl TargetKind {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
            Self::Eml => "eml",
        }
    }

    fn matches_container(&self, kind: ContainerKind) -> bool {
        matches!(
            (self, kind),
            (Self::Docx, ContainerKind::Docx)
                | (Self::Xlsx, ContainerKind::Xlsx)
                | (Self::Eml, ContainerKind::Eml)
        )
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

pub struct FormatConverter {
    soffice_path: PathBuf,
    timeout: Duration,
    /// The automation host is single-instance; at most one in-flight
    /// host-backed conversion system-wide.
    host_lock: Mutex<()>,
}

impl FormatConverter {
    pub fn new(config: &Config) -> Self {
        Self {
            soffice_path: config.soffice_path.clone(),
            timeout: Duration::from_secs(config.convert_timeout_secs),
            host_lock: Mutex::new(()),
        }
    }

    /// Converts `input` into `target` at `output`.
    ///
    /// Same-kind conversions are a plain copy and never touch a strategy.
    /// Spreadsheet inputs get `settings` baked into their page setup
    /// before any strategy runs.
    pub fn convert(
        &self,
        input: &Path,
        target: TargetKind,
        output: &Path,
        settings: Option<&PrintSettings>,
    ) -> Result<PathBuf, ConvertError> {
        let source = ContainerKind::from_path(input).ok_or_else(|| {
            ConvertError::UnsupportedSource(
                input
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("<none>")
                    .to_string(),
            )
        })?;

        if target.matches_container(source) {
            std::fs::copy(input, output).map_err(|e| ConvertError::Copy {
                from: input.to_path_buf(),
                to: output.to_path_buf(),
                source: e,
            })?;
            return Ok(output.to_path_buf());
        }

        // Page settings live inside the workbook, so stage a copy that
        // carries them and convert that instead.
        let mut staged: Option<PathBuf> = None;
        let effective_input = match (source, settings) {
            (ContainerKind::Xlsx, Some(settings)) if !settings.is_empty() => {
                let staged_path = output.with_extension("pagesetup.xlsx");
                page_setup::apply_to_workbook(input, &staged_path, settings)?;
                staged = Some(staged_path.clone());
                staged_path
            }
            _ => input.to_path_buf(),
        };

        let result = self.run_strategies(&effective_input, input, target, output);
        if let Some(staged) = staged {
            let _ = std::fs::remove_file(staged);
        }
        result
    }

    fn run_strategies(
        &self,
        effective_input: &Path,
        original_input: &Path,
        target: TargetKind,
        output: &Path,
    ) -> Result<PathBuf, ConvertError> {
        let strategies = self.strategies_for(target);
        let request = ConversionRequest {
            input: effective_input,
            output,
            target,
            timeout: self.timeout,
        };

        let mut attempts = Vec::new();
        for strategy in &strategies {
            let outcome = {
                let _host = strategy.uses_automation_host().then(|| {
                    self.host_lock
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                });
                strategy.attempt(&request)
            };

            let failure = match outcome {
                Ok(()) => match verify_output(output) {
                    Ok(()) => {
                        info!(
                            input = %redact_path(original_input),
                            target = %target,
                            strategy = strategy.name(),
                            fallbacks = attempts.len(),
                            "conversion succeeded"
                        );
                        return Ok(output.to_path_buf());
                    }
                    Err(failure) => failure,
                },
                Err(failure) => failure,
            };

            warn!(
                input = %redact_path(original_input),
                target = %target,
                strategy = strategy.name(),
                error = %failure,
                "conversion strategy failed"
            );
            attempts.push(AttemptReport {
                strategy: strategy.name(),
                failure,
            });
            // A half-written file must not satisfy the next verification.
            let _ = std::fs::remove_file(output);
        }

        Err(ConvertError::ConversionFailed {
            input: original_input.to_path_buf(),
            target,
            attempts,
        })
    }

    fn strategies_for(&self, target: TargetKind) -> Vec<Box<dyn ConversionStrategy>> {
        let office = Box::new(HeadlessOfficeStrategy {
            binary: self.soffice_path.clone(),
        });
        match target {
            TargetKind::Pdf => vec![office, Box::new(DirectPdfStrategy)],
            TargetKind::Docx => vec![office, Box::new(DirectDocxStrategy)],
            TargetKind::Xlsx => vec![office, Box::new(DirectXlsxStrategy)],
            // The office suite has no message export; generate directly.
            TargetKind::Eml => vec![Box::new(DirectEmlStrategy)],
        }
    }
}

fn verify_output(output: &Path) -> Result<(), AttemptFailure> {
    match std::fs::metadata(output) {
        Ok(metadata) if metadata.len() > 0 => Ok(()),
        Ok(_) => Err(AttemptFailure::EmptyOutput),
        Err(_) => Err(AttemptFailure::MissingOutput),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::docx::write_docx;
    use crate::ooxml::xlsx::{write_workbook, Workbook};
    use tempfile::TempDir;

    fn converter_without_office() -> FormatConverter {
        let config = Config {
            soffice_path: PathBuf::from("/nonexistent/soffice-binary"),
            convert_timeout_secs: 2,
            ..Default::default()
        };
        FormatConverter::new(&config)
    }

    #[test]
    fn same_kind_conversion_is_a_copy() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in.docx");
        write_docx(&["unchanged".to_string()], &input).unwrap();
        let output = tmp.path().join("out.docx");

        let converter = converter_without_office();
        let path = converter
            .convert(&input, TargetKind::Docx, &output, None)
            .unwrap();
        assert_eq!(path, output);
        assert_eq!(
            std::fs::read(&input).unwrap(),
            std::fs::read(&output).unwrap()
        );
    }

    #[test]
    fn falls_back_to_direct_pdf_when_office_is_missing() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in.docx");
        write_docx(&["Dear Ann".to_string()], &input).unwrap();
        let output = tmp.path().join("out.pdf");

        let converter = converter_without_office();
        converter
            .convert(&input, TargetKind::Pdf, &output, None)
            .unwrap();

        let text = pdf::extract_text(&output).unwrap();
        assert!(text.contains("Dear Ann"));
    }

    #[test]
    fn xlsx_to_pdf_applies_print_settings_before_converting() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in.xlsx");
        write_workbook(
            &[("S".to_string(), vec![vec!["cell".to_string()]])],
            &input,
        )
        .unwrap();
        let output = tmp.path().join("out.pdf");

        let settings = PrintSettings {
            orientation: Some(Orientation::Landscape),
            ..Default::default()
        };
        let converter = converter_without_office();
        converter
            .convert(&input, TargetKind::Pdf, &output, Some(&settings))
            .unwrap();

        assert!(output.is_file());
        // Staged page-setup copy is cleaned up.
        assert!(!output.with_extension("pagesetup.xlsx").exists());
    }

    #[test]
    fn eml_target_uses_direct_generation() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("letter.docx");
        write_docx(&["body text".to_string()], &input).unwrap();
        let output = tmp.path().join("out.eml");

        let converter = converter_without_office();
        converter
            .convert(&input, TargetKind::Eml, &output, None)
            .unwrap();

        let message = std::fs::read_to_string(&output).unwrap();
        assert!(message.contains("Subject: letter"));
        assert!(message.contains("body text"));
    }

    #[test]
    fn docx_to_xlsx_falls_back_to_direct_workbook() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("doc.docx");
        write_docx(&["alpha".to_string(), "beta".to_string()], &input).unwrap();
        let output = tmp.path().join("out.xlsx");

        let converter = converter_without_office();
        converter
            .convert(&input, TargetKind::Xlsx, &output, None)
            .unwrap();

        let workbook = Workbook::open(&output).unwrap();
        assert_eq!(workbook.sheets[0].rows[0][0], "alpha");
        assert_eq!(workbook.sheets[0].rows[1][0], "beta");
    }

    #[test]
    fn unsupported_source_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("file.txt");
        std::fs::write(&input, "text").unwrap();

        let converter = converter_without_office();
        let result = converter.convert(
            &input,
            TargetKind::Pdf,
            &tmp.path().join("out.pdf"),
            None,
        );
        assert!(matches!(result, Err(ConvertError::UnsupportedSource(_))));
    }

    #[test]
    fn exhausted_strategies_embed_the_attempt_log() {
        let tmp = TempDir::new().unwrap();
        // A corrupt container defeats both the office strategy (missing
        // binary) and the direct strategy (unreadable input).
        let input = tmp.path().join("broken.docx");
        std::fs::write(&input, b"not a zip").unwrap();
        let output = tmp.path().join("out.pdf");

        let converter = converter_without_office();
        let err = converter
            .convert(&input, TargetKind::Pdf, &output, None)
            .err()
            .unwrap();

        let message = err.to_string();
        assert!(message.contains("headless-office"));
        assert!(message.contains("direct-pdf"));
    }
}
