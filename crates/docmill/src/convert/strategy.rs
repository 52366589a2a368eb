//! Conversion strategies.
//!
//! Every strategy has the same contract: attempt to produce the request's
//! output file, report an `AttemptFailure` otherwise. The converter tries
//! them in a fixed order and never trusts exit status alone; the produced
//! file is verified separately.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tracing::debug;

use super::error::AttemptFailure;
use super::pdf::text_to_pdf;
use super::TargetKind;
use crate::logging::redact_path;
use crate::ooxml::docx::write_docx;
use crate::ooxml::xlsx::{write_workbook, Workbook};
use crate::template::eml::subject;
use crate::template::ContainerKind;

pub struct ConversionRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub target: TargetKind,
    pub timeout: Duration,
}

pub trait ConversionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Strategies going through the external single-instance host must be
    /// serialized system-wide.
    fn uses_automation_host(&self) -> bool {
        false
    }

    fn attempt(&self, request: &ConversionRequest) -> Result<(), AttemptFailure>;
}

/// Headless office-suite invocation (`soffice --convert-to`).
pub struct HeadlessOfficeStrategy {
    pub binary: PathBuf,
}

impl ConversionStrategy for HeadlessOfficeStrategy {
    fn name(&self) -> &'static str {
        "headless-office"
    }

    fn uses_automation_host(&self) -> bool {
        true
    }

    fn attempt(&self, request: &ConversionRequest) -> Result<(), AttemptFailure> {
        let out_dir = request
            .output
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        // Isolated profile: a wedged default profile is the most common
        // way a headless instance hangs.
        let profile_dir = std::env::temp_dir().join(format!("docmill-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&profile_dir).map_err(|e| AttemptFailure::Io(e.to_string()))?;
        let profile_arg = format!(
            "-env:UserInstallation=file://{}",
            profile_dir.to_string_lossy()
        );

        let result = self.run_converter(request, &out_dir, &profile_arg);
        let _ = std::fs::remove_dir_all(&profile_dir);
        result?;

        // soffice names the output after the input stem.
        let stem = request
            .input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let produced = out_dir.join(format!("{}.{}", stem, request.target.extension()));
        if !produced.is_file() {
            return Err(AttemptFailure::MissingOutput);
        }
        if produced != request.output {
            std::fs::rename(&produced, request.output)
                .map_err(|e| AttemptFailure::Io(e.to_string()))?;
        }
        Ok(())
    }
}

impl HeadlessOfficeStrategy {
    fn run_converter(
        &self,
        request: &ConversionRequest,
        out_dir: &Path,
        profile_arg: &str,
    ) -> Result<(), AttemptFailure> {
        let mut child = std::process::Command::new(&self.binary)
            .arg("--headless")
            .arg("--norestore")
            .arg(profile_arg)
            .arg("--convert-to")
            .arg(request.target.extension())
            .arg("--outdir")
            .arg(out_dir)
            .arg(request.input)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AttemptFailure::Spawn(e.to_string()))?;

        let deadline = Instant::now() + request.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(AttemptFailure::Timeout {
                            secs: request.timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(AttemptFailure::Io(e.to_string())),
            }
        };

        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            let stderr = stderr.chars().take(500).collect::<String>();
            return Err(AttemptFailure::NonZeroExit {
                code: status.code(),
                stderr,
            });
        }

        debug!(
            input = %redact_path(request.input),
            target = %request.target,
            "headless conversion finished"
        );
        Ok(())
    }
}

/// Text content of a rendered document, for the direct strategies.
fn source_text(input: &Path) -> Result<String, AttemptFailure> {
    let kind = ContainerKind::from_path(input)
        .ok_or_else(|| AttemptFailure::Io(format!("unsupported source '{}'", input.display())))?;
    match kind {
        ContainerKind::Docx => {
            crate::ooxml::docx::extract_text(input).map_err(|e| AttemptFailure::Io(e.to_string()))
        }
        ContainerKind::Xlsx => {
            let workbook =
                Workbook::open(input).map_err(|e| AttemptFailure::Io(e.to_string()))?;
            let mut text = String::new();
            for sheet in &workbook.sheets {
                if workbook.sheets.len() > 1 {
                    text.push_str(&format!("[{}]\n", sheet.name));
                }
                for row in &sheet.rows {
                    if row.iter().all(|c| c.is_empty()) {
                        continue;
                    }
                    text.push_str(&row.join("\t"));
                    text.push('\n');
                }
            }
            Ok(text)
        }
        ContainerKind::Eml => {
            let raw =
                std::fs::read(input).map_err(|e| AttemptFailure::Io(e.to_string()))?;
            Ok(String::from_utf8_lossy(&raw).into_owned())
        }
    }
}

/// Direct text-layout PDF, no external tooling.
pub struct DirectPdfStrategy;

impl ConversionStrategy for DirectPdfStrategy {
    fn name(&self) -> &'static str {
        "direct-pdf"
    }

    fn attempt(&self, request: &ConversionRequest) -> Result<(), AttemptFailure> {
        let text = source_text(request.input)?;
        let bytes = text_to_pdf(&text).map_err(|e| AttemptFailure::Io(e.to_string()))?;
        std::fs::write(request.output, bytes).map_err(|e| AttemptFailure::Io(e.to_string()))
    }
}

/// Bare word container holding the source text, one paragraph per line.
pub struct DirectDocxStrategy;

impl ConversionStrategy for DirectDocxStrategy {
    fn name(&self) -> &'static str {
        "direct-docx"
    }

    fn attempt(&self, request: &ConversionRequest) -> Result<(), AttemptFailure> {
        let text = source_text(request.input)?;
        let paragraphs: Vec<String> = text.lines().map(str::to_string).collect();
        write_docx(&paragraphs, request.output).map_err(|e| AttemptFailure::Io(e.to_string()))
    }
}

/// Bare workbook holding the source text, tab-split into columns.
pub struct DirectXlsxStrategy;

impl ConversionStrategy for DirectXlsxStrategy {
    fn name(&self) -> &'static str {
        "direct-xlsx"
    }

    fn attempt(&self, request: &ConversionRequest) -> Result<(), AttemptFailure> {
        let text = source_text(request.input)?;
        let rows: Vec<Vec<String>> = text
            .lines()
            .map(|line| line.split('\t').map(str::to_string).collect())
            .collect();
        write_workbook(&[("Sheet1".to_string(), rows)], request.output)
            .map_err(|e| AttemptFailure::Io(e.to_string()))
    }
}

/// RFC 5322 message wrapping the source text; subject falls back to the
/// input filename.
pub struct DirectEmlStrategy;

impl ConversionStrategy for DirectEmlStrategy {
    fn name(&self) -> &'static str {
        "direct-eml"
    }

    fn attempt(&self, request: &ConversionRequest) -> Result<(), AttemptFailure> {
        let text = source_text(request.input)?;

        // Already header-shaped text keeps its own headers.
        let message = if subject(&text).is_some() {
            text
        } else {
            let subject = request
                .input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Document");
            let body = text.replace('\n', "\r\n");
            format!(
                "Subject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}",
                subject, body
            )
        };

        std::fs::write(request.output, message.as_bytes())
            .map_err(|e| AttemptFailure::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn direct_pdf_converts_docx_text() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in.docx");
        write_docx(&["Invoice for Ann".to_string()], &input).unwrap();
        let output = tmp.path().join("out.pdf");

        let request = ConversionRequest {
            input: &input,
            output: &output,
            target: TargetKind::Pdf,
            timeout: Duration::from_secs(5),
        };
        DirectPdfStrategy.attempt(&request).unwrap();

        let text = crate::convert::pdf::extract_text(&output).unwrap();
        assert!(text.contains("Invoice for Ann"));
    }

    #[test]
    fn direct_docx_converts_spreadsheet_rows() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in.xlsx");
        write_workbook(
            &[(
                "S".to_string(),
                vec![vec!["Ann".to_string(), "a@x.com".to_string()]],
            )],
            &input,
        )
        .unwrap();
        let output = tmp.path().join("out.docx");

        let request = ConversionRequest {
            input: &input,
            output: &output,
            target: TargetKind::Docx,
            timeout: Duration::from_secs(5),
        };
        DirectDocxStrategy.attempt(&request).unwrap();

        let text = crate::ooxml::docx::extract_text(&output).unwrap();
        assert!(text.contains("Ann\ta@x.com"));
    }

    #[test]
    fn direct_eml_wraps_text_with_subject() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("welcome_letter.docx");
        write_docx(&["Hello there".to_string()], &input).unwrap();
        let output = tmp.path().join("out.eml");

        let request = ConversionRequest {
            input: &input,
            output: &output,
            target: TargetKind::Eml,
            timeout: Duration::from_secs(5),
        };
        DirectEmlStrategy.attempt(&request).unwrap();

        let message = std::fs::read_to_string(&output).unwrap();
        assert!(message.starts_with("Subject: welcome_letter\r\n"));
        assert!(message.contains("Hello there"));
    }

    #[test]
    fn direct_eml_keeps_existing_headers() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in.eml");
        let original = "Subject: Quarterly report\r\nTo: ann@example.com\r\n\r\nSee attached.\r\n";
        std::fs::write(&input, original).unwrap();
        let output = tmp.path().join("out.eml");

        let request = ConversionRequest {
            input: &input,
            output: &output,
            target: TargetKind::Eml,
            timeout: Duration::from_secs(5),
        };
        DirectEmlStrategy.attempt(&request).unwrap();

        let message = std::fs::read_to_string(&output).unwrap();
        assert_eq!(message, original);
        assert!(!message.contains("Subject: in\r\n"));
    }

    #[test]
    fn missing_office_binary_is_spawn_failure() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in.docx");
        write_docx(&["x".to_string()], &input).unwrap();
        let output = tmp.path().join("out.pdf");

        let strategy = HeadlessOfficeStrategy {
            binary: PathBuf::from("/nonexistent/soffice-binary"),
        };
        let request = ConversionRequest {
            input: &input,
            output: &output,
            target: TargetKind::Pdf,
            timeout: Duration::from_secs(1),
        };
        let result = strategy.attempt(&request);
        assert!(matches!(result, Err(AttemptFailure::Spawn(_))));
    }
}
