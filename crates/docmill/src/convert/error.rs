use std::path::PathBuf;

use thiserror::Error;

use super::TargetKind;

/// Why one strategy attempt did not produce a usable file.
#[derive(Error, Debug)]
pub enum AttemptFailure {
    #[error("failed to spawn converter: {0}")]
    Spawn(String),

    #[error("converter exited with {status}: {stderr}", status = exit_code_label(.code))]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("converter timed out after {secs}s and was killed")]
    Timeout { secs: u64 },

    #[error("converter reported success but produced no output file")]
    MissingOutput,

    #[error("converter produced an empty output file")]
    EmptyOutput,

    #[error("{0}")]
    Io(String),
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "signal".to_string(),
    }
}

/// One entry of the ordered attempt log embedded in `ConversionFailed`.
#[derive(Debug)]
pub struct AttemptReport {
    pub strategy: &'static str,
    pub failure: AttemptFailure,
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("unsupported source container '{0}'")]
    UnsupportedSource(String),

    #[error("failed to copy '{from}' to '{to}': {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "conversion of '{}' to {target} failed; attempts: {}",
        input.display(),
        format_attempts(attempts)
    )]
    ConversionFailed {
        input: PathBuf,
        target: TargetKind,
        attempts: Vec<AttemptReport>,
    },

    #[error("PDF processing error: {0}")]
    Pdf(String),

    #[error("failed to apply page setup to '{path}': {reason}")]
    PageSetup { path: PathBuf, reason: String },
}

fn format_attempts(attempts: &[AttemptReport]) -> String {
    if attempts.is_empty() {
        return "none".to_string();
    }
    attempts
        .iter()
        .enumerate()
        .map(|(i, report)| format!("[{}] {}: {}", i + 1, report.strategy, report.failure))
        .collect::<Vec<_>>()
        .join("; ")
}
