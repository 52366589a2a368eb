use std::path::PathBuf;
use thiserror::Error;

use crate::error::{ParseError, TemplateError, TrackError};

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Job '{0}' not found")]
    NotFound(String),

    #[error("Job '{id}' is {status}, expected {expected}")]
    InvalidState {
        id: String,
        status: String,
        expected: String,
    },

    #[error("Failed to persist job '{id}': {reason}")]
    Persist { id: String, reason: String },

    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to archive outputs of job '{id}': {reason}")]
    Archive { id: String, reason: String },

    #[error(transparent)]
    Track(#[from] TrackError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}
