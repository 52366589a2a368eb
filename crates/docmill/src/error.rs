use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocmillError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("File tracking error: {0}")]
    Track(#[from] TrackError),

    #[error("Data source error: {0}")]
    Parse(#[from] ParseError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Conversion error: {0}")]
    Convert(#[from] crate::convert::ConvertError),

    #[error("Job error: {0}")]
    Job(#[from] crate::jobs::JobError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Source file not found or unreadable: '{path}'")]
    SourceNotFound { path: PathBuf },

    #[error("Failed to read source file '{path}': {source}")]
    ReadSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file store '{path}': {source}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to persist tracking index: {0}")]
    IndexWrite(String),
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Malformed data source '{path}': {reason}")]
    MalformedDataSource { path: PathBuf, reason: String },

    #[error("No sheet in '{path}' has a header row with ##variable## cells")]
    NoMatchingSheet { path: PathBuf },
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read template '{path}': {reason}")]
    TemplateRead { path: PathBuf, reason: String },

    #[error("Unsupported template format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Failed to write rendered document '{path}': {source}")]
    RenderWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Sheet '{sheet}' not found in template '{path}'")]
    SheetNotFound { path: PathBuf, sheet: String },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Job queue is full")]
    QueueFull,

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, DocmillError>;
