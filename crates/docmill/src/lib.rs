pub mod config;
pub mod convert;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod ooxml;
pub mod placeholder;
pub mod records;
pub mod store;
pub mod template;
pub mod worker;

pub use config::{load_config, Config};
pub use convert::{FormatConverter, PrintSettings, TargetKind};
pub use error::{
    ConfigError, DocmillError, ParseError, Result, TemplateError, TrackError, WorkerError,
};
pub use jobs::{
    CreateJobRequest, Job, JobError, JobOrchestrator, JobStats, JobStatus, OutputFileDescriptor,
    OutputFormat, SourceUpdates, TemplateRef,
};
pub use logging::init_logging;
pub use store::{FileStore, TrackedFile};
pub use template::TemplateEngine;
pub use worker::JobWorker;
