//! Job lifecycle: creation, persistence, and the processing pipeline.

mod error;
mod job;
mod orchestrator;
mod store;

pub use error::JobError;
pub use job::{Job, JobStatus, OutputFileDescriptor, OutputFormat, TemplateRef};
pub use orchestrator::{CreateJobRequest, JobOrchestrator, JobStats, SourceUpdates};
pub use store::JobStore;
