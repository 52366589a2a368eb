//! The batch-generation job model and its persisted shape.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::convert::{PrintSettings, TargetKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Requested deliverable kinds. The two aggregate kinds collect
/// per-record outputs into one file after the record loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Pdf,
    PdfMerged,
    Word,
    Excel,
    ExcelWorkbook,
    #[serde(rename = "eml")]
    Message,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 6] = [
        Self::Pdf,
        Self::PdfMerged,
        Self::Word,
        Self::Excel,
        Self::ExcelWorkbook,
        Self::Message,
    ];

    /// Subdirectory of the job's output root that holds this kind.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::PdfMerged => "pdf_merged",
            Self::Word => "word",
            Self::Excel => "excel",
            Self::ExcelWorkbook => "excel_workbook",
            Self::Message => "eml",
        }
    }

    /// Per-record conversion target; aggregates have none.
    pub fn target_kind(&self) -> Option<TargetKind> {
        match self {
            Self::Pdf => Some(TargetKind::Pdf),
            Self::Word => Some(TargetKind::Docx),
            Self::Excel => Some(TargetKind::Xlsx),
            Self::Message => Some(TargetKind::Eml),
            Self::PdfMerged | Self::ExcelWorkbook => None,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::PdfMerged | Self::ExcelWorkbook)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Message => "eml",
            other => other.dir_name(),
        })
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(Self::Pdf),
            "pdf_merged" => Ok(Self::PdfMerged),
            "word" => Ok(Self::Word),
            "excel" => Ok(Self::Excel),
            "excel_workbook" => Ok(Self::ExcelWorkbook),
            "eml" => Ok(Self::Message),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

/// One template of a job. Multi-template jobs render every template per
/// record and merge in priority order where the kind supports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRef {
    /// Original path as supplied at creation.
    pub path: PathBuf,
    #[serde(default)]
    pub priority: i32,
    /// Narrows spreadsheet-template substitution to one sheet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    /// Filled at creation by the file store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

impl TemplateRef {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            priority: 0,
            sheet: None,
            file_id: None,
            local_path: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_sheet<S: Into<String>>(mut self, sheet: S) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    /// Tracked copy when available, original path otherwise.
    pub fn effective_path(&self) -> &PathBuf {
        self.local_path.as_ref().unwrap_or(&self.path)
    }
}

/// One produced artifact. Aggregate deliverables carry no record index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFileDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_index: Option<usize>,
    pub kind: OutputFormat,
    /// Relative to the job's directory.
    pub relative_path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Original data-source path as supplied at creation.
    pub data_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_data_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_sheet: Option<String>,

    /// Sorted by priority at creation.
    pub templates: Vec<TemplateRef>,
    pub output_formats: Vec<OutputFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excel_print_settings: Option<PrintSettings>,
    /// Record variable whose value names per-record output files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_variable: Option<String>,
    /// Record variable whose value names workbook tabs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tabname_variable: Option<String>,

    pub total_records: usize,
    pub processed_records: usize,
    pub failed_records: usize,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub output_files: Vec<OutputFileDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_file_path: Option<PathBuf>,
}

impl Job {
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// All file-store ids this job references.
    pub fn tracked_file_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .templates
            .iter()
            .filter_map(|t| t.file_id.clone())
            .collect();
        if let Some(id) = &self.data_file_id {
            ids.push(id.clone());
        }
        ids
    }
}
