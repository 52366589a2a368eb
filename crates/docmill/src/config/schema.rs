use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_jobs_dir")]
    pub jobs_dir: PathBuf,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// Optional directory outside the job tree that finished archives are
    /// copied into. Delivery failures are non-fatal.
    #[serde(default)]
    pub output_directory: Option<PathBuf>,
    #[serde(default = "default_soffice_path")]
    pub soffice_path: PathBuf,
    #[serde(default = "default_convert_timeout_secs")]
    pub convert_timeout_secs: u64,
    /// Progress is persisted every this many processed records during a run.
    #[serde(default = "default_progress_save_interval")]
    pub progress_save_interval: usize,
    #[serde(default = "default_template_extensions")]
    pub allowed_template_extensions: Vec<String>,
    #[serde(default = "default_data_extensions")]
    pub allowed_data_extensions: Vec<String>,
    /// Deliverable kinds jobs may request. Defaults to every kind.
    #[serde(default = "default_output_formats")]
    pub available_output_formats: Vec<String>,
}

fn default_jobs_dir() -> PathBuf {
    PathBuf::from("jobs")
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("storage")
}

fn default_soffice_path() -> PathBuf {
    PathBuf::from("soffice")
}

fn default_convert_timeout_secs() -> u64 {
    120
}

fn default_progress_save_interval() -> usize {
    10
}

fn default_template_extensions() -> Vec<String> {
    vec!["docx".to_string(), "xlsx".to_string(), "eml".to_string()]
}

fn default_data_extensions() -> Vec<String> {
    vec!["xlsx".to_string()]
}

fn default_output_formats() -> Vec<String> {
    crate::jobs::OutputFormat::ALL
        .iter()
        .map(|f| f.to_string())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jobs_dir: default_jobs_dir(),
            storage_dir: default_storage_dir(),
            output_directory: None,
            soffice_path: default_soffice_path(),
            convert_timeout_secs: default_convert_timeout_secs(),
            progress_save_interval: default_progress_save_interval(),
            allowed_template_extensions: default_template_extensions(),
            allowed_data_extensions: default_data_extensions(),
            available_output_formats: default_output_formats(),
        }
    }
}

impl Config {
    pub fn is_allowed_template_extension(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.allowed_template_extensions.iter().any(|e| *e == ext)
    }

    pub fn is_allowed_data_extension(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.allowed_data_extensions.iter().any(|e| *e == ext)
    }

    pub fn is_available_output_format(&self, format: &crate::jobs::OutputFormat) -> bool {
        let name = format.to_string();
        self.available_output_formats.iter().any(|f| *f == name)
    }
}
