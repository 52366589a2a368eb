//! Shared fixtures for docmill integration tests.

use std::path::{Path, PathBuf};

use assert_fs::TempDir;

use docmill::jobs::TemplateRef;
use docmill::ooxml::{docx, xlsx};
use docmill::{Config, CreateJobRequest, JobOrchestrator, OutputFormat};

/// An isolated orchestrator over temp directories, with the office
/// binary pointed nowhere so conversions take the direct fallbacks.
pub struct TestHarness {
    pub temp: TempDir,
    pub config: Config,
    pub orchestrator: JobOrchestrator,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config_tweak(|_| {})
    }

    pub fn with_config_tweak(tweak: impl FnOnce(&mut Config)) -> Self {
        docmill::init_logging();
        let temp = TempDir::new().expect("temp dir");
        let mut config = Config {
            jobs_dir: temp.path().join("jobs"),
            storage_dir: temp.path().join("storage"),
            soffice_path: PathBuf::from("/nonexistent/soffice-binary"),
            convert_timeout_secs: 5,
            ..Config::default()
        };
        tweak(&mut config);
        let orchestrator = JobOrchestrator::new(config.clone()).expect("orchestrator");
        Self {
            temp,
            config,
            orchestrator,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn job_dir(&self, id: &str) -> PathBuf {
        self.config.jobs_dir.join(id)
    }

    /// A data workbook whose header cells carry `##name##` markers.
    pub fn data_workbook(&self, name: &str, headers: &[&str], rows: &[&[&str]]) -> PathBuf {
        let path = self.root().join(name);
        let mut sheet: Vec<Vec<String>> =
            vec![headers.iter().map(|h| format!("##{}##", h)).collect()];
        for row in rows {
            sheet.push(row.iter().map(|v| v.to_string()).collect());
        }
        xlsx::write_workbook(&[("Data".to_string(), sheet)], &path).expect("data workbook");
        path
    }

    pub fn docx_template(&self, name: &str, paragraphs: &[&str]) -> PathBuf {
        let path = self.root().join(name);
        let paragraphs: Vec<String> = paragraphs.iter().map(|p| p.to_string()).collect();
        docx::write_docx(&paragraphs, &path).expect("docx template");
        path
    }

    pub fn xlsx_template(&self, name: &str, sheets: &[(&str, Vec<Vec<&str>>)]) -> PathBuf {
        let path = self.root().join(name);
        let sheets: Vec<(String, Vec<Vec<String>>)> = sheets
            .iter()
            .map(|(sheet_name, rows)| {
                (
                    sheet_name.to_string(),
                    rows.iter()
                        .map(|row| row.iter().map(|v| v.to_string()).collect())
                        .collect(),
                )
            })
            .collect();
        xlsx::write_workbook(&sheets, &path).expect("xlsx template");
        path
    }

    pub fn request(
        &self,
        data: PathBuf,
        templates: Vec<TemplateRef>,
        formats: Vec<OutputFormat>,
    ) -> CreateJobRequest {
        CreateJobRequest {
            data_path: data,
            templates,
            output_formats: formats,
            ..CreateJobRequest::default()
        }
    }
}
