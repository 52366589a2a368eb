//! Drives a job from creation through rendering, conversion,
//! aggregation, and archiving.
//!
//! A single record failing its render or conversion marks that record
//! failed and the run continues; the job only fails outright when a
//! batch-level step breaks or every record fails.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;
use zip::write::SimpleFileOptions;

use crate::config::Config;
use crate::convert::{pdf, FormatConverter, PrintSettings, TargetKind};
use crate::ooxml::xlsx;
use crate::placeholder::Record;
use crate::records;
use crate::store::FileStore;
use crate::template::{resolve_label, LabelContext, TemplateEngine};

use super::error::JobError;
use super::job::{Job, JobStatus, OutputFileDescriptor, OutputFormat, TemplateRef};
use super::store::JobStore;

/// Everything needed to create a job. Paths are the caller's originals;
/// the orchestrator snapshots them into the file store.
#[derive(Debug, Clone, Default)]
pub struct CreateJobRequest {
    pub data_path: PathBuf,
    pub templates: Vec<TemplateRef>,
    pub output_formats: Vec<OutputFormat>,
    pub data_sheet: Option<String>,
    pub output_directory: Option<PathBuf>,
    pub excel_print_settings: Option<PrintSettings>,
    pub filename_variable: Option<String>,
    pub tabname_variable: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub records_processed: usize,
    pub files_generated: usize,
}

/// What `check_updates` found and refreshed.
#[derive(Debug, Clone, Default)]
pub struct SourceUpdates {
    /// Original paths whose content changed since they were snapshotted;
    /// their cached copies have been refreshed.
    pub refreshed: Vec<PathBuf>,
}

impl SourceUpdates {
    pub fn any(&self) -> bool {
        !self.refreshed.is_empty()
    }
}

pub struct JobOrchestrator {
    config: Config,
    store: JobStore,
    files: FileStore,
    engine: TemplateEngine,
    converter: FormatConverter,
    jobs: RwLock<HashMap<String, Job>>,
}

/// Artifacts one record contributed, fed into the aggregates.
struct RecordOutcome {
    outputs: Vec<OutputFileDescriptor>,
    missing_names: BTreeSet<String>,
    merged_pdf: Option<PathBuf>,
    workbook_parts: Vec<PathBuf>,
}

impl JobOrchestrator {
    pub fn new(config: Config) -> crate::error::Result<Self> {
        let store = JobStore::open(&config.jobs_dir)?;
        let files = FileStore::open(&config.storage_dir)?;
        let converter = FormatConverter::new(&config);

        let mut jobs = HashMap::new();
        for job in store.load_all()? {
            jobs.insert(job.id.clone(), job);
        }
        info!(jobs = jobs.len(), "loaded existing jobs");

        Ok(Self {
            config,
            store,
            files,
            engine: TemplateEngine::new(),
            converter,
            jobs: RwLock::new(jobs),
        })
    }

    /// Validates the request, snapshots every input into the file store,
    /// and persists a new pending job. No record is touched yet.
    pub fn create(&self, request: CreateJobRequest) -> Result<Job, JobError> {
        self.validate(&request)?;

        let data_file = self.files.track(&request.data_path)?;

        let mut templates = request.templates;
        for template in &mut templates {
            let tracked = self.files.track(&template.path)?;
            template.file_id = Some(tracked.file_id);
            template.local_path = Some(tracked.local_path);
        }
        // Priority decides merge order for multi-template deliverables.
        templates.sort_by_key(|t| t.priority);

        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            data_path: request.data_path,
            data_file_id: Some(data_file.file_id),
            local_data_path: Some(data_file.local_path),
            data_sheet: request.data_sheet,
            templates,
            output_formats: request.output_formats,
            output_directory: request
                .output_directory
                .or_else(|| self.config.output_directory.clone()),
            excel_print_settings: request.excel_print_settings,
            filename_variable: request.filename_variable,
            tabname_variable: request.tabname_variable,
            total_records: 0,
            processed_records: 0,
            failed_records: 0,
            warnings: Vec::new(),
            error_message: None,
            output_files: Vec::new(),
            zip_file_path: None,
        };

        self.store.save(&job)?;
        self.write_locked().insert(job.id.clone(), job.clone());
        info!(job_id = %job.id, templates = job.templates.len(), "created job");
        Ok(job)
    }

    fn validate(&self, request: &CreateJobRequest) -> Result<(), JobError> {
        if request.output_formats.is_empty() {
            return Err(JobError::Validation(
                "at least one output format is required".to_string(),
            ));
        }
        if request.templates.is_empty() {
            return Err(JobError::Validation(
                "at least one template is required".to_string(),
            ));
        }
        for format in &request.output_formats {
            if !self.config.is_available_output_format(format) {
                return Err(JobError::Validation(format!(
                    "output format '{}' is not available",
                    format
                )));
            }
        }

        let data_ext = extension_of(&request.data_path);
        if !self.config.is_allowed_data_extension(&data_ext) {
            return Err(JobError::Validation(format!(
                "data source extension '{}' is not allowed",
                data_ext
            )));
        }
        if !request.data_path.is_file() {
            return Err(JobError::Validation(format!(
                "data source '{}' does not exist",
                request.data_path.display()
            )));
        }

        for template in &request.templates {
            let ext = extension_of(&template.path);
            if !self.config.is_allowed_template_extension(&ext) {
                return Err(JobError::Validation(format!(
                    "template extension '{}' is not allowed",
                    ext
                )));
            }
            if !template.path.is_file() {
                return Err(JobError::Validation(format!(
                    "template '{}' does not exist",
                    template.path.display()
                )));
            }
        }
        Ok(())
    }

    /// Runs a pending job to a terminal state. Calling it again on a
    /// job that already left pending is a no-op and returns the job as
    /// it stands, so duplicate triggers are harmless.
    pub fn process(&self, id: &str) -> Result<Job, JobError> {
        let _span = info_span!("job.process", job_id = %id).entered();

        // Check and transition under one write lock so two concurrent
        // callers cannot both observe PENDING and run the batch.
        let mut job = {
            let mut jobs = self.write_locked();
            let entry = jobs
                .get_mut(id)
                .ok_or_else(|| JobError::NotFound(id.to_string()))?;
            if entry.status != JobStatus::Pending {
                debug!(status = %entry.status, "job already picked up, nothing to do");
                return Ok(entry.clone());
            }
            entry.status = JobStatus::Processing;
            entry.started_at = Some(Utc::now());
            entry.touch();
            entry.clone()
        };
        self.store.save(&job)?;

        match self.process_inner(&mut job) {
            Ok(()) => {
                job.status = final_status(job.total_records, job.processed_records);
                if job.status == JobStatus::Failed {
                    job.error_message = Some("all records failed".to_string());
                }
            }
            Err(e) => {
                warn!(error = %e, "job failed");
                job.status = JobStatus::Failed;
                job.error_message = Some(e.to_string());
            }
        }

        if job.status == JobStatus::Completed {
            match self.archive_outputs(&mut job) {
                Ok(()) => self.deliver_archive(&mut job),
                Err(e) => {
                    warn!(error = %e, "archiving failed");
                    job.status = JobStatus::Failed;
                    job.error_message = Some(e.to_string());
                }
            }
        }

        job.completed_at = Some(Utc::now());
        job.touch();
        self.store.save(&job)?;
        self.write_locked().insert(job.id.clone(), job.clone());
        info!(
            status = %job.status,
            processed = job.processed_records,
            failed = job.failed_records,
            "job finished"
        );
        Ok(job)
    }

    fn process_inner(&self, job: &mut Job) -> Result<(), JobError> {
        let job_dir = self.store.job_dir(&job.id);
        let rendered_dir = job_dir.join("rendered");
        let outputs_dir = job_dir.join("outputs");
        fs::create_dir_all(&rendered_dir).map_err(|source| JobError::Io {
            path: rendered_dir.clone(),
            source,
        })?;
        for format in &job.output_formats {
            let dir = outputs_dir.join(format.dir_name());
            fs::create_dir_all(&dir).map_err(|source| JobError::Io { path: dir, source })?;
        }

        let data_path = job
            .local_data_path
            .clone()
            .unwrap_or_else(|| job.data_path.clone());
        let source = records::parse(&data_path, job.data_sheet.as_deref())?;
        job.total_records = source.records.len();
        debug!(
            records = source.records.len(),
            sheet = %source.sheet_name,
            "parsed data source"
        );

        self.check_template_variables(job, &source.variables)?;

        let mut used_basenames: HashSet<String> = HashSet::new();
        let mut merge_sources: Vec<PathBuf> = Vec::new();
        let mut workbook_sheets: Vec<(String, Vec<Vec<String>>)> = Vec::new();
        let want_merged = job.output_formats.contains(&OutputFormat::PdfMerged);
        let want_workbook = job.output_formats.contains(&OutputFormat::ExcelWorkbook);

        for (index, record) in source.records.iter().enumerate() {
            let number = index + 1;
            let _record_span = tracing::debug_span!("job.record", record = number).entered();
            let base = self.record_basename(job, record, number, &mut used_basenames);

            match self.process_record(job, record, &base, &rendered_dir, &outputs_dir) {
                Ok(outcome) => {
                    job.processed_records += 1;
                    for name in &outcome.missing_names {
                        job.add_warning(format!(
                            "record {}: no value for placeholder '{}'",
                            number, name
                        ));
                    }
                    let start = job.output_files.len();
                    job.output_files.extend(outcome.outputs);
                    for descriptor in &mut job.output_files[start..] {
                        descriptor.record_index = Some(number);
                    }
                    if want_merged {
                        if let Some(path) = outcome.merged_pdf {
                            merge_sources.push(path);
                        }
                    }
                    if want_workbook && !outcome.workbook_parts.is_empty() {
                        let label = self.record_tab_label(job, record, number);
                        for part in &outcome.workbook_parts {
                            if let Err(e) =
                                xlsx::append_workbook_sheets(part, &label, &mut workbook_sheets)
                            {
                                job.add_warning(format!(
                                    "record {}: could not read sheets for the workbook: {}",
                                    number, e
                                ));
                            }
                        }
                    }
                }
                Err(cause) => {
                    warn!(record = number, cause = %cause, "record failed");
                    job.failed_records += 1;
                    job.add_warning(format!("record {}: {}", number, cause));
                }
            }

            if number % self.config.progress_save_interval == 0 {
                job.touch();
                if let Err(e) = self.store.save(job) {
                    warn!(error = %e, "progress save failed");
                }
            }
        }

        if want_merged {
            self.build_merged_pdf(job, &outputs_dir, &merge_sources);
        }
        if want_workbook {
            self.build_workbook(job, &outputs_dir, workbook_sheets);
        }
        Ok(())
    }

    /// Flags placeholders no data column can ever fill, once per
    /// template and name, before any record is rendered. An unreadable
    /// template is fatal here rather than once per record.
    fn check_template_variables(
        &self,
        job: &mut Job,
        variables: &crate::records::VariableSet,
    ) -> Result<(), JobError> {
        let mut warnings = Vec::new();
        for template in &job.templates {
            let names = self.engine.extract_variables(template.effective_path())?;
            for name in names {
                if !variables.contains(&name) {
                    warnings.push(format!(
                        "template '{}': placeholder '{}' matches no data column",
                        file_label(&template.path),
                        name
                    ));
                }
            }
        }
        for warning in warnings {
            job.add_warning(warning);
        }
        Ok(())
    }

    /// Renders every template for one record and converts the results
    /// into the requested per-record formats. Any error here fails only
    /// this record.
    fn process_record(
        &self,
        job: &Job,
        record: &Record,
        base: &str,
        rendered_dir: &Path,
        outputs_dir: &Path,
    ) -> Result<RecordOutcome, String> {
        let multi = job.templates.len() > 1;
        let mut missing_names = BTreeSet::new();
        let mut rendered: Vec<PathBuf> = Vec::new();

        for (n, template) in job.templates.iter().enumerate() {
            let ext = extension_of(&template.path);
            let name = if multi {
                format!("{}_t{}.{}", base, n + 1, ext)
            } else {
                format!("{}.{}", base, ext)
            };
            let path = rendered_dir.join(name);
            let outcome = self
                .engine
                .render(
                    template.effective_path(),
                    record,
                    &path,
                    template.sheet.as_deref(),
                )
                .map_err(|e| e.to_string())?;
            missing_names.extend(outcome.missing_names);
            rendered.push(path);
        }

        let settings = job.excel_print_settings.as_ref();
        let mut outputs = Vec::new();
        let mut merged_pdf: Option<PathBuf> = None;
        let mut workbook_parts: Vec<PathBuf> = Vec::new();

        for format in &job.output_formats {
            let Some(target) = format.target_kind() else {
                continue;
            };
            let out_dir = outputs_dir.join(format.dir_name());

            if target == TargetKind::Pdf {
                let out = out_dir.join(format!("{}.pdf", base));
                self.record_pdf(&rendered, base, rendered_dir, &out, settings)?;
                outputs.push(describe(&out, *format)?);
                merged_pdf = Some(out);
                continue;
            }

            for (n, input) in rendered.iter().enumerate() {
                let name = if multi {
                    format!("{}_t{}.{}", base, n + 1, target.extension())
                } else {
                    format!("{}.{}", base, target.extension())
                };
                let out = out_dir.join(name);
                self.converter
                    .convert(input, target, &out, settings)
                    .map_err(|e| e.to_string())?;
                outputs.push(describe(&out, *format)?);
                if target == TargetKind::Xlsx {
                    workbook_parts.push(out);
                }
            }
        }

        // Aggregates can run without their per-record counterpart being
        // requested; the intermediates then live outside outputs/.
        if job.output_formats.contains(&OutputFormat::PdfMerged) && merged_pdf.is_none() {
            let out = rendered_dir.join(format!("{}.pdf", base));
            self.record_pdf(&rendered, base, rendered_dir, &out, settings)?;
            merged_pdf = Some(out);
        }
        if job.output_formats.contains(&OutputFormat::ExcelWorkbook) && workbook_parts.is_empty() {
            for (n, input) in rendered.iter().enumerate() {
                let out = rendered_dir.join(format!("{}_w{}.xlsx", base, n + 1));
                self.converter
                    .convert(input, TargetKind::Xlsx, &out, settings)
                    .map_err(|e| e.to_string())?;
                workbook_parts.push(out);
            }
        }

        Ok(RecordOutcome {
            outputs,
            missing_names,
            merged_pdf,
            workbook_parts,
        })
    }

    /// One PDF per record: a straight conversion for a single template,
    /// a merge in priority order when there are several.
    fn record_pdf(
        &self,
        rendered: &[PathBuf],
        base: &str,
        rendered_dir: &Path,
        output: &Path,
        settings: Option<&PrintSettings>,
    ) -> Result<(), String> {
        if rendered.len() == 1 {
            self.converter
                .convert(&rendered[0], TargetKind::Pdf, output, settings)
                .map_err(|e| e.to_string())?;
            return Ok(());
        }

        let mut parts = Vec::new();
        for (n, input) in rendered.iter().enumerate() {
            let part = rendered_dir.join(format!("{}_t{}.pdf", base, n + 1));
            self.converter
                .convert(input, TargetKind::Pdf, &part, settings)
                .map_err(|e| e.to_string())?;
            parts.push(part);
        }
        pdf::merge_pdfs(&parts, output).map_err(|e| e.to_string())
    }

    fn build_merged_pdf(&self, job: &mut Job, outputs_dir: &Path, sources: &[PathBuf]) {
        if sources.is_empty() {
            job.add_warning("no per-record PDFs were produced, skipping the merged PDF".into());
            return;
        }
        let out = outputs_dir
            .join(OutputFormat::PdfMerged.dir_name())
            .join("merged.pdf");
        match pdf::merge_pdfs(sources, &out) {
            Ok(()) => match describe(&out, OutputFormat::PdfMerged) {
                Ok(descriptor) => job.output_files.push(descriptor),
                Err(e) => job.add_warning(format!("merged PDF written but unreadable: {}", e)),
            },
            Err(e) => {
                warn!(error = %e, "merged PDF failed");
                job.add_warning(format!("could not build the merged PDF: {}", e));
            }
        }
    }

    fn build_workbook(
        &self,
        job: &mut Job,
        outputs_dir: &Path,
        sheets: Vec<(String, Vec<Vec<String>>)>,
    ) {
        if sheets.is_empty() {
            job.add_warning("no spreadsheet outputs were produced, skipping the workbook".into());
            return;
        }
        let sheets = dedupe_tab_names(sheets);
        let out = outputs_dir
            .join(OutputFormat::ExcelWorkbook.dir_name())
            .join("workbook.xlsx");
        match xlsx::write_workbook(&sheets, &out) {
            Ok(()) => match describe(&out, OutputFormat::ExcelWorkbook) {
                Ok(descriptor) => job.output_files.push(descriptor),
                Err(e) => job.add_warning(format!("workbook written but unreadable: {}", e)),
            },
            Err(e) => {
                warn!(error = %e, "workbook merge failed");
                job.add_warning(format!("could not build the combined workbook: {}", e));
            }
        }
    }

    fn record_basename(
        &self,
        job: &Job,
        record: &Record,
        number: usize,
        used: &mut HashSet<String>,
    ) -> String {
        let base = job
            .filename_variable
            .as_deref()
            .and_then(|variable| resolve_label(record, variable, LabelContext::Filename))
            .unwrap_or_else(|| format!("record_{}", number));

        if used.insert(base.clone()) {
            return base;
        }
        let mut counter = 2;
        loop {
            let candidate = format!("{}_{}", base, counter);
            if used.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }

    fn record_tab_label(&self, job: &Job, record: &Record, number: usize) -> String {
        job.tabname_variable
            .as_deref()
            .and_then(|variable| resolve_label(record, variable, LabelContext::TabName))
            .unwrap_or_else(|| format!("Sheet{}", number))
    }

    /// Zips everything under outputs/ into `job_<id>_output.zip` at the
    /// job root. Descriptor order is preserved so the archive reads in
    /// record order.
    fn archive_outputs(&self, job: &mut Job) -> Result<(), JobError> {
        let job_dir = self.store.job_dir(&job.id);
        let zip_path = job_dir.join(format!("job_{}_output.zip", job.id));

        let archive = |job: &Job| -> Result<(), String> {
            let file = fs::File::create(&zip_path).map_err(|e| e.to_string())?;
            let mut writer = zip::ZipWriter::new(file);
            let options =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

            for descriptor in &job.output_files {
                let source = job_dir.join(&descriptor.relative_path);
                let entry_name = descriptor
                    .relative_path
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                writer
                    .start_file(entry_name, options)
                    .map_err(|e| e.to_string())?;
                let bytes = fs::read(&source).map_err(|e| e.to_string())?;
                writer.write_all(&bytes).map_err(|e| e.to_string())?;
            }
            writer.finish().map_err(|e| e.to_string())?;
            Ok(())
        };

        archive(job).map_err(|reason| JobError::Archive {
            id: job.id.clone(),
            reason,
        })?;
        job.zip_file_path = Some(zip_path);
        Ok(())
    }

    /// Copies the archive into the job's delivery directory. Failure is
    /// a warning, never a job failure.
    fn deliver_archive(&self, job: &mut Job) {
        let (Some(dir), Some(zip_path)) = (job.output_directory.clone(), job.zip_file_path.clone())
        else {
            return;
        };
        let deliver = || -> std::io::Result<()> {
            fs::create_dir_all(&dir)?;
            let name = zip_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("job_{}_output.zip", job.id));
            fs::copy(&zip_path, dir.join(name))?;
            Ok(())
        };
        if let Err(e) = deliver() {
            warn!(directory = %dir.display(), error = %e, "archive delivery failed");
            job.add_warning(format!(
                "could not deliver the archive to '{}': {}",
                dir.display(),
                e
            ));
        }
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.read_locked().get(id).cloned()
    }

    /// Newest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.read_locked().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub fn get_output_files(&self, id: &str) -> Result<Vec<OutputFileDescriptor>, JobError> {
        self.read_locked()
            .get(id)
            .map(|job| job.output_files.clone())
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Re-hashes the job's source files and refreshes the cached copy of
    /// every one that changed on disk since it was snapshotted.
    pub fn check_updates(&self, id: &str) -> Result<SourceUpdates, JobError> {
        let job = self
            .read_locked()
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;

        let mut updates = SourceUpdates::default();
        let mut sources = vec![job.data_path.clone()];
        sources.extend(job.templates.iter().map(|t| t.path.clone()));
        for path in sources {
            if self.files.is_stale(&path)? {
                self.files.track(&path)?;
                updates.refreshed.push(path);
            }
        }
        if updates.any() {
            info!(job_id = %id, changed = updates.refreshed.len(), "source files changed");
        }
        Ok(updates)
    }

    /// Creates and runs a fresh job from an existing job's inputs and
    /// settings, re-snapshotting the sources.
    pub fn rerun(&self, id: &str) -> Result<Job, JobError> {
        let original = self
            .read_locked()
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;

        let templates = original
            .templates
            .iter()
            .map(|t| {
                let mut fresh = TemplateRef::new(&t.path).with_priority(t.priority);
                fresh.sheet = t.sheet.clone();
                fresh
            })
            .collect();

        let job = self.create(CreateJobRequest {
            data_path: original.data_path.clone(),
            templates,
            output_formats: original.output_formats.clone(),
            data_sheet: original.data_sheet.clone(),
            output_directory: original.output_directory.clone(),
            excel_print_settings: original.excel_print_settings.clone(),
            filename_variable: original.filename_variable.clone(),
            tabname_variable: original.tabname_variable.clone(),
        })?;
        self.process(&job.id)
    }

    /// Removes the job and its directory. A job mid-run cannot be
    /// deleted.
    pub fn delete(&self, id: &str) -> Result<(), JobError> {
        {
            let jobs = self.read_locked();
            if let Some(job) = jobs.get(id) {
                if job.status == JobStatus::Processing {
                    return Err(JobError::InvalidState {
                        id: id.to_string(),
                        status: job.status.to_string(),
                        expected: "any state except processing".to_string(),
                    });
                }
            }
        }
        self.store.delete(id)?;
        self.write_locked().remove(id);
        Ok(())
    }

    /// Drops snapshot copies no remaining job references.
    pub fn cleanup_storage(&self) -> Result<usize, JobError> {
        let referenced: Vec<String> = self
            .read_locked()
            .values()
            .flat_map(|job| job.tracked_file_ids())
            .collect();
        Ok(self.files.cleanup_orphaned(&referenced)?)
    }

    pub fn stats(&self) -> JobStats {
        let jobs = self.read_locked();
        let mut stats = JobStats {
            total: jobs.len(),
            ..JobStats::default()
        };
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
            stats.records_processed += job.processed_records;
            stats.files_generated += job.output_files.len();
        }
        stats
    }

    fn read_locked(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Job>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_locked(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Job>> {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Partial failure is tolerated; only a batch with zero survivors (out
/// of at least one record) fails.
fn final_status(total_records: usize, processed_records: usize) -> JobStatus {
    if total_records > 0 && processed_records == 0 {
        JobStatus::Failed
    } else {
        JobStatus::Completed
    }
}

fn describe(path: &Path, kind: OutputFormat) -> Result<OutputFileDescriptor, String> {
    let size = fs::metadata(path).map_err(|e| e.to_string())?.len();
    // outputs/<kind>/<file>, relative to the job directory.
    let relative_path = PathBuf::from("outputs")
        .join(kind.dir_name())
        .join(path.file_name().unwrap_or_default());
    Ok(OutputFileDescriptor {
        record_index: None,
        kind,
        relative_path,
        size,
    })
}

/// Sheet names must stay unique and at most 31 characters after any
/// dedupe suffix.
fn dedupe_tab_names(
    sheets: Vec<(String, Vec<Vec<String>>)>,
) -> Vec<(String, Vec<Vec<String>>)> {
    let mut seen: HashSet<String> = HashSet::new();
    sheets
        .into_iter()
        .map(|(label, rows)| {
            let mut name: String = label.chars().take(31).collect();
            if !seen.insert(name.clone()) {
                let mut counter = 2;
                loop {
                    let suffix = format!("_{}", counter);
                    let keep = 31usize.saturating_sub(suffix.len());
                    let candidate: String =
                        label.chars().take(keep).collect::<String>() + &suffix;
                    if seen.insert(candidate.clone()) {
                        name = candidate;
                        break;
                    }
                    counter += 1;
                }
            }
            (name, rows)
        })
        .collect()
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
