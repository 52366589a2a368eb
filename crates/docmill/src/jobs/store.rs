//! Per-job directories with a `metadata.json` snapshot in each.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::error::JobError;
use super::job::Job;

pub struct JobStore {
    jobs_dir: PathBuf,
}

impl JobStore {
    /// Opens the store, creating the root directory if needed.
    pub fn open<P: Into<PathBuf>>(jobs_dir: P) -> Result<Self, JobError> {
        let jobs_dir = jobs_dir.into();
        fs::create_dir_all(&jobs_dir).map_err(|source| JobError::Io {
            path: jobs_dir.clone(),
            source,
        })?;
        Ok(Self { jobs_dir })
    }

    pub fn job_dir(&self, id: &str) -> PathBuf {
        self.jobs_dir.join(id)
    }

    fn metadata_path(&self, id: &str) -> PathBuf {
        self.job_dir(id).join("metadata.json")
    }

    /// Writes the snapshot to a temp file first so readers never see a
    /// half-written metadata.json.
    pub fn save(&self, job: &Job) -> Result<(), JobError> {
        let dir = self.job_dir(&job.id);
        fs::create_dir_all(&dir).map_err(|source| JobError::Io {
            path: dir.clone(),
            source,
        })?;

        let json = serde_json::to_vec_pretty(job).map_err(|e| JobError::Persist {
            id: job.id.clone(),
            reason: e.to_string(),
        })?;

        let final_path = self.metadata_path(&job.id);
        let tmp_path = dir.join("metadata.json.tmp");
        fs::write(&tmp_path, &json).map_err(|source| JobError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &final_path).map_err(|source| JobError::Io {
            path: final_path.clone(),
            source,
        })?;

        debug!(job_id = %job.id, status = %job.status, "persisted job metadata");
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<Job, JobError> {
        let path = self.metadata_path(id);
        if !path.is_file() {
            return Err(JobError::NotFound(id.to_string()));
        }
        let bytes = fs::read(&path).map_err(|source| JobError::Io { path, source })?;
        serde_json::from_slice(&bytes).map_err(|e| JobError::Persist {
            id: id.to_string(),
            reason: format!("corrupt metadata: {}", e),
        })
    }

    /// Loads every readable job, skipping directories whose metadata
    /// cannot be parsed.
    pub fn load_all(&self) -> Result<Vec<Job>, JobError> {
        let entries = fs::read_dir(&self.jobs_dir).map_err(|source| JobError::Io {
            path: self.jobs_dir.clone(),
            source,
        })?;

        let mut jobs = Vec::new();
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            match self.load(&id) {
                Ok(job) => jobs.push(job),
                Err(JobError::NotFound(_)) => {}
                Err(e) => {
                    warn!(job_id = %id, error = %e, "skipping unreadable job directory");
                }
            }
        }
        Ok(jobs)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.metadata_path(id).is_file()
    }

    /// Removes the job directory and everything produced under it.
    pub fn delete(&self, id: &str) -> Result<(), JobError> {
        let dir = self.job_dir(id);
        if !dir.is_dir() {
            return Err(JobError::NotFound(id.to_string()));
        }
        fs::remove_dir_all(&dir).map_err(|source| JobError::Io { path: dir, source })
    }

    pub fn jobs_dir(&self) -> &Path {
        &self.jobs_dir
    }
}
