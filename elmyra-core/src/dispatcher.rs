//! Job Dispatcher - One Request, One Engine Run
//!
//! Every operation blocks until the engine exits. Nothing is retried; the
//! outcome is decided from the exit status and the files the engine left.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::resolver::SCENE_FILENAME;
use crate::store::VersionStore;
use crate::worker::{dasherize, Job, JobKind, Worker};

/// Outcome of a generate job. Non-zero exits are reported, not raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReport {
    pub success: bool,
    pub exit_code: Option<i32>,
}

pub struct Dispatcher<W> {
    worker: W,
    store: VersionStore,
    imports: PathBuf,
}

impl<W: Worker> Dispatcher<W> {
    /// `imports` is the directory the engine writes import sessions into.
    pub fn new(worker: W, store: VersionStore, imports: impl Into<PathBuf>) -> Self {
        Self {
            worker,
            store,
            imports: imports.into(),
        }
    }

    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    pub fn imports_dir(&self) -> &Path {
        &self.imports
    }

    /// Imports `url` into session `session_id`.
    ///
    /// The engine signals success only by creating `imports/<session_id>`, so
    /// a zero exit without that directory is a failure too.
    pub fn run_import(&self, url: &str, session_id: &str) -> Result<PathBuf> {
        let job = Job::new(JobKind::Import)
            .flag("url", url)
            .flag("id", session_id);
        let status = self.worker.run(&job)?;

        let output = self.imports.join(session_id);
        if !status.success() {
            warn!(session_id, code = ?status.code, "import job exited with failure");
            return Err(Error::JobFailed(format!(
                "import {session_id} exited with {:?}",
                status.code
            )));
        }
        if !output.is_dir() {
            warn!(session_id, "import job produced no output");
            return Err(Error::JobFailed(format!("import {session_id} produced no output")));
        }

        info!(session_id, "import job finished");
        Ok(output)
    }

    /// Runs a generate job, each parameter passed as `--dash-cased-key value`.
    pub fn run_generate(&self, params: &BTreeMap<String, String>) -> Result<GenerateReport> {
        let job = params
            .iter()
            .fold(Job::new(JobKind::Generate), |job, (key, value)| {
                job.flag(dasherize(key), value.as_str())
            });
        let status = self.worker.run(&job)?;

        if !status.success() {
            warn!(code = ?status.code, "generate job exited with failure");
        }
        Ok(GenerateReport {
            success: status.success(),
            exit_code: status.code,
        })
    }

    /// Produces a new version of `visualization` from its latest version,
    /// optionally merging the uploaded scene file at `blend` first.
    ///
    /// The engine writes into a hidden staging directory which is renamed to
    /// the new version id only if the engine exits cleanly and left a scene
    /// file. `blend` is deleted once the job is over, whatever the outcome.
    pub fn run_update(&self, visualization: &str, blend: Option<PathBuf>) -> Result<String> {
        let upload = TempUpload(blend);

        let base = match self.store.latest_version(visualization) {
            Ok(latest) => Some(self.store.version_path(visualization, &latest)?.join(SCENE_FILENAME)),
            Err(Error::NotFound(_)) if upload.0.is_some() => None,
            Err(e) => return Err(e),
        };

        let staged = self.store.stage_version(visualization)?;
        let mut job = Job::new(JobKind::Update)
            .flag("id", visualization)
            .flag("version", staged.version.as_str())
            .flag("output", staged.path.to_string_lossy());
        if let Some(base) = &base {
            job = job.flag("base", base.to_string_lossy());
        }
        if let Some(blend) = &upload.0 {
            job = job.flag("blend", blend.to_string_lossy());
        }

        let status = match self.worker.run(&job) {
            Ok(status) => status,
            Err(e) => return Err(self.store.abandon(staged, e)),
        };

        let produced_scene = staged.path.join(SCENE_FILENAME).is_file();
        if !status.success() || !produced_scene {
            warn!(
                visualization,
                version = %staged.version,
                code = ?status.code,
                produced_scene,
                "update job failed, discarding staged version"
            );
            let err = Error::JobFailed(format!(
                "update of {visualization} to {} failed (exit {:?})",
                staged.version, status.code
            ));
            return Err(self.store.abandon(staged, err));
        }

        let (version, _) = self.store.commit(staged)?;
        Ok(version)
    }
}

/// Uploaded scene file removed when the update job is done with it.
struct TempUpload(Option<PathBuf>);

impl Drop for TempUpload {
    fn drop(&mut self) {
        if let Some(path) = &self.0 {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    error!(path = %path.display(), error = %e, "could not remove uploaded scene file");
                }
            }
        }
    }
}
