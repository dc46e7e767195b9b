//! Import Sessions - One-Shot Previews
//!
//! An import session is a single preview produced from an external scene. It
//! lives under `imports/<id>/`, outside every visualization's history.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::resolver::{Artifact, Disposition};
use crate::store::validate_segment;
use crate::version::new_session_id;
use crate::worker::Worker;

pub const PREVIEW_FILENAME: &str = "preview.obj";

pub struct ImportSessions<'a, W> {
    dispatcher: &'a Dispatcher<W>,
    uploads: PathBuf,
}

impl<'a, W: Worker> ImportSessions<'a, W> {
    /// `uploads` holds source files received with an import request.
    pub fn new(dispatcher: &'a Dispatcher<W>, uploads: impl Into<PathBuf>) -> Self {
        Self {
            dispatcher,
            uploads: uploads.into(),
        }
    }

    /// Imports the scene at `url`, returning the new session id.
    pub fn create_session(&self, url: &str) -> Result<String> {
        let id = new_session_id();
        self.import(url, id)
    }

    /// Stores an uploaded scene file and imports it from disk.
    pub fn create_session_from_upload(&self, filename: &str, data: &[u8]) -> Result<String> {
        let id = new_session_id();
        let filename = Path::new(filename)
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| validate_segment(name).is_ok())
            .ok_or_else(|| Error::InvalidName(filename.to_string()))?;

        let dir = self.uploads.join(&id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(filename);
        fs::write(&path, data)?;
        let path = path.canonicalize()?;
        info!(session_id = %id, path = %path.display(), bytes = data.len(), "stored import upload");

        self.import(&path.to_string_lossy(), id)
    }

    /// Preview scene of session `id`.
    pub fn preview(&self, id: &str) -> Result<Artifact> {
        validate_segment(id)?;
        let path = self.dispatcher.imports_dir().join(id).join(PREVIEW_FILENAME);
        if !path.is_file() {
            return Err(Error::NotFound(format!("import {id}")));
        }
        Ok(Artifact {
            path,
            content_type: "text/plain",
            disposition: Disposition::Attachment(PREVIEW_FILENAME.to_string()),
        })
    }

    fn import(&self, url: &str, id: String) -> Result<String> {
        fs::create_dir_all(self.dispatcher.imports_dir())?;

        match self.dispatcher.run_import(url, &id) {
            Ok(_) => Ok(id),
            Err(e @ Error::JobFailed(_)) => {
                warn!(session_id = %id, error = %e, "import session never materialized");
                Err(Error::ImportFailed(format!("{id}: {e}")))
            }
            Err(e) => Err(e),
        }
    }
}
