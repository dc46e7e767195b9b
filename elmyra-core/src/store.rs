//! Version Store - Filesystem Is the Index
//!
//! Each visualization is a directory under `visualizations/`, each version a
//! subdirectory named by its id. There is no cache: every read lists the
//! directory again, so a version becomes visible the moment its directory
//! appears under its final name.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::metadata::{Metadata, VisualizationSummary, METADATA_FILENAME};
use crate::version::{natural_sort, new_version_id, VersionPrecision};

/// Token accepted wherever a version id is expected.
pub const LATEST: &str = "latest";

const STAGING_PREFIX: &str = ".tmp-";

#[derive(Debug, Clone)]
pub struct VersionStore {
    root: PathBuf,
    precision: VersionPrecision,
}

/// A version being written under a hidden name.
///
/// Readers never see it until [`VersionStore::commit`] renames it.
#[derive(Debug)]
pub struct StagedVersion {
    pub visualization: String,
    pub version: String,
    pub path: PathBuf,
}

impl VersionStore {
    /// `root` is the `visualizations/` directory.
    pub fn new(root: impl Into<PathBuf>, precision: VersionPrecision) -> Self {
        Self {
            root: root.into(),
            precision,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn visualization_path(&self, visualization: &str) -> Result<PathBuf> {
        validate_segment(visualization)?;
        Ok(self.root.join(visualization))
    }

    pub fn version_path(&self, visualization: &str, version: &str) -> Result<PathBuf> {
        validate_segment(version)?;
        Ok(self.visualization_path(visualization)?.join(version))
    }

    /// Version ids of `visualization`, oldest first.
    pub fn list_versions(&self, visualization: &str) -> Result<Vec<String>> {
        let dir = self.visualization_path(visualization)?;
        let mut versions = visible_subdirectories(&dir)?;
        natural_sort(&mut versions);
        Ok(versions)
    }

    pub fn latest_version(&self, visualization: &str) -> Result<String> {
        self.list_versions(visualization)?
            .pop()
            .ok_or_else(|| Error::NotFound(format!("no versions of {visualization}")))
    }

    /// Maps the `latest` token to a concrete id; other ids pass through.
    pub fn resolve_version(&self, visualization: &str, version: &str) -> Result<String> {
        if version == LATEST {
            self.latest_version(visualization)
        } else {
            validate_segment(version)?;
            Ok(version.to_string())
        }
    }

    /// Derived fields overlaid with whatever `meta.json` provides.
    pub fn read_metadata(&self, visualization: &str, version: &str) -> Result<Metadata> {
        let mut meta = Metadata::derived(visualization, version);
        let path = self.version_path(visualization, version)?.join(METADATA_FILENAME);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(meta),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(serde_json::Value::Object(fields)) => meta.merge(fields),
            Ok(_) => warn!(path = %path.display(), "metadata is not a JSON object, ignoring"),
            Err(e) => warn!(path = %path.display(), error = %e, "unreadable metadata, ignoring"),
        }

        Ok(meta)
    }

    /// Every visualization by name, each with its versions newest first.
    pub fn list_all_visualizations(&self) -> Result<Vec<VisualizationSummary>> {
        let mut names = visible_subdirectories(&self.root)?;
        names.sort();

        let mut all = Vec::with_capacity(names.len());
        for name in names {
            let mut versions = match self.list_versions(&name) {
                Ok(versions) => versions,
                Err(Error::InvalidName(_)) => {
                    warn!(visualization = %name, "skipping directory with unusable name");
                    continue;
                }
                Err(e) => return Err(e),
            };
            versions.reverse();
            let versions = versions
                .iter()
                .filter(|version| validate_segment(version).is_ok())
                .map(|version| self.read_metadata(&name, version))
                .collect::<Result<Vec<_>>>()?;
            all.push(VisualizationSummary { name, versions });
        }
        Ok(all)
    }

    /// Allocates a version id from the clock and creates its directory.
    pub fn create_version_directory(&self, visualization: &str) -> Result<(String, PathBuf)> {
        let version = new_version_id(self.precision);
        let path = self.create_version_directory_with_id(visualization, &version)?;
        Ok((version, path))
    }

    /// Creates the directory of `version`; `Conflict` if it already exists.
    pub fn create_version_directory_with_id(
        &self,
        visualization: &str,
        version: &str,
    ) -> Result<PathBuf> {
        let path = self.version_path(visualization, version)?;
        fs::create_dir_all(self.visualization_path(visualization)?)?;
        create_dir_exclusive(&path, visualization, version)?;
        info!(visualization, version, "created version directory");
        Ok(path)
    }

    /// Allocates a version id and creates its hidden staging directory.
    pub fn stage_version(&self, visualization: &str) -> Result<StagedVersion> {
        let version = new_version_id(self.precision);
        self.stage_version_with_id(visualization, &version)
    }

    pub fn stage_version_with_id(&self, visualization: &str, version: &str) -> Result<StagedVersion> {
        let final_path = self.version_path(visualization, version)?;
        if final_path.exists() {
            return Err(conflict(visualization, version));
        }

        let path = self
            .visualization_path(visualization)?
            .join(format!("{STAGING_PREFIX}{version}"));
        fs::create_dir_all(self.visualization_path(visualization)?)?;
        create_dir_exclusive(&path, visualization, version)?;
        debug!(visualization, version, path = %path.display(), "staged version");

        Ok(StagedVersion {
            visualization: visualization.to_string(),
            version: version.to_string(),
            path,
        })
    }

    /// Makes a staged version visible under its id.
    ///
    /// On failure the staged files are dropped; on `Conflict` the existing
    /// version is left as it was.
    pub fn commit(&self, staged: StagedVersion) -> Result<(String, PathBuf)> {
        let target = self.version_path(&staged.visualization, &staged.version)?;
        if target.exists() {
            let err = conflict(&staged.visualization, &staged.version);
            return Err(self.abandon(staged, err));
        }

        // rename(2) replaces an empty target directory, the exists check above
        // narrows that window but cannot close it.
        if let Err(e) = fs::rename(&staged.path, &target) {
            let err = if target.exists() {
                conflict(&staged.visualization, &staged.version)
            } else {
                e.into()
            };
            return Err(self.abandon(staged, err));
        }

        info!(
            visualization = %staged.visualization,
            version = %staged.version,
            "committed version"
        );
        Ok((staged.version, target))
    }

    /// Discards `staged` and hands back `err`; a failed cleanup is only logged.
    pub fn abandon(&self, staged: StagedVersion, err: Error) -> Error {
        let path = staged.path.clone();
        if let Err(e) = self.discard(staged) {
            error!(path = %path.display(), error = %e, "could not remove staged version");
        }
        err
    }

    /// Drops a staged version without publishing it.
    pub fn discard(&self, staged: StagedVersion) -> Result<()> {
        match fs::remove_dir_all(&staged.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(
            visualization = %staged.visualization,
            version = %staged.version,
            "discarded staged version"
        );
        Ok(())
    }
}

/// Rejects names that would escape the store or collide with hidden entries.
pub fn validate_segment(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

fn create_dir_exclusive(path: &Path, visualization: &str, version: &str) -> Result<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            warn!(visualization, version, "version id collision");
            Err(conflict(visualization, version))
        }
        Err(e) => Err(e.into()),
    }
}

fn conflict(visualization: &str, version: &str) -> Error {
    Error::Conflict(format!("{visualization}/{version}"))
}

/// Names of non-hidden subdirectories; a missing `dir` has none.
fn visible_subdirectories(dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(e.into()),
    };

    let mut names = vec![];
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_segment() {
        assert!(validate_segment("demo").is_ok());
        assert!(validate_segment("20240101T1000").is_ok());
        for bad in ["", ".", "..", ".hidden", "a/b", "a\\b"] {
            assert!(matches!(validate_segment(bad), Err(Error::InvalidName(_))), "{bad}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_rename_drops_staging() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = VersionStore::new(dir.path(), VersionPrecision::Minute);
        let staged = store.stage_version_with_id("demo", "20240101T1000").unwrap();
        let staging = staged.path.clone();
        fs::write(staging.join("scene.blend"), "x").unwrap();

        // A dangling symlink does not "exist", but a directory cannot replace it.
        let target = dir.path().join("demo/20240101T1000");
        std::os::unix::fs::symlink(dir.path().join("missing"), &target).unwrap();

        let err = store.commit(staged).unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{err:?}");
        assert!(!staging.exists());
        assert!(store.stage_version_with_id("demo", "20240101T1000").is_ok());
    }
}
