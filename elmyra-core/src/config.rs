//! Configuration - TOML file with per-field defaults
//!
//! Every field has a default so an empty (or missing) file is a valid config.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::version::VersionPrecision;
use crate::worker::JobKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding `visualizations/`, `imports/` and `uploads/`.
    pub root: PathBuf,
    pub bind: SocketAddr,
    /// Engine executable, looked up on `PATH` when relative.
    pub engine: PathBuf,
    pub scripts: Scripts,
    pub version_precision: VersionPrecision,
    pub job_timeout_secs: Option<u64>,
    pub max_upload_bytes: u64,
    pub log: LogConfig,
}

/// Engine-side scripts, one per job kind. Relative paths resolve against `root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scripts {
    pub generate: PathBuf,
    pub import: PathBuf,
    pub update: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: String,
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            engine: PathBuf::from("blender"),
            scripts: Scripts::default(),
            version_precision: VersionPrecision::Minute,
            job_timeout_secs: None,
            max_upload_bytes: 512 * 1024 * 1024,
            log: LogConfig::default(),
        }
    }
}

impl Default for Scripts {
    fn default() -> Self {
        Self {
            generate: PathBuf::from("blender_generate.py"),
            import: PathBuf::from("blender_import.py"),
            update: PathBuf::from("blender_update.py"),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Loads `path` if given, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                Self::from_toml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.root)
    }

    pub fn script(&self, kind: JobKind) -> PathBuf {
        let script = match kind {
            JobKind::Generate => &self.scripts.generate,
            JobKind::Import => &self.scripts.import,
            JobKind::Update => &self.scripts.update,
        };
        self.root.join(script)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }
}

/// Directory layout under the store root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub visualizations: PathBuf,
    pub imports: PathBuf,
    pub uploads: PathBuf,
}

impl Layout {
    pub fn new(root: &Path) -> Self {
        Self {
            visualizations: root.join("visualizations"),
            imports: root.join("imports"),
            uploads: root.join("uploads"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.engine, PathBuf::from("blender"));
        assert_eq!(config.version_precision, VersionPrecision::Minute);
        assert_eq!(config.job_timeout(), None);
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_toml(
            r#"
            root = "/srv/elmyra"
            version_precision = "second"
            job_timeout_secs = 600

            [scripts]
            update = "scripts/update.py"
            "#,
        )
        .unwrap();

        assert_eq!(config.version_precision, VersionPrecision::Second);
        assert_eq!(config.job_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(
            config.script(JobKind::Update),
            PathBuf::from("/srv/elmyra/scripts/update.py")
        );
        assert_eq!(
            config.script(JobKind::Import),
            PathBuf::from("/srv/elmyra/blender_import.py")
        );
        assert_eq!(
            config.layout().visualizations,
            PathBuf::from("/srv/elmyra/visualizations")
        );
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml("bind = 12").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
