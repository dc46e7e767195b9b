//! Artifact Resolver - (visualization, version, format) to a file
//!
//! Resolution never creates anything. A version whose export is missing is
//! reported as `NotFound`, distinct from a format that is not served at all.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::store::VersionStore;

pub const SCENE_FILENAME: &str = "scene.blend";
pub const THUMBNAIL_FILENAME: &str = "thumbnail.png";
pub const THUMBNAIL_FORMAT: &str = "thumbnail";
pub const SCENE_FORMAT: &str = "blend";

/// Export formats served as `exported.<format>`.
pub const EXPORT_MIME_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("svg", "image/svg+xml"),
    ("gif", "image/gif"),
    ("mp4", "video/mp4"),
    ("ogv", "video/ogg"),
    ("webm", "video/webm"),
    ("svg.zip", "application/zip"),
    ("png.zip", "application/zip"),
    ("html", "text/html"),
];

pub fn export_mime_type(format: &str) -> Option<&'static str> {
    EXPORT_MIME_TYPES
        .iter()
        .find(|(ext, _)| *ext == format)
        .map(|(_, mime)| *mime)
}

/// Whether a client should display the file or save it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "filename")]
pub enum Disposition {
    Inline,
    Attachment(String),
}

/// A concrete file ready to be served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub disposition: Disposition,
}

impl Artifact {
    /// Fails with `NotFound` unless the file is on disk.
    fn existing(self) -> Result<Self> {
        if self.path.is_file() {
            Ok(self)
        } else {
            Err(Error::NotFound(self.path.display().to_string()))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    store: VersionStore,
}

impl ArtifactResolver {
    pub fn new(store: VersionStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    /// Resolves `format` of `version` (or `latest`) of `visualization`.
    pub fn resolve(&self, visualization: &str, version: &str, format: &str) -> Result<Artifact> {
        let version = self.store.resolve_version(visualization, version)?;
        let dir = self.store.version_path(visualization, &version)?;

        let artifact = match format {
            THUMBNAIL_FORMAT => Artifact {
                path: dir.join(THUMBNAIL_FILENAME),
                content_type: "image/png",
                disposition: Disposition::Inline,
            },
            SCENE_FORMAT => Artifact {
                path: dir.join(SCENE_FILENAME),
                content_type: "application/x-blender",
                disposition: Disposition::Attachment(format!("{visualization}.blend")),
            },
            _ => {
                let content_type = export_mime_type(format)
                    .ok_or_else(|| Error::UnsupportedFormat(format.to_string()))?;
                Artifact {
                    path: dir.join(format!("exported.{format}")),
                    content_type,
                    disposition: Disposition::Attachment(format!("{visualization}.{format}")),
                }
            }
        };

        artifact.existing()
    }

    /// The export matching the version's `mediaType`, for inline display.
    pub fn resolve_primary(&self, visualization: &str, version: &str) -> Result<Artifact> {
        let version = self.store.resolve_version(visualization, version)?;
        let meta = self.store.read_metadata(visualization, &version)?;
        let media_type = meta.media_type().ok_or_else(|| {
            Error::NotFound(format!("{visualization}/{version} has no known media type"))
        })?;

        let mut artifact = self.resolve(visualization, &version, media_type.primary_format())?;
        artifact.disposition = Disposition::Inline;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_table() {
        assert_eq!(export_mime_type("png"), Some("image/png"));
        assert_eq!(export_mime_type("svg.zip"), Some("application/zip"));
        assert_eq!(export_mime_type("html"), Some("text/html"));
        assert_eq!(export_mime_type("foo"), None);
        assert_eq!(export_mime_type(THUMBNAIL_FORMAT), None);
    }
}
