//! Manifest and plugin source providers
//!
//! The registry never touches the filesystem itself; it asks a
//! [`ManifestProvider`] for the parsed manifest and for each plugin's source.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{PluginManifest, PluginSpec};
use crate::error::{ManifestError, PluginLoadError};

/// Supplies the manifest and plugin sources to the registry build.
pub trait ManifestProvider: Send + Sync {
    /// Read and parse the manifest
    fn load_manifest(&self) -> Result<PluginManifest, ManifestError>;

    /// Read a plugin's source text.
    ///
    /// Must return [`PluginLoadError::SourceAbsent`] when the source does not
    /// exist so the registry can skip the plugin instead of recording a failure.
    fn read_source(&self, spec: &PluginSpec) -> Result<String, PluginLoadError>;
}

/// Manifest stored as a JSON file, with plugin sources on disk.
#[derive(Debug, Clone)]
pub struct ManifestFile {
    path: PathBuf,
    source_root: PathBuf,
}

impl ManifestFile {
    /// Relative plugin filenames resolve against the manifest's directory.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let source_root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self { path, source_root }
    }

    pub fn with_source_root(mut self, source_root: impl Into<PathBuf>) -> Self {
        self.source_root = source_root.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Resolve a plugin's `filename` to a path
    pub fn resolve(&self, spec: &PluginSpec) -> PathBuf {
        let source = Path::new(&spec.source_ref);
        if source.is_absolute() {
            source.to_path_buf()
        } else {
            self.source_root.join(source)
        }
    }
}

impl ManifestProvider for ManifestFile {
    fn load_manifest(&self) -> Result<PluginManifest, ManifestError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                ManifestError::Missing {
                    path: self.path.clone(),
                }
            } else {
                ManifestError::Unreadable {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;

        let manifest = PluginManifest::from_json(&content, &self.path.display().to_string())?;
        debug!(
            "Parsed manifest with {} plugins from {:?}",
            manifest.plugins.len(),
            self.path
        );
        Ok(manifest)
    }

    fn read_source(&self, spec: &PluginSpec) -> Result<String, PluginLoadError> {
        let path = self.resolve(spec);
        std::fs::read_to_string(&path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                PluginLoadError::SourceAbsent {
                    source_ref: spec.source_ref.clone(),
                }
            } else {
                PluginLoadError::SourceUnreadable {
                    source_ref: spec.source_ref.clone(),
                    source,
                }
            }
        })
    }
}

/// In-memory manifest, for embedding plugins without a filesystem.
#[derive(Debug, Clone, Default)]
pub struct StaticManifest {
    plugins: Vec<PluginSpec>,
    sources: HashMap<String, String>,
}

impl StaticManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin together with its source
    pub fn plugin(mut self, spec: PluginSpec, source: impl Into<String>) -> Self {
        self.sources.insert(spec.source_ref.clone(), source.into());
        self.plugins.push(spec);
        self
    }

    /// Append a plugin whose source does not exist
    pub fn plugin_without_source(mut self, spec: PluginSpec) -> Self {
        self.plugins.push(spec);
        self
    }
}

impl ManifestProvider for StaticManifest {
    fn load_manifest(&self) -> Result<PluginManifest, ManifestError> {
        Ok(PluginManifest::new(self.plugins.clone()))
    }

    fn read_source(&self, spec: &PluginSpec) -> Result<String, PluginLoadError> {
        self.sources
            .get(&spec.source_ref)
            .cloned()
            .ok_or_else(|| PluginLoadError::SourceAbsent {
                source_ref: spec.source_ref.clone(),
            })
    }
}
