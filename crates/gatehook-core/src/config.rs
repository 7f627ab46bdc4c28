//! Gateway configuration
//!
//! Loaded from an optional TOML file; every field has a default:
//!
//! ```toml
//! manifest = "plugins.json"
//! target = "gateway"
//! hook_timeout_ms = 250
//! on_empty = "allow"
//! on_hook_failure = "deny"
//! strict = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_HOOK_TIMEOUT_MS, DEFAULT_MANIFEST_FILE, DEFAULT_TARGET};
use crate::pipeline::{EmptyPolicy, FailurePolicy, PipelinePolicy};
use crate::plugins::ManifestFile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Manifest JSON path
    pub manifest: PathBuf,
    /// Directory relative plugin filenames resolve against.
    /// Defaults to the manifest's directory.
    pub source_root: Option<PathBuf>,
    /// Service name this gateway authorizes for
    pub target: String,
    pub hook_timeout_ms: u64,
    pub on_empty: EmptyPolicy,
    pub on_hook_failure: FailurePolicy,
    /// Refuse to start when the manifest or any plugin failed to load
    pub strict: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from(DEFAULT_MANIFEST_FILE),
            source_root: None,
            target: DEFAULT_TARGET.to_string(),
            hook_timeout_ms: DEFAULT_HOOK_TIMEOUT_MS,
            on_empty: EmptyPolicy::default(),
            on_hook_failure: FailurePolicy::default(),
            strict: false,
        }
    }
}

impl GatewayConfig {
    /// Load from a TOML file. Relative paths resolve against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config {:?}", path))?;

        if let Some(base) = path.parent() {
            config.manifest = base.join(&config.manifest);
            config.source_root = config.source_root.map(|root| base.join(root));
        }

        tracing::debug!("Loaded gateway config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }

    pub fn policy(&self) -> PipelinePolicy {
        PipelinePolicy {
            on_empty: self.on_empty,
            on_hook_failure: self.on_hook_failure,
            hook_timeout: self.hook_timeout(),
        }
    }

    pub fn manifest_file(&self) -> ManifestFile {
        let file = ManifestFile::new(&self.manifest);
        match &self.source_root {
            Some(root) => file.with_source_root(root),
            None => file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_config_uses_defaults() {
        let config = GatewayConfig::from_toml_str("").unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.manifest, PathBuf::from("plugins.json"));
        assert_eq!(config.on_empty, EmptyPolicy::Allow);
        assert_eq!(config.on_hook_failure, FailurePolicy::Deny);
    }

    #[test]
    fn policies_parse_from_lowercase_names() {
        let config = GatewayConfig::from_toml_str(
            r#"
            target = "billing"
            hook_timeout_ms = 40
            on_empty = "deny"
            on_hook_failure = "allow"
            strict = true
            "#,
        )
        .unwrap();

        let policy = config.policy();
        assert_eq!(config.target, "billing");
        assert_eq!(policy.hook_timeout, Duration::from_millis(40));
        assert_eq!(policy.on_empty, EmptyPolicy::Deny);
        assert_eq!(policy.on_hook_failure, FailurePolicy::Allow);
        assert!(config.strict);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(GatewayConfig::from_toml_str(r#"on_empty = "maybe""#).is_err());
    }

    #[test]
    fn load_resolves_paths_against_config_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gatehook.toml");
        std::fs::write(
            &path,
            "manifest = \"conf/plugins.json\"\nsource_root = \"scripts\"\n",
        )
        .unwrap();

        let config = GatewayConfig::load(&path).unwrap();
        assert_eq!(config.manifest, dir.path().join("conf/plugins.json"));
        assert_eq!(config.source_root, Some(dir.path().join("scripts")));
        assert_eq!(config.manifest_file().source_root(), dir.path().join("scripts"));
    }
}
