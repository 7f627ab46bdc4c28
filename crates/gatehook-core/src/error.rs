//! Error types for manifest loading, plugin loading and hook invocation

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The manifest could not be read or parsed.
///
/// Fatal for the registry build: the registry stays empty for the lifetime
/// of the process.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest not found at {}", path.display())]
    Missing { path: PathBuf },

    #[error("failed to read manifest {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {origin}: {source}")]
    Unparsable {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A single plugin could not be turned into a ready execution context.
#[derive(Debug, Error)]
pub enum PluginLoadError {
    /// Not fatal: the plugin is skipped and excluded from the registry.
    #[error("plugin source '{source_ref}' does not exist")]
    SourceAbsent { source_ref: String },

    #[error("failed to read plugin source '{source_ref}': {source}")]
    SourceUnreadable {
        source_ref: String,
        #[source]
        source: std::io::Error,
    },

    #[error("plugin source failed to compile: {message}")]
    Compile { message: String },

    #[error("plugin source failed while executing: {message}")]
    Execute { message: String },
}

impl PluginLoadError {
    pub fn is_absent(&self) -> bool {
        matches!(self, PluginLoadError::SourceAbsent { .. })
    }
}

/// A hook invocation did not produce a usable result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("hook '{hook}' is not defined")]
    Undefined { hook: &'static str },

    #[error("hook '{hook}' raised an error: {message}")]
    Raised { hook: &'static str, message: String },

    #[error("hook '{hook}' did not finish within {}ms", timeout.as_millis())]
    Timeout {
        hook: &'static str,
        timeout: Duration,
    },

    #[error("hook '{hook}' must return a boolean, got {found}")]
    WrongType { hook: &'static str, found: String },

    #[error("request could not be passed to hook '{hook}': {message}")]
    Marshal { hook: &'static str, message: String },

    #[error("hook '{hook}' task aborted: {message}")]
    Aborted { hook: &'static str, message: String },
}

impl HookError {
    pub fn hook(&self) -> &'static str {
        match self {
            HookError::Undefined { hook }
            | HookError::Raised { hook, .. }
            | HookError::Timeout { hook, .. }
            | HookError::WrongType { hook, .. }
            | HookError::Marshal { hook, .. }
            | HookError::Aborted { hook, .. } => hook,
        }
    }
}

/// Raised by strict deployments that refuse to start with a degraded registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("plugin manifest unavailable: {0}")]
    ManifestUnavailable(String),

    #[error("{count} plugin(s) failed to load: {summary}")]
    PluginsFailed { count: usize, summary: String },
}
