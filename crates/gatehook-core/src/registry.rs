//! Plugin registry: build-once, read-many.
//!
//! The registry moves through *uninitialized* → *loading* → *ready* exactly
//! once. The first [`PluginRegistry::load`] call reads the manifest and builds
//! one execution context per enabled plugin while concurrent callers wait;
//! every later call returns the same [`ReadyRegistry`] without side effects.
//! Once ready, entries are immutable and reads take no lock.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::error::{ManifestError, PluginLoadError, RegistryError};
use crate::plugins::{ManifestProvider, PluginSpec};
use crate::runtime::{ScriptContext, ScriptEngine};

/// A loaded plugin: its specification and its exclusively owned context.
pub struct RegistryEntry {
    spec: PluginSpec,
    context: Arc<dyn ScriptContext>,
}

impl RegistryEntry {
    pub fn spec(&self) -> &PluginSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn context(&self) -> &Arc<dyn ScriptContext> {
        &self.context
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// A plugin that exists but could not be loaded.
#[derive(Debug)]
pub struct LoadFailure {
    pub spec: PluginSpec,
    pub error: PluginLoadError,
}

/// What happened during the one-time build
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Set when the manifest could not be read; the registry is then empty
    pub manifest_error: Option<ManifestError>,
    /// Number of entries the manifest declared
    pub declared: usize,
    pub disabled: Vec<PluginSpec>,
    /// Plugins skipped because their source does not exist
    pub absent: Vec<PluginSpec>,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.manifest_error.is_none() && self.failures.is_empty()
    }
}

/// The registry in its *ready* state.
#[derive(Debug, Default)]
pub struct ReadyRegistry {
    entries: Vec<RegistryEntry>,
    report: LoadReport,
}

impl ReadyRegistry {
    /// Entries bound to `target`, in manifest order. Empty when none match.
    pub fn entries_for(&self, target: &str) -> Vec<&RegistryEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.spec.targets(target))
            .collect()
    }

    /// Every loaded entry, in manifest order
    pub fn all_entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    /// Fail-fast check for deployments that refuse to start degraded.
    pub fn ensure_healthy(&self) -> Result<(), RegistryError> {
        if let Some(err) = &self.report.manifest_error {
            return Err(RegistryError::ManifestUnavailable(err.to_string()));
        }

        if !self.report.failures.is_empty() {
            let summary = self
                .report
                .failures
                .iter()
                .map(|failure| format!("{}: {}", failure.spec.name(), failure.error))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RegistryError::PluginsFailed {
                count: self.report.failures.len(),
                summary,
            });
        }

        Ok(())
    }
}

/// Owns every plugin's execution context for the lifetime of the process.
pub struct PluginRegistry {
    provider: Box<dyn ManifestProvider>,
    engine: Box<dyn ScriptEngine>,
    ready: OnceCell<ReadyRegistry>,
}

impl PluginRegistry {
    pub fn new(
        provider: impl ManifestProvider + 'static,
        engine: impl ScriptEngine + 'static,
    ) -> Self {
        Self {
            provider: Box::new(provider),
            engine: Box::new(engine),
            ready: OnceCell::new(),
        }
    }

    /// Build the registry on first call; return the existing one afterwards.
    ///
    /// Blocks while another caller is building, so plugin sources execute
    /// exactly once. Call from a blocking context at start-up.
    pub fn load(&self) -> &ReadyRegistry {
        self.ready.get_or_init(|| self.build())
    }

    /// Like [`load`](Self::load), but a first build runs on the blocking
    /// pool so plugin sources never execute on an async worker.
    pub async fn load_async(self: &Arc<Self>) -> &ReadyRegistry {
        if let Some(ready) = self.ready.get() {
            return ready;
        }

        let registry = Arc::clone(self);
        if let Err(err) = tokio::task::spawn_blocking(move || {
            registry.load();
        })
        .await
        {
            warn!(error = %err, "Plugin registry build aborted; retrying inline");
        }

        self.load()
    }

    /// The ready registry, if the build has completed
    pub fn get(&self) -> Option<&ReadyRegistry> {
        self.ready.get()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get().is_some()
    }

    fn build(&self) -> ReadyRegistry {
        let mut report = LoadReport::default();

        let manifest = match self.provider.load_manifest() {
            Ok(manifest) => manifest,
            Err(err) => {
                error!(error = %err, "Plugin manifest unavailable; no plugins loaded");
                report.manifest_error = Some(err);
                return ReadyRegistry {
                    entries: Vec::new(),
                    report,
                };
            }
        };

        report.declared = manifest.plugins.len();
        let mut entries = Vec::new();

        for spec in manifest.plugins {
            if !spec.enabled {
                debug!(plugin = spec.name(), "Skipping disabled plugin");
                report.disabled.push(spec);
                continue;
            }

            let source = match self.provider.read_source(&spec) {
                Ok(source) => source,
                Err(err) if err.is_absent() => {
                    debug!(plugin = spec.name(), "Plugin source not found; skipping");
                    report.absent.push(spec);
                    continue;
                }
                Err(err) => {
                    warn!(plugin = spec.name(), error = %err, "Failed to read plugin source");
                    report.failures.push(LoadFailure { spec, error: err });
                    continue;
                }
            };

            match self.engine.instantiate(&spec, &source) {
                Ok(context) => {
                    info!(
                        plugin = spec.name(),
                        service = %spec.target,
                        description = %spec.description,
                        "Loaded plugin"
                    );
                    entries.push(RegistryEntry {
                        spec,
                        context: Arc::from(context),
                    });
                }
                Err(err) => {
                    warn!(plugin = spec.name(), error = %err, "Failed to load plugin; excluding it");
                    report.failures.push(LoadFailure { spec, error: err });
                }
            }
        }

        info!(
            "Plugin registry ready: {} loaded, {} absent, {} failed",
            entries.len(),
            report.absent.len(),
            report.failures.len()
        );

        ReadyRegistry { entries, report }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{ManifestFile, StaticManifest};
    use crate::testing::FakeEngine;

    fn names(entries: &[&RegistryEntry]) -> Vec<String> {
        entries.iter().map(|e| e.name().to_string()).collect()
    }

    #[test]
    fn concurrent_loads_execute_each_source_once() {
        let engine = FakeEngine::new();
        let registry = Arc::new(PluginRegistry::new(
            StaticManifest::new()
                .plugin(PluginSpec::new("a", "svcA"), "allow")
                .plugin(PluginSpec::new("b", "svcB"), "allow"),
            engine.clone(),
        ));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.load().len())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 2);
        }
        assert_eq!(engine.loads_of("a"), 1);
        assert_eq!(engine.loads_of("b"), 1);
    }

    #[test]
    fn repeated_load_returns_same_registry() {
        let engine = FakeEngine::new();
        let registry = PluginRegistry::new(
            StaticManifest::new().plugin(PluginSpec::new("a", "svcA"), "allow"),
            engine.clone(),
        );

        assert!(!registry.is_ready());
        let first = registry.load() as *const ReadyRegistry;
        let second = registry.load() as *const ReadyRegistry;

        assert!(registry.is_ready());
        assert_eq!(first, second);
        assert_eq!(engine.loads_of("a"), 1);
    }

    #[tokio::test]
    async fn async_load_builds_off_the_calling_thread() {
        let engine = FakeEngine::new();
        let registry = Arc::new(PluginRegistry::new(
            StaticManifest::new().plugin(PluginSpec::new("a", "svcA"), "allow"),
            engine.clone(),
        ));

        let ready = registry.load_async().await;
        assert_eq!(ready.len(), 1);

        let threads = engine.load_threads();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], std::thread::current().id());

        // Already built: no second load
        registry.load_async().await;
        assert_eq!(engine.loads_of("a"), 1);
    }

    #[test]
    fn entries_for_keeps_manifest_order() {
        let registry = PluginRegistry::new(
            StaticManifest::new()
                .plugin(PluginSpec::new("first", "svcA"), "allow")
                .plugin(PluginSpec::new("other", "svcB"), "allow")
                .plugin(PluginSpec::new("second", "svcA"), "allow"),
            FakeEngine::new(),
        );

        let ready = registry.load();
        assert_eq!(names(&ready.entries_for("svcA")), vec!["first", "second"]);
        assert_eq!(names(&ready.entries_for("svcB")), vec!["other"]);
        assert!(ready.entries_for("svcC").is_empty());
        assert_eq!(ready.all_entries().len(), 3);
    }

    #[test]
    fn absent_source_is_skipped_without_affecting_others() {
        let registry = PluginRegistry::new(
            StaticManifest::new()
                .plugin_without_source(PluginSpec::new("missing", "svcA"))
                .plugin(PluginSpec::new("present", "svcA"), "allow"),
            FakeEngine::new(),
        );

        let ready = registry.load();
        assert_eq!(names(&ready.entries_for("svcA")), vec!["present"]);
        assert_eq!(ready.report().absent.len(), 1);
        assert!(ready.report().failures.is_empty());
        assert!(ready.ensure_healthy().is_ok());
    }

    #[test]
    fn broken_plugin_is_recorded_and_excluded() {
        let registry = PluginRegistry::new(
            StaticManifest::new()
                .plugin(PluginSpec::new("broken", "svcA"), "broken")
                .plugin(PluginSpec::new("fine", "svcA"), "allow"),
            FakeEngine::new(),
        );

        let ready = registry.load();
        assert_eq!(names(&ready.entries_for("svcA")), vec!["fine"]);
        assert_eq!(ready.report().failures.len(), 1);
        assert!(matches!(
            ready.report().failures[0].error,
            PluginLoadError::Compile { .. }
        ));

        let err = ready.ensure_healthy().unwrap_err();
        assert!(matches!(err, RegistryError::PluginsFailed { count: 1, .. }));
    }

    #[test]
    fn disabled_plugins_are_never_executed() {
        let engine = FakeEngine::new();
        let registry = PluginRegistry::new(
            StaticManifest::new().plugin(PluginSpec::new("off", "svcA").disabled(), "allow"),
            engine.clone(),
        );

        let ready = registry.load();
        assert!(ready.is_empty());
        assert_eq!(ready.report().disabled.len(), 1);
        assert_eq!(engine.loads_of("off"), 0);
    }

    #[test]
    fn missing_manifest_leaves_registry_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = PluginRegistry::new(
            ManifestFile::new(dir.path().join("plugins.json")),
            FakeEngine::new(),
        );

        let ready = registry.load();
        assert!(ready.is_empty());
        assert!(matches!(
            ready.report().manifest_error,
            Some(ManifestError::Missing { .. })
        ));
        assert!(matches!(
            ready.ensure_healthy(),
            Err(RegistryError::ManifestUnavailable(_))
        ));
    }

    #[test]
    fn loads_real_rhai_plugins_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("plugins.json"),
            r#"{"plugins": [
                {"enabled": true, "filename": "ok.rhai", "description": "ok", "target": "svcA"},
                {"enabled": true, "filename": "bad.rhai", "description": "bad", "target": "svcA"},
                {"enabled": true, "filename": "gone.rhai", "description": "gone", "target": "svcA"}
            ]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("ok.rhai"),
            "fn checkRequest(request) { true }",
        )
        .unwrap();
        std::fs::write(dir.path().join("bad.rhai"), "fn checkRequest(request) {").unwrap();

        let registry = PluginRegistry::new(
            ManifestFile::new(dir.path().join("plugins.json")),
            crate::runtime::RhaiEngine::new(),
        );

        let ready = registry.load();
        assert_eq!(names(&ready.entries_for("svcA")), vec!["ok.rhai"]);
        assert_eq!(ready.report().declared, 3);
        assert_eq!(ready.report().absent.len(), 1);
        assert_eq!(ready.report().failures.len(), 1);
    }
}
