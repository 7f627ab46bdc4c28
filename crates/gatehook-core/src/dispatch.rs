//! Start-up initialization dispatch
//!
//! Runs each matching plugin's `init()` hook once per target, in manifest
//! order. A failing `init` is logged and recorded; dispatch moves on to the
//! next plugin.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::constants::hooks;
use crate::error::HookError;
use crate::registry::PluginRegistry;
use crate::runtime::invoke_hook;

#[derive(Debug, Clone)]
pub struct InitFailure {
    pub plugin: String,
    pub error: HookError,
}

/// Outcome of dispatching `init` for one target
#[derive(Debug, Clone, Default)]
pub struct InitReport {
    pub target: String,
    /// Number of loaded plugins bound to the target
    pub plugins: usize,
    pub initialized: Vec<String>,
    pub failures: Vec<InitFailure>,
    /// Set when init had already been dispatched for this target
    pub repeated: bool,
}

impl InitReport {
    /// Whether any plugin targets this service
    pub fn matched(&self) -> bool {
        self.plugins > 0
    }
}

pub struct InitDispatcher {
    registry: Arc<PluginRegistry>,
    hook_timeout: Duration,
    dispatched: Mutex<HashSet<String>>,
}

impl InitDispatcher {
    pub fn new(registry: Arc<PluginRegistry>, hook_timeout: Duration) -> Self {
        Self {
            registry,
            hook_timeout,
            dispatched: Mutex::new(HashSet::new()),
        }
    }

    /// Invoke `init` on every plugin bound to `target`.
    ///
    /// Returns whether any matching plugin exists.
    pub async fn dispatch_init(&self, target: &str) -> bool {
        self.dispatch_init_report(target).await.matched()
    }

    pub async fn dispatch_init_report(&self, target: &str) -> InitReport {
        let entries = self.registry.load_async().await.entries_for(target);
        let mut report = InitReport {
            target: target.to_string(),
            plugins: entries.len(),
            ..Default::default()
        };

        let first_dispatch = self.dispatched.lock().insert(target.to_string());
        if !first_dispatch {
            debug!(service = target, "Init already dispatched; skipping");
            report.repeated = true;
            return report;
        }

        for entry in entries {
            let outcome = invoke_hook(
                entry.context(),
                hooks::INIT,
                self.hook_timeout,
                |context, timeout| context.call_init(timeout),
            )
            .await;

            match outcome {
                Ok(()) => {
                    info!(
                        plugin = entry.name(),
                        service = target,
                        "Initialized plugin"
                    );
                    report.initialized.push(entry.name().to_string());
                }
                Err(error) => {
                    warn!(
                        plugin = entry.name(),
                        service = target,
                        error = %error,
                        "Plugin init failed; continuing"
                    );
                    report.failures.push(InitFailure {
                        plugin: entry.name().to_string(),
                        error,
                    });
                }
            }
        }

        report
    }
}
