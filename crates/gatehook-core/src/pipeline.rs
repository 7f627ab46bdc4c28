//! Authorization pipeline
//!
//! Every plugin bound to a target is asked, in manifest order, whether a
//! request may pass. The request is admitted only if every plugin answers
//! `true`; the first `false` short-circuits, so later plugins do not see
//! requests an earlier plugin denied.
//!
//! ## Policy knobs
//! - No plugin for the target: allowed by default (`EmptyPolicy::Allow`).
//!   Deployments that want fail-closed-on-empty set `EmptyPolicy::Deny`.
//! - A hook that raises, times out or returns a non-boolean: denied by
//!   default (`FailurePolicy::Deny`). `FailurePolicy::Allow` skips the
//!   failing plugin instead.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{hooks, DEFAULT_HOOK_TIMEOUT_MS};
use crate::error::HookError;
use crate::registry::PluginRegistry;
use crate::request::RequestView;
use crate::runtime::invoke_hook;

/// What to do when no plugin targets the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyPolicy {
    #[default]
    Allow,
    Deny,
}

/// What a failing `checkRequest` hook resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Fail-closed
    #[default]
    Deny,
    /// Fail-open: the failing plugin is skipped
    Allow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelinePolicy {
    pub on_empty: EmptyPolicy,
    pub on_hook_failure: FailurePolicy,
    pub hook_timeout: Duration,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self {
            on_empty: EmptyPolicy::default(),
            on_hook_failure: FailurePolicy::default(),
            hook_timeout: Duration::from_millis(DEFAULT_HOOK_TIMEOUT_MS),
        }
    }
}

/// Outcome of authorizing one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn reason(&self) -> Option<&DenyReason> {
        match self {
            Decision::Allow => None,
            Decision::Deny(reason) => Some(reason),
        }
    }
}

/// Why a request was denied. Meant for logs, not for clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// No plugin targets the service and the empty policy is `Deny`
    NoPolicy { target: String },
    /// A plugin's `checkRequest` returned `false`
    Rejected { plugin: String },
    /// A plugin's `checkRequest` failed under the fail-closed policy
    HookFailed { plugin: String, error: HookError },
}

impl DenyReason {
    pub fn plugin(&self) -> Option<&str> {
        match self {
            DenyReason::NoPolicy { .. } => None,
            DenyReason::Rejected { plugin } | DenyReason::HookFailed { plugin, .. } => Some(plugin),
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::NoPolicy { target } => {
                write!(f, "no plugin configured for '{}'", target)
            }
            DenyReason::Rejected { plugin } => write!(f, "rejected by plugin '{}'", plugin),
            DenyReason::HookFailed { plugin, error } => {
                write!(f, "plugin '{}' failed: {}", plugin, error)
            }
        }
    }
}

/// Asks every applicable plugin about a request and aggregates the answers.
pub struct AuthorizationPipeline {
    registry: Arc<PluginRegistry>,
    policy: PipelinePolicy,
}

impl AuthorizationPipeline {
    pub fn new(registry: Arc<PluginRegistry>, policy: PipelinePolicy) -> Self {
        Self { registry, policy }
    }

    pub fn policy(&self) -> &PipelinePolicy {
        &self.policy
    }

    /// Authorize `request` against every plugin targeting `target`.
    ///
    /// Never fails: plugin defects resolve to a [`Decision`] per the policy.
    pub async fn authorize(&self, request: &RequestView, target: &str) -> Decision {
        let entries = self.registry.load_async().await.entries_for(target);

        if entries.is_empty() {
            return match self.policy.on_empty {
                EmptyPolicy::Allow => Decision::Allow,
                EmptyPolicy::Deny => Decision::Deny(DenyReason::NoPolicy {
                    target: target.to_string(),
                }),
            };
        }

        let request = Arc::new(request.clone());

        for entry in entries {
            let snapshot = Arc::clone(&request);
            let outcome = invoke_hook(
                entry.context(),
                hooks::CHECK_REQUEST,
                self.policy.hook_timeout,
                move |context, timeout| context.check_request(&snapshot, timeout),
            )
            .await;

            match outcome {
                Ok(true) => {}
                Ok(false) => {
                    debug!(plugin = entry.name(), service = target, "Plugin denied request");
                    return Decision::Deny(DenyReason::Rejected {
                        plugin: entry.name().to_string(),
                    });
                }
                Err(error) => match self.policy.on_hook_failure {
                    FailurePolicy::Deny => {
                        warn!(
                            plugin = entry.name(),
                            service = target,
                            error = %error,
                            "checkRequest failed; denying request"
                        );
                        return Decision::Deny(DenyReason::HookFailed {
                            plugin: entry.name().to_string(),
                            error,
                        });
                    }
                    FailurePolicy::Allow => {
                        warn!(
                            plugin = entry.name(),
                            service = target,
                            error = %error,
                            "checkRequest failed; skipping plugin (fail-open)"
                        );
                    }
                },
            }
        }

        Decision::Allow
    }
}
