//! Script execution contexts.
//!
//! The rest of the crate only sees two capabilities:
//! - [`ScriptEngine`] builds a fresh, isolated context from a plugin source,
//!   executing the source exactly once
//! - [`ScriptContext`] invokes the `init` and `checkRequest` hooks
//!
//! The shipped engine is Rhai ([`RhaiEngine`]). Contexts are not assumed to be
//! reentrant: every implementation serializes its own invocations.

mod marshal;
mod rhai_host;

use std::sync::Arc;
use std::time::{Duration, Instant};

pub use marshal::to_script_value;
pub use rhai_host::{RhaiContext, RhaiEngine, RhaiLimits};

use crate::constants::HOOK_TIMEOUT_GRACE;
use crate::error::{HookError, PluginLoadError};
use crate::plugins::PluginSpec;
use crate::request::RequestView;

/// Builds execution contexts from plugin sources.
pub trait ScriptEngine: Send + Sync {
    /// Create a fresh context and run `source` in it once.
    ///
    /// Only a fully initialized context is returned; a source that fails to
    /// compile or execute yields an error and no context.
    fn instantiate(
        &self,
        spec: &PluginSpec,
        source: &str,
    ) -> Result<Box<dyn ScriptContext>, PluginLoadError>;
}

/// One plugin's loaded, stateful scripted environment.
pub trait ScriptContext: Send + Sync {
    /// Invoke `init()`; its return value is ignored.
    ///
    /// A plugin without `init` has nothing to set up and succeeds.
    fn call_init(&self, timeout: Duration) -> Result<(), HookError>;

    /// Invoke `checkRequest(request)`; the result must be exactly a boolean.
    fn check_request(&self, request: &RequestView, timeout: Duration) -> Result<bool, HookError>;
}

/// Run a hook on the blocking pool, giving up after `timeout`.
///
/// The budget starts when this is called: time spent queued for a blocking
/// thread is deducted before the context sees it. Contexts abort their own
/// invocation when the deadline passes; the outer timeout covers
/// implementations that do not.
pub async fn invoke_hook<T, F>(
    context: &Arc<dyn ScriptContext>,
    hook: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, HookError>
where
    T: Send + 'static,
    F: FnOnce(&dyn ScriptContext, Duration) -> Result<T, HookError> + Send + 'static,
{
    let context = Arc::clone(context);
    let started = Instant::now();
    let task = tokio::task::spawn_blocking(move || {
        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(HookError::Timeout { hook, timeout });
        }
        call(context.as_ref(), remaining)
    });

    match tokio::time::timeout(timeout + HOOK_TIMEOUT_GRACE, task).await {
        Ok(Ok(Err(HookError::Timeout { .. }))) => Err(HookError::Timeout { hook, timeout }),
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(HookError::Aborted {
            hook,
            message: join_err.to_string(),
        }),
        Err(_) => Err(HookError::Timeout { hook, timeout }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::hooks;
    use crate::testing::FakeEngine;

    #[test]
    fn queued_hook_past_its_budget_never_runs() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let engine = FakeEngine::new();
        let slow: Arc<dyn ScriptContext> = Arc::from(
            engine
                .instantiate(&PluginSpec::new("slow", "svcA"), "slow")
                .unwrap(),
        );
        let quick: Arc<dyn ScriptContext> = Arc::from(
            engine
                .instantiate(&PluginSpec::new("quick", "svcA"), "allow")
                .unwrap(),
        );
        let timeout = Duration::from_millis(50);
        let request = Arc::new(RequestView::new("GET", "/"));

        runtime.block_on(async {
            let r = Arc::clone(&request);
            let first = invoke_hook(&slow, hooks::CHECK_REQUEST, timeout, move |c, t| {
                c.check_request(&r, t)
            });
            let r = Arc::clone(&request);
            let second = invoke_hook(&quick, hooks::CHECK_REQUEST, timeout, move |c, t| {
                c.check_request(&r, t)
            });

            let (first, second) = tokio::join!(first, second);
            assert!(matches!(first, Err(HookError::Timeout { .. })));
            assert_eq!(second, Err(HookError::Timeout { hook: hooks::CHECK_REQUEST, timeout }));
        });

        // Let the single blocking thread drain the queued call
        std::thread::sleep(Duration::from_millis(700));
        assert_eq!(engine.checks(), vec!["slow"]);
    }
}
