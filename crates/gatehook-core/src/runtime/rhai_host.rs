//! Rhai-backed execution contexts.
//!
//! Every plugin gets its own `rhai::Engine`, compiled `AST` and scope. Plugin
//! state survives between hook calls through the `this` object map:
//!
//! ```rhai
//! fn init() {
//!     this.seen = 0;
//! }
//!
//! fn checkRequest(request) {
//!     this.seen += 1;
//!     !request.path.starts_with("/admin")
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, FuncArgs, Map, Scope, AST};

use super::marshal::to_script_value;
use super::{ScriptContext, ScriptEngine};
use crate::constants::{hooks, limits};
use crate::error::{HookError, PluginLoadError};
use crate::plugins::PluginSpec;
use crate::request::RequestView;

/// Resource limits applied to every Rhai context
#[derive(Debug, Clone)]
pub struct RhaiLimits {
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
    /// Deadline for the plugin's top-level statements
    pub source_exec_timeout: Duration,
}

impl Default for RhaiLimits {
    fn default() -> Self {
        Self {
            max_call_levels: limits::MAX_CALL_LEVELS,
            max_expr_depth: limits::MAX_EXPR_DEPTH,
            max_string_size: limits::MAX_STRING_SIZE,
            max_array_size: limits::MAX_ARRAY_SIZE,
            max_map_size: limits::MAX_MAP_SIZE,
            source_exec_timeout: limits::SOURCE_EXEC_TIMEOUT,
        }
    }
}

/// [`ScriptEngine`] that loads plugins as Rhai scripts
#[derive(Debug, Clone, Default)]
pub struct RhaiEngine {
    limits: RhaiLimits,
}

impl RhaiEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: RhaiLimits) -> Self {
        Self { limits }
    }

    fn build_engine(&self, plugin: &str, deadline: Arc<Deadline>) -> Engine {
        let mut engine = Engine::new();
        engine
            .set_max_call_levels(self.limits.max_call_levels)
            .set_max_expr_depths(self.limits.max_expr_depth, self.limits.max_expr_depth)
            .set_max_string_size(self.limits.max_string_size)
            .set_max_array_size(self.limits.max_array_size)
            .set_max_map_size(self.limits.max_map_size)
            .disable_symbol("eval");

        let name = plugin.to_string();
        engine.on_print(move |text| tracing::info!(plugin = %name, "{}", text));

        let name = plugin.to_string();
        engine.on_debug(move |text, _source, pos| {
            tracing::debug!(plugin = %name, position = %pos, "{}", text)
        });

        engine.on_progress(move |ops| {
            if ops % limits::PROGRESS_CHECK_INTERVAL == 0 && deadline.expired() {
                Some(Dynamic::UNIT)
            } else {
                None
            }
        });

        engine
    }
}

impl ScriptEngine for RhaiEngine {
    fn instantiate(
        &self,
        spec: &PluginSpec,
        source: &str,
    ) -> Result<Box<dyn ScriptContext>, PluginLoadError> {
        let deadline = Arc::new(Deadline::new());
        let engine = self.build_engine(spec.name(), Arc::clone(&deadline));

        let ast = engine
            .compile(source)
            .map_err(|e| PluginLoadError::Compile {
                message: e.to_string(),
            })?;

        let mut scope = Scope::new();
        deadline.arm(self.limits.source_exec_timeout);
        let executed = engine.run_ast_with_scope(&mut scope, &ast);
        deadline.disarm();
        executed.map_err(|e| PluginLoadError::Execute {
            message: e.to_string(),
        })?;

        Ok(Box::new(RhaiContext {
            plugin: spec.name().to_string(),
            engine,
            ast,
            deadline,
            state: Mutex::new(ContextState {
                scope,
                this: Dynamic::from_map(Map::new()),
            }),
        }))
    }
}

const UNARMED: u64 = u64::MAX;

/// Per-context invocation deadline, polled from the progress callback
struct Deadline {
    origin: Instant,
    expires_at_ms: AtomicU64,
}

impl Deadline {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            expires_at_ms: AtomicU64::new(UNARMED),
        }
    }

    fn arm(&self, timeout: Duration) {
        let at = self.origin.elapsed().saturating_add(timeout).as_millis();
        let at = u64::try_from(at).unwrap_or(UNARMED - 1);
        self.expires_at_ms.store(at, Ordering::Release);
    }

    fn disarm(&self) {
        self.expires_at_ms.store(UNARMED, Ordering::Release);
    }

    fn expired(&self) -> bool {
        let at = self.expires_at_ms.load(Ordering::Acquire);
        at != UNARMED && self.origin.elapsed().as_millis() >= u128::from(at)
    }
}

struct ContextState {
    scope: Scope<'static>,
    this: Dynamic,
}

/// A loaded Rhai plugin. Invocations are serialized by a per-context lock.
pub struct RhaiContext {
    plugin: String,
    engine: Engine,
    ast: AST,
    deadline: Arc<Deadline>,
    state: Mutex<ContextState>,
}

impl RhaiContext {
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn defines(&self, hook: &str, arity: usize) -> bool {
        self.ast
            .iter_functions()
            .any(|f| f.name == hook && f.params.len() == arity)
    }

    fn invoke(
        &self,
        hook: &'static str,
        arity: usize,
        args: impl FuncArgs,
        timeout: Duration,
    ) -> Result<Dynamic, HookError> {
        if !self.defines(hook, arity) {
            return Err(HookError::Undefined { hook });
        }

        // Waiting for a busy context counts against the same budget
        let entered = Instant::now();
        let Some(mut state) = self.state.try_lock_for(timeout) else {
            return Err(HookError::Timeout { hook, timeout });
        };
        let remaining = timeout.saturating_sub(entered.elapsed());
        if remaining.is_zero() {
            return Err(HookError::Timeout { hook, timeout });
        }

        let ContextState { scope, this } = &mut *state;
        let options = CallFnOptions::new()
            .eval_ast(false)
            .rewind_scope(true)
            .bind_this_ptr(this);

        self.deadline.arm(remaining);
        let result = self
            .engine
            .call_fn_with_options::<Dynamic>(options, scope, &self.ast, hook, args);
        self.deadline.disarm();

        result.map_err(|err| {
            if is_terminated(&err) {
                HookError::Timeout { hook, timeout }
            } else {
                HookError::Raised {
                    hook,
                    message: err.to_string(),
                }
            }
        })
    }
}

fn is_terminated(err: &EvalAltResult) -> bool {
    match err {
        EvalAltResult::ErrorTerminated(..) => true,
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => is_terminated(inner),
        _ => false,
    }
}

impl ScriptContext for RhaiContext {
    fn call_init(&self, timeout: Duration) -> Result<(), HookError> {
        if !self.defines(hooks::INIT, 0) {
            return Ok(());
        }
        self.invoke(hooks::INIT, 0, (), timeout).map(|_| ())
    }

    fn check_request(&self, request: &RequestView, timeout: Duration) -> Result<bool, HookError> {
        let hook = hooks::CHECK_REQUEST;
        let value =
            to_script_value(request).map_err(|message| HookError::Marshal { hook, message })?;

        let result = self.invoke(hook, 1, (value,), timeout)?;
        result.as_bool().map_err(|found| HookError::WrongType {
            hook,
            found: found.to_string(),
        })
    }
}
