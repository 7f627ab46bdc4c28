//! Counting fake engine for registry, pipeline and dispatcher tests.
//!
//! A plugin's source text selects its behavior: `allow`, `deny`, `throw`,
//! `number`, `slow`, `broken` (fails to load) or `init-throw`.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{HookError, PluginLoadError};
use crate::plugins::PluginSpec;
use crate::request::RequestView;
use crate::runtime::{ScriptContext, ScriptEngine};

#[derive(Debug, Default)]
pub struct CallLog {
    pub loads: HashMap<String, usize>,
    pub checks: Vec<String>,
    pub inits: Vec<String>,
    pub load_threads: Vec<ThreadId>,
}

#[derive(Clone, Default)]
pub struct FakeEngine {
    pub log: Arc<Mutex<CallLog>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loads_of(&self, name: &str) -> usize {
        self.log.lock().loads.get(name).copied().unwrap_or(0)
    }

    pub fn checks(&self) -> Vec<String> {
        self.log.lock().checks.clone()
    }

    pub fn inits(&self) -> Vec<String> {
        self.log.lock().inits.clone()
    }

    pub fn load_threads(&self) -> Vec<ThreadId> {
        self.log.lock().load_threads.clone()
    }
}

impl ScriptEngine for FakeEngine {
    fn instantiate(
        &self,
        spec: &PluginSpec,
        source: &str,
    ) -> Result<Box<dyn ScriptContext>, PluginLoadError> {
        {
            let mut log = self.log.lock();
            *log.loads.entry(spec.name().to_string()).or_default() += 1;
            log.load_threads.push(std::thread::current().id());
        }

        // Widen the race window for concurrent load tests
        std::thread::sleep(Duration::from_millis(5));

        if source == "broken" {
            return Err(PluginLoadError::Compile {
                message: "unexpected end of input".to_string(),
            });
        }

        Ok(Box::new(FakeContext {
            name: spec.name().to_string(),
            behavior: source.to_string(),
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeContext {
    name: String,
    behavior: String,
    log: Arc<Mutex<CallLog>>,
}

impl ScriptContext for FakeContext {
    fn call_init(&self, _timeout: Duration) -> Result<(), HookError> {
        self.log.lock().inits.push(self.name.clone());
        if self.behavior == "init-throw" {
            return Err(HookError::Raised {
                hook: "init",
                message: "init failed".to_string(),
            });
        }
        Ok(())
    }

    fn check_request(&self, _request: &RequestView, timeout: Duration) -> Result<bool, HookError> {
        self.log.lock().checks.push(self.name.clone());
        let hook = "checkRequest";
        match self.behavior.as_str() {
            "allow" | "init-throw" => Ok(true),
            "deny" => Ok(false),
            "number" => Err(HookError::WrongType {
                hook,
                found: "i64".to_string(),
            }),
            "slow" => {
                // Ignores its deadline on purpose
                std::thread::sleep(timeout * 4 + Duration::from_millis(200));
                Ok(true)
            }
            _ => Err(HookError::Raised {
                hook,
                message: "boom".to_string(),
            }),
        }
    }
}
