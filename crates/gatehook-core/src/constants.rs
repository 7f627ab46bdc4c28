//! Shared constants

use std::time::Duration;

/// Manifest file name used when none is configured
pub const DEFAULT_MANIFEST_FILE: &str = "plugins.json";

/// Target service name used when none is configured
pub const DEFAULT_TARGET: &str = "gateway";

/// Default per-hook invocation timeout
pub const DEFAULT_HOOK_TIMEOUT_MS: u64 = 250;

/// Slack granted to a blocking hook task on top of the script deadline
pub const HOOK_TIMEOUT_GRACE: Duration = Duration::from_millis(50);

/// Hook names plugins define by convention
pub mod hooks {
    pub const INIT: &str = "init";
    pub const CHECK_REQUEST: &str = "checkRequest";
}

/// Script engine resource limits
pub mod limits {
    use std::time::Duration;

    pub const MAX_CALL_LEVELS: usize = 64;
    pub const MAX_EXPR_DEPTH: usize = 64;
    pub const MAX_STRING_SIZE: usize = 1024 * 1024;
    pub const MAX_ARRAY_SIZE: usize = 64 * 1024;
    pub const MAX_MAP_SIZE: usize = 64 * 1024;

    /// Deadline for running a plugin's top-level statements
    pub const SOURCE_EXEC_TIMEOUT: Duration = Duration::from_secs(2);

    /// The deadline is checked once every this many operations
    pub const PROGRESS_CHECK_INTERVAL: u64 = 128;
}
