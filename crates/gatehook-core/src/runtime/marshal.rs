//! Marshaling between gateway values and Rhai values.
//!
//! The request snapshot is serialized into a Rhai object map, so the script
//! receives an independent copy:
//!
//! ```rhai
//! fn checkRequest(request) {
//!     request.method == "GET" && request.headers["x-api-key"] == "secret"
//! }
//! ```

use rhai::Dynamic;

use crate::request::RequestView;

/// Convert a request snapshot into a script value.
pub fn to_script_value(request: &RequestView) -> Result<Dynamic, String> {
    rhai::serde::to_dynamic(request).map_err(|e| format!("failed to marshal request: {e}"))
}
