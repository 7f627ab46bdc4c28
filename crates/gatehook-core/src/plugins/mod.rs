//! Plugin specifications and manifest loading.
//!
//! A manifest is an ordered list of plugin entries. Order is preserved all the
//! way into the registry, where it fixes initialization and evaluation order.
//!
//! ```json
//! {
//!   "plugins": [
//!     {
//!       "enabled": true,
//!       "filename": "plugins/deny_admin.rhai",
//!       "description": "Blocks /admin for remote callers",
//!       "target": "gateway"
//!     }
//!   ]
//! }
//! ```

mod manifest;
mod types;

pub use manifest::{ManifestFile, ManifestProvider, StaticManifest};
pub use types::{PluginManifest, PluginSpec};
