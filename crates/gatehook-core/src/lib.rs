//! Gatehook Core
//!
//! Plugin registry and authorization pipeline for a gateway whose policy is
//! supplied at runtime by scripted plugins:
//! - Manifest parsing into plugin specifications
//! - One isolated script context per plugin, built exactly once
//! - Per-request authorization across every plugin bound to a target
//! - Start-up initialization dispatch
//!
//! # Usage
//!
//! ```rust,ignore
//! use gatehook_core::{Gateway, GatewayConfig, RequestView};
//!
//! let gateway = Gateway::from_config(&GatewayConfig::default());
//! gateway.registry().load();
//! gateway.dispatch_init().await;
//!
//! let request = RequestView::new("GET", "/status");
//! if gateway.authorize(&request).await.is_allowed() {
//!     // forward upstream
//! }
//! ```

pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod plugins;
pub mod registry;
pub mod request;
pub mod runtime;

#[cfg(test)]
pub(crate) mod testing;

pub use config::GatewayConfig;
pub use dispatch::{InitDispatcher, InitReport};
pub use error::{HookError, ManifestError, PluginLoadError, RegistryError};
pub use gateway::Gateway;
pub use pipeline::{AuthorizationPipeline, Decision, DenyReason, EmptyPolicy, FailurePolicy};
pub use plugins::{ManifestFile, ManifestProvider, PluginManifest, PluginSpec, StaticManifest};
pub use registry::{LoadReport, PluginRegistry, ReadyRegistry, RegistryEntry};
pub use request::RequestView;
pub use runtime::{RhaiEngine, ScriptContext, ScriptEngine};
