//! Gateway assembly: one registry shared by the pipeline and the dispatcher

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::dispatch::{InitDispatcher, InitReport};
use crate::pipeline::{AuthorizationPipeline, Decision, PipelinePolicy};
use crate::registry::{PluginRegistry, ReadyRegistry};
use crate::request::RequestView;
use crate::runtime::RhaiEngine;

/// Authorizes requests for a single target service.
pub struct Gateway {
    registry: Arc<PluginRegistry>,
    pipeline: AuthorizationPipeline,
    dispatcher: InitDispatcher,
    target: String,
}

impl Gateway {
    pub fn new(registry: PluginRegistry, policy: PipelinePolicy, target: impl Into<String>) -> Self {
        let registry = Arc::new(registry);
        Self {
            pipeline: AuthorizationPipeline::new(Arc::clone(&registry), policy),
            dispatcher: InitDispatcher::new(Arc::clone(&registry), policy.hook_timeout),
            registry,
            target: target.into(),
        }
    }

    /// File-backed manifest with Rhai plugins
    pub fn from_config(config: &GatewayConfig) -> Self {
        let registry = PluginRegistry::new(config.manifest_file(), RhaiEngine::new());
        Self::new(registry, config.policy(), config.target.clone())
    }

    /// Load every plugin, off the async workers on first use.
    pub async fn load(&self) -> &ReadyRegistry {
        self.registry.load_async().await
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn pipeline(&self) -> &AuthorizationPipeline {
        &self.pipeline
    }

    pub fn dispatcher(&self) -> &InitDispatcher {
        &self.dispatcher
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub async fn authorize(&self, request: &RequestView) -> Decision {
        self.pipeline.authorize(request, &self.target).await
    }

    pub async fn dispatch_init(&self) -> InitReport {
        self.dispatcher.dispatch_init_report(&self.target).await
    }
}
