use agora_core::{AgoraError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::provider::{LlmProvider, LlmRequest, LlmResponse};

/// Routes model requests to a provider by the `provider/model` prefix.
///
/// The router is itself an `LlmProvider`, so the engine holds one
/// `Arc<dyn LlmProvider>` whether it talks to one backend or several.
#[derive(Clone, Default)]
pub struct ModelRouter {
    providers: Vec<Arc<dyn LlmProvider>>,
}

impl ModelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_provider(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.push(provider);
    }

    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.add_provider(provider);
        self
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Split "openai/gpt-4o" into the provider and the model id it expects.
    pub fn resolve(&self, model: &str) -> Result<(Arc<dyn LlmProvider>, String)> {
        let (prefix, model_id) = model
            .split_once('/')
            .ok_or_else(|| AgoraError::ModelNotFound(model.to_string()))?;
        self.providers
            .iter()
            .find(|p| p.name() == prefix)
            .map(|p| (Arc::clone(p), model_id.to_string()))
            .ok_or_else(|| AgoraError::ModelNotFound(model.to_string()))
    }
}

#[async_trait]
impl LlmProvider for ModelRouter {
    fn name(&self) -> &str {
        "router"
    }

    fn models(&self) -> Vec<String> {
        self.providers
            .iter()
            .flat_map(|p| {
                let name = p.name().to_string();
                p.models().into_iter().map(move |m| {
                    if m.contains('/') {
                        m
                    } else {
                        format!("{}/{}", name, m)
                    }
                })
            })
            .collect()
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let (provider, model_id) = self.resolve(&request.model)?;
        debug!(provider = provider.name(), model = %model_id, "routing model request");
        let mut routed = request.clone();
        routed.model = model_id;
        provider.complete(&routed).await
    }

    async fn health_check(&self) -> Result<()> {
        for p in &self.providers {
            p.health_check().await?;
        }
        Ok(())
    }
}
