use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::ResponseContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMeta {
    pub id: String,
    pub name: String,
    pub version: String,
    pub dependencies: Vec<PluginDependency>,
    pub provides: Vec<String>,
    pub category: PluginCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDependency {
    pub plugin_id: String,
    pub version_req: String,
    pub optional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PluginCategory {
    Context,
    PostProcess,
    Other,
}

/// A stage of the response pipeline.
///
/// Hooks run in dependency order for every handled message:
/// `on_message` when the message is accepted, `pre_inference` right before
/// the generation call and `post_inference` once text came back.
#[async_trait]
pub trait PulpitPlugin: Send + Sync {
    fn meta(&self) -> PluginMeta;

    async fn load(&mut self, config: toml::Value) -> Result<()>;

    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    async fn on_message(&self, _ctx: &mut ResponseContext) -> Result<()> {
        Ok(())
    }

    async fn pre_inference(&self, _ctx: &mut ResponseContext) -> Result<()> {
        Ok(())
    }

    async fn post_inference(&self, _ctx: &mut ResponseContext) -> Result<()> {
        Ok(())
    }
}
