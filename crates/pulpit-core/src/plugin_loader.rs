use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use crate::error::{PulpitError, Result};
use crate::plugin_trait::PulpitPlugin;
use crate::types::ResponseContext;

#[derive(Clone, Copy, Debug)]
enum Hook {
    OnMessage,
    PreInference,
    PostInference,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Placed,
}

/// Owns the registered plugins and runs them in dependency order.
/// Plugins with no ordering constraint between them run sorted by id.
#[derive(Default)]
pub struct PluginLoader {
    plugins: BTreeMap<String, Box<dyn PulpitPlugin>>,
    order: Vec<String>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn PulpitPlugin>) {
        let meta = plugin.meta();
        info!("Registered plugin: {} ({})", meta.name, meta.id);
        self.plugins.insert(meta.id, plugin);
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Depth-first placement: every plugin lands after the plugins it
    /// depends on.
    pub fn resolve_order(&mut self) -> Result<()> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut order = Vec::with_capacity(self.plugins.len());
        for id in self.plugins.keys() {
            self.place(id, &mut marks, &mut order)?;
        }
        self.order = order;
        info!("Plugin order: {:?}", self.order);
        Ok(())
    }

    fn place<'a>(
        &'a self,
        id: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        match marks.get(id) {
            Some(Mark::Placed) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(PulpitError::DependencyError(format!(
                    "Plugin dependency cycle through '{id}'"
                )))
            }
            None => {}
        }
        let Some(plugin) = self.plugins.get(id) else {
            return Ok(());
        };

        marks.insert(id, Mark::Visiting);
        for dep in plugin.meta().dependencies {
            match self.plugins.get_key_value(&dep.plugin_id) {
                Some((dep_id, _)) => self.place(dep_id, marks, order)?,
                None if dep.optional => {
                    warn!("Plugin '{id}' runs without optional '{}'", dep.plugin_id)
                }
                None => {
                    return Err(PulpitError::DependencyError(format!(
                        "Plugin '{id}' requires '{}', which is not registered",
                        dep.plugin_id
                    )))
                }
            }
        }
        marks.insert(id, Mark::Placed);
        order.push(id.to_string());
        Ok(())
    }

    /// Resolves the order, then loads, initializes and starts each plugin
    /// with its `[plugins.<id>]` table (empty when absent).
    pub async fn start_all(&mut self, config: &toml::Value) -> Result<()> {
        self.resolve_order()?;

        for id in &self.order {
            let Some(plugin) = self.plugins.get_mut(id) else {
                continue;
            };
            let section = config
                .get("plugins")
                .and_then(|plugins| plugins.get(id))
                .cloned()
                .unwrap_or_else(|| toml::Value::Table(Default::default()));

            debug!("Starting plugin {id}");
            plugin.load(section).await?;
            plugin.init().await?;
            plugin.start().await?;
        }
        info!("{} plugins started", self.order.len());
        Ok(())
    }

    /// Stops in reverse order. Failures are logged and do not halt the rest.
    pub async fn stop_all(&mut self) -> Result<()> {
        for id in self.order.iter().rev() {
            if let Some(plugin) = self.plugins.get_mut(id) {
                if let Err(e) = plugin.stop().await {
                    warn!("Plugin {id} did not stop cleanly: {e}");
                }
            }
        }
        Ok(())
    }

    pub async fn run_on_message(&self, ctx: &mut ResponseContext) -> Result<()> {
        self.run_hook(Hook::OnMessage, ctx).await
    }

    pub async fn run_pre_inference(&self, ctx: &mut ResponseContext) -> Result<()> {
        self.run_hook(Hook::PreInference, ctx).await
    }

    pub async fn run_post_inference(&self, ctx: &mut ResponseContext) -> Result<()> {
        self.run_hook(Hook::PostInference, ctx).await
    }

    async fn run_hook(&self, hook: Hook, ctx: &mut ResponseContext) -> Result<()> {
        for id in &self.order {
            let Some(plugin) = self.plugins.get(id) else {
                continue;
            };
            debug!("Running {hook:?} hook: {id}");
            match hook {
                Hook::OnMessage => plugin.on_message(ctx).await?,
                Hook::PreInference => plugin.pre_inference(ctx).await?,
                Hook::PostInference => plugin.post_inference(ctx).await?,
            }
        }
        Ok(())
    }
}
