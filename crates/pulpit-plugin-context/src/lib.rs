use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use pulpit_core::{
    ConversationEntry, PluginCategory, PluginMeta, PulpitError, PulpitPlugin, ResponseContext,
    Result,
};
use serde::Deserialize;

pub const DEFAULT_MAX_ENTRIES: usize = 5;
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}
fn default_preview_chars() -> usize {
    DEFAULT_PREVIEW_CHARS
}

#[derive(Debug, Clone, Deserialize)]
struct ContextPluginConfig {
    #[serde(default = "default_max_entries")]
    max_entries: usize,
    #[serde(default = "default_preview_chars")]
    preview_chars: usize,
}

/// Records each accepted message and renders channel history before inference.
pub struct ContextPlugin {
    window: Arc<ContextWindow>,
}

impl ContextPlugin {
    pub fn create(window: Arc<ContextWindow>) -> Box<dyn PulpitPlugin> {
        Box::new(Self { window })
    }
}

#[async_trait]
impl PulpitPlugin for ContextPlugin {
    fn meta(&self) -> PluginMeta {
        PluginMeta {
            id: "context".into(),
            name: "Context Window Plugin".into(),
            version: "0.1.0".into(),
            dependencies: vec![],
            provides: vec!["context".into()],
            category: PluginCategory::Context,
        }
    }

    async fn load(&mut self, config: toml::Value) -> Result<()> {
        let config: ContextPluginConfig = config.try_into()?;
        if config.max_entries == 0 {
            return Err(PulpitError::PluginLoadError(
                "context.max_entries must be at least 1".into(),
            ));
        }
        self.window.configure(config.max_entries, config.preview_chars);
        tracing::info!(
            "ContextPlugin loaded (max_entries={}, preview_chars={})",
            config.max_entries,
            config.preview_chars
        );
        Ok(())
    }

    async fn on_message(&self, ctx: &mut ResponseContext) -> Result<()> {
        self.window.record(
            &ctx.incoming.channel_id,
            ConversationEntry::from_incoming(&ctx.incoming),
        );
        tracing::debug!(
            "Channel {} holds {} entries",
            ctx.incoming.channel_id,
            self.window.len(&ctx.incoming.channel_id)
        );
        Ok(())
    }

    async fn pre_inference(&self, ctx: &mut ResponseContext) -> Result<()> {
        ctx.history = self.window.render(&ctx.incoming.channel_id);
        Ok(())
    }
}

struct Limits {
    max_entries: usize,
    preview_chars: usize,
}

/// Bounded, per-channel rolling log of recent messages.
pub struct ContextWindow {
    channels: Mutex<HashMap<String, VecDeque<ConversationEntry>>>,
    limits: Mutex<Limits>,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_PREVIEW_CHARS)
    }
}

impl ContextWindow {
    pub fn new(max_entries: usize, preview_chars: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            limits: Mutex::new(Limits {
                max_entries: max_entries.max(1),
                preview_chars,
            }),
        }
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, VecDeque<ConversationEntry>>> {
        self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn limits(&self) -> MutexGuard<'_, Limits> {
        self.limits.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn configure(&self, max_entries: usize, preview_chars: usize) {
        let mut limits = self.limits();
        limits.max_entries = max_entries.max(1);
        limits.preview_chars = preview_chars;
        drop(limits);

        let mut channels = self.channels();
        for history in channels.values_mut() {
            while history.len() > max_entries.max(1) {
                history.pop_front();
            }
        }
    }

    pub fn record(&self, channel_id: &str, entry: ConversationEntry) {
        let max_entries = self.limits().max_entries;
        let mut channels = self.channels();
        let history = channels.entry(channel_id.to_string()).or_default();
        history.push_back(entry);
        while history.len() > max_entries {
            history.pop_front();
        }
    }

    /// `speaker: content` lines, oldest first, each content cut to the
    /// preview length. Empty when the channel has no history.
    pub fn render(&self, channel_id: &str) -> String {
        let preview_chars = self.limits().preview_chars;
        let channels = self.channels();
        let Some(history) = channels.get(channel_id) else {
            return String::new();
        };
        history
            .iter()
            .map(|entry| {
                let content: String = entry.content.chars().take(preview_chars).collect();
                format!("{}: {}", entry.speaker_label, content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self, channel_id: &str) -> usize {
        self.channels().get(channel_id).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.channels().values().all(VecDeque::is_empty)
    }

    pub fn clear(&self) {
        self.channels().clear();
        tracing::info!("Cleared conversation history");
    }
}
