pub mod config;
pub mod error;
pub mod plugin_loader;
pub mod plugin_trait;
pub mod text;
pub mod types;

pub use config::{load_config, load_config_or_default, BotConfig, Credentials};
pub use error::{FailureClass, PulpitError, Result};
pub use plugin_loader::PluginLoader;
pub use plugin_trait::{PluginCategory, PluginDependency, PluginMeta, PulpitPlugin};
pub use text::{is_sentence_terminal, split_sentences};
pub use types::{ConversationEntry, InboundMessage, ResponseContext, ResponseMode, ResponseRequest};
