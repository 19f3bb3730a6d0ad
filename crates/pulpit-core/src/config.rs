use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PulpitError, Result};

pub fn load_config(path: &Path) -> Result<toml::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PulpitError::ConfigError(format!("Failed to read config {}: {e}", path.display()))
    })?;
    let value: toml::Value = content.parse().map_err(|e| {
        PulpitError::ConfigError(format!("Failed to parse config {}: {e}", path.display()))
    })?;
    Ok(value)
}

/// Like [`load_config`], but a missing file means "all defaults".
pub fn load_config_or_default(path: &Path) -> Result<toml::Value> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!("No config at {}, using defaults", path.display());
        Ok(toml::Value::Table(toml::map::Map::new()))
    }
}

fn default_stop_command() -> String {
    "/stop".into()
}
fn default_start_command() -> String {
    "/start".into()
}
fn default_response_delay_ms() -> u64 {
    2000
}
fn default_chunk_delay_ms() -> u64 {
    1000
}
fn default_max_message_length() -> usize {
    2000
}
fn default_card_threshold() -> usize {
    500
}
fn default_peer_bot_ids() -> Vec<String> {
    vec!["1397068991230509146".into()]
}
fn default_ignored_prefixes() -> Vec<String> {
    vec!["!".into(), "⏸️".into(), "▶️".into()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotSection {
    #[serde(default = "default_stop_command")]
    pub stop_command: String,
    #[serde(default = "default_start_command")]
    pub start_command: String,
    #[serde(default = "default_response_delay_ms")]
    pub response_delay_ms: u64,
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    /// Replies longer than this are shown as a card even without a mention.
    #[serde(default = "default_card_threshold")]
    pub card_threshold: usize,
    #[serde(default)]
    pub blacklisted_channels: Vec<String>,
    /// Messages mentioning one of these bots are left to that bot.
    #[serde(default = "default_peer_bot_ids")]
    pub peer_bot_ids: Vec<String>,
    #[serde(default = "default_ignored_prefixes")]
    pub ignored_prefixes: Vec<String>,
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            stop_command: default_stop_command(),
            start_command: default_start_command(),
            response_delay_ms: default_response_delay_ms(),
            chunk_delay_ms: default_chunk_delay_ms(),
            max_message_length: default_max_message_length(),
            card_threshold: default_card_threshold(),
            blacklisted_channels: Vec::new(),
            peer_bot_ids: default_peer_bot_ids(),
            ignored_prefixes: default_ignored_prefixes(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".into()
}
fn default_prompt_id() -> String {
    "pmpt_687f16ce57548195a6ebbf149f2adc5907ded20c34b488e2".into()
}
fn default_fallback_model() -> String {
    "gpt-4".into()
}
fn default_short_max_tokens() -> u32 {
    90
}
fn default_detailed_max_tokens() -> u32 {
    1000
}
fn default_short_temperature() -> f64 {
    0.6
}
fn default_detailed_temperature() -> f64 {
    0.4
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationSection {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Prompt-template reference handed to the primary call.
    #[serde(default = "default_prompt_id")]
    pub prompt_id: String,
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
    #[serde(default = "default_short_max_tokens")]
    pub short_max_tokens: u32,
    #[serde(default = "default_detailed_max_tokens")]
    pub detailed_max_tokens: u32,
    #[serde(default = "default_short_temperature")]
    pub short_temperature: f64,
    #[serde(default = "default_detailed_temperature")]
    pub detailed_temperature: f64,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            prompt_id: default_prompt_id(),
            fallback_model: default_fallback_model(),
            short_max_tokens: default_short_max_tokens(),
            detailed_max_tokens: default_detailed_max_tokens(),
            short_temperature: default_short_temperature(),
            detailed_temperature: default_detailed_temperature(),
        }
    }
}

fn default_persona_name() -> String {
    "約翰·加爾文".into()
}
fn default_card_author() -> String {
    "約翰·加爾文 (John Calvin)".into()
}
fn default_avatar_url() -> String {
    "https://upload.wikimedia.org/wikipedia/commons/thumb/f/f7/John_Calvin_by_Holbein.jpg/256px-John_Calvin_by_Holbein.jpg".into()
}
fn default_card_colour() -> u32 {
    0x2F4F4F
}
fn default_card_title() -> String {
    "🛡️ 約翰·加爾文的回應".into()
}
fn default_detailed_card_title() -> String {
    "🛡️ 約翰·加爾文的詳細回應".into()
}
fn default_card_footer() -> String {
    "基於加爾文神學著作".into()
}
fn default_card_note() -> String {
    "此回應基於約翰·加爾文的神學著作和改革宗傳統".into()
}
fn default_detailed_card_note() -> String {
    "此為詳細回應，基於約翰·加爾文的神學著作和改革宗傳統".into()
}
fn default_active_activity() -> String {
    "研讀基督教要義與改革神學".into()
}
fn default_paused_activity() -> String {
    "已暫停回應 (/stop)".into()
}

/// Presentation strings for the persona.
#[derive(Debug, Clone, Deserialize)]
pub struct PersonaSection {
    #[serde(default = "default_persona_name")]
    pub name: String,
    #[serde(default = "default_card_author")]
    pub card_author: String,
    #[serde(default = "default_avatar_url")]
    pub avatar_url: String,
    #[serde(default = "default_card_colour")]
    pub card_colour: u32,
    #[serde(default = "default_card_title")]
    pub card_title: String,
    #[serde(default = "default_detailed_card_title")]
    pub detailed_card_title: String,
    #[serde(default = "default_card_footer")]
    pub card_footer: String,
    #[serde(default = "default_card_note")]
    pub card_note: String,
    #[serde(default = "default_detailed_card_note")]
    pub detailed_card_note: String,
    #[serde(default = "default_active_activity")]
    pub active_activity: String,
    #[serde(default = "default_paused_activity")]
    pub paused_activity: String,
}

impl Default for PersonaSection {
    fn default() -> Self {
        Self {
            name: default_persona_name(),
            card_author: default_card_author(),
            avatar_url: default_avatar_url(),
            card_colour: default_card_colour(),
            card_title: default_card_title(),
            detailed_card_title: default_detailed_card_title(),
            card_footer: default_card_footer(),
            card_note: default_card_note(),
            detailed_card_note: default_detailed_card_note(),
            active_activity: default_active_activity(),
            paused_activity: default_paused_activity(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub bot: BotSection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub persona: PersonaSection,
}

impl BotConfig {
    /// Typed view of the top-level sections; `[plugins.*]` tables are left
    /// to the plugins themselves.
    pub fn from_value(value: &toml::Value) -> Result<Self> {
        Ok(value.clone().try_into::<BotConfig>()?)
    }
}

/// Process secrets and the administrator allow-list.
#[derive(Clone)]
pub struct Credentials {
    pub discord_token: String,
    pub openai_api_key: String,
    pub admin_user_ids: Vec<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("discord_token", &"<redacted>")
            .field("openai_api_key", &"<redacted>")
            .field("admin_user_ids", &self.admin_user_ids)
            .finish()
    }
}

impl Credentials {
    /// Reads `DISCORD_TOKEN`, `OPENAI_API_KEY` and `ADMIN_USER_IDS` from the
    /// process environment, falling back to `.env` in the working directory.
    pub fn from_env() -> Result<Self> {
        let dotenv = std::fs::read_to_string(".env")
            .map(|content| parse_dotenv(&content))
            .unwrap_or_default();
        Self::from_sources(|key| std::env::var(key).ok(), &dotenv)
    }

    pub fn from_sources(
        env: impl Fn(&str) -> Option<String>,
        dotenv: &HashMap<String, String>,
    ) -> Result<Self> {
        let lookup = |key: &str| {
            env(key)
                .or_else(|| dotenv.get(key).cloned())
                .filter(|v| !v.trim().is_empty())
        };
        let discord_token = lookup("DISCORD_TOKEN")
            .ok_or_else(|| PulpitError::ConfigError("DISCORD_TOKEN is not set".into()))?;
        let openai_api_key = lookup("OPENAI_API_KEY")
            .ok_or_else(|| PulpitError::ConfigError("OPENAI_API_KEY is not set".into()))?;
        let admin_user_ids = lookup("ADMIN_USER_IDS")
            .map(|raw| parse_admin_ids(&raw))
            .unwrap_or_default();
        Ok(Self {
            discord_token,
            openai_api_key,
            admin_user_ids,
        })
    }
}

pub fn parse_admin_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a dotenv-format string into a key-value map.
///
/// Supports `KEY=value`, `export KEY=value`, quoted values, comments and
/// blank lines.
pub fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let key = key.strip_prefix("export ").map(str::trim).unwrap_or(key);
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    map
}

fn unquote(s: &str) -> &str {
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        return &s[1..s.len() - 1];
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_yields_defaults() {
        let value = toml::Value::Table(toml::map::Map::new());
        let config = BotConfig::from_value(&value).unwrap();
        assert_eq!(config.bot.stop_command, "/stop");
        assert_eq!(config.bot.max_message_length, 2000);
        assert_eq!(config.generation.short_max_tokens, 90);
        assert_eq!(config.generation.detailed_max_tokens, 1000);
        assert!(config.generation.detailed_temperature < config.generation.short_temperature);
        assert_eq!(config.persona.card_colour, 0x2F4F4F);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let value: toml::Value = toml::from_str(
            r#"
            [bot]
            response_delay_ms = 0
            peer_bot_ids = []

            [generation]
            fallback_model = "gpt-4o-mini"

            [plugins.context]
            max_entries = 3
            "#,
        )
        .unwrap();
        let config = BotConfig::from_value(&value).unwrap();
        assert_eq!(config.bot.response_delay_ms, 0);
        assert!(config.bot.peer_bot_ids.is_empty());
        assert_eq!(config.bot.start_command, "/start");
        assert_eq!(config.generation.fallback_model, "gpt-4o-mini");
        assert_eq!(config.generation.short_temperature, 0.6);
    }

    #[test]
    fn missing_file_is_an_empty_table() {
        let value = load_config_or_default(Path::new("/nonexistent/pulpit.toml")).unwrap();
        assert!(value.as_table().is_some_and(|t| t.is_empty()));
    }

    #[test]
    fn admin_ids_are_trimmed_and_filtered() {
        assert_eq!(parse_admin_ids(" 1, 2 ,,3 "), vec!["1", "2", "3"]);
        assert!(parse_admin_ids("").is_empty());
    }

    #[test]
    fn process_env_wins_over_dotenv() {
        let dotenv = parse_dotenv(
            "# secrets\nexport DISCORD_TOKEN=\"from-file\"\nOPENAI_API_KEY='sk-file'\nADMIN_USER_IDS=9\n",
        );
        let creds = Credentials::from_sources(
            |key| (key == "DISCORD_TOKEN").then(|| "from-env".to_string()),
            &dotenv,
        )
        .unwrap();
        assert_eq!(creds.discord_token, "from-env");
        assert_eq!(creds.openai_api_key, "sk-file");
        assert_eq!(creds.admin_user_ids, vec!["9"]);
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let err = Credentials::from_sources(|_| None, &HashMap::new()).unwrap_err();
        assert!(matches!(err, PulpitError::ConfigError(_)));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let creds = Credentials {
            discord_token: "secret-token".into(),
            openai_api_key: "sk-secret".into(),
            admin_user_ids: vec![],
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(!rendered.contains("sk-secret"));
    }
}
