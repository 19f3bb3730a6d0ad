//! Strips letter-format artifacts (salutations, blessings, signatures) that
//! the model adds to replies despite being told not to.

use async_trait::async_trait;
use pulpit_core::{PluginCategory, PluginMeta, PulpitError, PulpitPlugin, ResponseContext, Result};
use regex::Regex;
use serde::Deserialize;

/// Leading forms of address, tried in this order.
const GREETINGS: &[&str] = &["親愛的", "敬愛的", "我的", "在基督裡的", "弟兄", "姊妹", "朋友"];

#[derive(Debug, Clone, Copy)]
enum Signoff {
    /// A closing phrase running to the end of its sentence.
    Blessing(&'static str),
    /// Slot where the persona's own names are tried.
    Signature,
}

/// Trailing sign-offs, tried in this order.
const SIGNOFFS: &[Signoff] = &[
    Signoff::Blessing("願上帝"),
    Signoff::Blessing("在基督裡"),
    Signoff::Blessing("主內"),
    Signoff::Blessing("祝福您"),
    Signoff::Blessing("願主"),
    Signoff::Signature,
    Signoff::Blessing("您的僕人"),
    Signoff::Blessing("在主裡"),
    Signoff::Blessing("神的僕人"),
];

pub const DEFAULT_SIGNATURE_NAMES: &[&str] = &["約翰·加爾文", "加爾文"];

fn default_signature_names() -> Vec<String> {
    DEFAULT_SIGNATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Deserialize)]
struct CleanerPluginConfig {
    #[serde(default = "default_signature_names")]
    signature_names: Vec<String>,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| PulpitError::PluginLoadError(format!("invalid cleanup pattern {pattern}: {e}")))
}

/// Regex for a persona name used as a bare signature. Name-internal
/// separators (`·`, `・`, spaces) match any run of separators.
fn signature_pattern(name: &str) -> String {
    let body = name
        .split(|c: char| c == '·' || c == '・' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"[·・\s]*");
    format!(r"\n*{body}\s*$")
}

#[derive(Debug, Clone)]
pub struct TextCleaner {
    greetings: Vec<Regex>,
    signoffs: Vec<Regex>,
    blank_lines: Regex,
}

impl TextCleaner {
    pub fn new<S: AsRef<str>>(signature_names: &[S]) -> Result<Self> {
        let greetings = GREETINGS
            .iter()
            .map(|prefix| compile(&format!(r"^{}[^，。！？\n]*[，。！？\n]", regex::escape(prefix))))
            .collect::<Result<Vec<_>>>()?;

        let mut signoffs = Vec::new();
        for rule in SIGNOFFS {
            match rule {
                Signoff::Blessing(prefix) => signoffs.push(compile(&format!(
                    r"\n*{}[^。！]*[。！]?\s*$",
                    regex::escape(prefix)
                ))?),
                Signoff::Signature => {
                    for name in signature_names {
                        let name: &str = name.as_ref();
                        let name = name.trim();
                        if !name.is_empty() {
                            signoffs.push(compile(&signature_pattern(name))?);
                        }
                    }
                }
            }
        }

        Ok(Self {
            greetings,
            signoffs,
            blank_lines: compile(r"\n\s*\n")?,
        })
    }

    pub fn clean(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut cleaned = text.trim().to_string();
        for pattern in self.greetings.iter().chain(&self.signoffs) {
            let matched = pattern.find(&cleaned).map(|m| m.range());
            if let Some(range) = matched {
                cleaned.replace_range(range, "");
            }
        }

        self.blank_lines
            .replace_all(&cleaned, "\n")
            .trim()
            .to_string()
    }
}

pub struct CleanerPlugin {
    cleaner: TextCleaner,
}

impl CleanerPlugin {
    pub fn create() -> Result<Box<dyn PulpitPlugin>> {
        Ok(Box::new(Self {
            cleaner: TextCleaner::new(DEFAULT_SIGNATURE_NAMES)?,
        }))
    }
}

#[async_trait]
impl PulpitPlugin for CleanerPlugin {
    fn meta(&self) -> PluginMeta {
        PluginMeta {
            id: "cleaner".into(),
            name: "Letter Format Cleaner".into(),
            version: "0.1.0".into(),
            dependencies: vec![],
            provides: vec!["cleaner".into()],
            category: PluginCategory::PostProcess,
        }
    }

    async fn load(&mut self, config: toml::Value) -> Result<()> {
        let config: CleanerPluginConfig = config.try_into()?;
        self.cleaner = TextCleaner::new(&config.signature_names)?;
        tracing::info!(
            "CleanerPlugin loaded ({} signature names)",
            config.signature_names.len()
        );
        Ok(())
    }

    async fn post_inference(&self, ctx: &mut ResponseContext) -> Result<()> {
        if let Some(reply) = ctx.reply.as_mut() {
            *reply = self.cleaner.clean(reply);
        }
        Ok(())
    }
}
