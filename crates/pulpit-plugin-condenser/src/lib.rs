use async_trait::async_trait;
use pulpit_core::{
    is_sentence_terminal, split_sentences, PluginCategory, PluginDependency, PluginMeta,
    PulpitPlugin, ResponseContext, ResponseMode, Result,
};
use serde::Deserialize;

/// CJK Unified Ideographs, the range the length ceiling is measured in.
pub fn is_ideograph(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

pub fn count_ideographs(text: &str) -> usize {
    text.chars().filter(|c| is_ideograph(*c)).count()
}

fn default_max_ideographs() -> usize {
    35
}
fn default_min_result_chars() -> usize {
    10
}
fn default_fallback_ideograph_floor() -> usize {
    30
}
fn default_fallback_prefix_chars() -> usize {
    50
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CondenserLimits {
    /// Sentences are accumulated while the ideograph count stays at or below this.
    #[serde(default = "default_max_ideographs")]
    pub max_ideographs: usize,
    /// A sentence-based result shorter than this falls back to raw text.
    #[serde(default = "default_min_result_chars")]
    pub min_result_chars: usize,
    /// Above this many ideographs the fallback takes a prefix instead of everything.
    #[serde(default = "default_fallback_ideograph_floor")]
    pub fallback_ideograph_floor: usize,
    #[serde(default = "default_fallback_prefix_chars")]
    pub fallback_prefix_chars: usize,
}

impl Default for CondenserLimits {
    fn default() -> Self {
        Self {
            max_ideographs: default_max_ideographs(),
            min_result_chars: default_min_result_chars(),
            fallback_ideograph_floor: default_fallback_ideograph_floor(),
            fallback_prefix_chars: default_fallback_prefix_chars(),
        }
    }
}

/// Keeps casual replies to a couple of short sentences.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortReplyCondenser {
    limits: CondenserLimits,
}

impl ShortReplyCondenser {
    pub fn new(limits: CondenserLimits) -> Self {
        Self { limits }
    }

    pub fn condense(&self, text: &str) -> String {
        let normalized = collapse_newlines(text);

        let mut result = String::new();
        for sentence in split_sentences(&normalized, false) {
            let candidate_count = count_ideographs(&result) + count_ideographs(sentence);
            if candidate_count > self.limits.max_ideographs {
                break;
            }
            result.push_str(sentence);
        }

        if result.is_empty() || result.chars().count() < self.limits.min_result_chars {
            result = if count_ideographs(&normalized) > self.limits.fallback_ideograph_floor {
                normalized
                    .chars()
                    .take(self.limits.fallback_prefix_chars)
                    .collect()
            } else {
                normalized.clone()
            };
        }

        let mut result = result.trim().to_string();
        if !result.is_empty() && !result.ends_with(is_sentence_terminal) {
            result.push('。');
        }
        result
    }
}

/// Newline runs become a single space; the result is trimmed.
fn collapse_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_break = false;
    for c in text.chars() {
        if c == '\n' {
            if !in_break {
                out.push(' ');
            }
            in_break = true;
        } else {
            out.push(c);
            in_break = false;
        }
    }
    out.trim().to_string()
}

pub struct CondenserPlugin {
    condenser: ShortReplyCondenser,
}

impl CondenserPlugin {
    pub fn create() -> Box<dyn PulpitPlugin> {
        Box::new(Self {
            condenser: ShortReplyCondenser::default(),
        })
    }
}

#[async_trait]
impl PulpitPlugin for CondenserPlugin {
    fn meta(&self) -> PluginMeta {
        PluginMeta {
            id: "condenser".into(),
            name: "Short Reply Condenser".into(),
            version: "0.1.0".into(),
            // must see text the cleaner already stripped
            dependencies: vec![PluginDependency {
                plugin_id: "cleaner".into(),
                version_req: "0.1".into(),
                optional: false,
            }],
            provides: vec!["condenser".into()],
            category: PluginCategory::PostProcess,
        }
    }

    async fn load(&mut self, config: toml::Value) -> Result<()> {
        let limits: CondenserLimits = config.try_into()?;
        tracing::info!("CondenserPlugin loaded ({limits:?})");
        self.condenser = ShortReplyCondenser::new(limits);
        Ok(())
    }

    async fn post_inference(&self, ctx: &mut ResponseContext) -> Result<()> {
        if ctx.mode != ResponseMode::Short {
            return Ok(());
        }
        if let Some(reply) = ctx.reply.as_mut() {
            *reply = self.condenser.condense(reply);
        }
        Ok(())
    }
}
