use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One captured chat line. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub speaker_label: String,
    pub content: String,
    pub captured_at: DateTime<Utc>,
    pub is_automated: bool,
}

impl ConversationEntry {
    pub fn from_incoming(incoming: &InboundMessage) -> Self {
        Self {
            speaker_label: incoming.author_tag.clone(),
            content: incoming.content.clone(),
            captured_at: incoming.created_at,
            is_automated: incoming.is_automated_sender,
        }
    }
}

/// Platform-neutral view of an inbound chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub author_id: String,
    /// Unique handle used when the line is replayed as history.
    pub author_tag: String,
    /// Friendly name shown in prompts and card footers.
    pub sender_label: String,
    pub content: String,
    pub channel_id: String,
    /// `None` for private conversations.
    pub channel_label: Option<String>,
    pub is_automated_sender: bool,
    pub mentioned_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn mentions(&self, id: &str) -> bool {
        self.mentioned_ids.iter().any(|m| m == id)
    }

    /// Bounded preview for log lines.
    pub fn preview(&self, chars: usize) -> String {
        self.content.chars().take(chars).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseMode {
    Short,
    Detailed,
}

impl ResponseMode {
    /// Detailed only when the bot was addressed by identity.
    pub fn for_mention(mentioned: bool) -> Self {
        if mentioned {
            Self::Detailed
        } else {
            Self::Short
        }
    }

    /// Label embedded in the prompt.
    pub fn prompt_label(self) -> &'static str {
        match self {
            Self::Short => "簡短對話",
            Self::Detailed => "詳細回應",
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short => f.write_str("short"),
            Self::Detailed => f.write_str("detailed"),
        }
    }
}

/// Everything the prompt builder needs for one reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRequest {
    pub channel_history_context: String,
    pub user_message: String,
    pub channel_label: Option<String>,
    pub sender_label: String,
    pub is_automated_sender: bool,
    pub mode: ResponseMode,
}

/// State threaded through the plugin hooks while handling one message.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub incoming: InboundMessage,
    pub mode: ResponseMode,
    /// Rendered channel history, filled during `pre_inference`.
    pub history: String,
    /// Generated text, reshaped during `post_inference`.
    pub reply: Option<String>,
}

impl ResponseContext {
    pub fn new(incoming: InboundMessage, mode: ResponseMode) -> Self {
        Self {
            incoming,
            mode,
            history: String::new(),
            reply: None,
        }
    }

    pub fn request(&self) -> ResponseRequest {
        ResponseRequest {
            channel_history_context: self.history.clone(),
            user_message: self.incoming.content.clone(),
            channel_label: self.incoming.channel_label.clone(),
            sender_label: self.incoming.sender_label.clone(),
            is_automated_sender: self.incoming.is_automated_sender,
            mode: self.mode,
        }
    }
}
