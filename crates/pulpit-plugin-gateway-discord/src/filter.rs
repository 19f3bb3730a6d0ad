use pulpit_core::config::BotSection;
use pulpit_core::InboundMessage;

/// Why a message was dropped without touching history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suppression {
    OwnMessage,
    PeerMention(String),
    IgnoredPrefix(String),
}

/// Bot-to-bot etiquette for a shared channel.
#[derive(Debug, Clone, Default)]
pub struct SuppressionRules {
    pub peer_bot_ids: Vec<String>,
    pub ignored_prefixes: Vec<String>,
}

impl SuppressionRules {
    pub fn from_config(bot: &BotSection) -> Self {
        Self {
            peer_bot_ids: bot.peer_bot_ids.clone(),
            ignored_prefixes: bot.ignored_prefixes.clone(),
        }
    }

    pub fn check(&self, incoming: &InboundMessage, self_id: &str) -> Option<Suppression> {
        if incoming.author_id == self_id {
            return Some(Suppression::OwnMessage);
        }
        if let Some(peer) = self.peer_bot_ids.iter().find(|id| incoming.mentions(id)) {
            return Some(Suppression::PeerMention(peer.clone()));
        }
        let content = incoming.content.trim();
        self.ignored_prefixes
            .iter()
            .find(|prefix| !prefix.is_empty() && content.starts_with(prefix.as_str()))
            .map(|prefix| Suppression::IgnoredPrefix(prefix.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Stop,
    Start,
}

/// What happens to an inbound message before any history is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Suppressed(Suppression),
    Control(ControlCommand),
    Paused,
    Blacklisted,
    Proceed,
}

/// Suppression, control commands and the channel blacklist, checked in
/// that order.
#[derive(Debug, Clone, Default)]
pub struct MessageGate {
    pub rules: SuppressionRules,
    pub stop_command: String,
    pub start_command: String,
    pub blacklisted_channels: Vec<String>,
}

impl MessageGate {
    pub fn from_config(bot: &BotSection) -> Self {
        Self {
            rules: SuppressionRules::from_config(bot),
            stop_command: bot.stop_command.clone(),
            start_command: bot.start_command.clone(),
            blacklisted_channels: bot.blacklisted_channels.clone(),
        }
    }

    /// Control commands are honoured while paused and in blacklisted
    /// channels.
    pub fn screen(&self, incoming: &InboundMessage, self_id: &str, active: bool) -> Verdict {
        if let Some(reason) = self.rules.check(incoming, self_id) {
            return Verdict::Suppressed(reason);
        }
        if let Some(command) = self.control(&incoming.content) {
            return Verdict::Control(command);
        }
        if !active {
            return Verdict::Paused;
        }
        if self.blacklisted_channels.contains(&incoming.channel_id) {
            return Verdict::Blacklisted;
        }
        Verdict::Proceed
    }

    /// Exact match on the trimmed content.
    pub fn control(&self, content: &str) -> Option<ControlCommand> {
        let content = content.trim();
        if content == self.stop_command {
            Some(ControlCommand::Stop)
        } else if content == self.start_command {
            Some(ControlCommand::Start)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn message(author_id: &str, content: &str, mentions: &[&str]) -> InboundMessage {
        InboundMessage {
            author_id: author_id.into(),
            author_tag: "user".into(),
            sender_label: "User".into(),
            content: content.into(),
            channel_id: "c".into(),
            channel_label: None,
            is_automated_sender: false,
            mentioned_ids: mentions.iter().map(|m| m.to_string()).collect(),
            created_at: Utc::now(),
        }
    }

    fn rules() -> SuppressionRules {
        SuppressionRules::from_config(&BotSection::default())
    }

    #[test]
    fn own_messages_are_ignored() {
        assert_eq!(rules().check(&message("42", "hi", &[]), "42"), Some(Suppression::OwnMessage));
    }

    #[test]
    fn peer_bot_mentions_are_left_alone() {
        let msg = message("7", "<@1397068991230509146> 你怎麼看？", &["1397068991230509146"]);
        assert_eq!(
            rules().check(&msg, "42"),
            Some(Suppression::PeerMention("1397068991230509146".into()))
        );
    }

    #[test]
    fn prefixes_match_after_trimming() {
        let r = rules();
        assert_eq!(
            r.check(&message("7", "  !roll d20", &[]), "42"),
            Some(Suppression::IgnoredPrefix("!".into()))
        );
        assert!(matches!(
            r.check(&message("7", "⏸️ 機器人已停止回應。", &[]), "42"),
            Some(Suppression::IgnoredPrefix(_))
        ));
        assert!(matches!(
            r.check(&message("7", "▶️ 已重新啟動", &[]), "42"),
            Some(Suppression::IgnoredPrefix(_))
        ));
    }

    #[test]
    fn ordinary_messages_pass() {
        assert_eq!(rules().check(&message("7", "什麼是預定論？", &["42"]), "42"), None);
    }

    #[test]
    fn empty_rules_only_drop_own_messages() {
        let r = SuppressionRules::default();
        assert_eq!(r.check(&message("7", "!cmd", &["1397068991230509146"]), "42"), None);
    }

    #[test]
    fn control_commands_need_exact_match() {
        let gate = MessageGate::from_config(&BotSection::default());
        assert_eq!(gate.control(" /stop "), Some(ControlCommand::Stop));
        assert_eq!(gate.control("/start"), Some(ControlCommand::Start));
        assert_eq!(gate.control("/stop now"), None);
        assert_eq!(gate.control("please /start"), None);
    }

    fn gate() -> MessageGate {
        MessageGate {
            blacklisted_channels: vec!["quiet".into()],
            ..MessageGate::from_config(&BotSection::default())
        }
    }

    #[test]
    fn suppression_wins_over_control() {
        let msg = message("42", "/stop", &[]);
        assert_eq!(gate().screen(&msg, "42", true), Verdict::Suppressed(Suppression::OwnMessage));
    }

    #[test]
    fn commands_work_while_paused_or_blacklisted() {
        let mut msg = message("7", "/start", &[]);
        assert_eq!(gate().screen(&msg, "42", false), Verdict::Control(ControlCommand::Start));
        msg.channel_id = "quiet".into();
        assert_eq!(gate().screen(&msg, "42", true), Verdict::Control(ControlCommand::Start));
    }

    #[test]
    fn paused_is_checked_before_blacklist() {
        let mut msg = message("7", "你好", &[]);
        msg.channel_id = "quiet".into();
        assert_eq!(gate().screen(&msg, "42", false), Verdict::Paused);
        assert_eq!(gate().screen(&msg, "42", true), Verdict::Blacklisted);
        msg.channel_id = "c".into();
        assert_eq!(gate().screen(&msg, "42", true), Verdict::Proceed);
    }
}
