use std::time::Duration;

use async_trait::async_trait;
use pulpit_core::config::{BotSection, PersonaSection};
use pulpit_core::{FailureClass, PulpitError, Result};

use crate::chunker::split_message;

/// Room kept free in each chunk for the ` (i/n)` suffix.
const PART_SUFFIX_RESERVE: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ReplyCard {
    pub colour: u32,
    pub author_name: String,
    pub author_icon: String,
    pub title: String,
    pub body: String,
    pub footer: String,
    pub footer_icon: Option<String>,
    pub note_title: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Plain(String),
    Card(ReplyCard),
}

/// Who the reply is for, as shown on a card footer.
#[derive(Debug, Clone, Default)]
pub struct Recipient {
    pub label: String,
    pub avatar_url: Option<String>,
}

/// Decides how a reply goes out: numbered parts when it is too long for
/// one message, a card when the bot was addressed or the reply is long,
/// plain text otherwise.
pub fn plan_delivery(
    reply: &str,
    mentioned: bool,
    recipient: &Recipient,
    bot: &BotSection,
    persona: &PersonaSection,
) -> Vec<Outbound> {
    let len = reply.chars().count();

    if len > bot.max_message_length {
        let budget = bot.max_message_length.saturating_sub(PART_SUFFIX_RESERVE).max(1);
        let chunks = split_message(reply, budget);
        let total = chunks.len();
        if total == 1 {
            return chunks.into_iter().map(Outbound::Plain).collect();
        }
        return chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| Outbound::Plain(format!("{chunk} ({}/{total})", i + 1)))
            .collect();
    }

    if mentioned || len > bot.card_threshold {
        return vec![Outbound::Card(build_card(reply, mentioned, recipient, persona))];
    }

    vec![Outbound::Plain(reply.to_string())]
}

fn build_card(
    reply: &str,
    detailed: bool,
    recipient: &Recipient,
    persona: &PersonaSection,
) -> ReplyCard {
    let (title, note) = if detailed {
        (&persona.detailed_card_title, &persona.detailed_card_note)
    } else {
        (&persona.card_title, &persona.card_note)
    };
    ReplyCard {
        colour: persona.card_colour,
        author_name: persona.card_author.clone(),
        author_icon: persona.avatar_url.clone(),
        title: title.clone(),
        body: reply.to_string(),
        footer: format!("回應給 {} • {}", recipient.label, persona.card_footer),
        footer_icon: recipient.avatar_url.clone(),
        note_title: "💡 提醒".into(),
        note: note.clone(),
    }
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Where outbound messages go; one call per message.
#[async_trait]
pub trait OutboundSink: Send + Sync {
    async fn send(&self, outbound: &Outbound) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryReport {
    Sent,
    Truncated,
    Failed,
}

/// Sends the plan in order, pausing `gap` between parts. After the first
/// failure the reply is resent once as a single truncated plain message.
pub async fn send_with_fallback(
    sink: &dyn OutboundSink,
    plan: &[Outbound],
    reply: &str,
    max_len: usize,
    gap: Duration,
) -> DeliveryReport {
    let Err(e) = send_plan(sink, plan, gap).await else {
        return DeliveryReport::Sent;
    };
    tracing::error!("Failed to send reply: {e}");

    let truncated = Outbound::Plain(truncate_chars(reply, max_len));
    match sink.send(&truncated).await {
        Ok(()) => DeliveryReport::Truncated,
        Err(e) => {
            tracing::error!("Fallback send also failed: {e}");
            DeliveryReport::Failed
        }
    }
}

async fn send_plan(sink: &dyn OutboundSink, plan: &[Outbound], gap: Duration) -> Result<()> {
    for (i, outbound) in plan.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(gap).await;
        }
        sink.send(outbound).await?;
    }
    Ok(())
}

/// A failed generation is only answered when the bot was addressed.
pub fn failure_notice(err: &PulpitError, mentioned: bool) -> Option<String> {
    mentioned.then(|| apology(err.failure_class()))
}

/// Apology shown when a reply to a direct mention could not be generated.
pub fn apology(class: FailureClass) -> String {
    let detail = match class {
        FailureClass::RateLimited => "請稍候片刻再詢問。",
        FailureClass::Unauthorized => "我的認證出現問題。",
        FailureClass::Network => "網路連線出現問題。",
        FailureClass::Other => "請稍後再試。",
    };
    format!("🙏 弟兄姊妹，我現在無法回應您的問題。{detail}")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records what was sent and fails the attempts listed in `fail_on`.
    #[derive(Default)]
    struct RecordingSink {
        fail_on: Vec<usize>,
        attempts: Mutex<usize>,
        sent: Mutex<Vec<Outbound>>,
    }

    #[async_trait]
    impl OutboundSink for RecordingSink {
        async fn send(&self, outbound: &Outbound) -> Result<()> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                *attempts += 1;
                *attempts
            };
            if self.fail_on.contains(&attempt) {
                return Err(PulpitError::SendError(format!("attempt {attempt} refused")));
            }
            self.sent.lock().unwrap().push(outbound.clone());
            Ok(())
        }
    }

    fn parts() -> Vec<Outbound> {
        vec![Outbound::Plain("一 (1/2)".into()), Outbound::Plain("二 (2/2)".into())]
    }

    fn recipient() -> Recipient {
        Recipient {
            label: "Alice".into(),
            avatar_url: Some("https://cdn.example/alice.png".into()),
        }
    }

    fn plan(reply: &str, mentioned: bool) -> Vec<Outbound> {
        plan_delivery(
            reply,
            mentioned,
            &recipient(),
            &BotSection::default(),
            &PersonaSection::default(),
        )
    }

    #[test]
    fn short_unmentioned_reply_is_plain() {
        assert_eq!(plan("是的。", false), vec![Outbound::Plain("是的。".into())]);
    }

    #[test]
    fn mention_gets_detailed_card() {
        let out = plan("上帝掌權。", true);
        let [Outbound::Card(card)] = out.as_slice() else {
            panic!("expected a single card, got {out:?}");
        };
        assert_eq!(card.title, PersonaSection::default().detailed_card_title);
        assert_eq!(card.body, "上帝掌權。");
        assert_eq!(card.colour, 0x2F4F4F);
        assert!(card.footer.starts_with("回應給 Alice • "));
        assert_eq!(card.footer_icon.as_deref(), Some("https://cdn.example/alice.png"));
    }

    #[test]
    fn long_unmentioned_reply_gets_plain_card() {
        let reply = "恩".repeat(501);
        let out = plan(&reply, false);
        let [Outbound::Card(card)] = out.as_slice() else {
            panic!("expected a single card");
        };
        assert_eq!(card.title, PersonaSection::default().card_title);
        assert_eq!(card.note, PersonaSection::default().card_note);
    }

    #[test]
    fn oversized_reply_is_sent_in_numbered_parts() {
        let reply = format!("{}。", "道".repeat(99)).repeat(30);
        let out = plan(&reply, true);
        assert!(out.len() >= 2);
        let total = out.len();
        for (i, part) in out.iter().enumerate() {
            let Outbound::Plain(text) = part else {
                panic!("chunks are always plain");
            };
            assert!(text.ends_with(&format!(" ({}/{total})", i + 1)));
            assert!(text.chars().count() <= 2000);
        }
    }

    #[tokio::test]
    async fn whole_plan_is_sent_in_order() {
        let sink = RecordingSink::default();
        let report = send_with_fallback(&sink, &parts(), "一二", 2000, Duration::ZERO).await;
        assert_eq!(report, DeliveryReport::Sent);
        assert_eq!(*sink.sent.lock().unwrap(), parts());
    }

    #[tokio::test]
    async fn failed_send_is_retried_once_truncated() {
        let sink = RecordingSink { fail_on: vec![2], ..Default::default() };
        let reply = "恩".repeat(12);
        let report = send_with_fallback(&sink, &parts(), &reply, 5, Duration::ZERO).await;

        assert_eq!(report, DeliveryReport::Truncated);
        assert_eq!(
            *sink.sent.lock().unwrap(),
            vec![parts()[0].clone(), Outbound::Plain("恩".repeat(5))]
        );
    }

    #[tokio::test]
    async fn second_failure_is_not_retried() {
        let sink = RecordingSink { fail_on: vec![1, 2], ..Default::default() };
        let report = send_with_fallback(&sink, &parts(), "一二", 2000, Duration::ZERO).await;
        assert_eq!(report, DeliveryReport::Failed);
        assert_eq!(*sink.attempts.lock().unwrap(), 2);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn failures_are_only_answered_when_mentioned() {
        let err = PulpitError::GenerationStatus { status: 429, body: String::new() };
        assert_eq!(failure_notice(&err, false), None);
        assert_eq!(failure_notice(&err, true), Some(apology(FailureClass::RateLimited)));
    }

    #[test]
    fn apology_wording_follows_failure_class() {
        assert!(apology(FailureClass::RateLimited).ends_with("請稍候片刻再詢問。"));
        assert!(apology(FailureClass::Unauthorized).ends_with("我的認證出現問題。"));
        assert!(apology(FailureClass::Network).ends_with("網路連線出現問題。"));
        assert!(apology(FailureClass::Other).ends_with("請稍後再試。"));
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("上帝是主權的", 3), "上帝是");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }
}
