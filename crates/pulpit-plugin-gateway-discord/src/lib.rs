pub mod chunker;
pub mod delivery;
pub mod filter;
pub mod prompt;
pub mod responder;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulpit_core::config::{BotSection, PersonaSection};
use pulpit_core::{InboundMessage, PulpitError};
use serenity::all::{
    ActivityData, ChannelId, Client, Context, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter,
    CreateMessage, EventHandler, GatewayIntents, Http, Message, OnlineStatus, Ready, ShardManager,
    Timestamp,
};

use crate::delivery::{
    failure_notice, plan_delivery, send_with_fallback, Outbound, OutboundSink, Recipient,
    ReplyCard,
};
use crate::filter::{ControlCommand, MessageGate, Verdict};
use crate::responder::{Admission, ControlOutcome, Responder};

/// Platform-facing settings for the gateway.
#[derive(Debug, Clone, Default)]
pub struct GatewaySettings {
    pub bot: BotSection,
    pub persona: PersonaSection,
}

struct Handler {
    responder: Arc<Responder>,
    settings: Arc<GatewaySettings>,
    gate: MessageGate,
    bot_user_id: Arc<AtomicU64>,
}

/// Sends into one Discord channel.
struct ChannelSink<'a> {
    http: &'a Arc<Http>,
    channel_id: ChannelId,
}

#[async_trait]
impl<'a> OutboundSink for ChannelSink<'a> {
    async fn send(&self, outbound: &Outbound) -> pulpit_core::Result<()> {
        let sent = match outbound {
            Outbound::Plain(text) => self.channel_id.say(self.http, text).await,
            Outbound::Card(card) => {
                self.channel_id
                    .send_message(self.http, CreateMessage::new().embed(render_card(card)))
                    .await
            }
        };
        sent.map(|_| ())
            .map_err(|e| PulpitError::SendError(e.to_string()))
    }
}

impl Handler {
    fn update_presence(&self, ctx: &Context) {
        let persona = &self.settings.persona;
        let (activity, status) = if self.responder.is_active() {
            (&persona.active_activity, OnlineStatus::Online)
        } else {
            (&persona.paused_activity, OnlineStatus::Idle)
        };
        ctx.set_presence(Some(ActivityData::watching(activity.clone())), status);
    }

    async fn handle_control(&self, ctx: &Context, msg: &Message, command: ControlCommand) {
        let author = msg.author.tag();
        let name = &self.settings.persona.name;
        let start = &self.settings.bot.start_command;
        let reply = match self.responder.apply_control(command, &msg.author.id.to_string()) {
            ControlOutcome::Rejected(ControlCommand::Stop) => {
                tracing::info!("Rejected stop command from {author}");
                "🔒 只有授權用戶可以停止機器人。".to_string()
            }
            ControlOutcome::Rejected(ControlCommand::Start) => {
                tracing::info!("Rejected start command from {author}");
                "🔒 只有授權用戶可以啟動機器人。".to_string()
            }
            ControlOutcome::Stopped => {
                self.update_presence(ctx);
                format!("⏸️ {name}機器人已停止回應。使用 `{start}` 重新啟動。")
            }
            ControlOutcome::Started => {
                self.update_presence(ctx);
                format!("▶️ {name}機器人已重新啟動，將繼續回應訊息。對話歷史已清空。")
            }
            ControlOutcome::AlreadyRunning => "✅ 機器人已經在運行中。".to_string(),
        };
        if let Err(e) = msg.reply(&ctx.http, reply).await {
            tracing::error!("Failed to answer control command: {e}");
        }
    }
}

fn render_card(card: &ReplyCard) -> CreateEmbed {
    let mut footer = CreateEmbedFooter::new(&card.footer);
    if let Some(icon) = &card.footer_icon {
        footer = footer.icon_url(icon);
    }
    CreateEmbed::new()
        .colour(card.colour)
        .author(CreateEmbedAuthor::new(&card.author_name).icon_url(&card.author_icon))
        .title(&card.title)
        .description(&card.body)
        .footer(footer)
        .timestamp(Timestamp::now())
        .field(&card.note_title, &card.note, false)
}

/// Built from the message alone; the channel label is filled in later.
fn to_inbound(msg: &Message) -> InboundMessage {
    InboundMessage {
        author_id: msg.author.id.to_string(),
        author_tag: msg.author.tag(),
        sender_label: sender_label(msg),
        content: msg.content.clone(),
        channel_id: msg.channel_id.to_string(),
        channel_label: None,
        is_automated_sender: msg.author.bot,
        mentioned_ids: msg.mentions.iter().map(|u| u.id.to_string()).collect(),
        created_at: DateTime::from_timestamp(msg.timestamp.unix_timestamp(), 0)
            .unwrap_or_else(Utc::now),
    }
}

fn sender_label(msg: &Message) -> String {
    msg.author
        .global_name
        .clone()
        .unwrap_or_else(|| msg.author.name.clone())
}

/// Guild channel name; direct messages have none.
async fn channel_label(ctx: &Context, msg: &Message) -> Option<String> {
    if msg.guild_id.is_none() {
        return None;
    }
    msg.channel_id.name(ctx).await.ok()
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        let bot_id = self.bot_user_id.load(Ordering::Relaxed).to_string();
        let incoming = to_inbound(&msg);
        let mentioned = incoming.mentions(&bot_id);

        let admission = self
            .responder
            .admit(&self.gate, incoming, &bot_id, channel_label(&ctx, &msg))
            .await;
        let response_ctx = match admission {
            Ok(Admission::Accepted(response_ctx)) => response_ctx,
            Ok(Admission::Screened(Verdict::Control(command))) => {
                self.handle_control(&ctx, &msg, command).await;
                return;
            }
            Ok(Admission::Screened(verdict)) => {
                tracing::debug!("Not replying to {} ({verdict:?})", msg.author.tag());
                return;
            }
            Err(e) => {
                tracing::error!("Failed to record message: {e}");
                return;
            }
        };

        let recipient = Recipient {
            label: sender_label(&msg),
            avatar_url: Some(msg.author.face()),
        };
        let sink = ChannelSink {
            http: &ctx.http,
            channel_id: msg.channel_id,
        };
        let bot = &self.settings.bot;

        let typing = msg.channel_id.start_typing(&ctx.http);
        tokio::time::sleep(Duration::from_millis(bot.response_delay_ms)).await;
        let result = self.responder.respond(response_ctx).await;
        drop(typing);

        match result {
            Ok(Some(reply)) => {
                let plan = plan_delivery(&reply, mentioned, &recipient, bot, &self.settings.persona);
                let gap = Duration::from_millis(bot.chunk_delay_ms);
                let report =
                    send_with_fallback(&sink, &plan, &reply, bot.max_message_length, gap).await;
                tracing::info!("Replied to {} ({report:?})", msg.author.tag());
            }
            Ok(None) => tracing::info!("No reply for {}", msg.author.tag()),
            Err(e) => {
                tracing::error!("Generation failed: {e}");
                if let Some(notice) = failure_notice(&e, mentioned) {
                    if let Err(e) = sink.send(&Outbound::Plain(notice)).await {
                        tracing::error!("Failed to send apology: {e}");
                    }
                }
            }
        }
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        self.bot_user_id.store(ready.user.id.get(), Ordering::Relaxed);
        tracing::info!("Discord bot connected as {} (id={})", ready.user.name, ready.user.id.get());
        tracing::info!(
            "Joined {} guilds, {} administrators",
            ready.guilds.len(),
            self.responder.admin_count()
        );
        self.update_presence(&ctx);
    }
}

pub async fn build_discord_client(
    token: &str,
    responder: Arc<Responder>,
    settings: GatewaySettings,
) -> anyhow::Result<Client> {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    let handler = Handler {
        responder,
        gate: MessageGate::from_config(&settings.bot),
        settings: Arc::new(settings),
        bot_user_id: Arc::new(AtomicU64::new(0)),
    };
    let client = Client::builder(token, intents).event_handler(handler).await?;
    Ok(client)
}

/// Shows every shard as offline before the process goes away.
pub async fn go_invisible(shard_manager: &ShardManager) {
    let runners = shard_manager.runners.lock().await;
    for (id, runner) in runners.iter() {
        tracing::info!("Setting shard {} invisible", id.0);
        runner.runner_tx.set_status(OnlineStatus::Invisible);
    }
}
