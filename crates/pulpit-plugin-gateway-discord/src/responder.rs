use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use pulpit_core::config::GenerationSection;
use pulpit_core::{InboundMessage, PluginLoader, ResponseContext, ResponseMode, Result};
use pulpit_plugin_context::ContextWindow;
use pulpit_plugin_inference::{GenerationCall, InferenceService};
use tokio::sync::RwLock;
use tracing::info;

use crate::filter::{ControlCommand, MessageGate, Verdict};
use crate::prompt;

/// Process-wide switch plus the administrator allow-list.
#[derive(Debug)]
struct RuntimeState {
    is_active: bool,
    authorized_user_ids: HashSet<String>,
}

impl RuntimeState {
    /// An empty allow-list lets everyone through.
    fn authorizes(&self, user_id: &str) -> bool {
        self.authorized_user_ids.is_empty() || self.authorized_user_ids.contains(user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Rejected(ControlCommand),
    Stopped,
    Started,
    AlreadyRunning,
}

#[derive(Debug)]
pub enum Admission {
    /// Stopped at the gate; history is untouched.
    Screened(Verdict),
    Accepted(ResponseContext),
}

/// Owns the state for one bot instance and turns accepted messages into
/// reply text.
pub struct Responder {
    pipeline: RwLock<PluginLoader>,
    context: Arc<ContextWindow>,
    inference: InferenceService,
    generation: GenerationSection,
    state: Mutex<RuntimeState>,
}

impl Responder {
    /// `pipeline` must already be started.
    pub fn new(
        pipeline: PluginLoader,
        context: Arc<ContextWindow>,
        inference: InferenceService,
        generation: GenerationSection,
        authorized_user_ids: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            pipeline: RwLock::new(pipeline),
            context,
            inference,
            generation,
            state: Mutex::new(RuntimeState {
                is_active: true,
                authorized_user_ids: authorized_user_ids.into_iter().collect(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active
    }

    pub fn admin_count(&self) -> usize {
        self.state().authorized_user_ids.len()
    }

    pub fn context(&self) -> &ContextWindow {
        &self.context
    }

    pub fn apply_control(&self, command: ControlCommand, user_id: &str) -> ControlOutcome {
        let mut state = self.state();
        if !state.authorizes(user_id) {
            return ControlOutcome::Rejected(command);
        }
        match command {
            ControlCommand::Stop => {
                state.is_active = false;
                info!("Replies paused by {user_id}");
                ControlOutcome::Stopped
            }
            ControlCommand::Start if state.is_active => ControlOutcome::AlreadyRunning,
            ControlCommand::Start => {
                state.is_active = true;
                // cleared under the state lock so no reply sees stale topics
                self.context.clear();
                info!("Replies resumed by {user_id}");
                ControlOutcome::Started
            }
        }
    }

    fn budget(&self, mode: ResponseMode) -> (u32, f64) {
        match mode {
            ResponseMode::Short => (
                self.generation.short_max_tokens,
                self.generation.short_temperature,
            ),
            ResponseMode::Detailed => (
                self.generation.detailed_max_tokens,
                self.generation.detailed_temperature,
            ),
        }
    }

    /// Screens a message and records it when it passes. `channel_label` is
    /// only awaited for messages that pass.
    pub async fn admit<L>(
        &self,
        gate: &MessageGate,
        mut incoming: InboundMessage,
        self_id: &str,
        channel_label: L,
    ) -> Result<Admission>
    where
        L: Future<Output = Option<String>>,
    {
        match gate.screen(&incoming, self_id, self.is_active()) {
            Verdict::Proceed => {}
            verdict => return Ok(Admission::Screened(verdict)),
        }
        if incoming.channel_label.is_none() {
            incoming.channel_label = channel_label.await;
        }
        let mentioned = incoming.mentions(self_id);
        self.observe(incoming, mentioned).await.map(Admission::Accepted)
    }

    /// Accepts a message into the pipeline. Runs the `on_message` hooks,
    /// which record it in the channel history.
    pub async fn observe(&self, incoming: InboundMessage, mentioned: bool) -> Result<ResponseContext> {
        let mode = ResponseMode::for_mention(mentioned);
        info!(
            "Message from {} ({mode} mode): {}",
            incoming.author_tag,
            incoming.preview(100)
        );
        let mut ctx = ResponseContext::new(incoming, mode);
        self.pipeline.read().await.run_on_message(&mut ctx).await?;
        Ok(ctx)
    }

    /// Generates and post-processes the reply. `Ok(None)` means nothing
    /// should be sent.
    pub async fn respond(&self, mut ctx: ResponseContext) -> Result<Option<String>> {
        let pipeline = self.pipeline.read().await;
        pipeline.run_pre_inference(&mut ctx).await?;

        let (max_tokens, temperature) = self.budget(ctx.mode);
        let call = GenerationCall {
            input: prompt::build_input(&ctx.request()),
            system_instruction: prompt::system_instruction(ctx.mode, &self.generation.prompt_id),
            max_tokens,
            temperature,
        };
        info!(
            "Generating for: {} ({} mode, max_tokens={max_tokens})",
            ctx.incoming.preview(50),
            ctx.mode
        );

        ctx.reply = self.inference.generate(&call).await?;
        if ctx.reply.is_none() {
            return Ok(None);
        }
        pipeline.run_post_inference(&mut ctx).await?;

        Ok(ctx.reply.filter(|reply| !reply.trim().is_empty()))
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.pipeline.write().await.stop_all().await
    }
}
