use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use pulpit_core::{load_config_or_default, BotConfig, Credentials, PluginLoader};
use pulpit_plugin_cleaner::CleanerPlugin;
use pulpit_plugin_condenser::CondenserPlugin;
use pulpit_plugin_context::{ContextPlugin, ContextWindow};
use pulpit_plugin_gateway_discord::responder::Responder;
use pulpit_plugin_gateway_discord::{build_discord_client, go_invisible, GatewaySettings};
use pulpit_plugin_inference::InferenceService;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("Pulpit starting...");

    let config_path = std::env::var("PULPIT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("pulpit.toml"));
    let raw_config = load_config_or_default(&config_path)?;
    let config = BotConfig::from_value(&raw_config)?;
    let credentials = Credentials::from_env()?;

    let window = Arc::new(ContextWindow::default());
    let mut pipeline = PluginLoader::new();
    pipeline.register(ContextPlugin::create(window.clone()));
    pipeline.register(CleanerPlugin::create()?);
    pipeline.register(CondenserPlugin::create());
    pipeline.start_all(&raw_config).await?;

    let generation = config.generation.clone();
    let inference = InferenceService::openai(
        &generation.api_base,
        &credentials.openai_api_key,
        &generation.prompt_id,
        &generation.fallback_model,
    );
    let responder = Arc::new(Responder::new(
        pipeline,
        window,
        inference,
        generation,
        credentials.admin_user_ids.clone(),
    ));

    let settings = GatewaySettings {
        bot: config.bot,
        persona: config.persona,
    };
    let mut client =
        build_discord_client(&credentials.discord_token, responder.clone(), settings).await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            tracing::error!("Failed to listen for shutdown signal: {e}");
            return;
        }
        tracing::info!("Shutting down...");
        go_invisible(&shard_manager).await;
        // let the presence update reach the gateway
        tokio::time::sleep(Duration::from_millis(500)).await;
        shard_manager.shutdown_all().await;
    });

    tracing::info!("Pulpit initialized. Press Ctrl+C to stop.");
    if let Err(e) = client.start().await {
        tracing::error!("Discord client error: {e}");
    }

    responder.shutdown().await?;
    tracing::info!("Pulpit stopped");
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
