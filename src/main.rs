// This is the entry point of the spam sentinel bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases)
// - `discord/` = Discord-specific adapters (event glue, API calls)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize the trigger-config store and the engine
// 3. Set up the Discord framework
// 4. Register the event handler and background sweeps

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::moderation::{EngineSettings, SpamEngine};
use crate::discord::action_api::{SerenityMessageDeleter, SerenityModerationApi};
use crate::discord::{spam_handler, Data, Error};
use crate::infra::moderation::SqliteTriggerStore;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Event handler for non-command Discord events.
/// Messages feed the spam engine; guild creation seeds default triggers.
async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            spam_handler::handle_message(&data.engine, new_message);
        }
        serenity::FullEvent::GuildCreate { guild, is_new: _ } => {
            if let Err(e) = data.engine.ensure_guild_defaults(guild.id.get()).await {
                tracing::error!("Failed to seed trigger defaults for guild {}: {}", guild.id, e);
            }
        }
        _ => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Get Discord bot token from environment
    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );

    // Keep runtime databases in a dedicated folder so the repo root stays tidy.
    let data_dir = "data";
    std::fs::create_dir_all(data_dir).expect("Failed to create data directory for SQLite files");
    let trigger_db_path = format!("{}/triggers.db", data_dir);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // The trigger store is built here; the engine itself is assembled in the
    // framework setup once the HTTP client exists for the API adapters.

    let trigger_pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}?mode=rwc", trigger_db_path))
        .await
        .expect("Failed to connect to trigger DB");
    let trigger_store = SqliteTriggerStore::new(trigger_pool);
    trigger_store
        .migrate()
        .await
        .expect("Failed to migrate trigger DB");

    let settings = EngineSettings::default();

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    // Message content is not needed: the engine only counts message
    // metadata (who, where, when).
    let intents = serenity::GatewayIntents::GUILD_MESSAGES | serenity::GatewayIntents::GUILDS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![],
            // Event handler for messages and guild lifecycle
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, _framework| {
            Box::pin(async move {
                tracing::info!("Spam sentinel starting up");

                let actions = SerenityModerationApi::new(ctx.http.clone());
                let deleter = SerenityMessageDeleter::new(ctx.http.clone());
                let engine = Arc::new(SpamEngine::with_settings(
                    trigger_store,
                    actions,
                    deleter,
                    settings,
                ));

                // Background sweep: drop tracked windows for users who went
                // quiet so memory stays bounded on long-lived deployments.
                let sweeper = Arc::clone(&engine);
                tokio::spawn(async move {
                    use std::time::Duration as StdDuration;
                    use tokio::time::sleep;

                    loop {
                        sleep(StdDuration::from_secs(300)).await;
                        let evicted = sweeper.evict_idle();
                        if evicted > 0 {
                            tracing::debug!("Evicted {} idle tracked windows", evicted);
                        }
                    }
                });

                tracing::info!("Spam sentinel ready");
                Ok(Data { engine })
            })
        })
        .build();

    // Create the client and start the bot
    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    client.start().await.expect("Error running bot");
}
