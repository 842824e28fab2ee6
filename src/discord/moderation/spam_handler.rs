// Discord-specific spam handling - feeds gateway messages into the engine.

use crate::core::moderation::ActivityEvent;
use crate::discord::LiveEngine;
use chrono::Utc;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Hand a gateway message to the spam engine.
///
/// Returns immediately: the engine offloads its own work, so the gateway
/// event loop is never blocked by evaluation or moderation calls.
pub fn handle_message(engine: &Arc<LiveEngine>, msg: &serenity::Message) {
    // Skip bots (including our own messages)
    if msg.author.bot {
        return;
    }

    // Only guild messages are tracked
    let Some(guild_id) = msg.guild_id else {
        return;
    };

    let timestamp = chrono::DateTime::from_timestamp(msg.timestamp.unix_timestamp(), 0)
        .unwrap_or_else(Utc::now);

    engine.handle_event(ActivityEvent {
        guild_id: guild_id.get(),
        channel_id: msg.channel_id.get(),
        user_id: msg.author.id.get(),
        message_id: msg.id.get(),
        timestamp,
    });
}
