// Serenity-backed implementations of the engine's moderation ports.

use crate::core::moderation::{MessageDeleter, ModerationApi, SpamEngineError};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;

pub struct SerenityModerationApi {
    http: Arc<serenity::Http>,
}

impl SerenityModerationApi {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ModerationApi for SerenityModerationApi {
    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), SpamEngineError> {
        serenity::GuildId::new(guild_id)
            .ban_with_reason(&self.http, serenity::UserId::new(user_id), 0, reason)
            .await
            .map_err(|e| SpamEngineError::ActionError(e.to_string()))
    }

    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), SpamEngineError> {
        serenity::GuildId::new(guild_id)
            .kick_with_reason(&self.http, serenity::UserId::new(user_id), reason)
            .await
            .map_err(|e| SpamEngineError::ActionError(e.to_string()))
    }

    async fn timeout(
        &self,
        guild_id: u64,
        user_id: u64,
        duration: Duration,
        reason: &str,
    ) -> Result<(), SpamEngineError> {
        let until = serenity::Timestamp::from_unix_timestamp(
            chrono::Utc::now().timestamp() + duration.as_secs() as i64,
        )
        .map_err(|e| SpamEngineError::ActionError(e.to_string()))?;

        serenity::GuildId::new(guild_id)
            .edit_member(
                &self.http,
                serenity::UserId::new(user_id),
                serenity::EditMember::new()
                    .disable_communication_until_datetime(until)
                    .audit_log_reason(reason),
            )
            .await
            .map(|_| ())
            .map_err(|e| SpamEngineError::ActionError(e.to_string()))
    }
}

pub struct SerenityMessageDeleter {
    http: Arc<serenity::Http>,
}

impl SerenityMessageDeleter {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MessageDeleter for SerenityMessageDeleter {
    async fn bulk_delete(
        &self,
        channel_id: u64,
        message_ids: &[u64],
    ) -> Result<(), SpamEngineError> {
        let message_ids: Vec<serenity::MessageId> = message_ids
            .iter()
            .map(|&id| serenity::MessageId::new(id))
            .collect();
        serenity::ChannelId::new(channel_id)
            .delete_messages(&self.http, &message_ids)
            .await
            .map_err(|e| SpamEngineError::DeletionError(e.to_string()))
    }

    async fn delete_one(&self, channel_id: u64, message_id: u64) -> Result<(), SpamEngineError> {
        serenity::ChannelId::new(channel_id)
            .delete_message(&self.http, serenity::MessageId::new(message_id))
            .await
            .map_err(|e| SpamEngineError::DeletionError(e.to_string()))
    }
}
