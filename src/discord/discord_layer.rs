// Discord layer - gateway event glue and moderation API adapters.

#[path = "moderation/action_api.rs"]
pub mod action_api;
#[path = "moderation/spam_handler.rs"]
pub mod spam_handler;

use crate::core::moderation::SpamEngine;
use crate::infra::moderation::SqliteTriggerStore;
use action_api::{SerenityMessageDeleter, SerenityModerationApi};
use std::sync::Arc;

/// The engine as wired for a live bot: SQLite configs, serenity-backed
/// moderation and deletion APIs.
pub type LiveEngine = SpamEngine<SqliteTriggerStore, SerenityModerationApi, SerenityMessageDeleter>;

/// Shared state for the poise framework.
pub struct Data {
    pub engine: Arc<LiveEngine>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
