// Spam engine - core business logic for abuse-rate detection.
//
// The engine watches per-user activity, detects when a guild-configured
// threshold breaks inside a sliding window, and dispatches the configured
// moderation action exactly once per violation.
//
// NO Discord dependencies here - just pure domain logic behind ports.

use super::moderation_models::{
    ActionKind, ActionOutcome, ActivityEvent, ClassifierKind, EngineSettings, MessageHandle,
    SpamTriggerConfig, ViolationResult,
};
use super::tracker::{TrackedWindow, TrackerTable, WindowKey};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Semaphore};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum SpamEngineError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Moderation action failed: {0}")]
    ActionError(String),

    #[error("Message deletion failed: {0}")]
    DeletionError(String),
}

// ============================================================================
// PORTS
// ============================================================================

/// Per-guild trigger configuration, read once per event.
///
/// Read-only from the engine's perspective; an admin surface mutates it
/// through `save_trigger_config` out of band.
#[async_trait]
pub trait TriggerConfigStore: Send + Sync {
    /// All trigger configs for a guild, one per configured classifier.
    async fn get_trigger_configs(
        &self,
        guild_id: u64,
    ) -> Result<Vec<SpamTriggerConfig>, SpamEngineError>;

    /// Upsert one trigger config.
    async fn save_trigger_config(&self, config: SpamTriggerConfig) -> Result<(), SpamEngineError>;

    /// Create the default triggers for a guild that has none yet.
    /// Called when a guild first becomes known.
    async fn ensure_guild_defaults(&self, guild_id: u64) -> Result<(), SpamEngineError>;
}

/// Moderation actions against a user. Each call may fail (insufficient
/// permission, user already gone) and must surface that as an error the
/// engine can log and swallow.
#[async_trait]
pub trait ModerationApi: Send + Sync {
    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), SpamEngineError>;

    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), SpamEngineError>;

    async fn timeout(
        &self,
        guild_id: u64,
        user_id: u64,
        duration: Duration,
        reason: &str,
    ) -> Result<(), SpamEngineError>;
}

/// Channel-scoped message deletion. `bulk_delete` succeeds or fails
/// atomically per call; `delete_one` has an independent per-message outcome.
#[async_trait]
pub trait MessageDeleter: Send + Sync {
    async fn bulk_delete(
        &self,
        channel_id: u64,
        message_ids: &[u64],
    ) -> Result<(), SpamEngineError>;

    async fn delete_one(&self, channel_id: u64, message_id: u64) -> Result<(), SpamEngineError>;
}

// ============================================================================
// TRIGGER EVALUATION
// ============================================================================

/// Decide whether the window's current state breaches the configured
/// threshold. Must run after pruning - a burst that already aged out of the
/// window cannot retroactively trigger.
///
/// On a violation the window is drained: the contributing handles ride on
/// the result and the window resets to empty, so a single burst cannot
/// re-trigger while the action is still being applied.
pub fn evaluate(
    user_id: u64,
    guild_id: u64,
    window: &mut TrackedWindow,
    config: &SpamTriggerConfig,
) -> Option<ViolationResult> {
    if !config.is_enabled() {
        return None;
    }

    let breached = match config.classifier {
        ClassifierKind::Uniform => window.total_count() >= config.threshold as usize,
        ClassifierKind::Dispersed => window.active_channel_count() >= config.threshold as usize,
    };

    if !breached {
        return None;
    }

    Some(ViolationResult {
        user_id,
        guild_id,
        classifier: config.classifier,
        handles: window.drain_all_handles(),
    })
}

// ============================================================================
// ENGINE
// ============================================================================

/// Abuse-rate detection and moderation-action engine.
///
/// Generic over its three ports so tests can inject mocks, following the
/// same pattern as the other services in core.
pub struct SpamEngine<S: TriggerConfigStore, M: ModerationApi, D: MessageDeleter> {
    configs: S,
    actions: M,
    deleter: D,
    tracker: TrackerTable,
    settings: EngineSettings,
    event_permits: Arc<Semaphore>,
    /// Tail of each user's arrival chain: the receiver resolves when the
    /// most recently enqueued event for that user finishes processing.
    intake_chain: DashMap<u64, oneshot::Receiver<()>>,
}

impl<S, M, D> SpamEngine<S, M, D>
where
    S: TriggerConfigStore + 'static,
    M: ModerationApi + 'static,
    D: MessageDeleter + 'static,
{
    pub fn new(configs: S, actions: M, deleter: D) -> Self {
        Self::with_settings(configs, actions, deleter, EngineSettings::default())
    }

    pub fn with_settings(configs: S, actions: M, deleter: D, settings: EngineSettings) -> Self {
        let event_permits = Arc::new(Semaphore::new(settings.max_concurrent_events));
        Self {
            configs,
            actions,
            deleter,
            tracker: TrackerTable::new(),
            settings,
            event_permits,
            intake_chain: DashMap::new(),
        }
    }

    /// Non-blocking intake: offload the per-event work to its own task so a
    /// slow ban or deletion round-trip cannot stall the gateway. The
    /// semaphore bounds in-flight work instead of letting tasks pile up
    /// without limit. Errors are logged here and never reach the caller.
    ///
    /// A user's events are chained in the order this method sees them: each
    /// task waits for its predecessor to finish before touching the tracker,
    /// so two tasks for the same user can never reach the window out of
    /// arrival order. Different users' chains run fully in parallel.
    pub fn handle_event(self: &Arc<Self>, event: ActivityEvent) {
        let engine = Arc::clone(self);
        let permits = Arc::clone(&self.event_permits);

        // Claim the chain position synchronously, before spawning; the
        // predecessor (if any) is whatever tail the map held for this user.
        let (done_tx, done_rx) = oneshot::channel();
        let predecessor = self.intake_chain.insert(event.user_id, done_rx);

        tokio::spawn(async move {
            if let Some(predecessor) = predecessor {
                // Err means the predecessor task is already gone; either way
                // it finished before us.
                let _ = predecessor.await;
            }
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                // Semaphore is never closed while the engine lives.
                Err(_) => return,
            };
            if let Err(err) = engine.process_event(&event).await {
                tracing::error!(
                    user_id = event.user_id,
                    guild_id = event.guild_id,
                    "Spam check failed: {}",
                    err
                );
            }
            let _ = done_tx.send(());
        });
    }

    /// Run one event through every configured classifier for its guild:
    /// record -> prune -> evaluate -> (on violation) dispatch.
    /// Returns the outcome of each violation that fired, usually zero or one.
    pub async fn process_event(
        &self,
        event: &ActivityEvent,
    ) -> Result<Vec<ActionOutcome>, SpamEngineError> {
        let configs = self.configs.get_trigger_configs(event.guild_id).await?;

        let mut outcomes = Vec::new();
        for config in &configs {
            if !config.is_enabled() {
                continue;
            }
            if let Some(outcome) = self.run_classifier(event, config).await {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    /// One classifier pass under that classifier's per-user lock. The lock
    /// covers record/prune/evaluate only; the external action and deletion
    /// calls run after it drops so they never block other events for the
    /// same user's other classifier or other users.
    async fn run_classifier(
        &self,
        event: &ActivityEvent,
        config: &SpamTriggerConfig,
    ) -> Option<ActionOutcome> {
        let key = WindowKey {
            user_id: event.user_id,
            classifier: config.classifier,
        };
        let slot = self.tracker.window(key);

        let violation = {
            let mut window = slot.lock().await;
            window.record(event.channel_id, event.timestamp, event.message_id);
            window.prune(config.window(), event.timestamp);
            evaluate(event.user_id, event.guild_id, &mut window, config)
        };

        match violation {
            Some(violation) => Some(self.dispatch(violation, config).await),
            None => None,
        }
    }

    /// Apply the configured action for a violation, then optionally purge
    /// the contributing messages. Neither step can fail the pipeline.
    pub async fn dispatch(
        &self,
        violation: ViolationResult,
        config: &SpamTriggerConfig,
    ) -> ActionOutcome {
        let action_applied = self.apply_action(&violation, config).await;

        let deleted_messages = if config.delete_on_trigger {
            self.delete_contributing(&violation).await
        } else {
            0
        };

        tracing::info!(
            user_id = violation.user_id,
            guild_id = violation.guild_id,
            classifier = %violation.classifier,
            action = %config.action,
            action_applied,
            deleted_messages,
            "Spam violation handled"
        );

        ActionOutcome {
            action: config.action,
            action_applied,
            deleted_messages,
        }
    }

    async fn apply_action(&self, violation: &ViolationResult, config: &SpamTriggerConfig) -> bool {
        let reason = format!("Spam detected ({} trigger)", violation.classifier);

        let result = match config.action {
            ActionKind::Ban => {
                self.actions
                    .ban(violation.guild_id, violation.user_id, &reason)
                    .await
            }
            ActionKind::Kick => {
                self.actions
                    .kick(violation.guild_id, violation.user_id, &reason)
                    .await
            }
            ActionKind::Timeout => {
                self.actions
                    .timeout(
                        violation.guild_id,
                        violation.user_id,
                        config.timeout_duration(),
                        &reason,
                    )
                    .await
            }
            ActionKind::NoAction => {
                tracing::info!(
                    user_id = violation.user_id,
                    guild_id = violation.guild_id,
                    classifier = %violation.classifier,
                    "Spam violation detected (monitoring only)"
                );
                Ok(())
            }
        };

        match result {
            Ok(()) => true,
            Err(err) => {
                // No retry: the user's next message re-runs evaluation anyway.
                tracing::warn!(
                    user_id = violation.user_id,
                    guild_id = violation.guild_id,
                    classifier = %violation.classifier,
                    "Failed to apply {} action: {}",
                    config.action,
                    err
                );
                false
            }
        }
    }

    /// Delete the messages that contributed to a violation. Bulk deletion
    /// only works on recent messages, so each channel's batch is split at
    /// the cutoff; a failed bulk call falls back to one-by-one deletion and
    /// individual failures are skipped. Returns the number deleted.
    async fn delete_contributing(&self, violation: &ViolationResult) -> usize {
        let mut by_channel: HashMap<u64, Vec<MessageHandle>> = HashMap::new();
        for handle in &violation.handles {
            by_channel.entry(handle.channel_id).or_default().push(*handle);
        }

        let now = Utc::now();
        let mut deleted = 0usize;

        for (channel_id, handles) in by_channel {
            let (recent, old): (Vec<_>, Vec<_>) = handles
                .into_iter()
                .partition(|handle| now - handle.timestamp < self.settings.bulk_delete_cutoff);

            let recent_ids: Vec<u64> = recent.iter().map(|h| h.message_id).collect();
            if recent_ids.len() > 1 {
                match self.deleter.bulk_delete(channel_id, &recent_ids).await {
                    Ok(()) => deleted += recent_ids.len(),
                    Err(err) => {
                        tracing::debug!(
                            channel_id,
                            "Bulk delete failed ({}), deleting individually",
                            err
                        );
                        deleted += self.delete_individually(channel_id, &recent_ids).await;
                    }
                }
            } else {
                deleted += self.delete_individually(channel_id, &recent_ids).await;
            }

            let old_ids: Vec<u64> = old.iter().map(|h| h.message_id).collect();
            deleted += self.delete_individually(channel_id, &old_ids).await;
        }

        deleted
    }

    async fn delete_individually(&self, channel_id: u64, message_ids: &[u64]) -> usize {
        let mut deleted = 0usize;
        for message_id in message_ids {
            match self.deleter.delete_one(channel_id, *message_id).await {
                Ok(()) => deleted += 1,
                // A message already gone or unreachable is not an error.
                Err(err) => {
                    tracing::debug!(channel_id, message_id, "Skipping undeletable message: {}", err)
                }
            }
        }
        deleted
    }

    /// Drop tracked windows for users who went quiet, bounding memory on
    /// long-lived deployments. Called from a background sweep. Chain tails
    /// whose last task already finished are dropped in the same pass.
    pub fn evict_idle(&self) -> usize {
        self.intake_chain.retain(|_, pending| {
            matches!(pending.try_recv(), Err(oneshot::error::TryRecvError::Empty))
        });
        self.tracker.evict_idle(self.settings.idle_window_ttl, Utc::now())
    }

    /// Seed the default triggers for a newly known guild.
    pub async fn ensure_guild_defaults(&self, guild_id: u64) -> Result<(), SpamEngineError> {
        self.configs.ensure_guild_defaults(guild_id).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
