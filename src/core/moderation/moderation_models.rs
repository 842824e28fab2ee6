// Moderation domain models - data structures for the spam detection engine.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts these to Discord-specific API calls.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Fallback timeout length when a Timeout trigger has no duration configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// One spam-detection strategy. Each guild evaluates both independently;
/// they never share tracked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassifierKind {
    /// Raw message volume from one user, regardless of channel.
    Uniform,
    /// Cross-channel flooding: the same user posting in many distinct
    /// channels at once, the typical signature of a compromised account.
    Dispersed,
}

impl ClassifierKind {
    pub const ALL: [ClassifierKind; 2] = [ClassifierKind::Uniform, ClassifierKind::Dispersed];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierKind::Uniform => "Uniform",
            ClassifierKind::Dispersed => "Dispersed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Uniform" => Some(ClassifierKind::Uniform),
            "Dispersed" => Some(ClassifierKind::Dispersed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The moderation response configured for a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Ban,
    Kick,
    Timeout,
    /// Log-only; used to monitor a trigger without enforcing it.
    NoAction,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Ban => "Ban",
            ActionKind::Kick => "Kick",
            ActionKind::Timeout => "Timeout",
            ActionKind::NoAction => "NoAction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Ban" => Some(ActionKind::Ban),
            "Kick" => Some(ActionKind::Kick),
            "Timeout" => Some(ActionKind::Timeout),
            "NoAction" => Some(ActionKind::NoAction),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound user message, reduced to what the engine needs.
/// Produced by the gateway adapter, consumed once by the tracker.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub guild_id: u64,
    pub channel_id: u64,
    pub user_id: u64,
    pub message_id: u64,
    pub timestamp: DateTime<Utc>,
}

/// Reference to a tracked message, sufficient to delete it later.
/// Deletion APIs are channel-scoped, so the channel rides along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel_id: u64,
    pub message_id: u64,
    pub timestamp: DateTime<Utc>,
}

/// Per-guild, per-classifier trigger configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpamTriggerConfig {
    pub guild_id: u64,
    pub classifier: ClassifierKind,
    /// Message count (Uniform) or distinct channel count (Dispersed).
    pub threshold: u32,
    /// Sliding window length in seconds.
    pub window_secs: f64,
    pub action: ActionKind,
    /// Only meaningful when `action` is Timeout.
    pub timeout_duration_secs: Option<u64>,
    /// Purge the messages that contributed to the violation.
    pub delete_on_trigger: bool,
}

impl SpamTriggerConfig {
    /// Default trigger created when a guild first becomes known:
    /// Uniform volume spam gets a 10 minute timeout, dispersed bot-style
    /// spam gets a ban plus message cleanup.
    pub fn default_for(guild_id: u64, classifier: ClassifierKind) -> Self {
        match classifier {
            ClassifierKind::Uniform => Self {
                guild_id,
                classifier,
                threshold: 10,
                window_secs: 5.0,
                action: ActionKind::Timeout,
                timeout_duration_secs: Some(DEFAULT_TIMEOUT_SECS),
                delete_on_trigger: false,
            },
            ClassifierKind::Dispersed => Self {
                guild_id,
                classifier,
                threshold: 3,
                window_secs: 10.0,
                action: ActionKind::Ban,
                timeout_duration_secs: None,
                delete_on_trigger: true,
            },
        }
    }

    /// A threshold of 0 or 1 is not a meaningful spam signal; treat it as
    /// "classifier disabled" rather than firing on every message.
    pub fn is_enabled(&self) -> bool {
        self.threshold > 1
    }

    pub fn window(&self) -> Duration {
        Duration::milliseconds((self.window_secs * 1000.0) as i64)
    }

    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_duration_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

/// A detected breach of one classifier's threshold for one user.
/// Transient: produced by evaluation, consumed once by dispatch.
#[derive(Debug, Clone)]
pub struct ViolationResult {
    pub user_id: u64,
    pub guild_id: u64,
    pub classifier: ClassifierKind,
    /// Every handle that was tracked when the threshold broke. Draining
    /// these out of the window is what resets it.
    pub handles: Vec<MessageHandle>,
}

/// What dispatch actually managed to do for a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionOutcome {
    pub action: ActionKind,
    /// False when the moderation API refused the action (missing
    /// permission, user already gone). Never fatal.
    pub action_applied: bool,
    pub deleted_messages: usize,
}

/// Engine-wide tunables, separate from per-guild trigger configs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Cap on in-flight per-event work units.
    pub max_concurrent_events: usize,
    /// Messages older than this cannot be bulk-deleted and fall back to
    /// one-by-one deletion. Platform constraint, observed default 14 days.
    pub bulk_delete_cutoff: Duration,
    /// Tracked windows untouched for this long are evicted to bound memory.
    pub idle_window_ttl: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_events: 64,
            bulk_delete_cutoff: Duration::days(14),
            idle_window_ttl: Duration::minutes(30),
        }
    }
}
