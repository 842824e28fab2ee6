// Sliding-window activity tracker.
//
// One `TrackedWindow` exists per (user, classifier) and records recent
// message handles grouped by channel. The `TrackerTable` owns the windows
// and hands out per-key locks so two events for the same user can never
// race on the same window, while different users (and the two classifiers
// of one user) proceed fully in parallel.

use super::moderation_models::{ClassifierKind, MessageHandle};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Lookup key for a tracked window. Classifiers own disjoint windows, so the
/// classifier is part of the key rather than a field inside the window.
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
pub struct WindowKey {
    pub user_id: u64,
    pub classifier: ClassifierKind,
}

/// Recent activity for one user under one classifier, grouped by channel.
///
/// Invariant: after `prune(window, now)`, no retained entry is older than
/// `window`. Callers must prune before reading either aggregate count.
#[derive(Debug, Default)]
pub struct TrackedWindow {
    /// channel id -> (timestamp, message id), in arrival order per channel.
    channels: HashMap<u64, Vec<(DateTime<Utc>, u64)>>,
    last_activity: Option<DateTime<Utc>>,
}

impl TrackedWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event. O(1) amortized.
    pub fn record(&mut self, channel_id: u64, timestamp: DateTime<Utc>, message_id: u64) {
        self.channels
            .entry(channel_id)
            .or_default()
            .push((timestamp, message_id));
        self.last_activity = Some(timestamp);
    }

    /// Drop every entry whose age exceeds `window`, per channel. Channels
    /// left without entries disappear so they no longer count as active.
    pub fn prune(&mut self, window: Duration, now: DateTime<Utc>) {
        for entries in self.channels.values_mut() {
            entries.retain(|(timestamp, _)| now - *timestamp <= window);
        }
        self.channels.retain(|_, entries| !entries.is_empty());
    }

    /// Live entries across all channels (Uniform classifier input).
    pub fn total_count(&self) -> usize {
        self.channels.values().map(Vec::len).sum()
    }

    /// Channels with at least one live entry (Dispersed classifier input).
    pub fn active_channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Return and clear every tracked handle, resetting the window to empty.
    /// The window itself stays in the table (clear, not destroy).
    pub fn drain_all_handles(&mut self) -> Vec<MessageHandle> {
        self.channels
            .drain()
            .flat_map(|(channel_id, entries)| {
                entries
                    .into_iter()
                    .map(move |(timestamp, message_id)| MessageHandle {
                        channel_id,
                        message_id,
                        timestamp,
                    })
            })
            .collect()
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }
}

/// The in-memory tracking table: the engine's only shared mutable state.
///
/// Owned and injectable rather than a process-wide singleton, so tests can
/// construct one per engine instance.
pub struct TrackerTable {
    windows: DashMap<WindowKey, Arc<Mutex<TrackedWindow>>>,
}

impl TrackerTable {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Get or lazily create the window for a key. The caller locks the
    /// returned mutex for the whole record/prune/evaluate sequence.
    pub fn window(&self, key: WindowKey) -> Arc<Mutex<TrackedWindow>> {
        self.windows
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(TrackedWindow::new())))
            .clone()
    }

    /// Drop windows untouched for longer than `max_idle`. Windows with an
    /// outstanding handle are left alone: a second strong reference means an
    /// event is somewhere between lookup and lock, and evicting now would
    /// detach the window it is about to record into.
    /// Returns how many were evicted.
    pub fn evict_idle(&self, max_idle: Duration, now: DateTime<Utc>) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(window) => match window.last_activity() {
                    Some(last) => now - last <= max_idle,
                    None => false,
                },
                Err(_) => true,
            }
        });
        before - self.windows.len()
    }

    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }
}

impl Default for TrackerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn prune_never_retains_stale_entries() {
        let mut window = TrackedWindow::new();
        window.record(1, at(0), 100);
        window.record(1, at(5), 101);
        window.record(2, at(9), 102);
        window.record(2, at(12), 103);

        window.prune(Duration::seconds(10), at(12));

        // Entry at t=0 aged out; everything else is within 10s of t=12.
        assert_eq!(window.total_count(), 3);
        assert_eq!(window.active_channel_count(), 2);

        window.prune(Duration::seconds(1), at(20));
        assert_eq!(window.total_count(), 0);
        assert_eq!(window.active_channel_count(), 0);
    }

    #[test]
    fn counts_distinguish_volume_from_spread() {
        let mut window = TrackedWindow::new();
        window.record(1, at(0), 100);
        window.record(1, at(1), 101);
        window.record(1, at(2), 102);
        window.record(7, at(2), 103);

        assert_eq!(window.total_count(), 4);
        assert_eq!(window.active_channel_count(), 2);
    }

    #[test]
    fn drain_returns_everything_and_resets() {
        let mut window = TrackedWindow::new();
        window.record(1, at(0), 100);
        window.record(2, at(1), 101);
        window.record(2, at(2), 102);

        let mut handles = window.drain_all_handles();
        handles.sort_by_key(|h| h.message_id);

        assert_eq!(handles.len(), 3);
        assert_eq!(handles[0].channel_id, 1);
        assert_eq!(handles[2].message_id, 102);
        assert_eq!(window.total_count(), 0);
        assert_eq!(window.active_channel_count(), 0);

        // The window keeps working after a drain.
        window.record(3, at(3), 103);
        assert_eq!(window.total_count(), 1);
    }

    #[tokio::test]
    async fn table_creates_windows_lazily_and_shares_them() {
        let table = TrackerTable::new();
        let key = WindowKey {
            user_id: 1,
            classifier: ClassifierKind::Uniform,
        };

        let slot = table.window(key);
        slot.lock().await.record(5, at(0), 100);

        // Same key resolves to the same window.
        let again = table.window(key);
        assert_eq!(again.lock().await.total_count(), 1);

        // A different classifier for the same user is a separate window.
        let other = table.window(WindowKey {
            user_id: 1,
            classifier: ClassifierKind::Dispersed,
        });
        assert_eq!(other.lock().await.total_count(), 0);
        assert_eq!(table.tracked_users(), 2);
    }

    #[tokio::test]
    async fn idle_windows_are_evicted_active_ones_kept() {
        let table = TrackerTable::new();
        let stale = WindowKey {
            user_id: 1,
            classifier: ClassifierKind::Uniform,
        };
        let fresh = WindowKey {
            user_id: 2,
            classifier: ClassifierKind::Uniform,
        };

        table.window(stale).lock().await.record(1, at(0), 100);
        table.window(fresh).lock().await.record(1, at(1800), 101);

        let evicted = table.evict_idle(Duration::minutes(10), at(1900));
        assert_eq!(evicted, 1);
        assert_eq!(table.tracked_users(), 1);

        // The surviving window is the recently active one.
        let kept = table.window(fresh);
        assert_eq!(kept.lock().await.total_count(), 1);
    }

    #[tokio::test]
    async fn windows_with_outstanding_handles_survive_eviction() {
        let table = TrackerTable::new();
        let key = WindowKey {
            user_id: 1,
            classifier: ClassifierKind::Uniform,
        };
        table.window(key).lock().await.record(1, at(0), 100);

        // An in-flight event sits between lookup and lock: it holds the
        // window but has not locked it yet. The sweep must not detach it.
        let held = table.window(key);
        assert_eq!(table.evict_idle(Duration::minutes(10), at(3600)), 0);
        assert_eq!(table.tracked_users(), 1);

        // Once the handle is gone the same sweep evicts the window.
        drop(held);
        assert_eq!(table.evict_idle(Duration::minutes(10), at(3600)), 1);
        assert_eq!(table.tracked_users(), 0);
    }
}
