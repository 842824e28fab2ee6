// In-memory implementation of TriggerConfigStore.
//
// Useful for tests and for running the engine without a database; the
// SQLite implementation follows the same contract for real deployments.

use crate::core::moderation::{
    ClassifierKind, SpamEngineError, SpamTriggerConfig, TriggerConfigStore,
};
use async_trait::async_trait;
use dashmap::DashMap;

/// Composite key: one trigger per guild per classifier.
#[derive(Hash, Eq, PartialEq, Clone, Debug)]
struct TriggerKey {
    guild_id: u64,
    classifier: ClassifierKind,
}

pub struct InMemoryTriggerStore {
    configs: DashMap<TriggerKey, SpamTriggerConfig>,
}

impl InMemoryTriggerStore {
    pub fn new() -> Self {
        Self {
            configs: DashMap::new(),
        }
    }
}

impl Default for InMemoryTriggerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TriggerConfigStore for InMemoryTriggerStore {
    async fn get_trigger_configs(
        &self,
        guild_id: u64,
    ) -> Result<Vec<SpamTriggerConfig>, SpamEngineError> {
        // A guild that was never seeded still gets the defaults, mirroring
        // the SQLite store's behavior for missing rows.
        Ok(ClassifierKind::ALL
            .iter()
            .map(|classifier| {
                let key = TriggerKey {
                    guild_id,
                    classifier: *classifier,
                };
                self.configs
                    .get(&key)
                    .map(|entry| entry.clone())
                    .unwrap_or_else(|| SpamTriggerConfig::default_for(guild_id, *classifier))
            })
            .collect())
    }

    async fn save_trigger_config(&self, config: SpamTriggerConfig) -> Result<(), SpamEngineError> {
        let key = TriggerKey {
            guild_id: config.guild_id,
            classifier: config.classifier,
        };
        self.configs.insert(key, config);
        Ok(())
    }

    async fn ensure_guild_defaults(&self, guild_id: u64) -> Result<(), SpamEngineError> {
        for classifier in ClassifierKind::ALL {
            let key = TriggerKey {
                guild_id,
                classifier,
            };
            self.configs
                .entry(key)
                .or_insert_with(|| SpamTriggerConfig::default_for(guild_id, classifier));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::ActionKind;

    #[tokio::test]
    async fn unseeded_guild_gets_defaults() {
        let store = InMemoryTriggerStore::new();

        let configs = store.get_trigger_configs(1).await.unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].classifier, ClassifierKind::Uniform);
        assert_eq!(configs[0].action, ActionKind::Timeout);
        assert_eq!(configs[1].classifier, ClassifierKind::Dispersed);
        assert_eq!(configs[1].action, ActionKind::Ban);
        assert!(configs[1].delete_on_trigger);
    }

    #[tokio::test]
    async fn saved_config_overrides_default() {
        let store = InMemoryTriggerStore::new();
        store.ensure_guild_defaults(1).await.unwrap();

        let mut config = SpamTriggerConfig::default_for(1, ClassifierKind::Uniform);
        config.threshold = 7;
        config.action = ActionKind::Kick;
        store.save_trigger_config(config).await.unwrap();

        let configs = store.get_trigger_configs(1).await.unwrap();
        let uniform = configs
            .iter()
            .find(|c| c.classifier == ClassifierKind::Uniform)
            .unwrap();
        assert_eq!(uniform.threshold, 7);
        assert_eq!(uniform.action, ActionKind::Kick);
    }

    #[tokio::test]
    async fn ensure_defaults_does_not_clobber_existing() {
        let store = InMemoryTriggerStore::new();

        let mut config = SpamTriggerConfig::default_for(1, ClassifierKind::Dispersed);
        config.threshold = 9;
        store.save_trigger_config(config).await.unwrap();

        store.ensure_guild_defaults(1).await.unwrap();

        let configs = store.get_trigger_configs(1).await.unwrap();
        let dispersed = configs
            .iter()
            .find(|c| c.classifier == ClassifierKind::Dispersed)
            .unwrap();
        assert_eq!(dispersed.threshold, 9);
    }
}
