// SQLite-backed trigger-config store.
//
// Tables:
// - spam_triggers: per-guild, per-classifier trigger configuration

use crate::core::moderation::{
    ActionKind, ClassifierKind, SpamEngineError, SpamTriggerConfig, TriggerConfigStore,
};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteTriggerStore {
    pool: Pool<Sqlite>,
}

impl SqliteTriggerStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), SpamEngineError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS spam_triggers (
                guild_id INTEGER NOT NULL,
                classifier TEXT NOT NULL,
                threshold INTEGER NOT NULL,
                window_secs REAL NOT NULL,
                action TEXT NOT NULL,
                timeout_duration_secs INTEGER,
                delete_on_trigger BOOLEAN NOT NULL DEFAULT 0,
                PRIMARY KEY (guild_id, classifier)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SpamEngineError::StorageError(e.to_string()))?;

        Ok(())
    }

    fn config_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SpamTriggerConfig, SpamEngineError> {
        let guild_id: i64 = row.get("guild_id");
        let classifier_str: String = row.get("classifier");
        let action_str: String = row.get("action");

        let classifier = ClassifierKind::parse(&classifier_str).ok_or_else(|| {
            SpamEngineError::StorageError(format!("unknown classifier '{}'", classifier_str))
        })?;
        let action = ActionKind::parse(&action_str).ok_or_else(|| {
            SpamEngineError::StorageError(format!("unknown action '{}'", action_str))
        })?;

        Ok(SpamTriggerConfig {
            guild_id: guild_id as u64,
            classifier,
            threshold: row.get::<i32, _>("threshold") as u32,
            window_secs: row.get("window_secs"),
            action,
            timeout_duration_secs: row
                .get::<Option<i64>, _>("timeout_duration_secs")
                .map(|secs| secs as u64),
            delete_on_trigger: row.get("delete_on_trigger"),
        })
    }
}

#[async_trait]
impl TriggerConfigStore for SqliteTriggerStore {
    async fn get_trigger_configs(
        &self,
        guild_id: u64,
    ) -> Result<Vec<SpamTriggerConfig>, SpamEngineError> {
        let rows = sqlx::query("SELECT * FROM spam_triggers WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SpamEngineError::StorageError(e.to_string()))?;

        let mut configs = Vec::with_capacity(2);
        for row in &rows {
            configs.push(Self::config_from_row(row)?);
        }

        // Classifiers without a persisted row still get their defaults so
        // the engine always sees both.
        for classifier in ClassifierKind::ALL {
            if !configs.iter().any(|c| c.classifier == classifier) {
                configs.push(SpamTriggerConfig::default_for(guild_id, classifier));
            }
        }

        Ok(configs)
    }

    async fn save_trigger_config(&self, config: SpamTriggerConfig) -> Result<(), SpamEngineError> {
        sqlx::query(
            r#"
            INSERT INTO spam_triggers (
                guild_id, classifier, threshold, window_secs, action,
                timeout_duration_secs, delete_on_trigger
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(guild_id, classifier) DO UPDATE SET
                threshold = excluded.threshold,
                window_secs = excluded.window_secs,
                action = excluded.action,
                timeout_duration_secs = excluded.timeout_duration_secs,
                delete_on_trigger = excluded.delete_on_trigger
            "#,
        )
        .bind(config.guild_id as i64)
        .bind(config.classifier.as_str())
        .bind(config.threshold as i32)
        .bind(config.window_secs)
        .bind(config.action.as_str())
        .bind(config.timeout_duration_secs.map(|secs| secs as i64))
        .bind(config.delete_on_trigger)
        .execute(&self.pool)
        .await
        .map_err(|e| SpamEngineError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn ensure_guild_defaults(&self, guild_id: u64) -> Result<(), SpamEngineError> {
        for classifier in ClassifierKind::ALL {
            let existing = sqlx::query(
                "SELECT 1 FROM spam_triggers WHERE guild_id = ? AND classifier = ?",
            )
            .bind(guild_id as i64)
            .bind(classifier.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SpamEngineError::StorageError(e.to_string()))?;

            if existing.is_none() {
                self.save_trigger_config(SpamTriggerConfig::default_for(guild_id, classifier))
                    .await?;
                tracing::info!(guild_id, %classifier, "Created default spam trigger");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    async fn test_store() -> (SqliteTriggerStore, NamedTempFile) {
        let tmp = NamedTempFile::new().unwrap();
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect(&format!("sqlite://{}?mode=rwc", tmp.path().display()))
            .await
            .unwrap();
        let store = SqliteTriggerStore::new(pool);
        store.migrate().await.unwrap();
        (store, tmp)
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let (store, _tmp) = test_store().await;

        let config = SpamTriggerConfig {
            guild_id: 42,
            classifier: ClassifierKind::Uniform,
            threshold: 8,
            window_secs: 2.5,
            action: ActionKind::Kick,
            timeout_duration_secs: None,
            delete_on_trigger: true,
        };
        store.save_trigger_config(config.clone()).await.unwrap();

        let configs = store.get_trigger_configs(42).await.unwrap();
        let uniform = configs
            .iter()
            .find(|c| c.classifier == ClassifierKind::Uniform)
            .unwrap();
        assert_eq!(*uniform, config);
    }

    #[tokio::test]
    async fn missing_rows_fall_back_to_defaults() {
        let (store, _tmp) = test_store().await;

        let configs = store.get_trigger_configs(7).await.unwrap();
        assert_eq!(configs.len(), 2);
        assert!(configs
            .iter()
            .any(|c| c.classifier == ClassifierKind::Dispersed && c.action == ActionKind::Ban));
    }

    #[tokio::test]
    async fn ensure_defaults_seeds_once_and_preserves_edits() {
        let (store, _tmp) = test_store().await;

        store.ensure_guild_defaults(7).await.unwrap();

        let mut edited = SpamTriggerConfig::default_for(7, ClassifierKind::Uniform);
        edited.threshold = 20;
        store.save_trigger_config(edited).await.unwrap();

        // A second seeding pass must not overwrite the edit.
        store.ensure_guild_defaults(7).await.unwrap();

        let configs = store.get_trigger_configs(7).await.unwrap();
        let uniform = configs
            .iter()
            .find(|c| c.classifier == ClassifierKind::Uniform)
            .unwrap();
        assert_eq!(uniform.threshold, 20);
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_row() {
        let (store, _tmp) = test_store().await;

        let mut config = SpamTriggerConfig::default_for(9, ClassifierKind::Dispersed);
        store.save_trigger_config(config.clone()).await.unwrap();

        config.threshold = 5;
        config.action = ActionKind::NoAction;
        store.save_trigger_config(config.clone()).await.unwrap();

        let configs = store.get_trigger_configs(9).await.unwrap();
        let dispersed = configs
            .iter()
            .find(|c| c.classifier == ClassifierKind::Dispersed)
            .unwrap();
        assert_eq!(dispersed.threshold, 5);
        assert_eq!(dispersed.action, ActionKind::NoAction);
    }
}
