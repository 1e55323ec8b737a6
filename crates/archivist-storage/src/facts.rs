// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the FactStore trait.

use std::collections::BTreeSet;
use std::str::FromStr;

use archivist_config::model::StorageConfig;
use archivist_core::types::{Cardinality, FactMap, UserFact};
use archivist_core::{AdapterType, ArchivistError, FactStore, HealthStatus, PluginAdapter};
use async_trait::async_trait;
use rusqlite::params;
use tracing::debug;

use crate::database::{Database, map_tr_err};

/// SQLite-backed profile fact store.
pub struct SqliteFactStore {
    db: Database,
}

impl SqliteFactStore {
    /// Opens the database named by `config`.
    pub async fn open(config: &StorageConfig) -> Result<Self, ArchivistError> {
        let db = Database::open(&config.database_path, config.wal_mode).await?;
        Ok(Self { db })
    }

    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    /// Total number of stored fact rows.
    pub async fn count_facts(&self) -> Result<u64, ArchivistError> {
        self.db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM user_facts", [], |row| row.get(0))
            })
            .await
            .map(|n| n.max(0) as u64)
            .map_err(map_tr_err)
    }
}

fn row_to_fact(row: &rusqlite::Row<'_>) -> Result<UserFact, rusqlite::Error> {
    let cardinality: String = row.get(3)?;
    let cardinality = Cardinality::from_str(&cardinality).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(UserFact {
        subject_user_id: row.get(0)?,
        attribute_key: row.get(1)?,
        value: row.get(2)?,
        cardinality,
        confidence: row.get(4)?,
        first_seen_message_id: row.get(5)?,
        last_confirmed_message_id: row.get(6)?,
        confirmation_count: row.get(7)?,
    })
}

#[async_trait]
impl PluginAdapter for SqliteFactStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::FactStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ArchivistError> {
        self.db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT 1", [], |row| row.get(0))
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ArchivistError> {
        self.db.checkpoint_wal().await?;
        debug!("shutdown: WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl FactStore for SqliteFactStore {
    async fn get_user_facts(&self, subject_user_id: &str) -> Result<FactMap, ArchivistError> {
        let subject = subject_user_id.to_string();
        let rows = self
            .db
            .connection()
            .call(move |conn| -> Result<Vec<UserFact>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT subject_user_id, attribute_key, value, cardinality, confidence,
                            first_seen_message_id, last_confirmed_message_id, confirmation_count
                     FROM user_facts
                     WHERE subject_user_id = ?1
                     ORDER BY attribute_key, first_seen_message_id, value_key",
                )?;
                let facts = stmt
                    .query_map(params![subject], row_to_fact)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(facts)
            })
            .await
            .map_err(map_tr_err)?;

        let mut map = FactMap::new();
        for fact in rows {
            map.entry(fact.attribute_key.clone()).or_default().push(fact);
        }
        Ok(map)
    }

    async fn upsert_user_facts(
        &self,
        subject_user_id: &str,
        writes: &[UserFact],
    ) -> Result<(), ArchivistError> {
        if writes.is_empty() {
            return Ok(());
        }
        if let Some(foreign) = writes.iter().find(|f| f.subject_user_id != subject_user_id) {
            return Err(ArchivistError::Internal(format!(
                "fact for `{}` passed in a write batch for `{subject_user_id}`",
                foreign.subject_user_id
            )));
        }

        let rows: Vec<(UserFact, String)> = writes
            .iter()
            .map(|f| (f.clone(), f.value_key()))
            .collect();
        let count = rows.len();

        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO user_facts (subject_user_id, attribute_key, value_key, value,
                             cardinality, confidence, first_seen_message_id,
                             last_confirmed_message_id, confirmation_count)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                         ON CONFLICT (subject_user_id, attribute_key, value_key) DO UPDATE SET
                             value = excluded.value,
                             cardinality = excluded.cardinality,
                             confidence = excluded.confidence,
                             first_seen_message_id = excluded.first_seen_message_id,
                             last_confirmed_message_id = excluded.last_confirmed_message_id,
                             confirmation_count = excluded.confirmation_count,
                             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    )?;
                    for (fact, value_key) in &rows {
                        stmt.execute(params![
                            fact.subject_user_id,
                            fact.attribute_key,
                            value_key,
                            fact.value,
                            fact.cardinality.to_string(),
                            fact.confidence,
                            fact.first_seen_message_id,
                            fact.last_confirmed_message_id,
                            fact.confirmation_count,
                        ])?;
                    }
                }
                tx.commit()
            })
            .await
            .map_err(map_tr_err)?;

        debug!(subject = subject_user_id, count, "upserted facts");
        Ok(())
    }

    async fn known_attribute_keys(&self) -> Result<BTreeSet<String>, ArchivistError> {
        self.db
            .connection()
            .call(|conn| -> Result<BTreeSet<String>, rusqlite::Error> {
                let mut stmt = conn.prepare("SELECT DISTINCT attribute_key FROM user_facts")?;
                let keys = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<BTreeSet<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(map_tr_err)
    }
}
