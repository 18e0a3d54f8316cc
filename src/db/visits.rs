use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::{
    connection::Database,
    helpers::{parse_datetime, parse_status, to_i64, to_u64},
};
use crate::models::VisitRecord;

fn row_to_visit(row: &Row) -> Result<VisitRecord> {
    let status: String = row.get("status")?;
    let required_secs: i64 = row.get("required_secs")?;
    let elapsed_secs: i64 = row.get("elapsed_secs")?;
    let coins_earned: Option<i64> = row.get("coins_earned")?;
    let started_at: String = row.get("started_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(VisitRecord {
        id: row.get("id")?,
        campaign_id: row.get("campaign_id")?,
        status: parse_status(&status)?,
        required_secs: to_u64(required_secs, "required_secs")?,
        elapsed_secs: to_u64(elapsed_secs, "elapsed_secs")?,
        coins_earned: coins_earned
            .map(|coins| to_u64(coins, "coins_earned"))
            .transpose()?,
        started_at: parse_datetime(&started_at, "started_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    /// Writes a batch of visits and key/value entries in one transaction.
    pub async fn write_batch(
        &self,
        visits: Vec<VisitRecord>,
        state: Vec<(String, String)>,
    ) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            for record in &visits {
                tx.execute(
                    "INSERT INTO visits (id, campaign_id, status, required_secs, elapsed_secs, coins_earned, started_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(id) DO UPDATE SET
                        status = excluded.status,
                        elapsed_secs = excluded.elapsed_secs,
                        coins_earned = excluded.coins_earned,
                        updated_at = excluded.updated_at",
                    params![
                        record.id,
                        record.campaign_id,
                        record.status.as_str(),
                        to_i64(record.required_secs)?,
                        to_i64(record.elapsed_secs)?,
                        record.coins_earned.map(to_i64).transpose()?,
                        record.started_at.to_rfc3339(),
                        record.updated_at.to_rfc3339(),
                    ],
                )
                .with_context(|| format!("failed to write visit {}", record.id))?;
            }

            let now = Utc::now().to_rfc3339();
            for (key, value) in &state {
                tx.execute(
                    "INSERT INTO kv_state (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, value, now],
                )
                .with_context(|| format!("failed to write state key {key}"))?;
            }

            tx.commit().context("failed to commit cache batch")?;
            Ok(())
        })
        .await
    }

    pub async fn recent_visits(&self, limit: usize) -> Result<Vec<VisitRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, campaign_id, status, required_secs, elapsed_secs, coins_earned, started_at, updated_at
                 FROM visits
                 ORDER BY started_at DESC
                 LIMIT ?1",
            )?;
            let mut rows = stmt.query(params![limit])?;
            let mut visits = Vec::new();
            while let Some(row) = rows.next()? {
                visits.push(row_to_visit(row)?);
            }
            Ok(visits)
        })
        .await
    }

    pub async fn get_state(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM kv_state WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }
}
