use anyhow::Result;

use qrwizard_core::model::Goal;

use crate::backend::{format_ts, now_utc, parse_ts};
use crate::DuckDbBackend;

const GOAL_SELECT: &str =
    "id, qr_code_id, name, target_url, description, active, CAST(created_at AS VARCHAR)";

fn goal_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Goal> {
    Ok(Goal {
        id: row.get(0)?,
        qr_code_id: row.get(1)?,
        name: row.get(2)?,
        target_url: row.get(3)?,
        description: row.get(4)?,
        active: row.get(5)?,
        created_at: parse_ts(&row.get::<_, String>(6)?)?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct GoalDraft {
    pub qr_code_id: Option<i64>,
    pub name: String,
    pub target_url: Option<String>,
    pub description: Option<String>,
    pub active: bool,
}

impl DuckDbBackend {
    pub async fn create_goal(&self, draft: &GoalDraft) -> Result<Goal> {
        let conn = self.conn.lock().await;
        let now = now_utc();
        let id: i64 = conn
            .prepare(
                r#"INSERT INTO goals (qr_code_id, name, target_url, description, active, created_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING id"#,
            )?
            .query_row(
                duckdb::params![
                    draft.qr_code_id,
                    draft.name,
                    draft.target_url,
                    draft.description,
                    draft.active,
                    format_ts(&now),
                ],
                |row| row.get(0),
            )?;
        Ok(Goal {
            id,
            qr_code_id: draft.qr_code_id,
            name: draft.name.clone(),
            target_url: draft.target_url.clone(),
            description: draft.description.clone(),
            active: draft.active,
            created_at: now,
        })
    }

    pub async fn goal_by_id(&self, id: i64) -> Result<Option<Goal>> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {GOAL_SELECT} FROM goals WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(duckdb::params![id], goal_from_row)?;
        Ok(rows.next().transpose()?)
    }

    /// All goals, newest first; optionally only those scoped to one link.
    pub async fn list_goals(&self, qr_code_id: Option<i64>) -> Result<Vec<Goal>> {
        let conn = self.conn.lock().await;
        let mut goals = Vec::new();
        match qr_code_id {
            Some(link_id) => {
                let sql = format!(
                    "SELECT {GOAL_SELECT} FROM goals WHERE qr_code_id = ?1 \
                     ORDER BY created_at DESC, id DESC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(duckdb::params![link_id], goal_from_row)?;
                for row in rows {
                    goals.push(row?);
                }
            }
            None => {
                let sql =
                    format!("SELECT {GOAL_SELECT} FROM goals ORDER BY created_at DESC, id DESC");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], goal_from_row)?;
                for row in rows {
                    goals.push(row?);
                }
            }
        }
        Ok(goals)
    }

    /// The goal attached to a link through the link-edit path. At most one
    /// exists; `active_only` selects the display variant used in link
    /// payloads.
    pub async fn primary_goal(&self, qr_code_id: i64, active_only: bool) -> Result<Option<Goal>> {
        let conn = self.conn.lock().await;
        let active_clause = if active_only { " AND active = true" } else { "" };
        let sql = format!(
            "SELECT {GOAL_SELECT} FROM goals WHERE qr_code_id = ?1{active_clause} \
             ORDER BY id ASC LIMIT 1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(duckdb::params![qr_code_id], goal_from_row)?;
        Ok(rows.next().transpose()?)
    }

    /// Insert-or-update the per-link primary goal, reactivating it if it had
    /// been switched off.
    pub async fn upsert_primary_goal(
        &self,
        qr_code_id: i64,
        name: &str,
        target_url: Option<&str>,
    ) -> Result<()> {
        let existing = self.primary_goal(qr_code_id, false).await?;
        let conn = self.conn.lock().await;
        match existing {
            Some(goal) => {
                conn.execute(
                    "UPDATE goals SET name = ?1, target_url = ?2, active = true WHERE id = ?3",
                    duckdb::params![name, target_url, goal.id],
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO goals (qr_code_id, name, target_url, active, created_at) \
                     VALUES (?1, ?2, ?3, true, ?4)",
                    duckdb::params![qr_code_id, name, target_url, format_ts(&now_utc())],
                )?;
            }
        }
        Ok(())
    }

    /// Remove the per-link primary goal. Returns true when one existed.
    pub async fn delete_primary_goal(&self, qr_code_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute(
            "DELETE FROM goals WHERE qr_code_id = ?1",
            duckdb::params![qr_code_id],
        )?;
        Ok(deleted > 0)
    }

    /// Auto-match a conversion to a goal: the first active goal scoped to
    /// this link or global whose `target_url` is a prefix of `current_url`.
    pub async fn match_goal_by_url(
        &self,
        qr_code_id: i64,
        current_url: &str,
    ) -> Result<Option<Goal>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {GOAL_SELECT} FROM goals \
             WHERE active = true AND (qr_code_id IS NULL OR qr_code_id = ?1) \
             ORDER BY id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(duckdb::params![qr_code_id], goal_from_row)?;
        for row in rows {
            let goal = row?;
            if let Some(target) = goal.target_url.as_deref() {
                if !target.is_empty() && current_url.starts_with(target) {
                    return Ok(Some(goal));
                }
            }
        }
        Ok(None)
    }
}
