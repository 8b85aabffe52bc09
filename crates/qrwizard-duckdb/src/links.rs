use anyhow::Result;
use serde::Serialize;

use qrwizard_core::identity::random_slug;
use qrwizard_core::model::{Link, LinkDraft, LinkStatus};

use crate::backend::{format_ts, now_utc, parse_ts, parse_ts_opt};
use crate::DuckDbBackend;

/// Column list for SELECTs that map to [`Link`]. `expires_at` arrives via a
/// migration, so the list is always explicit — never `SELECT *`.
pub(crate) fn link_select(prefix: &str) -> String {
    [
        "id",
        "slug",
        "name",
        "destination_url",
        "campaign",
        "channel",
        "location",
        "asset",
        "owner",
        "notes",
        "status",
        "auto_append_utm",
        "utm_source",
        "utm_medium",
        "utm_campaign",
        "utm_term",
        "utm_content",
        "dynamic",
    ]
    .iter()
    .map(|c| format!("{prefix}{c}"))
    .chain([
        format!("CAST({prefix}created_at AS VARCHAR)"),
        format!("CAST({prefix}updated_at AS VARCHAR)"),
        format!("CAST({prefix}expires_at AS VARCHAR)"),
    ])
    .collect::<Vec<_>>()
    .join(", ")
}

pub(crate) fn link_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Link> {
    let status: String = row.get(10)?;
    Ok(Link {
        id: row.get(0)?,
        slug: row.get(1)?,
        name: row.get(2)?,
        destination_url: row.get(3)?,
        campaign: row.get(4)?,
        channel: row.get(5)?,
        location: row.get(6)?,
        asset: row.get(7)?,
        owner: row.get(8)?,
        notes: row.get(9)?,
        status: LinkStatus::parse_lenient(Some(&status)),
        auto_append_utm: row.get(11)?,
        utm_source: row.get(12)?,
        utm_medium: row.get(13)?,
        utm_campaign: row.get(14)?,
        utm_term: row.get(15)?,
        utm_content: row.get(16)?,
        dynamic: row.get(17)?,
        created_at: parse_ts(&row.get::<_, String>(18)?)?,
        updated_at: parse_ts(&row.get::<_, String>(19)?)?,
        expires_at: parse_ts_opt(row.get(20)?)?,
    })
}

/// List-endpoint parameters: facet filters, free-text search, pagination.
#[derive(Debug, Clone, Default)]
pub struct LinkListQuery {
    /// Free-text search across name/slug/url/campaign/channel/location/asset/owner.
    pub q: Option<String>,
    pub status: Option<String>,
    pub campaign: Option<String>,
    pub channel: Option<String>,
    pub location: Option<String>,
    pub owner: Option<String>,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusCounts {
    pub active: i64,
    pub paused: i64,
    pub archived: i64,
    pub total: i64,
}

impl DuckDbBackend {
    /// Insert a new link, re-rolling the slug until it clears the unique
    /// index. The connection mutex is held across check and insert, so the
    /// re-roll loop cannot race another writer in this process.
    pub async fn create_link(&self, draft: &LinkDraft) -> Result<Link> {
        let conn = self.conn.lock().await;

        let slug = loop {
            let candidate = random_slug();
            let taken: i64 = conn
                .prepare("SELECT COUNT(*) FROM qr_codes WHERE slug = ?1")?
                .query_row(duckdb::params![candidate], |row| row.get(0))?;
            if taken == 0 {
                break candidate;
            }
        };

        let now = now_utc();
        let status = draft.status.unwrap_or(LinkStatus::Active);
        let id: i64 = conn
            .prepare(
                r#"INSERT INTO qr_codes (
                    slug, name, destination_url,
                    campaign, channel, location, asset, owner, notes,
                    status, auto_append_utm,
                    utm_source, utm_medium, utm_campaign, utm_term, utm_content,
                    dynamic, created_at, updated_at, expires_at
                ) VALUES (
                    ?1, ?2, ?3,
                    ?4, ?5, ?6, ?7, ?8, ?9,
                    ?10, ?11,
                    ?12, ?13, ?14, ?15, ?16,
                    true, ?17, ?18, ?19
                ) RETURNING id"#,
            )?
            .query_row(
                duckdb::params![
                    slug,
                    draft.name,
                    draft.destination_url,
                    draft.campaign,
                    draft.channel,
                    draft.location,
                    draft.asset,
                    draft.owner,
                    draft.notes,
                    status.as_str(),
                    draft.auto_append_utm,
                    draft.utm_source,
                    draft.utm_medium,
                    draft.utm_campaign,
                    draft.utm_term,
                    draft.utm_content,
                    format_ts(&now),
                    format_ts(&now),
                    draft.expires_at.as_ref().map(format_ts),
                ],
                |row| row.get(0),
            )?;

        Ok(Link {
            id,
            slug,
            name: draft.name.clone(),
            destination_url: draft.destination_url.clone(),
            campaign: draft.campaign.clone(),
            channel: draft.channel.clone(),
            location: draft.location.clone(),
            asset: draft.asset.clone(),
            owner: draft.owner.clone(),
            notes: draft.notes.clone(),
            status,
            auto_append_utm: draft.auto_append_utm,
            utm_source: draft.utm_source.clone(),
            utm_medium: draft.utm_medium.clone(),
            utm_campaign: draft.utm_campaign.clone(),
            utm_term: draft.utm_term.clone(),
            utm_content: draft.utm_content.clone(),
            dynamic: true,
            created_at: now,
            updated_at: now,
            expires_at: draft.expires_at,
        })
    }

    pub async fn get_link(&self, id: i64) -> Result<Option<Link>> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {} FROM qr_codes WHERE id = ?1", link_select(""));
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(duckdb::params![id], link_from_row)?;
        Ok(rows.next().transpose()?)
    }

    pub async fn get_link_by_slug(&self, slug: &str) -> Result<Option<Link>> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {} FROM qr_codes WHERE slug = ?1", link_select(""));
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(duckdb::params![slug], link_from_row)?;
        Ok(rows.next().transpose()?)
    }

    /// Write every mutable column back and bump `updated_at`.
    pub async fn update_link(&self, link: &Link) -> Result<Link> {
        let conn = self.conn.lock().await;
        let now = now_utc();
        conn.execute(
            r#"UPDATE qr_codes SET
                name = ?1, destination_url = ?2,
                campaign = ?3, channel = ?4, location = ?5, asset = ?6, owner = ?7, notes = ?8,
                status = ?9, auto_append_utm = ?10,
                utm_source = ?11, utm_medium = ?12, utm_campaign = ?13, utm_term = ?14, utm_content = ?15,
                expires_at = ?16, updated_at = ?17
               WHERE id = ?18"#,
            duckdb::params![
                link.name,
                link.destination_url,
                link.campaign,
                link.channel,
                link.location,
                link.asset,
                link.owner,
                link.notes,
                link.status.as_str(),
                link.auto_append_utm,
                link.utm_source,
                link.utm_medium,
                link.utm_campaign,
                link.utm_term,
                link.utm_content,
                link.expires_at.as_ref().map(format_ts),
                format_ts(&now),
                link.id,
            ],
        )?;
        let mut updated = link.clone();
        updated.updated_at = now;
        Ok(updated)
    }

    /// Used by the redirect path when an expired active link is archived.
    pub async fn set_link_status(&self, id: i64, status: LinkStatus) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE qr_codes SET status = ?1, updated_at = ?2 WHERE id = ?3",
            duckdb::params![status.as_str(), format_ts(&now_utc()), id],
        )?;
        Ok(())
    }

    /// Delete a link and everything that hangs off it, in one transaction.
    ///
    /// Returns false when the link did not exist.
    pub async fn delete_link(&self, id: i64) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM scan_events WHERE qr_code_id = ?1", duckdb::params![id])?;
        tx.execute(
            "DELETE FROM conversion_events WHERE qr_code_id = ?1",
            duckdb::params![id],
        )?;
        tx.execute("DELETE FROM goals WHERE qr_code_id = ?1", duckdb::params![id])?;
        tx.execute("DELETE FROM qr_history WHERE qr_code_id = ?1", duckdb::params![id])?;
        let deleted = tx.execute("DELETE FROM qr_codes WHERE id = ?1", duckdb::params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Bulk cascade delete. Returns the number of links removed.
    pub async fn delete_links(&self, ids: &[i64]) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        for id in ids {
            tx.execute("DELETE FROM scan_events WHERE qr_code_id = ?1", duckdb::params![id])?;
            tx.execute(
                "DELETE FROM conversion_events WHERE qr_code_id = ?1",
                duckdb::params![id],
            )?;
            tx.execute("DELETE FROM goals WHERE qr_code_id = ?1", duckdb::params![id])?;
            tx.execute("DELETE FROM qr_history WHERE qr_code_id = ?1", duckdb::params![id])?;
            deleted += tx.execute("DELETE FROM qr_codes WHERE id = ?1", duckdb::params![id])?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    /// Paginated listing with facet filters and free-text search. Each link
    /// comes with its total scan count. Returns `(rows, total_matching)`.
    pub async fn list_links(&self, query: &LinkListQuery) -> Result<(Vec<(Link, i64)>, i64)> {
        let conn = self.conn.lock().await;

        let mut filter_sql = String::new();
        let mut filter_params: Vec<Box<dyn duckdb::types::ToSql>> = Vec::new();
        let mut param_idx = 1;

        if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let like = format!("%{q}%");
            let mut ors = Vec::new();
            for col in [
                "q.name",
                "q.slug",
                "q.destination_url",
                "q.campaign",
                "q.channel",
                "q.location",
                "q.asset",
                "q.owner",
            ] {
                ors.push(format!("{col} ILIKE ?{param_idx}"));
                filter_params.push(Box::new(like.clone()));
                param_idx += 1;
            }
            filter_sql.push_str(&format!(" AND ({})", ors.join(" OR ")));
        }
        for (col, value) in [
            ("q.status", &query.status),
            ("q.campaign", &query.campaign),
            ("q.channel", &query.channel),
            ("q.location", &query.location),
            ("q.owner", &query.owner),
        ] {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                filter_sql.push_str(&format!(" AND {col} = ?{param_idx}"));
                filter_params.push(Box::new(v.to_string()));
                param_idx += 1;
            }
        }

        let param_refs: Vec<&dyn duckdb::types::ToSql> =
            filter_params.iter().map(|p| p.as_ref()).collect();

        let count_sql = format!("SELECT COUNT(*) FROM qr_codes q WHERE 1=1{filter_sql}");
        let total: i64 = conn
            .prepare(&count_sql)?
            .query_row(param_refs.as_slice(), |row| row.get(0))?;

        let page = query.page.max(1) as u64;
        let per_page = query.per_page.clamp(1, 200) as u64;
        let offset = (page - 1) * per_page;

        let list_sql = format!(
            r#"SELECT {cols}, CAST(COALESCE(sc.cnt, 0) AS BIGINT)
               FROM qr_codes q
               LEFT JOIN (
                   SELECT qr_code_id, COUNT(*) AS cnt FROM scan_events GROUP BY qr_code_id
               ) sc ON sc.qr_code_id = q.id
               WHERE 1=1{filter_sql}
               ORDER BY q.created_at DESC, q.id DESC
               LIMIT {per_page} OFFSET {offset}"#,
            cols = link_select("q."),
        );

        let mut stmt = conn.prepare(&list_sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            let link = link_from_row(row)?;
            let scans: i64 = row.get(21)?;
            Ok((link, scans))
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok((items, total))
    }

    /// Fetch the subset of `ids` that exist, in ascending id order.
    pub async fn links_by_ids(&self, ids: &[i64]) -> Result<Vec<Link>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().await;
        let placeholders = (1..=ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM qr_codes WHERE id IN ({placeholders}) ORDER BY id ASC",
            link_select("")
        );
        let params: Vec<&dyn duckdb::types::ToSql> =
            ids.iter().map(|id| id as &dyn duckdb::types::ToSql).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), link_from_row)?;
        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }

    /// Every link, newest first. Used by the links CSV export.
    pub async fn all_links(&self) -> Result<Vec<Link>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM qr_codes ORDER BY created_at DESC, id DESC",
            link_select("")
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], link_from_row)?;
        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }

    /// Distinct non-empty facet values, sorted, for filter pickers.
    pub async fn facet_options(&self) -> Result<qrwizard_core::analytics::FilterOptions> {
        let conn = self.conn.lock().await;
        let fetch = |col: &str| -> Result<Vec<String>> {
            let sql = format!(
                "SELECT DISTINCT {col} FROM qr_codes WHERE {col} IS NOT NULL AND {col} <> '' ORDER BY 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut values = Vec::new();
            for row in rows {
                values.push(row?);
            }
            Ok(values)
        };
        Ok(qrwizard_core::analytics::FilterOptions {
            campaigns: fetch("campaign")?,
            channels: fetch("channel")?,
            locations: fetch("location")?,
            owners: fetch("owner")?,
        })
    }

    /// Link counts per status plus the total, for the library dashboard.
    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT status, CAST(COUNT(*) AS BIGINT) FROM qr_codes GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = StatusCounts {
            active: 0,
            paused: 0,
            archived: 0,
            total: 0,
        };
        for row in rows {
            let (status, count) = row?;
            match status.as_str() {
                "active" => counts.active = count,
                "paused" => counts.paused = count,
                "archived" => counts.archived = count,
                _ => {}
            }
            counts.total += count;
        }
        Ok(counts)
    }
}
