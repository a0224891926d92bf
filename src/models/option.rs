use chrono::NaiveDateTime;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;

/// One row of the `options` table. The `kind` column drives how the raw
/// value string is interpreted (string, text, integer, boolean, json, image).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SiteOption {
    pub key: String,
    pub value: Option<String>,
    pub kind: String,
    pub group_name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub sort_order: i64,
    pub updated_at: NaiveDateTime,
}

impl SiteOption {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(SiteOption {
            key: row.get("key")?,
            value: row.get("value")?,
            kind: row.get("type")?,
            group_name: row.get("group_name")?,
            label: row.get("label")?,
            description: row.get("description")?,
            sort_order: row.get("sort_order")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn find(pool: &DbPool, key: &str) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM options WHERE key = ?1",
            params![key],
            Self::from_row,
        )
        .ok()
    }

    /// All options in admin display order (group, then sort within group).
    pub fn all(pool: &DbPool) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt =
            match conn.prepare("SELECT * FROM options ORDER BY group_name, sort_order, key") {
                Ok(s) => s,
                Err(_) => return vec![],
            };
        stmt.query_map([], Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    /// Update an existing option's value, or insert an untyped row for an
    /// unknown key. Metadata (type, group, label) is never overwritten here.
    pub fn set(pool: &DbPool, key: &str, value: &str) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO options (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = CURRENT_TIMESTAMP",
            params![key, value],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Boolean options accept '1'/'true' as true, anything else as false.
    pub fn as_bool(&self) -> bool {
        matches!(self.value.as_deref(), Some("1") | Some("true"))
    }

    pub fn as_int(&self) -> Option<i64> {
        self.value.as_deref().and_then(|v| v.trim().parse().ok())
    }
}
