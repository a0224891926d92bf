use std::fs;
use std::path::Path;

use chrono::{Datelike, NaiveDateTime, Utc};
use rand::RngCore;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;

/// 10 MiB upload ceiling.
pub const MAX_SIZE: u64 = 10 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "application/pdf",
];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Media {
    pub id: i64,
    /// Stored filename, slugified stem plus a random hex suffix.
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    /// Path relative to the uploads root, sharded by year/month.
    pub path: String,
    pub alt_text: Option<String>,
    pub title: Option<String>,
    pub uploaded_by: Option<i64>,
    pub created_at: NaiveDateTime,
}

impl Media {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Media {
            id: row.get("id")?,
            filename: row.get("filename")?,
            original_name: row.get("original_name")?,
            mime_type: row.get("mime_type")?,
            size: row.get("size")?,
            path: row.get("path")?,
            alt_text: row.get("alt_text")?,
            title: row.get("title")?,
            uploaded_by: row.get("uploaded_by")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row("SELECT * FROM media WHERE id = ?1", params![id], Self::from_row)
            .ok()
    }

    pub fn list(pool: &DbPool) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare("SELECT * FROM media ORDER BY created_at DESC") {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map([], Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn count(pool: &DbPool) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row("SELECT COUNT(*) FROM media", [], |row| row.get(0))
            .unwrap_or(0)
    }

    /// Store an upload: validate type and size, write the bytes under a
    /// year/month shard of `uploads_dir`, and record the row.
    pub fn store(
        pool: &DbPool,
        uploads_dir: &Path,
        original_name: &str,
        mime_type: &str,
        data: &[u8],
        uploaded_by: Option<i64>,
    ) -> Result<i64, String> {
        if !ALLOWED_MIME_TYPES.contains(&mime_type) {
            return Err(format!("File type not allowed: {}", mime_type));
        }
        if data.len() as u64 > MAX_SIZE {
            return Err(format!(
                "File too large: {} bytes (max {})",
                data.len(),
                MAX_SIZE
            ));
        }

        let filename = storage_filename(original_name);
        let now = Utc::now();
        let shard = format!("{:04}/{:02}", now.year(), now.month());
        let rel_path = format!("{}/{}", shard, filename);

        let dir = uploads_dir.join(&shard);
        fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
        fs::write(dir.join(&filename), data).map_err(|e| e.to_string())?;

        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO media (filename, original_name, mime_type, size, path, uploaded_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                filename,
                original_name,
                mime_type,
                data.len() as i64,
                rel_path,
                uploaded_by,
            ],
        )
        .map_err(|e| e.to_string())?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_meta(
        pool: &DbPool,
        id: i64,
        alt_text: Option<&str>,
        title: Option<&str>,
    ) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE media SET alt_text = ?1, title = ?2 WHERE id = ?3",
            params![alt_text, title, id],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Remove the row and the file on disk. A missing file is tolerated so
    /// the database never keeps a row for something already gone.
    pub fn delete(pool: &DbPool, uploads_dir: &Path, id: i64) -> Result<(), String> {
        let media = Self::find_by_id(pool, id).ok_or_else(|| format!("Media {} not found", id))?;

        let file = uploads_dir.join(&media.path);
        if file.exists() {
            fs::remove_file(&file).map_err(|e| e.to_string())?;
        }

        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM media WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Slugified stem plus 8 random hex chars, keeping the original extension
/// lowercased. Collisions are practically impossible without a lookup.
fn storage_filename(original_name: &str) -> String {
    let (stem, ext) = match original_name.rsplit_once('.') {
        Some((s, e)) => (s, Some(e.to_lowercase())),
        None => (original_name, None),
    };

    let base = {
        let s = slug::slugify(stem);
        if s.is_empty() {
            "file".to_string()
        } else {
            s
        }
    };

    let mut suffix = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut suffix);

    match ext {
        Some(e) => format!("{}-{}.{}", base, hex::encode(suffix), e),
        None => format!("{}-{}", base, hex::encode(suffix)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_filename_keeps_extension() {
        let name = storage_filename("My Photo (1).JPG");
        assert!(name.starts_with("my-photo-1-"));
        assert!(name.ends_with(".jpg"));
    }

    #[test]
    fn test_storage_filename_handles_no_extension() {
        let name = storage_filename("README");
        assert!(name.starts_with("readme-"));
        assert!(!name.contains('.'));
    }
}
