use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::models::tag::Tag;

pub const STATUS_DRAFT: &str = "draft";
pub const STATUS_PUBLISHED: &str = "published";
pub const STATUS_ARCHIVED: &str = "archived";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Post {
    pub id: i64,
    pub slug: String,
    /// When set, the slug survives title edits.
    pub slug_locked: bool,
    pub title: String,
    pub content_md: String,
    /// Rendered HTML cache, refreshed on every create/update.
    pub content_html: Option<String>,
    pub excerpt: Option<String>,
    pub status: String,
    pub category_id: Option<i64>,
    pub author_id: Option<i64>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub og_image: Option<String>,
    pub is_featured: bool,
    pub view_count: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    /// Set once, on the first transition to published. Never cleared.
    pub published_at: Option<NaiveDateTime>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PostForm {
    pub title: String,
    pub slug: Option<String>,
    pub slug_locked: Option<bool>,
    pub content_md: String,
    pub excerpt: Option<String>,
    pub status: Option<String>,
    pub category_id: Option<i64>,
    pub author_id: Option<i64>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub og_image: Option<String>,
    pub is_featured: Option<bool>,
    /// Tag names; the relation is replaced wholesale on save.
    pub tags: Vec<String>,
}

impl Post {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Post {
            id: row.get("id")?,
            slug: row.get("slug")?,
            slug_locked: row.get("slug_locked")?,
            title: row.get("title")?,
            content_md: row.get("content_md")?,
            content_html: row.get("content_html")?,
            excerpt: row.get("excerpt")?,
            status: row.get("status")?,
            category_id: row.get("category_id")?,
            author_id: row.get("author_id")?,
            seo_title: row.get("seo_title")?,
            seo_description: row.get("seo_description")?,
            og_image: row.get("og_image")?,
            is_featured: row.get("is_featured")?,
            view_count: row.get("view_count")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            published_at: row.get("published_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row("SELECT * FROM posts WHERE id = ?1", params![id], Self::from_row)
            .ok()
    }

    pub fn find_by_slug(pool: &DbPool, slug: &str) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM posts WHERE slug = ?1",
            params![slug],
            Self::from_row,
        )
        .ok()
    }

    /// All posts regardless of status, newest edits first (admin listing).
    pub fn list(pool: &DbPool) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare("SELECT * FROM posts ORDER BY updated_at DESC") {
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
        conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))
            .unwrap_or(0)
    }

    pub fn count_published(pool: &DbPool) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE status = ?1",
            params![STATUS_PUBLISHED],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    pub fn create(pool: &DbPool, form: &PostForm) -> Result<i64, String> {
        let slug = match &form.slug {
            Some(s) if !s.trim().is_empty() => unique_slug(pool, s, None),
            _ => unique_slug(pool, &form.title, None),
        };
        let status = form.status.clone().unwrap_or_else(|| STATUS_DRAFT.to_string());

        // First publication stamps published_at; drafts stay unstamped.
        let published_at: Option<NaiveDateTime> = if status == STATUS_PUBLISHED {
            Some(Utc::now().naive_utc())
        } else {
            None
        };

        let content_html = crate::content::render_content(pool, &form.content_md);

        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO posts (slug, slug_locked, title, content_md, content_html, excerpt,
                                status, category_id, author_id, seo_title, seo_description,
                                og_image, is_featured, published_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                slug,
                form.slug_locked.unwrap_or(false),
                form.title,
                form.content_md,
                content_html,
                form.excerpt,
                status,
                form.category_id,
                form.author_id,
                form.seo_title,
                form.seo_description,
                form.og_image,
                form.is_featured.unwrap_or(false),
                published_at,
            ],
        )
        .map_err(|e| e.to_string())?;
        let id = conn.last_insert_rowid();
        drop(conn);

        Self::sync_tags(pool, id, &form.tags)?;
        Ok(id)
    }

    pub fn update(pool: &DbPool, id: i64, form: &PostForm) -> Result<(), String> {
        let existing = Self::find_by_id(pool, id).ok_or_else(|| format!("Post {} not found", id))?;

        let slug_locked = form.slug_locked.unwrap_or(existing.slug_locked);
        let slug = if slug_locked {
            existing.slug.clone()
        } else {
            match &form.slug {
                Some(s) if !s.trim().is_empty() => unique_slug(pool, s, Some(id)),
                _ => unique_slug(pool, &form.title, Some(id)),
            }
        };

        let status = form
            .status
            .clone()
            .unwrap_or_else(|| existing.status.clone());

        // published_at is write-once: stamped on the first transition to
        // published, kept as-is on unpublish or re-publish.
        let published_at = match (&existing.published_at, status.as_str()) {
            (None, STATUS_PUBLISHED) => Some(Utc::now().naive_utc()),
            (existing_ts, _) => *existing_ts,
        };

        let content_html = crate::content::render_content(pool, &form.content_md);

        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE posts SET slug = ?1, slug_locked = ?2, title = ?3, content_md = ?4,
                              content_html = ?5, excerpt = ?6, status = ?7, category_id = ?8,
                              author_id = ?9, seo_title = ?10, seo_description = ?11,
                              og_image = ?12, is_featured = ?13, published_at = ?14,
                              updated_at = CURRENT_TIMESTAMP
             WHERE id = ?15",
            params![
                slug,
                slug_locked,
                form.title,
                form.content_md,
                content_html,
                form.excerpt,
                status,
                form.category_id,
                form.author_id,
                form.seo_title,
                form.seo_description,
                form.og_image,
                form.is_featured.unwrap_or(existing.is_featured),
                published_at,
                id,
            ],
        )
        .map_err(|e| e.to_string())?;
        drop(conn);

        Self::sync_tags(pool, id, &form.tags)?;
        Ok(())
    }

    pub fn delete(pool: &DbPool, id: i64) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        // post_tags rows go with the post via ON DELETE CASCADE
        conn.execute("DELETE FROM posts WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn increment_views(pool: &DbPool, id: i64) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE posts SET view_count = view_count + 1 WHERE id = ?1",
            params![id],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn tags(&self, pool: &DbPool) -> Vec<Tag> {
        Tag::for_post(pool, self.id)
    }

    pub fn is_published(&self) -> bool {
        self.status == STATUS_PUBLISHED
    }

    /// Replace the post's tag set. Tags are matched by name and created on
    /// first use; blank names are skipped.
    pub fn sync_tags(pool: &DbPool, post_id: i64, names: &[String]) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM post_tags WHERE post_id = ?1", params![post_id])
            .map_err(|e| e.to_string())?;
        drop(conn);

        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let tag_id = Tag::find_or_create(pool, name)?;
            let conn = pool.get().map_err(|e| e.to_string())?;
            conn.execute(
                "INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?1, ?2)",
                params![post_id, tag_id],
            )
            .map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

fn slug_exists(pool: &DbPool, slug: &str, exclude_id: Option<i64>) -> bool {
    let conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return false,
    };
    let count: i64 = match exclude_id {
        Some(id) => conn
            .query_row(
                "SELECT COUNT(*) FROM posts WHERE slug = ?1 AND id != ?2",
                params![slug, id],
                |row| row.get(0),
            )
            .unwrap_or(0),
        None => conn
            .query_row(
                "SELECT COUNT(*) FROM posts WHERE slug = ?1",
                params![slug],
                |row| row.get(0),
            )
            .unwrap_or(0),
    };
    count > 0
}

fn unique_slug(pool: &DbPool, source: &str, exclude_id: Option<i64>) -> String {
    let base = {
        let s = slug::slugify(source);
        if s.is_empty() {
            "post".to_string()
        } else {
            s
        }
    };
    let mut candidate = base.clone();
    let mut counter = 1;
    while slug_exists(pool, &candidate, exclude_id) {
        candidate = format!("{}-{}", base, counter);
        counter += 1;
    }
    candidate
}
