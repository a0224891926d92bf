use chrono::NaiveDateTime;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;

/// Safety valve for path propagation; no sane blog nests deeper than this.
const MAX_DEPTH: i64 = 32;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Category {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    /// Ancestor ids joined by '/', own id last. Root: just the own id.
    pub path: String,
    /// Root = 0, each level below adds one.
    pub depth: i64,
    pub sort_order: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Deserialize, Default)]
pub struct CategoryForm {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub sort_order: Option<i64>,
}

impl Category {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Category {
            id: row.get("id")?,
            slug: row.get("slug")?,
            name: row.get("name")?,
            description: row.get("description")?,
            parent_id: row.get("parent_id")?,
            path: row.get("path")?,
            depth: row.get("depth")?,
            sort_order: row.get("sort_order")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM categories WHERE id = ?1",
            params![id],
            Self::from_row,
        )
        .ok()
    }

    pub fn find_by_slug(pool: &DbPool, slug: &str) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM categories WHERE slug = ?1",
            params![slug],
            Self::from_row,
        )
        .ok()
    }

    pub fn find_by_path(pool: &DbPool, path: &str) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM categories WHERE path = ?1",
            params![path],
            Self::from_row,
        )
        .ok()
    }

    /// All categories in hierarchical order (path, then sort_order, then name).
    pub fn list(pool: &DbPool) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare("SELECT * FROM categories ORDER BY path, sort_order, name")
        {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map([], Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn children(pool: &DbPool, parent_id: i64) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn
            .prepare("SELECT * FROM categories WHERE parent_id = ?1 ORDER BY sort_order, name")
        {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![parent_id], Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn count(pool: &DbPool) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))
            .unwrap_or(0)
    }

    pub fn count_posts(pool: &DbPool, category_id: i64) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE category_id = ?1",
            params![category_id],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    /// Create a category. The slug is generated from the name when absent;
    /// depth comes from the parent pre-insert, and the path is patched
    /// post-insert once the new row's id is known.
    pub fn create(pool: &DbPool, form: &CategoryForm) -> Result<i64, String> {
        let slug = match &form.slug {
            Some(s) if !s.trim().is_empty() => unique_slug(pool, s, None),
            _ => unique_slug(pool, &form.name, None),
        };

        // Pre-insert hierarchy: depth from the parent; dangling parent falls
        // back to root-like values rather than failing the insert.
        let depth = match form.parent_id {
            Some(pid) => Self::find_by_id(pool, pid).map(|p| p.depth + 1).unwrap_or(0),
            None => 0,
        };

        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO categories (slug, name, description, parent_id, path, depth, sort_order)
             VALUES (?1, ?2, ?3, ?4, '', ?5, ?6)",
            params![
                slug,
                form.name,
                form.description,
                form.parent_id,
                depth,
                form.sort_order.unwrap_or(0),
            ],
        )
        .map_err(|e| e.to_string())?;
        let id = conn.last_insert_rowid();
        drop(conn);

        Self::write_path(pool, id, form.parent_id)?;
        Ok(id)
    }

    /// Update a category. A parent change re-materializes path/depth for the
    /// node and its whole subtree; an update that would introduce a cycle
    /// (directly or via a deeper ancestor chain) is rejected.
    pub fn update(pool: &DbPool, id: i64, form: &CategoryForm) -> Result<(), String> {
        if let Some(pid) = form.parent_id {
            if pid == id {
                return Err("A category cannot be its own parent".to_string());
            }
            if Self::would_create_cycle(pool, id, pid) {
                return Err("Parent change would create a cycle".to_string());
            }
        }

        let existing = Self::find_by_id(pool, id);

        let slug = match &form.slug {
            Some(s) if !s.trim().is_empty() => unique_slug(pool, s, Some(id)),
            _ => {
                // Keep the existing slug unless it was never set.
                match &existing {
                    Some(c) if !c.slug.is_empty() => c.slug.clone(),
                    _ => unique_slug(pool, &form.name, Some(id)),
                }
            }
        };

        let depth = match form.parent_id {
            Some(pid) => match Self::find_by_id(pool, pid) {
                Some(parent) => parent.depth + 1,
                // Dangling parent: the node keeps its previous depth while
                // its path degrades to the own id.
                None => existing.as_ref().map(|c| c.depth).unwrap_or(0),
            },
            None => 0,
        };

        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE categories SET slug = ?1, name = ?2, description = ?3, parent_id = ?4,
             depth = ?5, sort_order = ?6, updated_at = CURRENT_TIMESTAMP WHERE id = ?7",
            params![
                slug,
                form.name,
                form.description,
                form.parent_id,
                depth,
                form.sort_order.unwrap_or(0),
                id,
            ],
        )
        .map_err(|e| e.to_string())?;
        drop(conn);

        Self::write_path(pool, id, form.parent_id)?;
        Self::propagate_paths(pool, id)?;
        Ok(())
    }

    /// Delete a category. Children are orphaned (parent_id set to NULL) and
    /// keep their stale path/depth until they are explicitly updated.
    pub fn delete(pool: &DbPool, id: i64) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE categories SET parent_id = NULL WHERE parent_id = ?1",
            params![id],
        )
        .map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM categories WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Name indented by depth, for hierarchical select lists.
    pub fn indented_name(&self) -> String {
        format!("{}{}", "— ".repeat(self.depth as usize), self.name)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Walk the ancestor chain of `new_parent`; if `id` appears, attaching
    /// under it would close a loop.
    fn would_create_cycle(pool: &DbPool, id: i64, new_parent: i64) -> bool {
        let mut current = Some(new_parent);
        let mut hops = 0;
        while let Some(cid) = current {
            if cid == id {
                return true;
            }
            hops += 1;
            if hops > MAX_DEPTH {
                // A chain this long is already corrupt; refuse the update.
                return true;
            }
            current = Self::find_by_id(pool, cid).and_then(|c| c.parent_id);
        }
        false
    }

    /// Persist the materialized path for one node: parent's path + "/" + id,
    /// or just the id for a root (or when the parent row is gone).
    fn write_path(pool: &DbPool, id: i64, parent_id: Option<i64>) -> Result<(), String> {
        let path = match parent_id.and_then(|pid| Self::find_by_id(pool, pid)) {
            Some(parent) if !parent.path.is_empty() => format!("{}/{}", parent.path, id),
            _ => id.to_string(),
        };
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE categories SET path = ?1 WHERE id = ?2",
            params![path, id],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Re-materialize path/depth for every descendant of `id`, depth-first
    /// with an explicit stack. Each visited child is persisted immediately.
    fn propagate_paths(pool: &DbPool, id: i64) -> Result<(), String> {
        let root = match Self::find_by_id(pool, id) {
            Some(c) => c,
            None => return Ok(()),
        };

        let mut stack: Vec<Category> = vec![root];
        while let Some(parent) = stack.pop() {
            if parent.depth >= MAX_DEPTH {
                log::warn!(
                    "Category {} at depth {} hit the propagation ceiling; skipping its subtree",
                    parent.id,
                    parent.depth
                );
                continue;
            }
            for mut child in Self::children(pool, parent.id) {
                child.path = format!("{}/{}", parent.path, child.id);
                child.depth = parent.depth + 1;

                let conn = pool.get().map_err(|e| e.to_string())?;
                conn.execute(
                    "UPDATE categories SET path = ?1, depth = ?2 WHERE id = ?3",
                    params![child.path, child.depth, child.id],
                )
                .map_err(|e| e.to_string())?;
                drop(conn);

                stack.push(child);
            }
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
                "SELECT COUNT(*) FROM categories WHERE slug = ?1 AND id != ?2",
                params![slug, id],
                |row| row.get(0),
            )
            .unwrap_or(0),
        None => conn
            .query_row(
                "SELECT COUNT(*) FROM categories WHERE slug = ?1",
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
            "category".to_string()
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
