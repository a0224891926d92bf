use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use rusqlite::params;

use crate::db::DbPool;
use crate::markdown;
use crate::models::post::{Post, STATUS_PUBLISHED};
use crate::models::tag::Tag;

const WORDS_PER_MINUTE: usize = 200;

fn ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\[\]]+)\]\]").unwrap())
}

/// Lookup tables for `[[...]]` internal references, built once from the
/// current database state so a generation pass resolves every post against
/// the same snapshot.
#[derive(Debug, Default)]
pub struct LinkIndex {
    /// post slug -> title
    posts: HashMap<String, String>,
    /// category path -> (name, path)
    categories_by_path: HashMap<String, (String, String)>,
    /// category slug -> (name, path)
    categories_by_slug: HashMap<String, (String, String)>,
    /// tag slug -> name
    tags: HashMap<String, String>,
}

impl LinkIndex {
    pub fn build(pool: &DbPool) -> Self {
        let mut index = LinkIndex::default();

        if let Ok(conn) = pool.get() {
            if let Ok(mut stmt) =
                conn.prepare("SELECT slug, title FROM posts WHERE status = ?1")
            {
                let rows = stmt.query_map(params![STATUS_PUBLISHED], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                });
                if let Ok(rows) = rows {
                    for (slug, title) in rows.flatten() {
                        index.posts.insert(slug, title);
                    }
                }
            }

            if let Ok(mut stmt) = conn.prepare("SELECT slug, name, path FROM categories") {
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                });
                if let Ok(rows) = rows {
                    for (slug, name, path) in rows.flatten() {
                        index
                            .categories_by_path
                            .insert(path.clone(), (name.clone(), path.clone()));
                        index.categories_by_slug.insert(slug, (name, path));
                    }
                }
            }

            if let Ok(mut stmt) = conn.prepare("SELECT slug, name FROM tags") {
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                });
                if let Ok(rows) = rows {
                    for (slug, name) in rows.flatten() {
                        index.tags.insert(slug, name);
                    }
                }
            }
        }

        index
    }

    /// Resolve one reference token to a markdown link, or None when the
    /// target does not exist.
    fn resolve(&self, token: &str) -> Option<String> {
        if let Some(rest) = token.strip_prefix("category:") {
            // Paths are the canonical category address; a bare slug is
            // accepted as a fallback.
            let (name, path) = self
                .categories_by_path
                .get(rest)
                .or_else(|| self.categories_by_slug.get(rest))?;
            return Some(format!("[{}](/category/{}/)", name, path));
        }
        if let Some(rest) = token.strip_prefix("tag:") {
            let name = self.tags.get(rest)?;
            return Some(format!("[{}](/tag/{}/)", name, rest));
        }
        let title = self.posts.get(token)?;
        Some(format!("[{}](/post/{}/)", title, token))
    }
}

/// Replace every `[[ref]]` token with a markdown link. Unresolvable
/// references degrade to a visibly broken link instead of failing the
/// whole render.
pub fn resolve_refs(text: &str, index: &LinkIndex) -> String {
    ref_regex()
        .replace_all(text, |caps: &regex::Captures| {
            let token = caps[1].trim();
            match index.resolve(token) {
                Some(link) => link,
                None => format!("[⚠ {}](#broken)", token),
            }
        })
        .into_owned()
}

/// Full body pipeline: internal refs first (they produce markdown links),
/// then the markdown rules.
pub fn render_with_index(markdown_src: &str, index: &LinkIndex) -> String {
    let resolved = resolve_refs(markdown_src, index);
    markdown::render(&resolved)
}

pub fn render_content(pool: &DbPool, markdown_src: &str) -> String {
    let index = LinkIndex::build(pool);
    render_with_index(markdown_src, &index)
}

/// A published post joined with everything the renderer needs: author,
/// category, tags, and the rendered body.
#[derive(Debug, Clone)]
pub struct PublishedPost {
    pub post: Post,
    pub author_name: Option<String>,
    pub category_name: Option<String>,
    pub category_slug: Option<String>,
    pub category_path: Option<String>,
    pub tags: Vec<Tag>,
    pub content_html: String,
}

fn load_published(pool: &DbPool, filter_sql: &str, filter: &[&dyn rusqlite::ToSql]) -> Vec<PublishedPost> {
    let conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return vec![],
    };

    let sql = format!(
        "SELECT p.*, u.username AS author_name,
                c.name AS category_name, c.slug AS category_slug, c.path AS category_path
         FROM posts p
         LEFT JOIN users u ON u.id = p.author_id
         LEFT JOIN categories c ON c.id = p.category_id
         WHERE p.status = 'published'{}
         ORDER BY p.is_featured DESC, p.published_at DESC",
        filter_sql
    );

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(_) => return vec![],
    };

    let rows = stmt.query_map(filter, |row| {
        let post = Post::from_row(row)?;
        let author_name: Option<String> = row.get("author_name")?;
        let category_name: Option<String> = row.get("category_name")?;
        let category_slug: Option<String> = row.get("category_slug")?;
        let category_path: Option<String> = row.get("category_path")?;
        Ok((post, author_name, category_name, category_slug, category_path))
    });

    let base: Vec<_> = rows
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default();
    drop(stmt);
    drop(conn);

    base.into_iter()
        .map(|(post, author_name, category_name, category_slug, category_path)| {
            let tags = Tag::for_post(pool, post.id);
            let content_html = post.content_html.clone().unwrap_or_default();
            PublishedPost {
                post,
                author_name,
                category_name,
                category_slug,
                category_path,
                tags,
                content_html,
            }
        })
        .collect()
}

/// The global published feed: featured posts first, then newest first.
pub fn find_published(pool: &DbPool) -> Vec<PublishedPost> {
    load_published(pool, "", &[])
}

pub fn find_by_category(pool: &DbPool, category_id: i64) -> Vec<PublishedPost> {
    load_published(pool, " AND p.category_id = ?1", &[&category_id])
}

pub fn find_by_tag(pool: &DbPool, tag_id: i64) -> Vec<PublishedPost> {
    load_published(
        pool,
        " AND p.id IN (SELECT post_id FROM post_tags WHERE tag_id = ?1)",
        &[&tag_id],
    )
}

/// The post's explicit excerpt, or one derived from the body: tags stripped,
/// whitespace collapsed, cut at the last word boundary within `max_len`.
pub fn excerpt(post: &PublishedPost, max_len: usize) -> String {
    if let Some(explicit) = &post.post.excerpt {
        if !explicit.trim().is_empty() {
            return explicit.trim().to_string();
        }
    }

    let source = if post.content_html.is_empty() {
        post.post.content_md.clone()
    } else {
        post.content_html.clone()
    };
    let text = markdown::collapse_whitespace(&markdown::strip_tags(&source));

    if text.chars().count() <= max_len {
        return text;
    }

    let cut: String = text.chars().take(max_len).collect();
    let trimmed = match cut.rfind(' ') {
        Some(pos) => &cut[..pos],
        None => cut.as_str(),
    };
    format!("{}...", trimmed)
}

/// Estimated minutes to read, one minute minimum.
pub fn reading_time(post: &PublishedPost) -> usize {
    let source = if post.content_html.is_empty() {
        post.post.content_md.as_str()
    } else {
        post.content_html.as_str()
    };
    let words = markdown::strip_tags(source).split_whitespace().count();
    std::cmp::max(1, words.div_ceil(WORDS_PER_MINUTE))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> LinkIndex {
        let mut index = LinkIndex::default();
        index
            .posts
            .insert("hello-world".to_string(), "Hello World".to_string());
        index.categories_by_path.insert(
            "1/3".to_string(),
            ("Recettes".to_string(), "1/3".to_string()),
        );
        index.categories_by_slug.insert(
            "recettes".to_string(),
            ("Recettes".to_string(), "1/3".to_string()),
        );
        index.tags.insert("rust".to_string(), "Rust".to_string());
        index
    }

    #[test]
    fn test_post_ref_resolves_to_title_link() {
        let out = resolve_refs("see [[hello-world]]", &sample_index());
        assert_eq!(out, "see [Hello World](/post/hello-world/)");
    }

    #[test]
    fn test_category_ref_by_path_and_slug() {
        let index = sample_index();
        assert_eq!(
            resolve_refs("[[category:1/3]]", &index),
            "[Recettes](/category/1/3/)"
        );
        assert_eq!(
            resolve_refs("[[category:recettes]]", &index),
            "[Recettes](/category/1/3/)"
        );
    }

    #[test]
    fn test_tag_ref() {
        let out = resolve_refs("[[tag:rust]]", &sample_index());
        assert_eq!(out, "[Rust](/tag/rust/)");
    }

    #[test]
    fn test_unresolved_ref_degrades() {
        let out = resolve_refs("[[no-such-post]]", &sample_index());
        assert_eq!(out, "[⚠ no-such-post](#broken)");
    }

    #[test]
    fn test_refs_render_as_links() {
        let html = render_with_index("read [[hello-world]] now", &sample_index());
        assert!(html.contains("<a href=\"/post/hello-world/\">Hello World</a>"));
    }
}
