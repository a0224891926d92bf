use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

pub type DbPool = Pool<SqliteConnectionManager>;

pub fn init_pool(db_path: &Path) -> Result<DbPool, Box<dyn std::error::Error>> {
    // Pragmas are per-connection, so they run on every checkout.
    let manager = SqliteConnectionManager::file(db_path)
        .with_init(|conn| conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;"));
    let pool = Pool::builder().max_size(10).build(manager)?;
    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error>> {
    let conn = pool.get()?;

    conn.execute_batch(
        "
        -- Blog posts
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY,
            slug TEXT UNIQUE NOT NULL,
            slug_locked INTEGER NOT NULL DEFAULT 0,
            title TEXT NOT NULL,
            content_md TEXT NOT NULL DEFAULT '',
            content_html TEXT,
            excerpt TEXT,
            status TEXT NOT NULL DEFAULT 'draft',
            category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
            author_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
            seo_title TEXT,
            seo_description TEXT,
            og_image TEXT,
            is_featured INTEGER NOT NULL DEFAULT 0,
            view_count INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            published_at DATETIME
        );

        CREATE INDEX IF NOT EXISTS idx_posts_status ON posts(status);
        CREATE INDEX IF NOT EXISTS idx_posts_published ON posts(status, is_featured, published_at);
        CREATE INDEX IF NOT EXISTS idx_posts_category ON posts(category_id);

        -- Hierarchical categories with a materialized path
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY,
            slug TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            -- intentionally unconstrained: a dangling parent degrades to a
            -- root-like node instead of failing the write
            parent_id INTEGER,
            path TEXT NOT NULL DEFAULT '',
            depth INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id);
        CREATE INDEX IF NOT EXISTS idx_categories_path ON categories(path);

        -- Tags
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY,
            slug TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        -- Many-to-many: posts <-> tags
        CREATE TABLE IF NOT EXISTS post_tags (
            post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            UNIQUE(post_id, tag_id)
        );

        -- Uploaded media
        CREATE TABLE IF NOT EXISTS media (
            id INTEGER PRIMARY KEY,
            filename TEXT NOT NULL,
            original_name TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            size INTEGER NOT NULL DEFAULT 0,
            path TEXT NOT NULL,
            alt_text TEXT,
            title TEXT,
            uploaded_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        -- Users and roles
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            username TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'USER',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            last_login_at DATETIME
        );

        -- Site options (key-value with metadata)
        CREATE TABLE IF NOT EXISTS options (
            key TEXT PRIMARY KEY,
            value TEXT,
            type TEXT NOT NULL DEFAULT 'string',
            group_name TEXT NOT NULL DEFAULT 'general',
            label TEXT,
            description TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        -- Security events (login failures, rate-limit blocks, ...)
        CREATE TABLE IF NOT EXISTS security_logs (
            id INTEGER PRIMARY KEY,
            event_type TEXT NOT NULL,
            details TEXT,
            ip_address TEXT,
            user_agent TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        -- Rate limiting counters, one row per (ip, action)
        CREATE TABLE IF NOT EXISTS rate_limits (
            id INTEGER PRIMARY KEY,
            ip_address TEXT NOT NULL,
            action TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_attempt_at DATETIME,
            blocked_until DATETIME,
            UNIQUE(ip_address, action)
        );
        ",
    )?;

    Ok(())
}

pub fn seed_defaults(pool: &DbPool) -> Result<(), Box<dyn std::error::Error>> {
    let conn = pool.get()?;

    // (key, value, type, group, label, description, sort_order)
    let defaults: Vec<(&str, &str, &str, &str, &str, &str, i64)> = vec![
        // General
        ("site_name", "Mon Blog", "string", "general", "Site name", "The name of your blog", 1),
        ("site_description", "A blog powered by plume", "text", "general", "Site description", "Short description used for SEO", 2),
        ("site_url", "http://localhost", "string", "general", "Site URL", "Base URL without a trailing slash", 3),
        ("site_logo", "", "image", "general", "Logo", "Site logo (relative path)", 4),
        ("site_favicon", "", "image", "general", "Favicon", "Site favicon", 5),
        ("site_language", "fr", "string", "general", "Language", "Language code (fr, en, ...)", 6),
        // SEO
        ("meta_title_suffix", " | Mon Blog", "string", "seo", "Title suffix", "Appended to page titles", 1),
        ("meta_description_default", "Bienvenue sur mon blog", "text", "seo", "Default description", "Used when a page has none", 2),
        ("robots_txt", "User-agent: *\nAllow: /", "text", "seo", "robots.txt", "Rules for search crawlers", 3),
        // Social
        ("twitter_handle", "", "string", "social", "Twitter", "Your @username", 1),
        ("facebook_url", "", "string", "social", "Facebook", "Facebook page URL", 2),
        ("github_url", "", "string", "social", "GitHub", "GitHub profile URL", 3),
        ("og_default_image", "", "image", "social", "Default Open Graph image", "Used for social sharing", 4),
        // Appearance
        ("posts_per_page", "10", "integer", "appearance", "Posts per page", "Number of posts per index page", 1),
        ("excerpt_length", "200", "integer", "appearance", "Excerpt length", "Characters kept in derived excerpts", 2),
        ("date_format", "%d/%m/%Y", "string", "appearance", "Date format", "strftime format for dates", 3),
        ("theme_color", "#4f46e5", "string", "appearance", "Theme color", "Primary color (hex)", 4),
        // Contact
        ("admin_email", "admin@example.com", "string", "contact", "Admin email", "Administrator email address", 1),
        ("contact_email", "contact@example.com", "string", "contact", "Contact email", "Public contact address", 2),
    ];

    for (key, value, r#type, group, label, description, sort_order) in defaults {
        conn.execute(
            "INSERT OR IGNORE INTO options (key, value, type, group_name, label, description, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![key, value, r#type, group, label, description, sort_order],
        )?;
    }

    // Seed a default admin user if none exists.
    // Default password is "admin123"; it must be changed after first login.
    let admin_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = 'ADMIN'",
        [],
        |row| row.get(0),
    )?;

    if admin_count == 0 {
        let hash = bcrypt::hash("admin123", bcrypt::DEFAULT_COST)?;
        conn.execute(
            "INSERT INTO users (username, email, password_hash, role, is_active)
             VALUES ('admin', 'admin@example.com', ?1, 'ADMIN', 1)",
            params![hash],
        )?;
        log::warn!("Created default admin user (password: admin123, change it!)");
    }

    Ok(())
}
