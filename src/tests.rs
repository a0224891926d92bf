use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;

use crate::content;
use crate::db::{self, DbPool};
use crate::generator::Generator;
use crate::models::category::{Category, CategoryForm};
use crate::models::post::{Post, PostForm, STATUS_DRAFT, STATUS_PUBLISHED};
use crate::models::tag::Tag;
use crate::models::user::{User, ROLE_ADMIN, ROLE_REDACTOR};
use crate::options::Options;
use crate::{auth, rate_limit};

static TEST_DB_COUNTER: AtomicUsize = AtomicUsize::new(0);
static TEST_DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Fresh in-memory database per test. Shared-cache URIs keep the database
/// alive across the pool's connections.
fn test_pool() -> DbPool {
    let n = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let uri = format!("file:plume_testdb_{}?mode=memory&cache=shared", n);
    let manager = SqliteConnectionManager::file(uri)
        .with_flags(
            OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys=ON;"));
    let pool = r2d2::Pool::builder().max_size(4).build(manager).unwrap();
    db::run_migrations(&pool).unwrap();
    pool
}

fn temp_dir(label: &str) -> PathBuf {
    let n = TEST_DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "plume_test_{}_{}_{}",
        label,
        std::process::id(),
        n
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn make_category(pool: &DbPool, name: &str, parent_id: Option<i64>) -> i64 {
    Category::create(
        pool,
        &CategoryForm {
            name: name.to_string(),
            parent_id,
            ..Default::default()
        },
    )
    .unwrap()
}

fn make_post(pool: &DbPool, title: &str, status: &str) -> i64 {
    Post::create(
        pool,
        &PostForm {
            title: title.to_string(),
            content_md: format!("Body of {}.\n\nSecond paragraph.", title),
            status: Some(status.to_string()),
            ..Default::default()
        },
    )
    .unwrap()
}

fn make_generator(pool: &DbPool, label: &str) -> (Generator, PathBuf) {
    let root = temp_dir(label);
    let out = root.join("static");
    let generator = Generator::new(
        pool.clone(),
        out.clone(),
        root.join("cache/generator.lock"),
        root.join("cache/generator.log"),
    );
    (generator, out)
}

// ── Category hierarchy ───────────────────────────────────────────────────

#[test]
fn test_category_paths_and_depths() {
    let pool = test_pool();
    let root = make_category(&pool, "Cuisine", None);
    let child = make_category(&pool, "Recettes", Some(root));
    let grandchild = make_category(&pool, "Desserts", Some(child));

    let r = Category::find_by_id(&pool, root).unwrap();
    let c = Category::find_by_id(&pool, child).unwrap();
    let g = Category::find_by_id(&pool, grandchild).unwrap();

    assert!(r.is_root());
    assert_eq!(r.depth, 0);
    assert_eq!(r.path, root.to_string());
    assert!(!c.is_root());
    assert_eq!(c.depth, 1);
    assert_eq!(c.path, format!("{}/{}", root, child));
    assert_eq!(g.depth, 2);
    assert_eq!(g.path, format!("{}/{}/{}", root, child, grandchild));
}

#[test]
fn test_reparent_propagates_to_subtree() {
    let pool = test_pool();
    let root_a = make_category(&pool, "A", None);
    let root_b = make_category(&pool, "B", None);
    let child = make_category(&pool, "Child", Some(root_a));
    let grandchild = make_category(&pool, "Grandchild", Some(child));

    Category::update(
        &pool,
        child,
        &CategoryForm {
            name: "Child".to_string(),
            parent_id: Some(root_b),
            ..Default::default()
        },
    )
    .unwrap();

    let c = Category::find_by_id(&pool, child).unwrap();
    let g = Category::find_by_id(&pool, grandchild).unwrap();
    assert_eq!(c.path, format!("{}/{}", root_b, child));
    assert_eq!(c.depth, 1);
    assert_eq!(g.path, format!("{}/{}/{}", root_b, child, grandchild));
    assert_eq!(g.depth, 2);
}

#[test]
fn test_cycle_is_rejected() {
    let pool = test_pool();
    let root = make_category(&pool, "Root", None);
    let child = make_category(&pool, "Child", Some(root));
    let grandchild = make_category(&pool, "Grandchild", Some(child));

    // Attaching the root under its own grandchild must fail.
    let err = Category::update(
        &pool,
        root,
        &CategoryForm {
            name: "Root".to_string(),
            parent_id: Some(grandchild),
            ..Default::default()
        },
    );
    assert!(err.is_err());

    // Self-parenting too.
    let err = Category::update(
        &pool,
        root,
        &CategoryForm {
            name: "Root".to_string(),
            parent_id: Some(root),
            ..Default::default()
        },
    );
    assert!(err.is_err());
}

#[test]
fn test_delete_orphans_children_with_stale_path() {
    let pool = test_pool();
    let root = make_category(&pool, "Root", None);
    let child = make_category(&pool, "Child", Some(root));

    Category::delete(&pool, root).unwrap();

    // Orphan keeps its old path and depth until its next update.
    let c = Category::find_by_id(&pool, child).unwrap();
    assert_eq!(c.parent_id, None);
    assert_eq!(c.path, format!("{}/{}", root, child));
    assert_eq!(c.depth, 1);

    // An update repairs it to a root.
    Category::update(
        &pool,
        child,
        &CategoryForm {
            name: "Child".to_string(),
            ..Default::default()
        },
    )
    .unwrap();
    let c = Category::find_by_id(&pool, child).unwrap();
    assert_eq!(c.path, child.to_string());
    assert_eq!(c.depth, 0);
}

#[test]
fn test_reparent_to_missing_parent_keeps_depth() {
    let pool = test_pool();
    let root = make_category(&pool, "Root", None);
    let child = make_category(&pool, "Child", Some(root));

    // Pointing at a parent that does not exist degrades the path to the
    // own id but leaves the previous depth in place.
    Category::update(
        &pool,
        child,
        &CategoryForm {
            name: "Child".to_string(),
            parent_id: Some(9999),
            ..Default::default()
        },
    )
    .unwrap();

    let c = Category::find_by_id(&pool, child).unwrap();
    assert_eq!(c.path, child.to_string());
    assert_eq!(c.depth, 1);
}

#[test]
fn test_missing_parent_falls_back_to_root() {
    let pool = test_pool();
    let id = Category::create(
        &pool,
        &CategoryForm {
            name: "Lost".to_string(),
            parent_id: Some(9999),
            ..Default::default()
        },
    )
    .unwrap();

    let c = Category::find_by_id(&pool, id).unwrap();
    assert_eq!(c.depth, 0);
    assert_eq!(c.path, id.to_string());
}

// ── Posts ────────────────────────────────────────────────────────────────

#[test]
fn test_published_at_is_write_once() {
    let pool = test_pool();
    let id = make_post(&pool, "Draft first", STATUS_DRAFT);
    assert!(Post::find_by_id(&pool, id).unwrap().published_at.is_none());

    let form = |status: &str| PostForm {
        title: "Draft first".to_string(),
        content_md: "Body.".to_string(),
        status: Some(status.to_string()),
        ..Default::default()
    };

    Post::update(&pool, id, &form(STATUS_PUBLISHED)).unwrap();
    let first = Post::find_by_id(&pool, id).unwrap().published_at.unwrap();

    // Unpublishing keeps the stamp.
    Post::update(&pool, id, &form(STATUS_DRAFT)).unwrap();
    assert_eq!(Post::find_by_id(&pool, id).unwrap().published_at, Some(first));

    // Re-publishing does not move it.
    Post::update(&pool, id, &form(STATUS_PUBLISHED)).unwrap();
    assert_eq!(Post::find_by_id(&pool, id).unwrap().published_at, Some(first));
}

#[test]
fn test_slugs_are_unique_and_lockable() {
    let pool = test_pool();
    let a = make_post(&pool, "Même Titre", STATUS_DRAFT);
    let b = make_post(&pool, "Même Titre", STATUS_DRAFT);

    let pa = Post::find_by_id(&pool, a).unwrap();
    let pb = Post::find_by_id(&pool, b).unwrap();
    assert_eq!(pa.slug, "meme-titre");
    assert_eq!(pb.slug, "meme-titre-1");
    assert_eq!(Post::find_by_slug(&pool, "meme-titre").unwrap().id, a);

    // A locked slug survives a title change.
    Post::update(
        &pool,
        a,
        &PostForm {
            title: "Nouveau Titre".to_string(),
            content_md: "Body.".to_string(),
            slug_locked: Some(true),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(Post::find_by_id(&pool, a).unwrap().slug, "meme-titre");
}

#[test]
fn test_tag_sync_replaces_the_set() {
    let pool = test_pool();
    let id = make_post(&pool, "Tagged", STATUS_PUBLISHED);

    Post::sync_tags(&pool, id, &["Rust".to_string(), "Web".to_string()]).unwrap();
    let names: Vec<String> = Tag::for_post(&pool, id).into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["Rust", "Web"]);

    Post::sync_tags(&pool, id, &["Rust".to_string()]).unwrap();
    let post = Post::find_by_id(&pool, id).unwrap();
    let names: Vec<String> = post.tags(&pool).into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["Rust"]);

    // Same name again does not duplicate the tag row.
    assert_eq!(Tag::list(&pool).len(), 2);
}

// ── Content aggregation ──────────────────────────────────────────────────

#[test]
fn test_feed_excludes_drafts_and_archived() {
    let pool = test_pool();
    make_post(&pool, "Visible", STATUS_PUBLISHED);
    make_post(&pool, "Hidden draft", STATUS_DRAFT);
    make_post(&pool, "Hidden archive", crate::models::post::STATUS_ARCHIVED);

    let feed = content::find_published(&pool);
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].post.title, "Visible");
}

#[test]
fn test_feed_orders_featured_first() {
    let pool = test_pool();
    make_post(&pool, "Plain", STATUS_PUBLISHED);
    let featured = Post::create(
        &pool,
        &PostForm {
            title: "Starred".to_string(),
            content_md: "Body.".to_string(),
            status: Some(STATUS_PUBLISHED.to_string()),
            is_featured: Some(true),
            ..Default::default()
        },
    )
    .unwrap();
    make_post(&pool, "Unpublished", STATUS_DRAFT);

    let feed = content::find_published(&pool);
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].post.id, featured);
}

#[test]
fn test_excerpt_prefers_explicit_then_derives() {
    let pool = test_pool();
    let id = Post::create(
        &pool,
        &PostForm {
            title: "With excerpt".to_string(),
            content_md: "Long body text.".to_string(),
            excerpt: Some("Hand-written summary".to_string()),
            status: Some(STATUS_PUBLISHED.to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    make_post(
        &pool,
        "Without excerpt",
        STATUS_PUBLISHED,
    );

    let feed = content::find_published(&pool);
    let explicit = feed.iter().find(|p| p.post.id == id).unwrap();
    assert_eq!(content::excerpt(explicit, 200), "Hand-written summary");

    let derived = feed.iter().find(|p| p.post.id != id).unwrap();
    let text = content::excerpt(derived, 200);
    assert!(text.contains("Body of Without excerpt."));
    assert!(!text.contains('<'));
}

#[test]
fn test_excerpt_cuts_at_word_boundary() {
    let pool = test_pool();
    let id = Post::create(
        &pool,
        &PostForm {
            title: "Long".to_string(),
            content_md: "alpha bravo charlie delta echo foxtrot golf hotel".to_string(),
            status: Some(STATUS_PUBLISHED.to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    let feed = content::find_published(&pool);
    let post = feed.iter().find(|p| p.post.id == id).unwrap();

    let text = content::excerpt(post, 20);
    assert!(text.ends_with("..."));
    // never cuts through a word
    assert_eq!(text, "alpha bravo charlie...");
}

#[test]
fn test_reading_time_minimum_one_minute() {
    let pool = test_pool();
    make_post(&pool, "Tiny", STATUS_PUBLISHED);
    let feed = content::find_published(&pool);
    assert_eq!(content::reading_time(&feed[0]), 1);
}

#[test]
fn test_internal_refs_resolve_against_database() {
    let pool = test_pool();
    make_post(&pool, "Hello World", STATUS_PUBLISHED);
    let id = Post::create(
        &pool,
        &PostForm {
            title: "Pointer".to_string(),
            content_md: "See [[hello-world]] and [[missing-one]].".to_string(),
            status: Some(STATUS_PUBLISHED.to_string()),
            ..Default::default()
        },
    )
    .unwrap();

    let html = Post::find_by_id(&pool, id).unwrap().content_html.unwrap();
    assert!(html.contains("<a href=\"/post/hello-world/\">Hello World</a>"));
    assert!(html.contains("⚠ missing-one"));
}

// ── Static generation ────────────────────────────────────────────────────

#[test]
fn test_generate_paginates_the_home_feed() {
    let pool = test_pool();
    db::seed_defaults(&pool).unwrap();
    crate::models::option::SiteOption::set(&pool, "posts_per_page", "10").unwrap();
    for i in 0..25 {
        make_post(&pool, &format!("Post number {}", i), STATUS_PUBLISHED);
    }

    let (generator, out) = make_generator(&pool, "paginate");
    let report = generator.generate_all();
    assert!(report.success, "{:?}", report.error);
    assert_eq!(report.index.unwrap().pages, 3);
    assert_eq!(report.posts.unwrap().count, 25);

    let index = std::fs::read_to_string(out.join("index.html")).unwrap();
    let page1 = std::fs::read_to_string(out.join("page/1/index.html")).unwrap();
    assert_eq!(index, page1);

    assert!(out.join("page/3/index.html").exists());
    assert!(!out.join("page/4/index.html").exists());

    // page 2 links back to the root, not to /page/1/
    let page2 = std::fs::read_to_string(out.join("page/2/index.html")).unwrap();
    assert!(page2.contains("href=\"/\""));
    assert!(page2.contains("href=\"/page/3/\""));
}

#[test]
fn test_generate_single_page_has_no_pagination() {
    let pool = test_pool();
    make_post(&pool, "Lonely", STATUS_PUBLISHED);

    let (generator, out) = make_generator(&pool, "single");
    assert!(generator.generate_all().success);

    let index = std::fs::read_to_string(out.join("index.html")).unwrap();
    assert!(!index.contains("class=\"pagination\""));
}

#[test]
fn test_generate_is_idempotent() {
    let pool = test_pool();
    for i in 0..3 {
        make_post(&pool, &format!("Stable {}", i), STATUS_PUBLISHED);
    }

    let (generator, out) = make_generator(&pool, "idempotent");
    assert!(generator.generate_all().success);
    let first = std::fs::read_to_string(out.join("index.html")).unwrap();

    assert!(generator.generate_all().success);
    let second = std::fs::read_to_string(out.join("index.html")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_generate_writes_facet_pages() {
    let pool = test_pool();
    let root = make_category(&pool, "Cuisine", None);
    let child = make_category(&pool, "Desserts", Some(root));
    let post_id = Post::create(
        &pool,
        &PostForm {
            title: "Tarte".to_string(),
            content_md: "Body.".to_string(),
            status: Some(STATUS_PUBLISHED.to_string()),
            category_id: Some(child),
            tags: vec!["Sucré".to_string()],
            ..Default::default()
        },
    )
    .unwrap();

    let (generator, out) = make_generator(&pool, "facets");
    let report = generator.generate_all();
    assert!(report.success);
    assert_eq!(report.categories.unwrap().count, 2);
    assert_eq!(report.tags.unwrap().count, 1);

    let child_path = Category::find_by_id(&pool, child).unwrap().path;
    let page = std::fs::read_to_string(
        out.join(format!("category/{}/index.html", child_path)),
    )
    .unwrap();
    assert!(page.contains("Tarte"));

    let cats = std::fs::read_to_string(out.join("categories/index.html")).unwrap();
    assert!(cats.contains("Cuisine"));
    assert!(cats.contains("Desserts"));

    let tag_slug = Tag::for_post(&pool, post_id)[0].slug.clone();
    assert!(out.join(format!("tag/{}/index.html", tag_slug)).exists());
    assert!(out.join("tags/index.html").exists());
}

#[test]
fn test_generate_post_page_details() {
    let pool = test_pool();
    make_post(&pool, "Older", STATUS_PUBLISHED);
    std::thread::sleep(std::time::Duration::from_millis(5));
    make_post(&pool, "Newer", STATUS_PUBLISHED);

    let (generator, out) = make_generator(&pool, "postpage");
    assert!(generator.generate_all().success);

    let newer = std::fs::read_to_string(out.join("post/newer/index.html")).unwrap();
    assert!(newer.contains("min read"));
    assert!(newer.contains("/post/older/"));

    let older = std::fs::read_to_string(out.join("post/older/index.html")).unwrap();
    assert!(older.contains("/post/newer/"));
}

#[test]
fn test_search_index_fields() {
    let pool = test_pool();
    Post::create(
        &pool,
        &PostForm {
            title: "Findable".to_string(),
            content_md: "# Heading\n\nSearchable body text.".to_string(),
            status: Some(STATUS_PUBLISHED.to_string()),
            tags: vec!["Rust".to_string()],
            ..Default::default()
        },
    )
    .unwrap();

    let (generator, out) = make_generator(&pool, "search");
    let report = generator.generate_all();
    assert!(report.success);
    let stats = report.search_index.unwrap();
    assert_eq!(stats.posts, 1);
    assert!(stats.size > 0);

    let raw = std::fs::read_to_string(out.join("search-index.json")).unwrap();
    let entries: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let entry = &entries[0];
    assert_eq!(entry["title"], "Findable");
    assert_eq!(entry["url"], "/post/findable/");
    assert_eq!(entry["tags"][0], "Rust");
    // content is tag-free text
    let content = entry["content"].as_str().unwrap();
    assert!(content.contains("Searchable body text."));
    assert!(!content.contains('<'));
}

#[test]
fn test_generation_appends_log_line() {
    let pool = test_pool();
    make_post(&pool, "Logged", STATUS_PUBLISHED);

    let root = temp_dir("genlog");
    let log_file = root.join("cache/generator.log");
    let generator = Generator::new(
        pool.clone(),
        root.join("static"),
        root.join("cache/generator.lock"),
        log_file.clone(),
    );
    assert!(generator.generate_all().success);
    assert!(generator.generate_all().success);

    let log = std::fs::read_to_string(&log_file).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("\"success\":true"));
    assert!(lines[0].contains("\"generated_at\""));
}

// ── Options ──────────────────────────────────────────────────────────────

#[test]
fn test_options_typed_getters_and_snapshot() {
    let pool = test_pool();
    db::seed_defaults(&pool).unwrap();

    let snapshot = temp_dir("options").join("options.cache.json");
    let options = Options::new(pool.clone(), snapshot.clone());

    assert_eq!(options.get_int("posts_per_page", 7), 10);
    assert_eq!(options.get_string("site_name", "?"), "Mon Blog");
    assert_eq!(options.get_int("no_such_key", 42), 42);
    assert!(!options.get_bool("no_such_key", false));

    options.set("posts_per_page", "5").unwrap();
    assert_eq!(options.get_int("posts_per_page", 7), 5);

    // Snapshot written on change and readable as plain JSON.
    let raw = std::fs::read_to_string(&snapshot).unwrap();
    let map: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(map["posts_per_page"], "5");

    // A second service sees the persisted value after invalidation.
    let other = Options::new(pool, snapshot);
    assert_eq!(other.get_int("posts_per_page", 7), 5);
}

// ── Auth and rate limiting ───────────────────────────────────────────────

#[test]
fn test_login_and_rate_limit_block() {
    let pool = test_pool();
    User::create(&pool, "alice", "alice@example.com", "s3cret", ROLE_ADMIN).unwrap();

    // Good credentials work and stamp last_login_at.
    let user = auth::login(&pool, "alice@example.com", "s3cret", "10.0.0.1").unwrap();
    assert!(User::find_by_id(&pool, user.id).unwrap().last_login_at.is_some());

    // Failures share one message for wrong password and unknown account.
    let e1 = auth::login(&pool, "alice@example.com", "wrong", "10.0.0.2").unwrap_err();
    let e2 = auth::login(&pool, "nobody@example.com", "wrong", "10.0.0.2").unwrap_err();
    assert_eq!(e1, e2);

    // The fifth failure from one IP starts a block.
    for _ in 0..3 {
        let _ = auth::login(&pool, "alice@example.com", "wrong", "10.0.0.2");
    }
    let blocked = auth::login(&pool, "alice@example.com", "s3cret", "10.0.0.2").unwrap_err();
    assert!(blocked.contains("Too many attempts"));

    // Other IPs are unaffected.
    assert!(auth::login(&pool, "alice@example.com", "s3cret", "10.0.0.3").is_ok());
}

#[test]
fn test_rate_limit_reset_and_security_log() {
    let pool = test_pool();
    for i in 0..rate_limit::MAX_ATTEMPTS {
        let blocked = rate_limit::record_attempt(&pool, "1.2.3.4", "login").unwrap();
        assert_eq!(blocked, i == rate_limit::MAX_ATTEMPTS - 1);
    }
    assert!(rate_limit::is_blocked(&pool, "1.2.3.4", "login"));

    // The block event landed in the audit trail.
    let conn = pool.get().unwrap();
    let events: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM security_logs WHERE event_type = 'rate_limit_block'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(events, 1);
    drop(conn);

    rate_limit::reset(&pool, "1.2.3.4", "login").unwrap();
    assert!(!rate_limit::is_blocked(&pool, "1.2.3.4", "login"));
}

#[test]
fn test_inactive_user_cannot_login() {
    let pool = test_pool();
    let id = User::create(&pool, "bob", "bob@example.com", "pw12345", ROLE_REDACTOR).unwrap();
    User::set_active(&pool, id, false).unwrap();
    assert!(auth::login(&pool, "bob@example.com", "pw12345", "10.0.0.9").is_err());
}

#[test]
fn test_role_permissions() {
    let pool = test_pool();
    let admin = User::create(&pool, "root", "root@example.com", "pw", ROLE_ADMIN).unwrap();
    let writer = User::create(&pool, "w", "w@example.com", "pw", ROLE_REDACTOR).unwrap();

    let admin = User::find_by_id(&pool, admin).unwrap();
    let writer = User::find_by_id(&pool, writer).unwrap();

    assert!(admin.is_admin());
    assert!(admin.has_permission("manage_users"));
    assert!(writer.has_permission("manage_posts"));
    assert!(!writer.has_permission("manage_users"));
    assert!(!writer.is_admin());
    assert!(User::create(&pool, "x", "x@example.com", "pw", "OVERLORD").is_err());
}

// ── Media ────────────────────────────────────────────────────────────────

#[test]
fn test_media_store_and_delete() {
    let pool = test_pool();
    let uploads = temp_dir("uploads");

    let id = crate::models::media::Media::store(
        &pool,
        &uploads,
        "Photo de Vacances.png",
        "image/png",
        &[0x89, 0x50, 0x4e, 0x47],
        None,
    )
    .unwrap();

    let media = crate::models::media::Media::find_by_id(&pool, id).unwrap();
    assert_eq!(media.mime_type, "image/png");
    assert_eq!(media.size, 4);
    assert!(media.path.contains('/'));
    assert!(media.filename.starts_with("photo-de-vacances-"));
    assert!(uploads.join(&media.path).exists());

    crate::models::media::Media::update_meta(&pool, id, Some("a beach"), None).unwrap();
    assert_eq!(
        crate::models::media::Media::find_by_id(&pool, id).unwrap().alt_text.as_deref(),
        Some("a beach")
    );
    assert_eq!(crate::models::media::Media::list(&pool).len(), 1);

    crate::models::media::Media::delete(&pool, &uploads, id).unwrap();
    assert!(crate::models::media::Media::find_by_id(&pool, id).is_none());
    assert!(!uploads.join(&media.path).exists());
}

#[test]
fn test_media_rejects_bad_uploads() {
    let pool = test_pool();
    let uploads = temp_dir("uploads_bad");

    let err = crate::models::media::Media::store(
        &pool,
        &uploads,
        "payload.exe",
        "application/x-msdownload",
        &[0u8; 4],
        None,
    );
    assert!(err.is_err());

    let big = vec![0u8; (crate::models::media::MAX_SIZE + 1) as usize];
    let err = crate::models::media::Media::store(
        &pool,
        &uploads,
        "huge.png",
        "image/png",
        &big,
        None,
    );
    assert!(err.is_err());
}

// ── Deletions and smaller operations ─────────────────────────────────────

#[test]
fn test_post_delete_cascades_tag_links() {
    let pool = test_pool();
    let id = Post::create(
        &pool,
        &PostForm {
            title: "Doomed".to_string(),
            content_md: "Body.".to_string(),
            status: Some(STATUS_PUBLISHED.to_string()),
            tags: vec!["Keep".to_string()],
            ..Default::default()
        },
    )
    .unwrap();

    Post::increment_views(&pool, id).unwrap();
    assert_eq!(Post::find_by_id(&pool, id).unwrap().view_count, 1);

    Post::delete(&pool, id).unwrap();
    assert!(Post::find_by_id(&pool, id).is_none());
    assert!(Post::list(&pool).is_empty());

    // The tag itself stays; only the link rows go.
    assert_eq!(Tag::list(&pool).len(), 1);
    let conn = pool.get().unwrap();
    let links: i64 = conn
        .query_row("SELECT COUNT(*) FROM post_tags", [], |r| r.get(0))
        .unwrap();
    assert_eq!(links, 0);
}

#[test]
fn test_tag_update_and_delete() {
    let pool = test_pool();
    let id = Tag::find_or_create(&pool, "Rust").unwrap();
    // Same slugified name resolves to the same tag.
    assert_eq!(Tag::find_or_create(&pool, "rust").unwrap(), id);

    Tag::update(&pool, id, "Rust Lang", Some("the language")).unwrap();
    assert_eq!(Tag::find_by_id(&pool, id).unwrap().name, "Rust Lang");

    Tag::delete(&pool, id).unwrap();
    assert!(Tag::find_by_id(&pool, id).is_none());
}

#[test]
fn test_category_lookups_and_counts() {
    let pool = test_pool();
    let root = make_category(&pool, "Cuisine", None);
    let child = make_category(&pool, "Desserts", Some(root));
    Post::create(
        &pool,
        &PostForm {
            title: "Tarte".to_string(),
            content_md: "Body.".to_string(),
            status: Some(STATUS_PUBLISHED.to_string()),
            category_id: Some(child),
            ..Default::default()
        },
    )
    .unwrap();

    let by_slug = Category::find_by_slug(&pool, "desserts").unwrap();
    assert_eq!(by_slug.id, child);
    let by_path = Category::find_by_path(&pool, &by_slug.path).unwrap();
    assert_eq!(by_path.id, child);

    assert_eq!(Category::count(&pool), 2);
    assert_eq!(Category::count_posts(&pool, child), 1);
    assert_eq!(Category::count_posts(&pool, root), 0);
    assert_eq!(by_path.indented_name(), "— Desserts");
}

#[test]
fn test_option_row_typed_accessors() {
    let pool = test_pool();
    db::seed_defaults(&pool).unwrap();

    let row = crate::models::option::SiteOption::find(&pool, "posts_per_page").unwrap();
    assert_eq!(row.kind, "integer");
    assert_eq!(row.as_int(), Some(10));
    assert!(!row.as_bool());

    crate::models::option::SiteOption::set(&pool, "comments_enabled", "1").unwrap();
    let flag = crate::models::option::SiteOption::find(&pool, "comments_enabled").unwrap();
    assert!(flag.as_bool());
}

#[test]
fn test_user_password_change() {
    let pool = test_pool();
    let id = User::create(&pool, "carol", "carol@example.com", "old-pass", ROLE_ADMIN).unwrap();
    User::set_password(&pool, id, "new-pass").unwrap();

    let user = User::find_by_id(&pool, id).unwrap();
    assert!(user.verify_password("new-pass"));
    assert!(!user.verify_password("old-pass"));
}

// ── Seeds ────────────────────────────────────────────────────────────────

#[test]
fn test_seed_is_idempotent() {
    let pool = test_pool();
    db::seed_defaults(&pool).unwrap();
    db::seed_defaults(&pool).unwrap();

    let conn = pool.get().unwrap();
    let admins: i64 = conn
        .query_row("SELECT COUNT(*) FROM users WHERE role = 'ADMIN'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(admins, 1);

    let per_page: String = conn
        .query_row(
            "SELECT value FROM options WHERE key = 'posts_per_page'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(per_page, "10");
}
