use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{error, info};
use serde::Serialize;

use crate::content::{self, LinkIndex, PublishedPost};
use crate::db::DbPool;
use crate::lock::GenerationLock;
use crate::models::category::Category;
use crate::models::tag::Tag;
use crate::options::Options;
use crate::render::{self, SiteMeta};

/// Characters kept in search index excerpts.
const SEARCH_EXCERPT_LEN: usize = 150;

#[derive(Debug, Serialize, Default)]
pub struct PageStats {
    pub pages: usize,
}

#[derive(Debug, Serialize, Default)]
pub struct CountStats {
    pub count: usize,
}

#[derive(Debug, Serialize, Default)]
pub struct SearchStats {
    pub posts: usize,
    pub size: usize,
}

/// Outcome of one generation run. Serialized as one JSON line in the
/// generation log; steps that never ran stay absent.
#[derive(Debug, Serialize, Default)]
pub struct GenerationReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<PageStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts: Option<CountStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<CountStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<CountStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_index: Option<SearchStats>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
struct SearchEntry {
    title: String,
    url: String,
    excerpt: String,
    content: String,
    tags: Vec<String>,
}

pub struct Generator {
    pool: DbPool,
    output_dir: PathBuf,
    lock_file: PathBuf,
    log_file: PathBuf,
}

impl Generator {
    pub fn new(pool: DbPool, output_dir: PathBuf, lock_file: PathBuf, log_file: PathBuf) -> Self {
        Generator {
            pool,
            output_dir,
            lock_file,
            log_file,
        }
    }

    /// Run the full pipeline under the generation lock. The step order is
    /// fixed: home feed, post pages, category pages, tag pages, search
    /// index. Every run, successful or not, appends one line to the log.
    pub fn generate_all(&self) -> GenerationReport {
        let mut report = GenerationReport::default();

        let guard = match GenerationLock::acquire(&self.lock_file) {
            Ok(Some(g)) => g,
            Ok(None) => {
                report.error = Some("Another generation is already running".to_string());
                self.append_log(&report);
                return report;
            }
            Err(e) => {
                report.error = Some(e);
                self.append_log(&report);
                return report;
            }
        };

        let outcome = self.run_steps(&mut report);
        match outcome {
            Ok(()) => {
                report.success = true;
                report.generated_at =
                    Some(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string());
                info!("Site generation finished");
            }
            Err(e) => {
                error!("Site generation failed: {}", e);
                report.error = Some(e);
            }
        }

        self.append_log(&report);
        drop(guard);
        report
    }

    fn run_steps(&self, report: &mut GenerationReport) -> Result<(), String> {
        let options = Options::new(self.pool.clone(), self.log_file.with_file_name("options.cache.json"));
        let meta = SiteMeta::from_options(&options);

        // One snapshot of the published feed drives every step, re-rendered
        // against a single link index so all pages agree.
        let link_index = LinkIndex::build(&self.pool);
        let mut feed = content::find_published(&self.pool);
        for post in &mut feed {
            post.content_html = content::render_with_index(&post.post.content_md, &link_index);
        }

        report.index = Some(self.generate_index(&meta, &feed)?);
        report.posts = Some(self.generate_posts(&meta, &feed)?);
        report.categories = Some(self.generate_categories(&meta)?);
        report.tags = Some(self.generate_tags(&meta)?);
        report.search_index = Some(self.generate_search_index(&feed)?);
        Ok(())
    }

    /// Paginated home feed. Page 1 is written both as the site root and as
    /// /page/1/, byte for byte identical.
    fn generate_index(&self, meta: &SiteMeta, feed: &[PublishedPost]) -> Result<PageStats, String> {
        let per_page = meta.posts_per_page;
        let total_pages = std::cmp::max(1, feed.len().div_ceil(per_page));

        for page in 1..=total_pages {
            let start = (page - 1) * per_page;
            let end = std::cmp::min(start + per_page, feed.len());
            let slice = &feed[start..end];

            let html = render::render_index(meta, slice, page, total_pages);
            if page == 1 {
                self.write_file(Path::new("index.html"), &html)?;
                self.write_file(Path::new("page/1/index.html"), &html)?;
            } else {
                self.write_file(&PathBuf::from(format!("page/{}/index.html", page)), &html)?;
            }
        }

        info!("Generated {} index page(s)", total_pages);
        Ok(PageStats { pages: total_pages })
    }

    /// One page per published post, with prev/next following the feed:
    /// "next" is the adjacent newer post, "prev" the adjacent older one.
    fn generate_posts(&self, meta: &SiteMeta, feed: &[PublishedPost]) -> Result<CountStats, String> {
        for (i, post) in feed.iter().enumerate() {
            let next = if i > 0 { Some(&feed[i - 1]) } else { None };
            let prev = feed.get(i + 1);

            let html = render::render_post(meta, post, prev, next);
            let path = PathBuf::from(format!("post/{}/index.html", post.post.slug));
            self.write_file(&path, &html)?;
        }

        info!("Generated {} post page(s)", feed.len());
        Ok(CountStats { count: feed.len() })
    }

    /// One page per category at its materialized path, plus the category
    /// index listing the whole tree with post counts.
    fn generate_categories(&self, meta: &SiteMeta) -> Result<CountStats, String> {
        let categories = Category::list(&self.pool);
        let mut listed: Vec<(Category, i64)> = Vec::with_capacity(categories.len());

        for category in categories {
            let posts = content::find_by_category(&self.pool, category.id);
            let html = render::render_category_page(meta, &category, &posts);

            let address = if category.path.is_empty() {
                category.slug.clone()
            } else {
                category.path.clone()
            };
            let path = PathBuf::from(format!("category/{}/index.html", address));
            self.write_file(&path, &html)?;

            listed.push((category, posts.len() as i64));
        }

        let index_html = render::render_categories_index(meta, &listed);
        self.write_file(Path::new("categories/index.html"), &index_html)?;

        info!("Generated {} category page(s)", listed.len());
        Ok(CountStats { count: listed.len() })
    }

    fn generate_tags(&self, meta: &SiteMeta) -> Result<CountStats, String> {
        let tags = Tag::list(&self.pool);
        let mut listed: Vec<(Tag, i64)> = Vec::with_capacity(tags.len());

        for tag in tags {
            let posts = content::find_by_tag(&self.pool, tag.id);
            let html = render::render_tag_page(meta, &tag, &posts);
            let path = PathBuf::from(format!("tag/{}/index.html", tag.slug));
            self.write_file(&path, &html)?;
            listed.push((tag, posts.len() as i64));
        }

        let index_html = render::render_tags_index(meta, &listed);
        self.write_file(Path::new("tags/index.html"), &index_html)?;

        info!("Generated {} tag page(s)", listed.len());
        Ok(CountStats { count: listed.len() })
    }

    /// Client-side search index: one JSON record per published post.
    fn generate_search_index(&self, feed: &[PublishedPost]) -> Result<SearchStats, String> {
        let entries: Vec<SearchEntry> = feed
            .iter()
            .map(|post| SearchEntry {
                title: post.post.title.clone(),
                url: format!("/post/{}/", post.post.slug),
                excerpt: content::excerpt(post, SEARCH_EXCERPT_LEN),
                content: crate::markdown::strip_tags(&post.content_html),
                tags: post.tags.iter().map(|t| t.name.clone()).collect(),
            })
            .collect();

        let json = serde_json::to_string(&entries).map_err(|e| e.to_string())?;
        let size = json.len();
        self.write_file(Path::new("search-index.json"), &json)?;

        info!("Generated search index ({} post(s), {} bytes)", entries.len(), size);
        Ok(SearchStats {
            posts: entries.len(),
            size,
        })
    }

    fn write_file(&self, relative: &Path, contents: &str) -> Result<(), String> {
        let target = self.output_dir.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Could not create {}: {}", parent.display(), e))?;
        }
        fs::write(&target, contents)
            .map_err(|e| format!("Could not write {}: {}", target.display(), e))
    }

    /// Append the report as one timestamped JSON line. Logging must never
    /// fail a run that already produced its pages.
    fn append_log(&self, report: &GenerationReport) {
        let json = match serde_json::to_string(report) {
            Ok(j) => j,
            Err(e) => {
                error!("Could not serialize generation report: {}", e);
                return;
            }
        };
        let line = format!("{} - {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"), json);

        if let Some(parent) = self.log_file.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Could not create {}: {}", parent.display(), e);
                return;
            }
        }
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = result {
            error!("Could not append to {}: {}", self.log_file.display(), e);
        }
    }
}
