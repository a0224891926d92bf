use crate::content::{self, PublishedPost};
use crate::markdown::escape_html;
use crate::models::category::Category;
use crate::models::tag::Tag;
use crate::options::Options;

/// Site-wide values every page needs, read once per generation pass so all
/// pages of one run agree.
#[derive(Debug, Clone)]
pub struct SiteMeta {
    pub name: String,
    pub description: String,
    pub language: String,
    pub title_suffix: String,
    pub theme_color: String,
    pub posts_per_page: usize,
    pub excerpt_length: usize,
}

impl SiteMeta {
    pub fn from_options(options: &Options) -> Self {
        SiteMeta {
            name: options.get_string("site_name", "Blog"),
            description: options.get_string("site_description", ""),
            language: options.get_string("site_language", "en"),
            title_suffix: options.get_string("meta_title_suffix", ""),
            theme_color: options.get_string("theme_color", "#4f46e5"),
            posts_per_page: options.get_int("posts_per_page", 10).max(1) as usize,
            excerpt_length: options.get_int("excerpt_length", 200).max(1) as usize,
        }
    }
}

/// Shared page skeleton. Deliberately timestamp-free so re-running the
/// generator over unchanged content produces byte-identical files.
fn layout(meta: &SiteMeta, title: &str, body: &str) -> String {
    let mut page = String::with_capacity(body.len() + 1024);
    page.push_str("<!DOCTYPE html>\n");
    page.push_str(&format!("<html lang=\"{}\">\n", escape_html(&meta.language)));
    page.push_str("<head>\n<meta charset=\"utf-8\">\n");
    page.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    page.push_str(&format!(
        "<title>{}{}</title>\n",
        escape_html(title),
        escape_html(&meta.title_suffix)
    ));
    if !meta.description.is_empty() {
        page.push_str(&format!(
            "<meta name=\"description\" content=\"{}\">\n",
            escape_html(&meta.description)
        ));
    }
    page.push_str(&format!(
        "<meta name=\"theme-color\" content=\"{}\">\n",
        escape_html(&meta.theme_color)
    ));
    page.push_str("</head>\n<body>\n");
    page.push_str(&format!(
        "<header><h1><a href=\"/\">{}</a></h1></header>\n",
        escape_html(&meta.name)
    ));
    page.push_str("<main>\n");
    page.push_str(body);
    page.push_str("</main>\n");
    page.push_str(&format!(
        "<footer><p>{}</p></footer>\n",
        escape_html(&meta.name)
    ));
    page.push_str("</body>\n</html>\n");
    page
}

fn post_card(meta: &SiteMeta, post: &PublishedPost) -> String {
    let mut card = String::new();
    card.push_str("<article class=\"post-card\">\n");
    card.push_str(&format!(
        "<h2><a href=\"/post/{}/\">{}</a></h2>\n",
        post.post.slug,
        escape_html(&post.post.title)
    ));
    card.push_str("<p class=\"meta\">");
    if let Some(date) = &post.post.published_at {
        card.push_str(&format!(
            "<time datetime=\"{}\">{}</time>",
            date.format("%Y-%m-%d"),
            date.format("%d/%m/%Y")
        ));
    }
    if let Some(author) = &post.author_name {
        card.push_str(&format!(" · {}", escape_html(author)));
    }
    if let (Some(name), Some(path)) = (&post.category_name, &post.category_path) {
        card.push_str(&format!(
            " · <a href=\"/category/{}/\">{}</a>",
            path,
            escape_html(name)
        ));
    }
    card.push_str("</p>\n");
    card.push_str(&format!(
        "<p>{}</p>\n",
        escape_html(&content::excerpt(post, meta.excerpt_length))
    ));
    card.push_str("</article>\n");
    card
}

fn pagination_nav(page: usize, total_pages: usize) -> String {
    if total_pages <= 1 {
        return String::new();
    }
    let mut nav = String::from("<nav class=\"pagination\">\n");
    if page > 1 {
        let prev = if page == 2 {
            "/".to_string()
        } else {
            format!("/page/{}/", page - 1)
        };
        nav.push_str(&format!("<a class=\"prev\" href=\"{}\">&larr; Previous</a>\n", prev));
    }
    nav.push_str(&format!(
        "<span class=\"current\">Page {} / {}</span>\n",
        page, total_pages
    ));
    if page < total_pages {
        nav.push_str(&format!(
            "<a class=\"next\" href=\"/page/{}/\">Next &rarr;</a>\n",
            page + 1
        ));
    }
    nav.push_str("</nav>\n");
    nav
}

/// One page of the home feed. The featured block only appears on page 1;
/// deeper pages are a plain reverse-chronological list.
pub fn render_index(meta: &SiteMeta, posts: &[PublishedPost], page: usize, total_pages: usize) -> String {
    let mut body = String::new();

    if page == 1 {
        let featured: Vec<_> = posts.iter().filter(|p| p.post.is_featured).collect();
        let regular: Vec<_> = posts.iter().filter(|p| !p.post.is_featured).collect();

        if !featured.is_empty() {
            body.push_str("<section class=\"featured\">\n<h2>Featured</h2>\n");
            for post in featured {
                body.push_str(&post_card(meta, post));
            }
            body.push_str("</section>\n");
        }
        body.push_str("<section class=\"posts\">\n");
        for post in regular {
            body.push_str(&post_card(meta, post));
        }
        body.push_str("</section>\n");
    } else {
        body.push_str("<section class=\"posts\">\n");
        for post in posts {
            body.push_str(&post_card(meta, post));
        }
        body.push_str("</section>\n");
    }

    body.push_str(&pagination_nav(page, total_pages));

    let title = if page == 1 {
        meta.name.clone()
    } else {
        format!("{}, page {}", meta.name, page)
    };
    layout(meta, &title, &body)
}

/// A single post page, with prev/next links following the global feed order.
pub fn render_post(
    meta: &SiteMeta,
    post: &PublishedPost,
    prev: Option<&PublishedPost>,
    next: Option<&PublishedPost>,
) -> String {
    let mut body = String::new();
    body.push_str("<article class=\"post\">\n");
    body.push_str(&format!("<h1>{}</h1>\n", escape_html(&post.post.title)));

    body.push_str("<p class=\"meta\">");
    if let Some(date) = &post.post.published_at {
        body.push_str(&format!(
            "<time datetime=\"{}\">{}</time>",
            date.format("%Y-%m-%d"),
            date.format("%d/%m/%Y")
        ));
    }
    if let Some(author) = &post.author_name {
        body.push_str(&format!(" · {}", escape_html(author)));
    }
    if let (Some(name), Some(path)) = (&post.category_name, &post.category_path) {
        body.push_str(&format!(
            " · <a href=\"/category/{}/\">{}</a>",
            path,
            escape_html(name)
        ));
    }
    body.push_str(&format!(" · {} min read", content::reading_time(post)));
    body.push_str("</p>\n");

    body.push_str("<div class=\"content\">\n");
    body.push_str(&post.content_html);
    body.push_str("\n</div>\n");

    if !post.tags.is_empty() {
        body.push_str("<p class=\"tags\">");
        for tag in &post.tags {
            body.push_str(&format!(
                "<a href=\"/tag/{}/\">#{}</a> ",
                tag.slug,
                escape_html(&tag.name)
            ));
        }
        body.push_str("</p>\n");
    }
    body.push_str("</article>\n");

    if prev.is_some() || next.is_some() {
        body.push_str("<nav class=\"post-nav\">\n");
        if let Some(p) = prev {
            body.push_str(&format!(
                "<a class=\"prev\" href=\"/post/{}/\">&larr; {}</a>\n",
                p.post.slug,
                escape_html(&p.post.title)
            ));
        }
        if let Some(n) = next {
            body.push_str(&format!(
                "<a class=\"next\" href=\"/post/{}/\">{} &rarr;</a>\n",
                n.post.slug,
                escape_html(&n.post.title)
            ));
        }
        body.push_str("</nav>\n");
    }

    layout(meta, &post.post.title, &body)
}

pub fn render_category_page(meta: &SiteMeta, category: &Category, posts: &[PublishedPost]) -> String {
    let mut body = String::new();
    body.push_str(&format!("<h1>{}</h1>\n", escape_html(&category.name)));
    if let Some(description) = &category.description {
        body.push_str(&format!("<p class=\"description\">{}</p>\n", escape_html(description)));
    }
    body.push_str("<section class=\"posts\">\n");
    for post in posts {
        body.push_str(&post_card(meta, post));
    }
    body.push_str("</section>\n");
    layout(meta, &category.name, &body)
}

pub fn render_tag_page(meta: &SiteMeta, tag: &Tag, posts: &[PublishedPost]) -> String {
    let mut body = String::new();
    body.push_str(&format!("<h1>#{}</h1>\n", escape_html(&tag.name)));
    body.push_str("<section class=\"posts\">\n");
    for post in posts {
        body.push_str(&post_card(meta, post));
    }
    body.push_str("</section>\n");
    layout(meta, &tag.name, &body)
}

/// Facet index of every category, indented by depth, with post counts.
pub fn render_categories_index(meta: &SiteMeta, categories: &[(Category, i64)]) -> String {
    let mut body = String::from("<h1>Categories</h1>\n<ul class=\"categories\">\n");
    for (category, count) in categories {
        let href = if category.path.is_empty() {
            category.slug.clone()
        } else {
            category.path.clone()
        };
        body.push_str(&format!(
            "<li style=\"margin-left: {}em\"><a href=\"/category/{}/\">{}</a> ({})</li>\n",
            category.depth,
            href,
            escape_html(&category.name),
            count
        ));
    }
    body.push_str("</ul>\n");
    layout(meta, "Categories", &body)
}

pub fn render_tags_index(meta: &SiteMeta, tags: &[(Tag, i64)]) -> String {
    let mut body = String::from("<h1>Tags</h1>\n<ul class=\"tags\">\n");
    for (tag, count) in tags {
        body.push_str(&format!(
            "<li><a href=\"/tag/{}/\">#{}</a> ({})</li>\n",
            tag.slug,
            escape_html(&tag.name),
            count
        ));
    }
    body.push_str("</ul>\n");
    layout(meta, "Tags", &body)
}
