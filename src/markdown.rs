use std::sync::OnceLock;

use regex::Regex;

/// The fixed substitution pipeline applied to post bodies. This is a small,
/// deliberate subset of Markdown: headings (h1-h3), bold, italic, images,
/// links, flat lists, and paragraphs. Raw HTML in the source is escaped
/// before any rule runs, so posts cannot inject markup.
struct Rules {
    h3: Regex,
    h2: Regex,
    h1: Regex,
    bold: Regex,
    italic: Regex,
    image: Regex,
    link: Regex,
    list_item: Regex,
    list_wrap: Regex,
    para_break: Regex,
    p_open_fix: Regex,
    p_close_fix: Regex,
    tag: Regex,
    whitespace: Regex,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| Rules {
        h3: Regex::new(r"(?m)^### (.+)$").unwrap(),
        h2: Regex::new(r"(?m)^## (.+)$").unwrap(),
        h1: Regex::new(r"(?m)^# (.+)$").unwrap(),
        bold: Regex::new(r"(?s)\*\*(.+?)\*\*").unwrap(),
        italic: Regex::new(r"(?s)\*(.+?)\*").unwrap(),
        image: Regex::new(r"!\[(.+?)\]\((.+?)\)").unwrap(),
        link: Regex::new(r"\[(.+?)\]\((.+?)\)").unwrap(),
        list_item: Regex::new(r"(?m)^- (.+)$").unwrap(),
        list_wrap: Regex::new(r"((?:<li>.*</li>\n?)+)").unwrap(),
        para_break: Regex::new(r"\n{2,}").unwrap(),
        p_open_fix: Regex::new(r"<p><(h[1-3]|ul|li)").unwrap(),
        p_close_fix: Regex::new(r"</(h[1-3]|ul|li)></p>").unwrap(),
        tag: Regex::new(r"<[^>]*>").unwrap(),
        whitespace: Regex::new(r"\s+").unwrap(),
    })
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render markdown to HTML. The rule order matters: escaping first, most
/// specific heading first, bold before italic, images before links, lists
/// before paragraph wrapping.
pub fn render(markdown: &str) -> String {
    let r = rules();

    let text = escape_html(markdown);

    let text = r.h3.replace_all(&text, "<h3>$1</h3>");
    let text = r.h2.replace_all(&text, "<h2>$1</h2>");
    let text = r.h1.replace_all(&text, "<h1>$1</h1>");

    let text = r.bold.replace_all(&text, "<strong>$1</strong>");
    let text = r.italic.replace_all(&text, "<em>$1</em>");

    let text = r.image.replace_all(&text, "<img src=\"$2\" alt=\"$1\">");
    let text = r.link.replace_all(&text, "<a href=\"$2\">$1</a>");

    let text = r.list_item.replace_all(&text, "<li>$1</li>");
    let text = r.list_wrap.replace_all(&text, "<ul>$1</ul>");

    let body = r.para_break.replace_all(text.trim(), "</p><p>");
    let html = format!("<p>{}</p>", body);

    let html = r.p_open_fix.replace_all(&html, "<$1");
    let html = r.p_close_fix.replace_all(&html, "</$1>");

    html.into_owned()
}

/// Remove every HTML tag, leaving the text content.
pub fn strip_tags(html: &str) -> String {
    rules().tag.replace_all(html, "").into_owned()
}

/// Collapse any whitespace run to a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    rules().whitespace.replace_all(text.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escapes_raw_html() {
        let html = render("Hello <script>alert('x')</script>");
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&#039;x&#039;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_headings() {
        assert_eq!(render("# Title"), "<h1>Title</h1>");
        assert_eq!(render("## Sub"), "<h2>Sub</h2>");
        assert_eq!(render("### Deep"), "<h3>Deep</h3>");
    }

    #[test]
    fn test_heading_only_at_line_start() {
        let html = render("not # a heading");
        assert!(!html.contains("<h1>"));
    }

    #[test]
    fn test_bold_before_italic() {
        let html = render("**bold** and *slanted*");
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<em>slanted</em>"));
    }

    #[test]
    fn test_image_before_link() {
        let html = render("![cat](/img/cat.png) and [home](/)");
        assert!(html.contains("<img src=\"/img/cat.png\" alt=\"cat\">"));
        assert!(html.contains("<a href=\"/\">home</a>"));
        // image must not be mangled into a link with a stray '!'
        assert!(!html.contains("!<a"));
    }

    #[test]
    fn test_list_run_wrapped_once() {
        let html = render("- one\n- two\n- three");
        assert_eq!(html.matches("<ul>").count(), 1);
        assert_eq!(html.matches("<li>").count(), 3);
        assert!(html.contains("<li>one</li>"));
    }

    #[test]
    fn test_paragraph_split_on_blank_lines() {
        let html = render("first\n\nsecond\n\n\nthird");
        assert_eq!(html, "<p>first</p><p>second</p><p>third</p>");
    }

    #[test]
    fn test_block_elements_not_wrapped_in_p() {
        let html = render("# Title\n\nbody text");
        assert!(html.starts_with("<h1>Title</h1>"));
        assert!(html.contains("<p>body text</p>"));
        assert!(!html.contains("<p><h1>"));
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<p>Hello <strong>world</strong></p>"), "Hello world");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b   c  "), "a b c");
    }
}
