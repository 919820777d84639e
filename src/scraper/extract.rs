//! HTML → title, sections, and outgoing links.
//!
//! Content is read from the first of `<main>`, `<article>`, `div.content`,
//! or `<body>`. Headings build the structural path; paragraph-like blocks
//! shorter than `min_block_chars` are dropped as navigation noise. Links
//! are collected from the whole document since sidebars are how a docs
//! site is traversed.

use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Text under one structural path, blocks joined by blank lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Page title followed by the heading trail.
    pub path: Vec<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: String,
    pub sections: Vec<Section>,
    /// Absolute http(s) links in document order, not yet scoped or deduplicated.
    pub links: Vec<Url>,
}

impl ExtractedPage {
    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.text.trim().is_empty())
    }
}

const IGNORED: &[&str] = &[
    "script", "style", "template", "noscript", "svg", "nav", "footer", "header",
];
const BLOCKS: &[&str] = &["p", "li", "pre", "blockquote", "td"];

#[derive(Clone)]
pub struct Extractor {
    roots: Vec<Selector>,
    h1: Selector,
    title: Selector,
    anchors: Selector,
    min_block_chars: usize,
}

impl Extractor {
    pub fn new(min_block_chars: usize) -> Self {
        let parse = |s: &str| Selector::parse(s).expect("static selector");
        Self {
            roots: ["main", "article", "div.content", "body"]
                .into_iter()
                .map(parse)
                .collect(),
            h1: parse("h1"),
            title: parse("title"),
            anchors: parse("a[href]"),
            min_block_chars,
        }
    }

    pub fn extract(&self, html: &str, base: &Url) -> ExtractedPage {
        let document = Html::parse_document(html);
        let title = self.page_title(&document);
        let root = self.pick_root(&document);

        let mut collector = SectionCollector::new(&title, self.min_block_chars);
        for element in root.descendent_elements() {
            collector.visit(element);
        }

        let links = document
            .select(&self.anchors)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| base.join(href.trim()).ok())
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .collect();

        let sections = collector.finish();
        ExtractedPage {
            title,
            sections,
            links,
        }
    }

    fn pick_root<'a>(&self, document: &'a Html) -> ElementRef<'a> {
        self.roots
            .iter()
            .find_map(|sel| document.select(sel).next())
            .unwrap_or_else(|| document.root_element())
    }

    fn page_title(&self, document: &Html) -> String {
        [&self.h1, &self.title]
            .into_iter()
            .filter_map(|sel| document.select(sel).next())
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .find(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string())
    }
}

struct SectionCollector<'t> {
    title: &'t str,
    min_block_chars: usize,
    headings: Vec<(u8, String)>,
    sections: Vec<Section>,
    skipped_title: bool,
}

impl<'t> SectionCollector<'t> {
    fn new(title: &'t str, min_block_chars: usize) -> Self {
        Self {
            title,
            min_block_chars,
            headings: Vec::new(),
            sections: Vec::new(),
            skipped_title: false,
        }
    }

    fn visit(&mut self, element: ElementRef<'_>) {
        let tag = element.value().name();
        if IGNORED.contains(&tag) || has_ancestor(element, IGNORED) {
            return;
        }

        if let Some(level) = heading_level(tag) {
            let text = collapse_whitespace(&element.text().collect::<String>());
            if text.is_empty() {
                return;
            }
            if level == 1 && !self.skipped_title && text == self.title {
                self.skipped_title = true;
                return;
            }
            self.update_heading_path(level, text);
            return;
        }

        if !BLOCKS.contains(&tag) || has_ancestor(element, BLOCKS) {
            return;
        }
        let text = if tag == "pre" {
            collapse_newlines(&element.text().collect::<String>())
        } else {
            collapse_whitespace(&element.text().collect::<String>())
        };
        if text.chars().count() < self.min_block_chars {
            return;
        }
        self.push_block(text);
    }

    fn update_heading_path(&mut self, level: u8, text: String) {
        while let Some((last, _)) = self.headings.last() {
            if *last >= level {
                self.headings.pop();
            } else {
                break;
            }
        }
        self.headings.push((level, text));
    }

    fn current_path(&self) -> Vec<String> {
        std::iter::once(self.title.to_string())
            .chain(self.headings.iter().map(|(_, t)| t.clone()))
            .collect()
    }

    fn push_block(&mut self, text: String) {
        let path = self.current_path();
        match self.sections.last_mut() {
            Some(section) if section.path == path => {
                section.text.push_str("\n\n");
                section.text.push_str(&text);
            }
            _ => self.sections.push(Section { path, text }),
        }
    }

    fn finish(self) -> Vec<Section> {
        self.sections
    }
}

fn heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn has_ancestor(element: ElementRef<'_>, tags: &[&str]) -> bool {
    element
        .ancestors()
        .filter_map(|node| node.value().as_element())
        .any(|el| tags.contains(&el.name()))
}

fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim().to_string()
}

fn collapse_newlines(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://docs.example.com/guide/").unwrap()
    }

    const PAGE: &str = r#"
<html>
  <head><title>Ignored Title</title></head>
  <body>
    <nav><p>Navigation paragraph that is long enough</p><a href="setup">Setup</a></nav>
    <main>
      <h1>Inviting Judges</h1>
      <p>Judges receive an email invitation link.</p>
      <p>Short.</p>
      <h2>Adding a judge</h2>
      <p>Open the event and press <b>Add judge</b> in the panel.</p>
      <ul><li><p>Enter the judge email address here.</p></li></ul>
      <h3>Bulk import</h3>
      <p>Upload a CSV with one judge per line.</p>
      <h2>Removing a judge</h2>
      <p>Press remove next to the judge name.</p>
      <script>var x = "script content long enough";</script>
      <a href="/guide/judging#scores">Scores</a>
      <a href="mailto:help@example.com">Mail</a>
    </main>
    <footer><p>Footer text that is also long enough</p></footer>
  </body>
</html>
"#;

    #[test]
    fn sections_follow_heading_hierarchy() {
        let page = Extractor::new(15).extract(PAGE, &base());
        assert_eq!(page.title, "Inviting Judges");
        let paths: Vec<Vec<&str>> = page
            .sections
            .iter()
            .map(|s| s.path.iter().map(String::as_str).collect())
            .collect();
        assert_eq!(
            paths,
            vec![
                vec!["Inviting Judges"],
                vec!["Inviting Judges", "Adding a judge"],
                vec!["Inviting Judges", "Adding a judge", "Bulk import"],
                vec!["Inviting Judges", "Removing a judge"],
            ]
        );
        assert_eq!(
            page.sections[1].text,
            "Open the event and press Add judge in the panel.\n\nEnter the judge email address here."
        );
    }

    #[test]
    fn short_blocks_and_chrome_are_dropped() {
        let page = Extractor::new(15).extract(PAGE, &base());
        let all: String = page.sections.iter().map(|s| s.text.clone()).collect();
        assert!(!all.contains("Short."));
        assert!(!all.contains("Navigation"));
        assert!(!all.contains("Footer"));
        assert!(!all.contains("script content"));
    }

    #[test]
    fn links_resolve_against_base() {
        let page = Extractor::new(15).extract(PAGE, &base());
        let links: Vec<&str> = page.links.iter().map(Url::as_str).collect();
        assert_eq!(
            links,
            vec![
                "https://docs.example.com/guide/setup",
                "https://docs.example.com/guide/judging#scores",
            ]
        );
    }

    #[test]
    fn title_falls_back_to_title_tag_then_untitled() {
        let page = Extractor::new(15).extract(
            "<html><head><title> Setup  Guide </title></head><body></body></html>",
            &base(),
        );
        assert_eq!(page.title, "Setup Guide");
        assert!(page.is_empty());

        let page = Extractor::new(15).extract("<p>Some body text long enough.</p>", &base());
        assert_eq!(page.title, "Untitled");
        assert_eq!(page.sections[0].path, vec!["Untitled".to_string()]);
    }

    #[test]
    fn content_root_prefers_div_content_over_body() {
        let html = r#"<body><p>Outside the content root text.</p>
            <div class="content"><p>Inside the content root text.</p></div></body>"#;
        let page = Extractor::new(15).extract(html, &base());
        assert_eq!(page.sections.len(), 1);
        assert_eq!(page.sections[0].text, "Inside the content root text.");
    }

    #[test]
    fn preformatted_keeps_lines() {
        let html = "<main><pre>line one here\n  line two here\n\n</pre></main>";
        let page = Extractor::new(5).extract(html, &base());
        assert_eq!(page.sections[0].text, "line one here\n  line two here");
    }
}
