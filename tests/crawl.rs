//! Crawler behaviour against in-memory sites.

mod common;

use common::{doc, help_site, InMemorySite, Resource, ROOT};
use docsense::scraper::{crawl, CrawlOptions, PageFetcher, SoftFetchFailure};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

fn options() -> CrawlOptions {
    CrawlOptions {
        politeness_delay: Duration::ZERO,
        ..CrawlOptions::default()
    }
}

fn root() -> Url {
    Url::parse(ROOT).unwrap()
}

#[tokio::test]
async fn pages_linked_twice_are_fetched_once() {
    let site = Arc::new(help_site());
    let items: Vec<_> = crawl(site.clone() as Arc<dyn PageFetcher>, root(), options())
        .collect()
        .await;

    assert_eq!(items.len(), 4);
    assert!(items.iter().all(|i| i.is_ok()));
    assert_eq!(site.hit_count("https://docs.example.com/guide/judging"), 1);
    assert_eq!(site.hits().len(), 4);

    let urls: Vec<String> = items
        .into_iter()
        .map(|i| i.unwrap().url.to_string())
        .collect();
    // Breadth-first, canonical form.
    assert_eq!(
        urls,
        vec![
            "https://docs.example.com/guide",
            "https://docs.example.com/guide/setup",
            "https://docs.example.com/guide/judging",
            "https://docs.example.com/guide/invite",
        ]
    );
}

#[tokio::test]
async fn broken_page_is_soft_failure() {
    let site = help_site().with("https://docs.example.com/guide/setup", Resource::Status(500));
    let items: Vec<_> = crawl(Arc::new(site), root(), options()).collect().await;

    let failures: Vec<&SoftFetchFailure> =
        items.iter().filter_map(|i| i.as_ref().err()).collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        failures[0],
        SoftFetchFailure::HttpStatus { status: 500, .. }
    ));
    // Judging and invite are still reached from the root.
    assert_eq!(items.iter().filter(|i| i.is_ok()).count(), 3);
}

#[tokio::test]
async fn empty_page_still_contributes_links() {
    let site = InMemorySite::new()
        .page(ROOT, r#"<html><body><a href="/guide/deep">Deep</a></body></html>"#)
        .page(
            "https://docs.example.com/guide/deep",
            &doc("Deep", "<p>Only reachable through an empty page.</p>"),
        );
    let items: Vec<_> = crawl(Arc::new(site), root(), options()).collect().await;

    assert!(matches!(items[0], Err(SoftFetchFailure::Empty { .. })));
    let page = items[1].as_ref().unwrap();
    assert_eq!(page.title, "Deep");
}

#[tokio::test]
async fn out_of_scope_links_are_ignored() {
    let site = Arc::new(InMemorySite::new().page(
        ROOT,
        &doc(
            "Guide",
            r#"<p>Links that leave the documentation tree.</p>
               <a href="https://other.example.com/guide/x">Other host</a>
               <a href="/blog/post">Blog</a>
               <a href="/guidebook">Lookalike</a>"#,
        ),
    ));
    let items: Vec<_> = crawl(site.clone() as Arc<dyn PageFetcher>, root(), options())
        .collect()
        .await;
    assert_eq!(items.len(), 1);
    assert_eq!(site.hits(), vec![ROOT.to_string()]);
}

#[tokio::test]
async fn max_pages_bounds_traversal() {
    let site = Arc::new(help_site());
    let opts = CrawlOptions {
        max_pages: 2,
        ..options()
    };
    let items: Vec<_> = crawl(site.clone() as Arc<dyn PageFetcher>, root(), opts)
        .collect()
        .await;
    assert_eq!(items.len(), 2);
    assert_eq!(site.hits().len(), 2);
}

#[tokio::test]
async fn stream_is_lazy() {
    let site = Arc::new(help_site());
    let mut stream = crawl(site.clone() as Arc<dyn PageFetcher>, root(), options());
    assert!(site.hits().is_empty());

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.title, "Guide");
    assert_eq!(site.hits().len(), 1);
}

#[tokio::test]
async fn slow_page_times_out_softly() {
    let site = help_site().with(
        "https://docs.example.com/guide/judging",
        Resource::Slow(Duration::from_secs(5), doc("Judging", "<p>Never delivered in time.</p>")),
    );
    let opts = CrawlOptions {
        page_timeout: Duration::from_millis(50),
        ..options()
    };
    let items: Vec<_> = crawl(Arc::new(site), root(), opts).collect().await;
    assert!(items
        .iter()
        .any(|i| matches!(i, Err(SoftFetchFailure::Timeout { .. }))));
    assert_eq!(items.iter().filter(|i| i.is_ok()).count(), 3);
}
