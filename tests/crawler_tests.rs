//! Whole-gallery crawls over mock sites.

use futures::StreamExt;
use rust_gallery_scraper::config::{ChapterFailurePolicy, CrawlConfig};
use rust_gallery_scraper::crawler::{CrawlEvent, Crawler};
use rust_gallery_scraper::http_client::{HttpClient, HttpClientConfig};
use rust_gallery_scraper::page_context::PageContext;
use rust_gallery_scraper::sources::douban::DoubanMatcher;
use rust_gallery_scraper::sources::komiic::KomiicMatcher;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> Arc<HttpClient> {
    Arc::new(
        HttpClient::with_config(HttpClientConfig {
            timeout: Duration::from_secs(5),
            max_retries: 0,
            ..HttpClientConfig::default()
        })
        .expect("Failed to create client"),
    )
}

async fn mount_komiic(server: &MockServer) {
    let graphql = |operation: &str| {
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .and(body_partial_json(json!({ "operationName": operation })))
    };

    graphql("chapterByComicId")
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "chaptersByComicId": [
                { "id": "11", "serial": "1", "type": "chapter" },
                { "id": "12", "serial": "2", "type": "chapter" }
            ] }
        })))
        .mount(server)
        .await;
    graphql("comicById")
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "comicById": { "id": "7", "title": "Seven" } }
        })))
        .mount(server)
        .await;
    graphql("imagesByChapterId")
        .and(body_partial_json(json!({ "variables": { "chapterId": "11" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "imagesByChapterId": [
                { "id": "1", "kid": "a", "width": 10, "height": 20 },
                { "id": "2", "kid": "b", "width": 10, "height": 20 }
            ] }
        })))
        .mount(server)
        .await;
    graphql("imagesByChapterId")
        .and(body_partial_json(json!({ "variables": { "chapterId": "12" } })))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;
}

fn komiic_crawler(server: &MockServer, config: CrawlConfig) -> Crawler {
    let ctx = PageContext::new(&format!("{}/comic/7", server.uri()), client()).unwrap();
    Crawler::new("komiic.com", Box::new(KomiicMatcher::new(ctx)), config)
}

#[tokio::test]
async fn test_komiic_crawl_events() {
    let server = MockServer::start().await;
    mount_komiic(&server).await;

    let crawler = komiic_crawler(&server, CrawlConfig::default());
    let events: Vec<_> = crawler.events().collect().await;

    assert_eq!(events.len(), 3, "{:?}", events);
    match &events[0] {
        CrawlEvent::Chapters { chapters, meta } => {
            assert_eq!(chapters.len(), 2);
            assert_eq!(meta.title, "Seven");
        }
        other => panic!("unexpected {:?}", other),
    }
    match &events[1] {
        CrawlEvent::Page { chapter: 1, page: 1, images } => {
            assert_eq!(images.len(), 2);
            assert_eq!(images[0].url, format!("{}/api/image/a", server.uri()));
            assert_eq!(images[0].node.title, "1.webp");
            assert_eq!(images[0].title, "1.webp");
            assert_eq!(
                images[0].headers.get("Referer"),
                Some(&format!("{}/comic/7/chapter/11/page/1", server.uri()))
            );
        }
        other => panic!("unexpected {:?}", other),
    }
    // chapter 2 fails, the default policy still reports it and finishes
    assert!(matches!(events[2], CrawlEvent::PageFailed { chapter: 2, page: 1, .. }));

    let metrics = crawler.metrics().get_metrics("komiic.com").unwrap();
    assert_eq!(metrics.chapters, 2);
    assert_eq!(metrics.pages_ok, 1);
    assert_eq!(metrics.pages_failed, 1);
    assert_eq!(metrics.images, 2);
}

#[tokio::test]
async fn test_stop_policy_reports_abort() {
    let server = MockServer::start().await;
    mount_komiic(&server).await;

    let config = CrawlConfig {
        on_chapter_failure: ChapterFailurePolicy::Stop,
        ..CrawlConfig::default()
    };
    let events: Vec<_> = komiic_crawler(&server, config).events().collect().await;
    assert_eq!(events.len(), 4);
    assert!(matches!(&events[3], CrawlEvent::Aborted { reason } if reason.contains("chapter 2")));
}

#[tokio::test]
async fn test_events_are_json_lines() {
    let server = MockServer::start().await;
    mount_komiic(&server).await;

    let config = CrawlConfig {
        max_chapters: Some(1),
        ..CrawlConfig::default()
    };
    let crawler = komiic_crawler(&server, config);
    let lines: Vec<String> = crawler
        .events()
        .map(|e| serde_json::to_string(&e).unwrap())
        .collect()
        .await;

    assert_eq!(lines.len(), 2);
    let chapters: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(chapters["event"], "chapters");
    assert_eq!(chapters["chapters"].as_array().unwrap().len(), 1);
    let page: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
    assert_eq!(page["event"], "page");
    assert_eq!(page["images"][1]["position"], 2);
}

#[tokio::test]
async fn test_dropping_crawl_stops_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people/someone/photos"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<div id="content"><div class="article">
                 <div class="albumlst">
                   <a class="album_photo" href="/photos/album/1/"></a>
                   <div class="albumlst_r"><div class="pl2"><a>One</a></div><div class="pl">2张照片 2024-01-01创建</div></div>
                 </div>
               </div></div>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/photos/album/1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let url = format!("{}/people/someone/photos", server.uri());
    let ctx = PageContext::load(&url, client()).await.unwrap();
    let crawler = Crawler::new("豆瓣相册", Box::new(DoubanMatcher::new(ctx)), CrawlConfig::default());

    let mut events = crawler.events();
    assert!(matches!(events.next().await, Some(CrawlEvent::Chapters { .. })));
    drop(events);

    server.verify().await;
}
