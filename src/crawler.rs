//! Drives one matcher through a whole gallery.
//!
//! [`Crawler::events`] walks chapters, then pages, then images, resolving an
//! origin for each image, and reports everything as a lazy stream of
//! [`CrawlEvent`]s. Nothing is fetched before the consumer polls, so
//! dropping the stream stops the crawl.

use crate::config::{ChapterFailurePolicy, CrawlConfig};
use crate::matcher::GalleryMatcher;
use crate::metrics::MetricsTracker;
use crate::models::{Chapter, GalleryMeta, ImageNode};
use async_stream::stream;
use futures::stream::{BoxStream, StreamExt};
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;

/// An image ready to hand to a downloader.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolvedImage {
    /// 1-based position within its page
    pub position: usize,
    pub node: ImageNode,
    pub url: String,
    /// File name to save under; the origin's title when it has one
    pub title: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CrawlEvent {
    Chapters {
        chapters: Vec<Chapter>,
        meta: GalleryMeta,
    },
    Page {
        chapter: u32,
        page: usize,
        images: Vec<ResolvedImage>,
    },
    PageFailed {
        chapter: u32,
        page: usize,
        error: String,
    },
    ImageFailed {
        chapter: u32,
        page: usize,
        position: usize,
        error: String,
    },
    ListingFailed {
        error: String,
    },
    Aborted {
        reason: String,
    },
}

/// Tracks what a consumer has seen so far, to tell a partial crawl from one
/// that never got off the ground.
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    chapters_listed: bool,
    early_failure: Option<String>,
}

impl CrawlOutcome {
    pub fn observe(&mut self, event: &CrawlEvent) {
        match event {
            CrawlEvent::Chapters { .. } => self.chapters_listed = true,
            CrawlEvent::ListingFailed { error }
                if !self.chapters_listed && self.early_failure.is_none() =>
            {
                self.early_failure = Some(error.clone());
            }
            _ => {}
        }
    }

    /// The listing error, when no chapter was ever listed
    pub fn fatal_error(&self) -> Option<&str> {
        if self.chapters_listed {
            None
        } else {
            self.early_failure.as_deref()
        }
    }
}

pub struct Crawler {
    adapter: String,
    matcher: Box<dyn GalleryMatcher>,
    config: CrawlConfig,
    metrics: MetricsTracker,
}

impl Crawler {
    pub fn new(
        adapter: impl Into<String>,
        matcher: Box<dyn GalleryMatcher>,
        config: CrawlConfig,
    ) -> Self {
        Self {
            adapter: adapter.into(),
            matcher,
            config,
            metrics: MetricsTracker::new(),
        }
    }

    /// Share a tracker with other crawlers
    pub fn with_metrics(mut self, metrics: MetricsTracker) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    pub fn metrics(&self) -> &MetricsTracker {
        &self.metrics
    }

    pub fn events(&self) -> BoxStream<'_, CrawlEvent> {
        stream! {
            let adapter = self.adapter.as_str();
            let limit = self.config.max_chapters;
            let mut taken = 0usize;
            let mut last_index: Option<u32> = None;
            let mut chapters = self.matcher.chapters();

            info!("[{}] crawling {}", adapter, self.matcher.page_context().url());

            'listing: while let Some(batch) = chapters.next().await {
                let batch = match batch {
                    Ok(batch) => batch,
                    Err(e) => {
                        self.metrics.record_listing_failure(adapter, e.to_string());
                        yield CrawlEvent::ListingFailed { error: e.to_string() };
                        continue;
                    }
                };

                let mut accepted = Vec::with_capacity(batch.chapters.len());
                for chapter in batch.chapters {
                    if limit.is_some_and(|max| taken >= max) {
                        break;
                    }
                    if let Some(last) = last_index.filter(|&last| chapter.index <= last) {
                        warn!(
                            "[{}] skipping chapter {} ({}): index not after {}",
                            adapter, chapter.index, chapter.title, last
                        );
                        continue;
                    }
                    last_index = Some(chapter.index);
                    taken += 1;
                    accepted.push(chapter);
                }

                if let Some(first) = accepted.first() {
                    let meta = self.matcher.gallery_meta_for(&batch.session, first);
                    self.metrics.record_chapters(adapter, accepted.len());
                    yield CrawlEvent::Chapters { chapters: accepted.clone(), meta };
                }

                for chapter in &accepted {
                    let mut broken = None;
                    let mut pages = self.matcher.image_batches(chapter);
                    let mut page = 0usize;

                    while let Some(nodes) = pages.next().await {
                        page += 1;
                        let nodes = match nodes {
                            Ok(nodes) => nodes,
                            Err(e) => {
                                self.metrics.record_page_failure(adapter, e.to_string());
                                broken = Some(e.to_string());
                                yield CrawlEvent::PageFailed {
                                    chapter: chapter.index,
                                    page,
                                    error: e.to_string(),
                                };
                                continue;
                            }
                        };

                        let mut images = Vec::with_capacity(nodes.len());
                        let mut failures = Vec::new();
                        for (i, node) in nodes.into_iter().enumerate() {
                            let position = i + 1;
                            match self.resolve(node).await {
                                Ok(image) => images.push(ResolvedImage { position, ..image }),
                                Err(error) => {
                                    self.metrics.record_origin_failure(adapter, error.clone());
                                    failures.push(CrawlEvent::ImageFailed {
                                        chapter: chapter.index,
                                        page,
                                        position,
                                        error,
                                    });
                                }
                            }
                        }

                        self.metrics.record_page(adapter, images.len());
                        yield CrawlEvent::Page { chapter: chapter.index, page, images };
                        for failure in failures {
                            yield failure;
                        }
                    }

                    if let Some(error) = broken {
                        if self.config.on_chapter_failure == ChapterFailurePolicy::Stop {
                            warn!("[{}] stopping after chapter {}: {}", adapter, chapter.index, error);
                            yield CrawlEvent::Aborted {
                                reason: format!("chapter {} failed: {}", chapter.index, error),
                            };
                            break 'listing;
                        }
                    }
                }

                if limit.is_some_and(|max| taken >= max) {
                    info!("[{}] reached the limit of {} chapters", adapter, taken);
                    break;
                }
            }
        }
        .boxed()
    }

    async fn resolve(&self, node: ImageNode) -> Result<ResolvedImage, String> {
        let mut headers = self.matcher.request_headers(&node);

        if !self.config.resolve_origin {
            let url = node.download_url().to_string();
            if url.is_empty() {
                return Err(format!("image {} has no source", node.title));
            }
            return Ok(ResolvedImage {
                position: 0,
                title: node.title.clone(),
                node,
                url,
                headers,
            });
        }

        let origin = self
            .matcher
            .resolve_origin(&node)
            .await
            .map_err(|e| e.to_string())?;
        headers.extend(origin.headers);
        let title = origin
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| node.title.clone());
        Ok(ResolvedImage {
            position: 0,
            title,
            node,
            url: origin.url,
            headers,
        })
    }
}
