//! The contract every site adapter implements.
//!
//! A crawl is three lazy stages: chapters, then the raw pages of one chapter,
//! then the images parsed out of each page. Each stage is a stream that does
//! at most one network round-trip per item pulled and nothing ahead of the
//! consumer, so dropping a stream is all it takes to cancel a crawl.
//!
//! [`Matcher`] is what adapters implement; it is generic over the adapter's
//! own raw page type. [`GalleryMatcher`] erases that type so the registry can
//! hand out `Box<dyn GalleryMatcher>` for any site.

use crate::error::Result;
use crate::models::{Chapter, ChapterBatch, CrawlSession, GalleryMeta, ImageNode, OriginMeta};
use crate::page_context::PageContext;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::BTreeMap;

pub type ChapterStream<'a> = BoxStream<'a, Result<ChapterBatch>>;
pub type PageStream<'a, P> = BoxStream<'a, Result<P>>;
pub type ImageBatchStream<'a> = BoxStream<'a, Result<Vec<ImageNode>>>;

#[async_trait]
pub trait Matcher: Send + Sync {
    /// What one fetched page looks like for this site (HTML text, API payload, ...)
    type RawPage: Send + Sync;

    fn context(&self) -> &PageContext;

    /// Batches of chapters in site-pagination order.
    ///
    /// Indices come from the stream's own [`CrawlSession`] and never repeat
    /// across batches. A precondition failure is the first and only item.
    fn fetch_chapters(&self) -> ChapterStream<'_>;

    /// Raw pages of one chapter in next-link order. A failed fetch is yielded
    /// as one `Err`; if it hid the next link the stream ends there.
    fn fetch_pages_source(&self, chapter: &Chapter) -> PageStream<'_, Self::RawPage>;

    /// Extract images from an already fetched page. No network I/O.
    async fn parse_img_nodes(&self, page: &Self::RawPage) -> Result<Vec<ImageNode>>;

    /// Best available source for `node`, possibly via the network.
    async fn fetch_origin_meta(&self, node: &ImageNode) -> Result<OriginMeta>;

    /// Request headers the site needs to serve the image.
    fn headers(&self, _node: &ImageNode) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn gallery_meta(&self, session: &CrawlSession, _chapter: &Chapter) -> GalleryMeta {
        session
            .meta
            .clone()
            .unwrap_or_else(|| self.context().fallback_meta())
    }
}

/// Object-safe view of a [`Matcher`], implemented for all of them.
#[async_trait]
pub trait GalleryMatcher: Send + Sync {
    fn page_context(&self) -> &PageContext;

    fn chapters(&self) -> ChapterStream<'_>;

    /// Pages of `chapter` already parsed into image nodes, one item per page.
    fn image_batches(&self, chapter: &Chapter) -> ImageBatchStream<'_>;

    async fn resolve_origin(&self, node: &ImageNode) -> Result<OriginMeta>;

    fn request_headers(&self, node: &ImageNode) -> BTreeMap<String, String>;

    fn gallery_meta_for(&self, session: &CrawlSession, chapter: &Chapter) -> GalleryMeta;
}

#[async_trait]
impl<M> GalleryMatcher for M
where
    M: Matcher,
{
    fn page_context(&self) -> &PageContext {
        self.context()
    }

    fn chapters(&self) -> ChapterStream<'_> {
        self.fetch_chapters()
    }

    fn image_batches(&self, chapter: &Chapter) -> ImageBatchStream<'_> {
        self.fetch_pages_source(chapter)
            .then(move |page| async move {
                match page {
                    Ok(raw) => self.parse_img_nodes(&raw).await,
                    Err(e) => Err(e),
                }
            })
            .boxed()
    }

    async fn resolve_origin(&self, node: &ImageNode) -> Result<OriginMeta> {
        self.fetch_origin_meta(node).await
    }

    fn request_headers(&self, node: &ImageNode) -> BTreeMap<String, String> {
        self.headers(node)
    }

    fn gallery_meta_for(&self, session: &CrawlSession, chapter: &Chapter) -> GalleryMeta {
        self.gallery_meta(session, chapter)
    }
}
