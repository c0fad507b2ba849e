use crate::error::{Error, Result};
use crate::helpers::{normalize_text, resolve_link};
use crate::matcher::{ChapterStream, GalleryMatcher, Matcher, PageStream};
use crate::models::{
    Chapter, ChapterBatch, CrawlSession, GalleryMeta, HtmlPage, ImageNode, OriginMeta,
};
use crate::page_context::PageContext;
use crate::registry::{AdapterRegistry, AdapterSetup};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

pub const NAME: &str = "豆瓣相册";

const NEXT_PAGE: &str = "#content div.article div.paginator span.next > a";
const OWNER_NAME: &str = "#db-usr-profile > div.info > h1";
const OWNER_THUMB: &str = "#db-usr-profile > div.pic > a > img";

/// One album as listed on a user's photo page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoubanAlbum {
    pub title: String,
    pub path: String,
    pub photo_count: u32,
    pub date: String,
}

/// What one page of the album list tells us
#[derive(Debug)]
pub struct AlbumListing {
    pub owner_name: Option<String>,
    pub thumbnail: Option<String>,
    pub albums: Result<Vec<DoubanAlbum>>,
    pub next: Option<String>,
}

/// Photo albums of a douban.com user; each album is one chapter
pub struct DoubanMatcher {
    ctx: PageContext,
}

impl DoubanMatcher {
    pub fn new(ctx: PageContext) -> Self {
        Self { ctx }
    }

    async fn fetch_page(&self, url: &str) -> Result<HtmlPage> {
        let body = self.ctx.client().get_text(url).await?;
        Ok(HtmlPage {
            url: url.to_string(),
            body,
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::parse(format!("bad selector {}: {}", css, e)))
}

fn element_text(el: ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<String>())
}

fn first_text(scope: ElementRef<'_>, css: &str) -> Result<Option<String>> {
    let sel = selector(css)?;
    Ok(scope.select(&sel).next().map(element_text))
}

fn first_attr(doc: &Html, css: &str, attr: &str) -> Result<Option<String>> {
    let sel = selector(css)?;
    Ok(doc
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string))
}

/// Absolute URL of the paginator's "next" link, if the page has one
pub fn next_page_link(page: &HtmlPage) -> Option<String> {
    let doc = Html::parse_document(&page.body);
    let href = match first_attr(&doc, NEXT_PAGE, "href") {
        Ok(href) => href?,
        Err(e) => {
            log::warn!("[{}] {}", NAME, e);
            return None;
        }
    };
    match resolve_link(&page.url, &href) {
        Ok(url) => Some(url),
        Err(e) => {
            log::warn!("[{}] ignoring next link on {}: {}", NAME, page.url, e);
            None
        }
    }
}

fn parse_albums(doc: &Html, page_url: &str, fallback_title: &str) -> Result<Vec<DoubanAlbum>> {
    let album_sel = selector(".albumlst")?;
    let photo_sel = selector(".album_photo")?;
    let stats_re = Regex::new(r"(\d+)张照片\s+(.+)(创建|更新)")?;

    let mut albums = Vec::new();
    for entry in doc.select(&album_sel) {
        let title = first_text(entry, ".albumlst_r .pl2 a")?
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback_title.to_string());
        let path = entry
            .select(&photo_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .ok_or_else(|| Error::parse(format!("album {:?} has no link on {}", title, page_url)))?;
        let stats = first_text(entry, ".albumlst_r .pl")?.unwrap_or_default();
        let caps = stats_re
            .captures(&stats)
            .ok_or_else(|| Error::parse(format!("album {:?} stats {:?} not understood", title, stats)))?;
        let photo_count = caps[1]
            .parse::<u32>()
            .map_err(|e| Error::parse(format!("album {:?} photo count: {}", title, e)))?;

        albums.push(DoubanAlbum {
            title,
            path: resolve_link(page_url, path)?,
            photo_count,
            date: caps[2].trim().to_string(),
        });
    }
    Ok(albums)
}

/// Parse one page of a user's album list
pub fn parse_album_listing(page: &HtmlPage, fallback_title: &str) -> Result<AlbumListing> {
    let doc = Html::parse_document(&page.body);
    let owner_sel = selector(OWNER_NAME)?;
    let owner_name = doc
        .select(&owner_sel)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty());
    let thumbnail = match first_attr(&doc, OWNER_THUMB, "src")?.filter(|s| !s.is_empty()) {
        Some(src) => Some(resolve_link(&page.url, &src)?),
        None => None,
    };
    let albums = parse_albums(&doc, &page.url, fallback_title);

    Ok(AlbumListing {
        owner_name,
        thumbnail,
        albums,
        next: next_page_link(page),
    })
}

fn origin_of(src: &str, re: &Regex) -> String {
    // .../view/photo/m/public/p1.webp and .../sqs/public/p1.jpg -> .../view/photo/l/public/p1.webp
    re.replace(src, "${1}/l/${3}.webp").into_owned()
}

/// Image nodes of one album page
pub fn parse_photo_page(page: &HtmlPage) -> Result<Vec<ImageNode>> {
    let doc = Html::parse_document(&page.body);
    let img_sel = selector(".photo_wrap img")?;
    let origin_re = Regex::new(r"(.*/view/photo)(.+)(public/.*)\.(.+)")?;

    let mut nodes = Vec::new();
    for img in doc.select(&img_sel) {
        let raw_src = img
            .value()
            .attr("src")
            .ok_or_else(|| Error::parse(format!("photo without src on {}", page.url)))?;
        let src = resolve_link(&page.url, raw_src)?;
        let href = match img
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|a| a.value().attr("href"))
        {
            Some(h) => resolve_link(&page.url, h)?,
            None => page.url.clone(),
        };
        let origin = origin_of(&src, &origin_re);
        let file = origin.rsplit('/').next().unwrap_or(origin.as_str());
        let alt = img.value().attr("alt").unwrap_or("").trim();
        let title = if alt.is_empty() {
            file.to_string()
        } else {
            format!("{}_{}", alt, file)
        };
        nodes.push(ImageNode::new(src, href, &title).with_origin(origin));
    }
    Ok(nodes)
}

#[async_trait]
impl Matcher for DoubanMatcher {
    type RawPage = HtmlPage;

    fn context(&self) -> &PageContext {
        &self.ctx
    }

    fn fetch_chapters(&self) -> ChapterStream<'_> {
        stream! {
            let mut session = CrawlSession::new();
            let mut thumbnail: Option<String> = None;
            let mut visited = HashSet::new();
            let mut next = Some(self.ctx.url().to_string());
            let mut preloaded = self.ctx.document().map(str::to_string);

            while let Some(url) = next.take() {
                if !visited.insert(url.clone()) {
                    log::warn!("[{}] album list loops back to {}", NAME, url);
                    break;
                }
                let page = match preloaded.take() {
                    Some(body) => HtmlPage { url, body },
                    None => match self.fetch_page(&url).await {
                        Ok(page) => page,
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                };

                let listing = match parse_album_listing(&page, self.ctx.title()) {
                    Ok(listing) => listing,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                if session.meta.is_none() {
                    let title = listing
                        .owner_name
                        .clone()
                        .unwrap_or_else(|| self.ctx.title().to_string());
                    session.meta = Some(GalleryMeta::new(self.ctx.url(), title));
                    thumbnail = listing.thumbnail.clone();
                }
                next = listing.next;

                match listing.albums {
                    Ok(albums) => {
                        log::debug!("[{}] {} albums on {}", NAME, albums.len(), page.url);
                        for album in albums {
                            log::debug!(
                                "[{}] album {:?}: {} photos, {}",
                                NAME,
                                album.title,
                                album.photo_count,
                                album.date
                            );
                            let chapter = Chapter::new(session.next_index(), album.title, album.path)
                                .with_thumbnail(thumbnail.clone());
                            yield Ok(ChapterBatch {
                                chapters: vec![chapter],
                                session: session.clone(),
                            });
                        }
                    }
                    Err(e) => yield Err(e),
                }
            }
        }
        .boxed()
    }

    fn fetch_pages_source(&self, chapter: &Chapter) -> PageStream<'_, Self::RawPage> {
        let start = chapter.source.clone();
        stream! {
            let mut visited = HashSet::new();
            let mut next = Some(start);

            while let Some(url) = next.take() {
                if !visited.insert(url.clone()) {
                    log::warn!("[{}] album pages loop back to {}", NAME, url);
                    break;
                }
                let page = match self.fetch_page(&url).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                next = next_page_link(&page);
                yield Ok(page);
            }
        }
        .boxed()
    }

    async fn parse_img_nodes(&self, page: &HtmlPage) -> Result<Vec<ImageNode>> {
        parse_photo_page(page)
    }

    async fn fetch_origin_meta(&self, node: &ImageNode) -> Result<OriginMeta> {
        OriginMeta::from_node(node)
    }
}

fn construct(ctx: PageContext) -> Box<dyn GalleryMatcher> {
    Box::new(DoubanMatcher::new(ctx))
}

pub fn register(registry: &mut AdapterRegistry) -> Result<()> {
    registry.add_setup(AdapterSetup::new(
        NAME,
        &[r"douban\.com/people/[^/]+/photos"],
        &["https://www.douban.com/*"],
        construct,
    )?);
    Ok(())
}
