use crate::error::{Error, Result};
use crate::helpers::pad_index;
use crate::matcher::{ChapterStream, GalleryMatcher, Matcher, PageStream};
use crate::models::{Chapter, ChapterBatch, CrawlSession, GalleryMeta, ImageNode, OriginMeta};
use crate::page_context::PageContext;
use crate::registry::{AdapterRegistry, AdapterSetup};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

pub const NAME: &str = "komiic.com";

const CHAPTERS_QUERY: &str = "query chapterByComicId($comicId: ID!) {\n chaptersByComicId(comicId: $comicId) {\n id\n serial\n type\n dateCreated\n dateUpdated\n size\n __typename\n }\n}";
const COMIC_QUERY: &str = "query comicById($comicId: ID!) {\n comicById(comicId: $comicId) {\n id\n title\n status\n year\n imageUrl\n authors {\n id\n name\n __typename\n }\n categories {\n id\n name\n __typename\n }\n dateCreated\n dateUpdated\n views\n favoriteCount\n lastBookUpdate\n lastChapterUpdate\n __typename\n }\n}";
const IMAGES_QUERY: &str = "query imagesByChapterId($chapterId: ID!) {\n imagesByChapterId(chapterId: $chapterId) {\n id\n kid\n height\n width\n __typename\n }\n}";

const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/png,image/svg+xml,image/*;q=0.8,*/*;q=0.5";

#[derive(Deserialize, Debug)]
struct GraphqlResponse<T> {
    data: T,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum ChapterKind {
    Chapter,
    Book,
    #[serde(other)]
    Other,
}

impl ChapterKind {
    /// Volumes come before single chapters
    fn sort_key(self) -> u8 {
        match self {
            ChapterKind::Book => 0,
            ChapterKind::Chapter => 1,
            ChapterKind::Other => 2,
        }
    }

    fn display(self) -> &'static str {
        match self {
            ChapterKind::Book => "卷",
            ChapterKind::Chapter => "话",
            ChapterKind::Other => "",
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ChaptersData {
    chapters_by_comic_id: Vec<KomiicChapter>,
}

#[derive(Deserialize, Debug)]
#[allow(dead_code)]
struct KomiicChapter {
    id: String,
    serial: String,
    #[serde(rename = "type")]
    kind: ChapterKind,
    #[serde(rename = "dateCreated", default)]
    date_created: Option<String>,
    #[serde(default)]
    size: Option<u32>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ComicData {
    comic_by_id: KomiicComicInfo,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
struct KomiicComicInfo {
    id: String,
    title: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    authors: Vec<Named>,
    #[serde(default)]
    categories: Vec<Named>,
}

#[derive(Deserialize, Debug)]
struct Named {
    name: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ImagesData {
    images_by_chapter_id: Vec<ApiImage>,
}

#[derive(Deserialize, Debug)]
#[allow(dead_code)]
struct ApiImage {
    id: String,
    kid: String,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    width: u32,
}

/// One image of a chapter, tagged with the ids needed to build its URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KomiicImage {
    pub kid: String,
    pub width: u32,
    pub height: u32,
    pub comic_id: String,
    pub chapter_id: String,
}

/// komiic.com comics, served from a GraphQL API at `/api/query`
pub struct KomiicMatcher {
    ctx: PageContext,
}

impl KomiicMatcher {
    pub fn new(ctx: PageContext) -> Self {
        Self { ctx }
    }

    fn api_url(&self) -> String {
        format!("{}/api/query", self.ctx.origin())
    }

    fn comic_id(&self) -> Result<String> {
        let re = Regex::new(r"comic/(\d+)")?;
        re.captures(self.ctx.url())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::Precondition(format!("cannot get comic id from {}", self.ctx.url())))
    }

    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let body = json!({
            "operationName": operation,
            "query": query,
            "variables": variables,
        });
        let response: GraphqlResponse<T> = self.ctx.client().post_json(&self.api_url(), &body).await?;
        Ok(response.data)
    }

    /// Title, authors and categories. Only used to enrich the gallery meta.
    async fn fetch_comic_meta(&self, comic_id: &str) -> Result<GalleryMeta> {
        let data: ComicData = self
            .query("comicById", COMIC_QUERY, json!({ "comicId": comic_id }))
            .await?;
        let info = data.comic_by_id;
        let mut meta = GalleryMeta::new(self.ctx.url(), info.title);
        meta.extend_tag("authors", info.authors.into_iter().map(|a| a.name));
        meta.extend_tag("categories", info.categories.into_iter().map(|c| c.name));
        Ok(meta)
    }
}

/// Stable sort: books first, then chapters, keeping the API order within each kind
fn order_chapters(mut chapters: Vec<KomiicChapter>) -> Vec<KomiicChapter> {
    chapters.sort_by_key(|c| c.kind.sort_key());
    chapters
}

fn split_source(source: &str) -> Result<(&str, &str)> {
    source
        .split_once('/')
        .filter(|(comic, chapter)| !comic.is_empty() && !chapter.is_empty())
        .ok_or_else(|| Error::parse(format!("chapter source {:?} is not <comic>/<chapter>", source)))
}

#[async_trait]
impl Matcher for KomiicMatcher {
    type RawPage = Vec<KomiicImage>;

    fn context(&self) -> &PageContext {
        &self.ctx
    }

    fn fetch_chapters(&self) -> ChapterStream<'_> {
        stream! {
            let comic_id = match self.comic_id() {
                Ok(id) => id,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let listed: Result<ChaptersData> = self
                .query("chapterByComicId", CHAPTERS_QUERY, json!({ "comicId": comic_id }))
                .await;
            let listed = match listed {
                Ok(data) => data.chapters_by_comic_id,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut session = CrawlSession::new();
            match self.fetch_comic_meta(&comic_id).await {
                Ok(meta) => session.meta = Some(meta),
                Err(e) => log::warn!("[{}] fetch comic info error: {}", NAME, e),
            }

            let chapters: Vec<Chapter> = order_chapters(listed)
                .into_iter()
                .map(|c| {
                    Chapter::new(
                        session.next_index(),
                        format!("{}{}", c.serial, c.kind.display()),
                        format!("{}/{}", comic_id, c.id),
                    )
                })
                .collect();
            log::info!("[{}] comic {} has {} chapters", NAME, comic_id, chapters.len());

            yield Ok(ChapterBatch { chapters, session });
        }
        .boxed()
    }

    fn fetch_pages_source(&self, chapter: &Chapter) -> PageStream<'_, Self::RawPage> {
        let source = chapter.source.clone();
        stream! {
            let (comic_id, chapter_id) = match split_source(&source) {
                Ok(ids) => ids,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let images: Result<ImagesData> = self
                .query("imagesByChapterId", IMAGES_QUERY, json!({ "chapterId": chapter_id }))
                .await;
            match images {
                Ok(data) => {
                    let page = data
                        .images_by_chapter_id
                        .into_iter()
                        .map(|img| KomiicImage {
                            kid: img.kid,
                            width: img.width,
                            height: img.height,
                            comic_id: comic_id.to_string(),
                            chapter_id: chapter_id.to_string(),
                        })
                        .collect::<Vec<_>>();
                    yield Ok(page);
                }
                Err(e) => yield Err(e),
            }
        }
        .boxed()
    }

    async fn parse_img_nodes(&self, images: &Vec<KomiicImage>) -> Result<Vec<ImageNode>> {
        let origin = self.ctx.origin();
        Ok(images
            .iter()
            .enumerate()
            .map(|(i, img)| {
                let url = format!("{}/api/image/{}", origin, img.kid);
                let name = format!("{}.webp", pad_index(i + 1, images.len()));
                let href = format!(
                    "{}/comic/{}/chapter/{}/page/1",
                    origin, img.comic_id, img.chapter_id
                );
                ImageNode::new("", href, &name)
                    .with_origin(url)
                    .with_dimensions(img.width, img.height)
            })
            .collect())
    }

    async fn fetch_origin_meta(&self, node: &ImageNode) -> Result<OriginMeta> {
        OriginMeta::from_node(node)
    }

    fn headers(&self, node: &ImageNode) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Accept".to_string(), IMAGE_ACCEPT.to_string()),
            ("Referer".to_string(), node.href.clone()),
        ])
    }
}

fn construct(ctx: PageContext) -> Box<dyn GalleryMatcher> {
    Box::new(KomiicMatcher::new(ctx))
}

pub fn register(registry: &mut AdapterRegistry) -> Result<()> {
    registry.add_setup(AdapterSetup::new(
        NAME,
        &[r"komiic\.com/comic/\d+/?$"],
        &["https://komiic.com/*"],
        construct,
    )?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::HttpClient;
    use std::sync::Arc;

    fn matcher(url: &str) -> KomiicMatcher {
        KomiicMatcher::new(PageContext::new(url, Arc::new(HttpClient::new().unwrap())).unwrap())
    }

    fn chapter(id: &str, serial: &str, kind: ChapterKind) -> KomiicChapter {
        KomiicChapter {
            id: id.to_string(),
            serial: serial.to_string(),
            kind,
            date_created: None,
            size: None,
        }
    }

    #[test]
    fn test_comic_id() {
        assert_eq!(matcher("https://komiic.com/comic/1234").comic_id().unwrap(), "1234");
        let err = matcher("https://komiic.com/ranking").comic_id().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Precondition);
    }

    #[test]
    fn test_books_sort_before_chapters() {
        let ordered = order_chapters(vec![
            chapter("10", "01", ChapterKind::Chapter),
            chapter("11", "02", ChapterKind::Chapter),
            chapter("3", "01", ChapterKind::Book),
            chapter("99", "x", ChapterKind::Other),
            chapter("4", "02", ChapterKind::Book),
        ]);
        let ids: Vec<_> = ordered.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "4", "10", "11", "99"]);
    }

    #[test]
    fn test_chapter_kind_parsing() {
        let parsed: Vec<KomiicChapter> = serde_json::from_str(
            r#"[{"id":"1","serial":"01","type":"book"},{"id":"2","serial":"02","type":"chapter"},{"id":"3","serial":"x","type":"special"}]"#,
        )
        .unwrap();
        assert_eq!(parsed[0].kind, ChapterKind::Book);
        assert_eq!(parsed[1].kind, ChapterKind::Chapter);
        assert_eq!(parsed[2].kind, ChapterKind::Other);
        assert_eq!(ChapterKind::Book.display(), "卷");
        assert_eq!(ChapterKind::Chapter.display(), "话");
    }

    #[test]
    fn test_split_source() {
        assert_eq!(split_source("12/345").unwrap(), ("12", "345"));
        assert!(split_source("12345").is_err());
        assert!(split_source("12/").is_err());
    }

    #[tokio::test]
    async fn test_parse_img_nodes() {
        let m = matcher("https://komiic.com/comic/12");
        let images: Vec<KomiicImage> = (0..12)
            .map(|i| KomiicImage {
                kid: format!("k{}", i),
                width: 800,
                height: 1200,
                comic_id: "12".into(),
                chapter_id: "345".into(),
            })
            .collect();

        let nodes = m.parse_img_nodes(&images).await.unwrap();
        assert_eq!(nodes.len(), 12);
        assert_eq!(nodes[0].title, "01.webp");
        assert_eq!(nodes[11].title, "12.webp");
        assert_eq!(nodes[0].src, "");
        assert_eq!(nodes[0].origin_src.as_deref(), Some("https://komiic.com/api/image/k0"));
        assert_eq!(nodes[0].href, "https://komiic.com/comic/12/chapter/345/page/1");
        assert_eq!(nodes[0].dimensions.unwrap().height, 1200);

        // same input, same output
        assert_eq!(m.parse_img_nodes(&images).await.unwrap(), nodes);
    }

    #[tokio::test]
    async fn test_headers_and_origin() {
        let m = matcher("https://komiic.com/comic/12");
        let node = ImageNode::new("", "https://komiic.com/comic/12/chapter/3/page/1", "1.webp")
            .with_origin("https://komiic.com/api/image/abc");

        let headers = m.headers(&node);
        assert_eq!(headers["Referer"], node.href);
        assert!(headers["Accept"].starts_with("image/avif"));

        let origin = m.fetch_origin_meta(&node).await.unwrap();
        assert_eq!(origin.url, "https://komiic.com/api/image/abc");
    }
}
