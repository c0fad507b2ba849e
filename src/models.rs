use crate::error::{Error, Result};
use crate::helpers::sanitize_filename;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag values are either a single string or a list (authors, categories).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum TagValue {
    Single(String),
    List(Vec<String>),
}

/// Identity of one gallery. `url` is the stable key.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GalleryMeta {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub tags: BTreeMap<String, TagValue>,
}

impl GalleryMeta {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn add_tag(&mut self, key: impl Into<String>, value: TagValue) {
        self.tags.insert(key.into(), value);
    }

    /// Append values to a list tag, promoting a single value to a list.
    pub fn extend_tag<I, S>(&mut self, key: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self
            .tags
            .entry(key.to_string())
            .or_insert_with(|| TagValue::List(Vec::new()));
        if let TagValue::Single(s) = entry {
            let single = std::mem::take(s);
            *entry = TagValue::List(vec![single]);
        }
        if let TagValue::List(list) = entry {
            for v in values {
                let v = v.into();
                if !list.contains(&v) {
                    list.push(v);
                }
            }
        }
    }
}

/// One ordered unit of a gallery.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// Download order; unique and strictly increasing within a gallery
    pub index: u32,
    pub title: String,
    /// URL or a site-specific composite key
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl Chapter {
    pub fn new(index: u32, title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            source: source.into(),
            thumbnail: None,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail;
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// One downloadable image as discovered on a page.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ImageNode {
    /// URL as found in-page, possibly a thumbnail or empty
    pub src: String,
    /// Page that contains the image
    pub href: String,
    /// File-safe name
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    /// Highest-resolution locator, preferred over `src` once set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_src: Option<String>,
}

impl ImageNode {
    pub fn new(src: impl Into<String>, href: impl Into<String>, title: &str) -> Self {
        Self {
            src: src.into(),
            href: href.into(),
            title: sanitize_filename(title),
            dimensions: None,
            origin_src: None,
        }
    }

    pub fn with_origin(mut self, origin_src: impl Into<String>) -> Self {
        let origin = origin_src.into();
        self.origin_src = (!origin.is_empty()).then_some(origin);
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some(Dimensions { width, height });
        self
    }

    pub fn download_url(&self) -> &str {
        self.origin_src.as_deref().unwrap_or(&self.src)
    }
}

/// Best available source for one image.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OriginMeta {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl OriginMeta {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            headers: BTreeMap::new(),
        }
    }

    /// Resolve from what the node already carries, never downgrading an
    /// explicit origin to the in-page `src`.
    pub fn from_node(node: &ImageNode) -> Result<Self> {
        let url = node.download_url();
        if url.is_empty() {
            return Err(Error::parse(format!(
                "image {} has neither an origin nor an in-page source",
                node.title
            )));
        }
        let mut origin = Self::new(url);
        origin.title = (!node.title.is_empty()).then(|| node.title.clone());
        Ok(origin)
    }
}

/// State a chapter stream accumulates while it runs.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct CrawlSession {
    pub chapter_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<GalleryMeta>,
}

impl CrawlSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_index(&mut self) -> u32 {
        self.chapter_count += 1;
        self.chapter_count
    }
}

/// Chapters discovered by one pagination step, plus the session as it stood afterwards.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChapterBatch {
    pub chapters: Vec<Chapter>,
    pub session: CrawlSession,
}

/// A fetched HTML document, kept as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlPage {
    pub url: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url_prefers_origin() {
        let node = ImageNode::new("https://img/thumb.jpg", "https://page/1", "1.jpg");
        assert_eq!(node.download_url(), "https://img/thumb.jpg");

        let node = node.with_origin("https://img/large.webp");
        assert_eq!(node.download_url(), "https://img/large.webp");
    }

    #[test]
    fn test_empty_origin_is_unset() {
        let node = ImageNode::new("https://img/a.jpg", "", "a").with_origin("");
        assert!(node.origin_src.is_none());
    }

    #[test]
    fn test_image_title_is_file_safe() {
        let node = ImageNode::new("", "", "holiday/beach: 1.webp");
        assert_eq!(node.title, "holiday_beach_ 1.webp");
    }

    #[test]
    fn test_origin_meta_from_node() {
        let node = ImageNode::new("https://img/s.jpg", "", "s").with_origin("https://img/l.webp");
        let origin = OriginMeta::from_node(&node).unwrap();
        assert_eq!(origin.url, "https://img/l.webp");
        assert_eq!(origin.title.as_deref(), Some("s"));

        let bare = ImageNode::new("", "", "empty");
        assert!(OriginMeta::from_node(&bare).is_err());
    }

    #[test]
    fn test_extend_tag_promotes_single() {
        let mut meta = GalleryMeta::new("https://komiic.com/comic/1", "t");
        meta.add_tag("authors", TagValue::Single("A".into()));
        meta.extend_tag("authors", ["B", "A"]);
        meta.extend_tag("categories", vec!["愛情".to_string()]);

        assert_eq!(
            meta.tags.get("authors"),
            Some(&TagValue::List(vec!["A".into(), "B".into()]))
        );
        assert_eq!(
            meta.tags.get("categories"),
            Some(&TagValue::List(vec!["愛情".into()]))
        );
    }

    #[test]
    fn test_tags_serialize_untagged() {
        let mut meta = GalleryMeta::new("u", "t");
        meta.add_tag("lang", TagValue::Single("zh".into()));
        meta.extend_tag("authors", ["x"]);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["tags"]["lang"], "zh");
        assert_eq!(json["tags"]["authors"][0], "x");
    }

    #[test]
    fn test_session_indices_increase() {
        let mut session = CrawlSession::new();
        assert_eq!(session.next_index(), 1);
        assert_eq!(session.next_index(), 2);
        assert_eq!(session.chapter_count, 2);
    }
}
