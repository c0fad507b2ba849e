//! The page a crawl starts from, injected into every matcher.
//!
//! Matchers never reach for a global document. They read the start URL and
//! (optionally) its already-loaded HTML from here, and issue every request
//! through the shared [`HttpClient`]. Tests build a context offline with
//! [`PageContext::with_document`].

use crate::error::{Error, Result};
use crate::helpers::normalize_text;
use crate::http_client::HttpClient;
use crate::models::GalleryMeta;
use scraper::{Html, Selector};
use std::sync::Arc;
use url::Url;

#[derive(Clone)]
pub struct PageContext {
    url: Url,
    title: String,
    document: Option<Arc<str>>,
    client: Arc<HttpClient>,
}

impl PageContext {
    /// Context for `url` without a loaded document.
    pub fn new(url: &str, client: Arc<HttpClient>) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| Error::url(url, e))?;
        Ok(Self {
            url: parsed,
            title: String::new(),
            document: None,
            client,
        })
    }

    /// Fetch `url` and keep its HTML as the current document.
    pub async fn load(url: &str, client: Arc<HttpClient>) -> Result<Self> {
        let body = client.get_text(url).await?;
        Ok(Self::new(url, client)?.with_document(body))
    }

    pub fn with_document(mut self, html: impl Into<String>) -> Self {
        let html: String = html.into();
        self.title = document_title(&html).unwrap_or_default();
        self.document = Some(Arc::from(html));
        self
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// `scheme://host[:port]`, the base for site API calls
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Minimal metadata used until an adapter provides something richer
    pub fn fallback_meta(&self) -> GalleryMeta {
        GalleryMeta::new(self.url.as_str(), self.title.clone())
    }
}

impl std::fmt::Debug for PageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageContext")
            .field("url", &self.url.as_str())
            .field("title", &self.title)
            .field("has_document", &self.document.is_some())
            .finish()
    }
}

fn document_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    doc.select(&selector)
        .next()
        .map(|el| normalize_text(&el.text().collect::<String>()))
}
