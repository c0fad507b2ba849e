//! Typed errors shared by matchers, the registry and the crawler.
//!
//! Every network-derived value travels as a [`Result`]. A failed page or
//! chapter is one `Err` item in an otherwise continuing stream.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure talking to the site
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build the HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Site answered with a non-success status after retries
    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("invalid JSON from {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Expected document or payload shape is absent
    #[error("unexpected page structure: {0}")]
    Parse(String),

    /// The crawl cannot start at all (e.g. no gallery id in the URL)
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("invalid url {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid adapter pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Coarse classification used by consumers deciding whether to go on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Fetch,
    Parse,
    Precondition,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Http { .. } | Error::Status { .. } => ErrorKind::Fetch,
            Error::Json { .. } | Error::Parse(_) => ErrorKind::Parse,
            Error::Precondition(_) | Error::Url { .. } => ErrorKind::Precondition,
            Error::Client(_)
            | Error::Pattern(_)
            | Error::ConfigRead { .. }
            | Error::ConfigParse { .. } => {
                ErrorKind::Config
            }
        }
    }

    pub fn is_fetch_failure(&self) -> bool {
        self.kind() == ErrorKind::Fetch
    }

    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    pub(crate) fn url(url: &str, source: url::ParseError) -> Self {
        Error::Url {
            url: url.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::parse("missing .photo_wrap").kind(), ErrorKind::Parse);
        assert_eq!(
            Error::Precondition("cannot get comic id".into()).kind(),
            ErrorKind::Precondition
        );
        let status = Error::Status {
            url: "https://example.com/a".into(),
            status: reqwest::StatusCode::BAD_GATEWAY,
        };
        assert!(status.is_fetch_failure());
        assert_eq!(status.to_string(), "https://example.com/a returned HTTP 502 Bad Gateway");
    }

    #[test]
    fn test_url_error_is_precondition() {
        let source = url::Url::parse("not a url").unwrap_err();
        let err = Error::url("not a url", source);
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(err.to_string().starts_with("invalid url not a url"));
    }
}
