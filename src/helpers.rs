//! Helper functions shared by the adapters
//!
//! This module provides small utilities used throughout the crate:
//! - File-safe image titles
//! - Zero-padded page names
//! - Relative link resolution against the page that contained them
//! - Glob to regex conversion for adapter match patterns
//!
//! # Examples
//!
//! ```
//! use rust_gallery_scraper::helpers::{pad_index, sanitize_filename};
//!
//! assert_eq!(pad_index(7, 120), "007");
//! assert_eq!(sanitize_filename("a/b:c"), "a_b_c");
//! ```

use crate::error::{Error, Result};
use regex::Regex;
use url::Url;

/// Replace characters that are not allowed in file names
pub fn sanitize_filename(s: &str) -> String {
    s.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_")
        .trim()
        .to_string()
}

/// 1-based position padded to the number of digits in `total`
pub fn pad_index(position: usize, total: usize) -> String {
    let digits = total.max(1).to_string().len();
    format!("{:0width$}", position, width = digits)
}

/// Resolve `link` (possibly relative) against the URL of the page it came from
pub fn resolve_link(base: &str, link: &str) -> Result<String> {
    let base_url = Url::parse(base).map_err(|e| Error::url(base, e))?;
    let joined = base_url.join(link.trim()).map_err(|e| Error::url(link, e))?;
    Ok(joined.to_string())
}

/// Compile a match-pattern glob such as `https://komiic.com/*` into an anchored regex.
/// Only `*` is special; everything else matches literally.
pub fn glob_to_regex(glob: &str) -> Result<Regex> {
    let pattern = glob
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Ok(Regex::new(&format!("^{}$", pattern))?)
}

/// Collapse runs of whitespace the way rendered text would show them
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("cover: vol/1?"), "cover_ vol_1_");
        assert_eq!(sanitize_filename("  plain.webp "), "plain.webp");
    }

    #[test]
    fn test_pad_index() {
        assert_eq!(pad_index(1, 9), "1");
        assert_eq!(pad_index(3, 10), "03");
        assert_eq!(pad_index(42, 100), "042");
        assert_eq!(pad_index(1, 0), "1");
    }

    #[test]
    fn test_resolve_link() {
        let base = "https://www.douban.com/people/abc/photos";
        assert_eq!(
            resolve_link(base, "?start=16").unwrap(),
            "https://www.douban.com/people/abc/photos?start=16"
        );
        assert_eq!(
            resolve_link(base, "/photos/album/1/").unwrap(),
            "https://www.douban.com/photos/album/1/"
        );
        assert_eq!(
            resolve_link(base, "https://img1.doubanio.com/x.jpg").unwrap(),
            "https://img1.doubanio.com/x.jpg"
        );
        assert!(resolve_link("relative/only", "x").is_err());
    }

    #[test]
    fn test_glob_to_regex() {
        let re = glob_to_regex("https://komiic.com/*").unwrap();
        assert!(re.is_match("https://komiic.com/comic/12"));
        assert!(re.is_match("https://komiic.com/"));
        assert!(!re.is_match("https://komiic.community/comic/12"));
        assert!(!re.is_match("http://komiic.com/comic/12"));
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  12张照片 \n 2023-01-02  创建 "), "12张照片 2023-01-02 创建");
    }
}
