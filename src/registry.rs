//! Which adapter handles which page.
//!
//! Each adapter registers an [`AdapterSetup`]: a name, the `work_urls`
//! regexes that auto-activate it on a gallery page, the broader `matches`
//! globs that say it may run on a site at all, and a constructor. The list is
//! filled once at startup and only read afterwards.

use crate::error::Result;
use crate::helpers::glob_to_regex;
use crate::matcher::GalleryMatcher;
use crate::page_context::PageContext;
use regex::Regex;

pub type MatcherConstructor = fn(PageContext) -> Box<dyn GalleryMatcher>;

pub struct AdapterSetup {
    pub name: &'static str,
    pub work_urls: Vec<Regex>,
    pub matches: Vec<Regex>,
    pub constructor: MatcherConstructor,
}

impl AdapterSetup {
    pub fn new(
        name: &'static str,
        work_urls: &[&str],
        matches: &[&str],
        constructor: MatcherConstructor,
    ) -> Result<Self> {
        let work_urls = work_urls
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let matches = matches
            .iter()
            .map(|g| glob_to_regex(g))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name,
            work_urls,
            matches,
            constructor,
        })
    }

    /// This exact page is a gallery the adapter can crawl
    pub fn is_work_url(&self, url: &str) -> bool {
        self.work_urls.iter().any(|re| re.is_match(url))
    }

    /// The adapter is allowed to run somewhere on this site
    pub fn is_match(&self, url: &str) -> bool {
        self.matches.iter().any(|re| re.is_match(url))
    }
}

impl std::fmt::Debug for AdapterSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSetup")
            .field("name", &self.name)
            .field("work_urls", &self.work_urls.iter().map(Regex::as_str).collect::<Vec<_>>())
            .field("matches", &self.matches.iter().map(Regex::as_str).collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct AdapterRegistry {
    setups: Vec<AdapterSetup>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every adapter shipped with the crate
    pub fn with_builtin_adapters() -> Result<Self> {
        let mut registry = Self::new();
        crate::sources::register_builtin(&mut registry)?;
        Ok(registry)
    }

    pub fn add_setup(&mut self, setup: AdapterSetup) {
        log::debug!("Registered adapter {}", setup.name);
        self.setups.push(setup);
    }

    /// First adapter, in registration order, whose work URLs accept `url`
    pub fn select(&self, url: &str) -> Option<&AdapterSetup> {
        self.setups.iter().find(|s| s.is_work_url(url))
    }

    /// All adapters whose match globs accept `url`
    pub fn eligible<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a AdapterSetup> + 'a {
        self.setups.iter().filter(move |s| s.is_match(url))
    }

    pub fn find(&self, name: &str) -> Option<&AdapterSetup> {
        self.setups.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.setups.iter().map(|s| s.name).collect()
    }

    pub fn len(&self) -> usize {
        self.setups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setups.is_empty()
    }

    /// Build the matcher for the page, if any adapter claims it
    pub fn activate(&self, ctx: PageContext) -> Option<(&'static str, Box<dyn GalleryMatcher>)> {
        let setup = self.select(ctx.url())?;
        log::info!("Activating adapter {} for {}", setup.name, ctx.url());
        Some((setup.name, (setup.constructor)(ctx)))
    }
}
