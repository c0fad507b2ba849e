// Library interface for rust_gallery_scraper
// The binary and the integration tests use the adapters through this crate

pub mod config;
pub mod crawler;
pub mod error;
pub mod helpers;
pub mod http_client;
pub mod matcher;
pub mod metrics;
pub mod models;
pub mod page_context;
pub mod registry;
pub mod sources;

pub use error::{Error, ErrorKind, Result};
pub use matcher::{GalleryMatcher, Matcher};
pub use registry::{AdapterRegistry, AdapterSetup};
