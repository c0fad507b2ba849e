/// Crawl metrics per adapter
///
/// Tracks page success rates, image counts and failures for each adapter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterMetrics {
    pub adapter: String,
    pub chapters: u64,
    pub pages_ok: u64,
    pub pages_failed: u64,
    pub images: u64,
    pub origin_failures: u64,
    pub listing_failures: u64,
    pub started_at: DateTime<Utc>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl AdapterMetrics {
    pub fn new(adapter: String) -> Self {
        Self {
            adapter,
            chapters: 0,
            pages_ok: 0,
            pages_failed: 0,
            images: 0,
            origin_failures: 0,
            listing_failures: 0,
            started_at: Utc::now(),
            last_success: None,
            last_failure: None,
            last_error: None,
        }
    }

    /// Share of fetched pages that came back usable, in percent
    pub fn success_rate(&self) -> f64 {
        let total = self.pages_ok + self.pages_failed;
        if total == 0 {
            0.0
        } else {
            (self.pages_ok as f64 / total as f64) * 100.0
        }
    }

    pub fn record_chapters(&mut self, count: usize) {
        self.chapters += count as u64;
    }

    pub fn record_page(&mut self, images: usize) {
        self.pages_ok += 1;
        self.images += images as u64;
        self.last_success = Some(Utc::now());
    }

    pub fn record_page_failure(&mut self, error: String) {
        self.pages_failed += 1;
        self.note_failure(error);
    }

    pub fn record_listing_failure(&mut self, error: String) {
        self.listing_failures += 1;
        self.note_failure(error);
    }

    pub fn record_origin_failure(&mut self, error: String) {
        self.origin_failures += 1;
        self.note_failure(error);
    }

    fn note_failure(&mut self, error: String) {
        self.last_failure = Some(Utc::now());
        self.last_error = Some(error);
    }
}

/// Shared metrics tracker, cheap to clone
#[derive(Clone, Default)]
pub struct MetricsTracker {
    metrics: Arc<Mutex<HashMap<String, AdapterMetrics>>>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, AdapterMetrics>> {
        // counters stay meaningful even if a holder panicked
        self.metrics.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update<F>(&self, adapter: &str, f: F)
    where
        F: FnOnce(&mut AdapterMetrics),
    {
        let mut metrics = self.lock();
        let entry = metrics
            .entry(adapter.to_string())
            .or_insert_with(|| AdapterMetrics::new(adapter.to_string()));
        f(entry);
    }

    pub fn record_chapters(&self, adapter: &str, count: usize) {
        self.update(adapter, |m| m.record_chapters(count));
    }

    pub fn record_page(&self, adapter: &str, images: usize) {
        self.update(adapter, |m| m.record_page(images));
        log::debug!("[{}] page ok - {} images", adapter, images);
    }

    pub fn record_page_failure(&self, adapter: &str, error: String) {
        log::warn!("[{}] page failed - {}", adapter, error);
        self.update(adapter, |m| m.record_page_failure(error));
    }

    pub fn record_listing_failure(&self, adapter: &str, error: String) {
        log::warn!("[{}] chapter listing failed - {}", adapter, error);
        self.update(adapter, |m| m.record_listing_failure(error));
    }

    pub fn record_origin_failure(&self, adapter: &str, error: String) {
        log::warn!("[{}] origin lookup failed - {}", adapter, error);
        self.update(adapter, |m| m.record_origin_failure(error));
    }

    pub fn get_metrics(&self, adapter: &str) -> Option<AdapterMetrics> {
        self.lock().get(adapter).cloned()
    }

    pub fn get_all_metrics(&self) -> Vec<AdapterMetrics> {
        self.lock().values().cloned().collect()
    }

    pub fn log_summary(&self) {
        for m in self.get_all_metrics() {
            log::info!(
                "[{}] chapters: {}, pages: {} ok / {} failed ({:.2}%), images: {}, origin failures: {}, listing failures: {}",
                m.adapter,
                m.chapters,
                m.pages_ok,
                m.pages_failed,
                m.success_rate(),
                m.images,
                m.origin_failures,
                m.listing_failures
            );
            if let Some(last_error) = &m.last_error {
                log::info!("[{}] last error: {}", m.adapter, last_error);
            }
        }
    }

    pub fn export_json(&self) -> String {
        let metrics = self.lock();
        serde_json::to_string_pretty(&*metrics).unwrap_or_else(|_| "{}".to_string())
    }
}
