//! Retrieval metrics.
//!
//! Aggregated counters for searches, attempts, captcha resolution, parse
//! tiers, and document retrieval, alongside lightweight timing helpers for
//! per-search latency measurements.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Aggregated counters across engine activity.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineMetrics {
    pub searches: u64,
    pub attempts: u64,

    pub captcha_text_solved: u64,
    pub captcha_image_solved: u64,
    pub captcha_unsolved: u64,

    pub table_parses: u64,
    pub pattern_parses: u64,

    pub found: u64,
    pub not_found: u64,
    pub failed: u64,

    pub documents_fetched: u64,
    pub document_bytes: u64,

    pub total_search_time_ms: u64,
}

impl EngineMetrics {
    /// Merge the values from another metrics instance into this one.
    pub fn merge(&mut self, other: &EngineMetrics) {
        self.searches += other.searches;
        self.attempts += other.attempts;

        self.captcha_text_solved += other.captcha_text_solved;
        self.captcha_image_solved += other.captcha_image_solved;
        self.captcha_unsolved += other.captcha_unsolved;

        self.table_parses += other.table_parses;
        self.pattern_parses += other.pattern_parses;

        self.found += other.found;
        self.not_found += other.not_found;
        self.failed += other.failed;

        self.documents_fetched += other.documents_fetched;
        self.document_bytes += other.document_bytes;

        self.total_search_time_ms += other.total_search_time_ms;
    }

    pub fn record_search(&mut self, elapsed_ms: u64) {
        self.searches += 1;
        self.total_search_time_ms += elapsed_ms;
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    pub fn record_captcha_text(&mut self) {
        self.captcha_text_solved += 1;
    }

    pub fn record_captcha_image(&mut self) {
        self.captcha_image_solved += 1;
    }

    pub fn record_captcha_unsolved(&mut self) {
        self.captcha_unsolved += 1;
    }

    pub fn record_table_parse(&mut self) {
        self.table_parses += 1;
    }

    pub fn record_pattern_parse(&mut self) {
        self.pattern_parses += 1;
    }

    pub fn record_found(&mut self) {
        self.found += 1;
    }

    pub fn record_not_found(&mut self) {
        self.not_found += 1;
    }

    pub fn record_failed(&mut self) {
        self.failed += 1;
    }

    pub fn record_document(&mut self, bytes: u64) {
        self.documents_fetched += 1;
        self.document_bytes += bytes;
    }
}

/// Start a latency timer using [`Instant::now`].
pub fn start_timer() -> Instant {
    Instant::now()
}

/// Return the elapsed milliseconds since the provided start instant.
pub fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Helper for tests to convert milliseconds to [`Duration`].
pub fn duration_from_millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
