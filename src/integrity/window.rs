//! Per-session sliding window of recent checkpoints (spec §4.3).
//!
//! Threshold-driven, bounded-collection design grounded in this
//! codebase's `ContextStrategy` implementations (`TrimStrategy`,
//! `NoveltyAwareStrategy`), which similarly hold a small ordered buffer
//! and make push/compact decisions off configurable thresholds.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::integrity::verdict::Verdict;

#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub max_size: usize,
    pub max_age_seconds: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            max_size: 10,
            max_age_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone)]
struct WindowEntry {
    verdict: Verdict,
    pushed_at: u64,
}

#[derive(Debug, Clone)]
pub struct WindowSummary {
    pub size: usize,
    pub clear_count: usize,
    pub review_needed_count: usize,
    pub boundary_violation_count: usize,
    pub integrity_ratio: f64,
    pub drift_alert_active: bool,
}

/// A per-session sliding window. `drift_alert_active` is owned by the
/// caller's [`super::drift::DriftDetector`] and merged into the summary on
/// read rather than tracked here, keeping window and drift concerns
/// separate as in spec §4.3.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    config: WindowConfig,
    entries: VecDeque<WindowEntry>,
}

impl SlidingWindow {
    pub fn new(config: WindowConfig) -> Self {
        SlidingWindow {
            config,
            entries: VecDeque::new(),
        }
    }

    /// Push a new verdict at `now` (unix seconds). Drops checkpoints older
    /// than `max_age_seconds`, then drops the oldest entries until
    /// `size <= max_size`.
    pub fn push(&mut self, verdict: Verdict, now: u64) {
        self.entries.push_back(WindowEntry { verdict, pushed_at: now });
        self.evict_stale(now);
        while self.entries.len() > self.config.max_size {
            self.entries.pop_front();
        }
    }

    fn evict_stale(&mut self, now: u64) {
        while let Some(front) = self.entries.front() {
            if now.saturating_sub(front.pushed_at) > self.config.max_age_seconds {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self, drift_alert_active: bool) -> WindowSummary {
        let size = self.entries.len();
        let clear_count = self
            .entries
            .iter()
            .filter(|e| e.verdict == Verdict::Clear)
            .count();
        let review_needed_count = self
            .entries
            .iter()
            .filter(|e| e.verdict == Verdict::ReviewNeeded)
            .count();
        let boundary_violation_count = self
            .entries
            .iter()
            .filter(|e| e.verdict == Verdict::BoundaryViolation)
            .count();
        let integrity_ratio = if size == 0 {
            1.0
        } else {
            clear_count as f64 / size as f64
        };

        WindowSummary {
            size,
            clear_count,
            review_needed_count,
            boundary_violation_count,
            integrity_ratio,
            drift_alert_active,
        }
    }
}

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
