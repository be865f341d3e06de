//! In-process counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters incremented by the shield as it processes values.
#[derive(Debug, Default)]
pub struct ShieldMetrics {
    pattern_detected: AtomicU64,
    sanitized: AtomicU64,
    strict_sanitized: AtomicU64,
    form_sanitized: AtomicU64,
    field_override_skipped: AtomicU64,
    param_override_skipped: AtomicU64,
}

/// Point-in-time copy of [`ShieldMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub pattern_detected: u64,
    pub sanitized: u64,
    pub strict_sanitized: u64,
    pub form_sanitized: u64,
    pub field_override_skipped: u64,
    pub param_override_skipped: u64,
}

impl ShieldMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pattern_detected(&self) {
        self.pattern_detected.fetch_add(1, Ordering::Relaxed);
    }

    /// Value sanitized with the configured preset policy.
    pub fn record_sanitized(&self) {
        self.sanitized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_strict_sanitized(&self) {
        self.strict_sanitized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_form_sanitized(&self) {
        self.form_sanitized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_field_override_skipped(&self) {
        self.field_override_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_param_override_skipped(&self) {
        self.param_override_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pattern_detected: self.pattern_detected.load(Ordering::Relaxed),
            sanitized: self.sanitized.load(Ordering::Relaxed),
            strict_sanitized: self.strict_sanitized.load(Ordering::Relaxed),
            form_sanitized: self.form_sanitized.load(Ordering::Relaxed),
            field_override_skipped: self.field_override_skipped.load(Ordering::Relaxed),
            param_override_skipped: self.param_override_skipped.load(Ordering::Relaxed),
        }
    }
}
