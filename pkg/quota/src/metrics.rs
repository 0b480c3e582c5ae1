use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ErrorKind;

/// Counters for the enforcer and reconciler, rendered in Prometheus text format.
#[derive(Debug, Default)]
pub struct QuotaMetrics {
    admitted: AtomicU64,
    denied: AtomicU64,
    errored: AtomicU64,
    conflicts: AtomicU64,
    rollbacks: AtomicU64,
    reconciled: AtomicU64,
    reconcile_errors: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub admitted: u64,
    pub denied: u64,
    pub errored: u64,
    pub conflicts: u64,
    pub rollbacks: u64,
    pub reconciled: u64,
    pub reconcile_errors: u64,
}

impl QuotaMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Terminal user errors count as denials; everything else as errors.
    pub fn record_failure(&self, kind: ErrorKind) {
        match kind {
            ErrorKind::LimitExceeded | ErrorKind::BadRequest => {
                self.denied.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.errored.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconciled(&self, count: u64) {
        self.reconciled.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_reconcile_error(&self) {
        self.reconcile_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            reconciled: self.reconciled.load(Ordering::Relaxed),
            reconcile_errors: self.reconcile_errors.load(Ordering::Relaxed),
        }
    }

    /// Render all counters in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let s = self.snapshot();
        let counters = [
            ("quota_admissions_allowed_total", "Admissions that passed quota", s.admitted),
            ("quota_admissions_denied_total", "Admissions rejected by quota", s.denied),
            ("quota_admissions_errored_total", "Admissions that failed with a retryable or internal error", s.errored),
            ("quota_write_conflicts_total", "Stale-token quota writes that were retried", s.conflicts),
            ("quota_rollbacks_total", "Committed quota charges undone after a failed admission", s.rollbacks),
            ("quota_reconciled_total", "Quotas whose used amounts were corrected by reconciliation", s.reconciled),
            ("quota_reconcile_errors_total", "Quotas that could not be reconciled", s.reconcile_errors),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            let _ = writeln!(output, "# HELP {} {}", name, help);
            let _ = writeln!(output, "# TYPE {} counter", name);
            let _ = writeln!(output, "{} {}", name, value);
        }
        output
    }
}
