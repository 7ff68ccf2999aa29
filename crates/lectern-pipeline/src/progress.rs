//! Weighted progress reporting.
//!
//! [`ProgressReporter`] maps intra-stage completion fractions into the
//! active stage's percentage band and writes the result through the job
//! store. Values are clamped monotonic per run; the store's own CASE guard
//! provides the same property at the row level, so a stale writer can never
//! regress what a polling client sees.

use std::sync::atomic::{AtomicI64, Ordering};

use lectern_core::JobId;
use lectern_db::pool::DbPool;
use lectern_db::queries::jobs;

/// Per-run progress writer for one job.
pub struct ProgressReporter {
    db: DbPool,
    job_id: JobId,
    band_lo: AtomicI64,
    band_hi: AtomicI64,
    last: AtomicI64,
}

impl ProgressReporter {
    pub fn new(db: DbPool, job_id: JobId) -> Self {
        Self {
            db,
            job_id,
            band_lo: AtomicI64::new(0),
            band_hi: AtomicI64::new(0),
            last: AtomicI64::new(0),
        }
    }

    /// Enter a stage's band and report its floor.
    pub fn enter_band(&self, band: (i64, i64)) {
        self.band_lo.store(band.0, Ordering::Relaxed);
        self.band_hi.store(band.1, Ordering::Relaxed);
        self.report(band.0, None);
    }

    /// Report sub-progress as a fraction (0.0..=1.0) of the current stage,
    /// interpolated linearly inside the band.
    pub fn fraction(&self, frac: f64, message: Option<&str>) {
        let lo = self.band_lo.load(Ordering::Relaxed);
        let hi = self.band_hi.load(Ordering::Relaxed);
        let frac = frac.clamp(0.0, 1.0);
        let value = lo + ((hi - lo) as f64 * frac).round() as i64;
        self.report(value, message);
    }

    /// Jump to the current band's ceiling on stage completion.
    pub fn complete_stage(&self, message: Option<&str>) {
        let hi = self.band_hi.load(Ordering::Relaxed);
        self.report(hi, message);
    }

    /// The last value written by this reporter.
    pub fn current(&self) -> i64 {
        self.last.load(Ordering::Relaxed)
    }

    fn report(&self, value: i64, message: Option<&str>) {
        let clamped = self.last.fetch_max(value, Ordering::Relaxed).max(value);
        let conn = match lectern_db::pool::get_conn(&self.db) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(job_id = %self.job_id, "progress write skipped: {e}");
                return;
            }
        };
        if let Err(e) = jobs::update_progress(&conn, self.job_id, clamped, message) {
            tracing::warn!(job_id = %self.job_id, "progress write failed: {e}");
        }
    }
}
