//! The job runner pool.
//!
//! Executes pipeline runs without blocking the request that triggered them.
//! Submissions queue FIFO; a dispatcher task drains the queue under a
//! semaphore bounding concurrent runs. The in-flight map enforces the
//! single-writer invariant: at most one run (queued or executing) exists per
//! job id, and a duplicate submit reports the conflict instead of starting
//! a second writer.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use lectern_core::{Error, FailureKind, JobId, Result};
use lectern_db::pool::DbPool;
use lectern_db::queries::jobs;

use crate::orchestrator::Orchestrator;

/// Bounded pool of pipeline runs.
///
/// Cheap to clone; all clones share the same queue and in-flight map.
#[derive(Clone)]
pub struct RunnerPool {
    inner: Arc<Inner>,
}

struct Inner {
    orchestrator: Orchestrator,
    db: DbPool,
    /// Jobs with a queued or executing run, keyed to their cancel token.
    in_flight: DashMap<JobId, CancellationToken>,
    tx: mpsc::Sender<JobId>,
}

impl RunnerPool {
    /// Start the pool with `max_concurrent` simultaneous runs and a FIFO
    /// queue of at most `queue_depth` waiting submissions.
    pub fn start(
        orchestrator: Orchestrator,
        db: DbPool,
        max_concurrent: usize,
        queue_depth: usize,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<JobId>(queue_depth.max(1));
        let inner = Arc::new(Inner {
            orchestrator,
            db,
            in_flight: DashMap::new(),
            tx,
        });

        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let dispatcher = inner.clone();
        tokio::spawn(async move {
            while let Some(job_id) = rx.recv().await {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let worker = dispatcher.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    worker.execute(job_id).await;
                });
            }
            tracing::info!("Runner pool dispatcher stopped");
        });

        Self { inner }
    }

    /// Enqueue a run for `job_id`.
    ///
    /// Returns a conflict when a run for the job is already queued or
    /// executing; the existing run is untouched.
    pub fn submit(&self, job_id: JobId) -> Result<()> {
        match self.inner.in_flight.entry(job_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(Error::Conflict(format!("job {job_id} is already running")));
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(CancellationToken::new());
            }
        }

        if self.inner.tx.try_send(job_id).is_err() {
            self.inner.in_flight.remove(&job_id);
            return Err(Error::Conflict("run queue is full".into()));
        }

        tracing::debug!(job_id = %job_id, "Run submitted");
        Ok(())
    }

    /// Request cooperative cancellation of a job's run.
    ///
    /// Returns false when no run is in flight. The orchestrator observes the
    /// token at its next checkpoint; the job then lands in `failed` with a
    /// cancellation message.
    pub fn cancel(&self, job_id: JobId) -> bool {
        match self.inner.in_flight.get(&job_id) {
            Some(entry) => {
                entry.value().cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a run for the job is queued or executing.
    pub fn is_active(&self, job_id: JobId) -> bool {
        self.inner.in_flight.contains_key(&job_id)
    }

    /// Number of in-flight runs (queued plus executing).
    pub fn active_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Cancel every in-flight run (service shutdown).
    pub fn shutdown(&self) {
        for entry in self.inner.in_flight.iter() {
            entry.value().cancel();
        }
    }
}

impl Inner {
    async fn execute(&self, job_id: JobId) {
        let token = self
            .in_flight
            .get(&job_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        if let Err(e) = self.orchestrator.run(job_id, token).await {
            // The orchestrator absorbs stage failures; an error here means
            // the job record itself was unreachable. Surface it on the
            // record anyway, best effort, so the failure is never silent.
            tracing::error!(job_id = %job_id, "Pipeline run errored: {e}");
            if let Ok(conn) = lectern_db::pool::get_conn(&self.db) {
                let _ = jobs::fail_job(&conn, job_id, FailureKind::Transient, &e.to_string());
            }
        }

        self.in_flight.remove(&job_id);
    }
}
