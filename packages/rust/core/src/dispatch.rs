//! In-process job dispatch: a bounded queue drained by a pool of worker tasks.
//!
//! Submission enqueues a [`JobMessage`]; each worker pulls the next message
//! and runs the pipeline for it. Stages of one job run sequentially on one
//! worker while different jobs run concurrently.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use seocompass_shared::{JobFilter, JobId, JobStatus, Result, SeoCompassError};
use seocompass_storage::Storage;

use crate::pipeline::{Pipeline, ProgressReporter};

/// The unit of work on the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobMessage {
    pub job_id: JobId,
}

/// Cloneable sending side of the queue.
///
/// All handles share one sender slot, so [`Dispatcher::shutdown`] closes the
/// queue for every clone at once.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: Arc<Mutex<Option<mpsc::Sender<JobMessage>>>>,
}

impl DispatchHandle {
    /// Queue `job_id` for execution, waiting for space if the queue is full.
    pub async fn enqueue(&self, job_id: &JobId) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| SeoCompassError::Dispatch("dispatcher has shut down".into()))?;

        tx.send(JobMessage {
            job_id: job_id.clone(),
        })
        .await
        .map_err(|_| SeoCompassError::Dispatch("job queue is closed".into()))?;
        debug!(%job_id, "job enqueued");
        Ok(())
    }

    fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

/// Worker pool running queued jobs through a [`Pipeline`].
pub struct Dispatcher {
    handle: DispatchHandle,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Start `workers` tasks sharing one queue of `queue_capacity` messages.
    pub fn spawn(
        pipeline: Arc<Pipeline>,
        workers: usize,
        queue_capacity: usize,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..workers.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    pipeline.clone(),
                    rx.clone(),
                    progress.clone(),
                ))
            })
            .collect::<Vec<_>>();

        info!(workers = workers.len(), queue_capacity, "dispatcher started");
        Self {
            handle: DispatchHandle {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            workers,
        }
    }

    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// Enqueue every QUEUED job in the store, oldest first. Returns the count.
    pub async fn enqueue_pending(&self, store: &Storage) -> Result<usize> {
        let filter = JobFilter {
            url: None,
            status: Some(JobStatus::Queued),
        };
        let total = store.count_jobs(&filter).await?;
        if total == 0 {
            return Ok(0);
        }

        let mut pending = store
            .list_jobs(&filter, 1, i64::try_from(total).unwrap_or(i64::MAX))
            .await?;
        pending.reverse();

        for job in &pending {
            self.handle.enqueue(&job.id).await?;
        }
        info!(count = pending.len(), "pending jobs enqueued");
        Ok(pending.len())
    }

    /// Close the queue, let workers drain what is already queued, and join them.
    pub async fn shutdown(self) {
        self.handle.close();
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "worker task panicked");
            }
        }
        info!("dispatcher stopped");
    }
}

#[instrument(skip_all, fields(worker = worker))]
async fn worker_loop(
    worker: usize,
    pipeline: Arc<Pipeline>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<JobMessage>>>,
    progress: Arc<dyn ProgressReporter>,
) {
    loop {
        let message = { rx.lock().await.recv().await };
        let Some(JobMessage { job_id }) = message else {
            break;
        };

        match pipeline.run(&job_id, progress.as_ref()).await {
            Ok(outcome) => debug!(%job_id, status = %outcome.status, "job finished"),
            Err(SeoCompassError::InvalidTransition { message }) => {
                debug!(%job_id, %message, "duplicate message dropped");
            }
            Err(e) => warn!(%job_id, error = %e, "job could not run"),
        }
    }
    debug!(worker, "worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use seocompass_adapters::Capabilities;

    use crate::pipeline::SilentProgress;
    use crate::testing::{fast_retry, test_store};

    fn pipeline(store: &Arc<Storage>) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            store.clone(),
            Capabilities::mock(),
            fast_retry(),
        ))
    }

    #[tokio::test]
    async fn workers_complete_enqueued_jobs() {
        let store = test_store().await;
        let dispatcher = Dispatcher::spawn(pipeline(&store), 2, 4, Arc::new(SilentProgress));
        let handle = dispatcher.handle();

        let mut ids = Vec::new();
        for i in 0..5 {
            let job = store
                .create_job(&format!("https://site{i}.example.com"))
                .await
                .unwrap();
            handle.enqueue(&job.id).await.unwrap();
            ids.push(job.id);
        }
        dispatcher.shutdown().await;

        for id in &ids {
            let job = store.get_job(id).await.unwrap();
            assert_eq!(job.status, JobStatus::Completed, "job {id}");
        }
    }

    #[tokio::test]
    async fn duplicate_messages_run_once() {
        let store = test_store().await;
        let dispatcher = Dispatcher::spawn(pipeline(&store), 3, 8, Arc::new(SilentProgress));
        let job = store.create_job("https://example.com").await.unwrap();

        for _ in 0..3 {
            dispatcher.handle().enqueue(&job.id).await.unwrap();
        }
        dispatcher.shutdown().await;

        let stored = store.get_job(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(store.get_results(&job.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn enqueue_pending_picks_up_queued_jobs() {
        let store = test_store().await;
        let queued = store.create_job("https://queued.example.com").await.unwrap();
        let failed = store.create_job("https://failed.example.com").await.unwrap();
        store
            .set_status(&failed.id, JobStatus::Failed, Some("cancelled"))
            .await
            .unwrap();

        let dispatcher = Dispatcher::spawn(pipeline(&store), 1, 2, Arc::new(SilentProgress));
        assert_eq!(dispatcher.enqueue_pending(&store).await.unwrap(), 1);
        dispatcher.shutdown().await;

        assert_eq!(
            store.get_job(&queued.id).await.unwrap().status,
            JobStatus::Completed
        );
        assert_eq!(
            store.get_job(&failed.id).await.unwrap().status,
            JobStatus::Failed
        );
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_fails() {
        let store = test_store().await;
        let dispatcher = Dispatcher::spawn(pipeline(&store), 1, 1, Arc::new(SilentProgress));
        let handle = dispatcher.handle();
        dispatcher.shutdown().await;

        let err = handle.enqueue(&JobId::new()).await.unwrap_err();
        assert!(matches!(err, SeoCompassError::Dispatch(_)));
        assert_eq!(err.http_status(), 500);
    }
}
