//! Fixed pool of blocking pipeline workers behind the async HTTP layer.
//!
//! Request handlers never run inference themselves. They queue a job on a
//! bounded crossbeam channel and await the reply on a tokio oneshot, so the
//! runtime threads stay free while models are busy.

use crate::pipeline::Pipeline;
use crossbeam_channel::{Sender, TrySendError, bounded};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

type Job = Box<dyn FnOnce(&Pipeline) + Send>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("all pipeline workers are busy")]
    Busy,

    #[error("worker pool is shut down")]
    Closed,

    #[error("worker dropped the job without replying")]
    Lost,
}

pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` threads sharing `pipeline`. At most `queue_depth`
    /// jobs wait for a free worker.
    pub fn new(pipeline: Arc<Pipeline>, workers: usize, queue_depth: usize) -> Self {
        let (sender, receiver) = bounded::<Job>(queue_depth.max(1));

        let workers = (0..workers.max(1))
            .filter_map(|index| {
                let receiver = receiver.clone();
                let pipeline = Arc::clone(&pipeline);
                let spawned = thread::Builder::new()
                    .name(format!("vitrans-worker-{}", index))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            if catch_unwind(AssertUnwindSafe(|| job(&pipeline))).is_err() {
                                tracing::error!(worker = index, "pipeline job panicked");
                            }
                        }
                        tracing::debug!(worker = index, "worker stopped");
                    });
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        tracing::error!(worker = index, error = %e, "failed to spawn worker");
                        None
                    }
                }
            })
            .collect::<Vec<_>>();

        tracing::info!(workers = workers.len(), queue_depth, "worker pool started");
        Self {
            sender: Some(sender),
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Run `job` on a worker and await its result.
    ///
    /// Fails fast with [`WorkerError::Busy`] when the queue is full.
    pub async fn submit<T, F>(&self, job: F) -> Result<T, WorkerError>
    where
        T: Send + 'static,
        F: FnOnce(&Pipeline) -> T + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(WorkerError::Closed)?;
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();

        let job: Job = Box::new(move |pipeline| {
            if reply_tx.send(job(pipeline)).is_err() {
                tracing::debug!("requester went away before the job finished");
            }
        });

        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => WorkerError::Busy,
            TrySendError::Disconnected(_) => WorkerError::Closed,
        })?;

        reply_rx.await.map_err(|_| WorkerError::Lost)
    }

    /// Stop accepting jobs, let queued ones finish, and join the workers.
    pub fn shutdown(mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets idle workers exit; running jobs finish
        // on their own.
        self.sender.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelRegistry;
    use crate::pipeline::PipelineConfig;
    use crate::stt::MockTranscriber;
    use crate::translate::MockTranslator;
    use crate::tts::MockSynthesizer;
    use std::time::Duration;

    fn pipeline(transcriber: MockTranscriber) -> Arc<Pipeline> {
        let registry = ModelRegistry::from_parts(
            Arc::new(transcriber),
            Arc::new(MockTranslator::new()),
        );
        Arc::new(Pipeline::new(
            Arc::new(registry),
            Arc::new(MockSynthesizer::new()),
            PipelineConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_submit_returns_job_result() {
        let pool = WorkerPool::new(pipeline(MockTranscriber::new("mock")), 2, 4);

        let result = pool
            .submit(|p| p.translate_text("xin chào"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.translated_text, "en: xin chào");
        assert_eq!(pool.worker_count(), 2);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_panicking_job_reports_lost_and_worker_survives() {
        let pool = WorkerPool::new(pipeline(MockTranscriber::new("mock")), 1, 4);

        let lost = pool.submit(|_| -> u32 { panic!("boom") }).await;
        assert_eq!(lost, Err(WorkerError::Lost));

        let next = pool.submit(|_| 7).await;
        assert_eq!(next, Ok(7));
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_full_queue_is_busy() {
        let pool = Arc::new(WorkerPool::new(pipeline(MockTranscriber::new("mock")), 1, 1));
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        // Occupy the only worker until released.
        let blocker = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                pool.submit(move |_| {
                    assert!(started_tx.send(()).is_ok());
                    release_rx.recv_timeout(Duration::from_secs(5)).is_ok()
                })
                .await
            })
        };
        started_rx.await.unwrap();

        // The first poll enqueues the job, then waits for its reply.
        let queued = pool.submit(|_| 1);
        tokio::pin!(queued);
        tokio::select! {
            biased;
            _ = &mut queued => panic!("queued job ran while the worker was blocked"),
            _ = std::future::ready(()) => {}
        }

        assert_eq!(pool.submit(|_| 2).await, Err(WorkerError::Busy));

        release_tx.send(()).unwrap();
        assert_eq!(blocker.await.unwrap(), Ok(true));
        assert_eq!(queued.await, Ok(1));
    }
}
