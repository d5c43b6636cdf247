//! Worker Pool (C2): bounded concurrent execution of submitted jobs with a
//! result channel. Generic over [`Job`] so the transfer engine (C3) can run
//! both part-upload and range-download jobs through the same machinery.
//!
//! The teacher dispatches per-worker commands over a dedicated
//! `tokio::sync::mpsc` channel each; here many equivalent jobs share one
//! queue, so a multi-consumer channel is the natural generalisation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// One unit of work executed by the pool.
#[async_trait]
pub trait Job: Send + 'static {
    /// Result produced by a successfully executed job.
    type Output: Send + 'static;

    /// Run the job to completion, observing `cancel`.
    async fn execute(&self, cancel: CancellationToken) -> Result<Self::Output, JobError>;
}

/// Failure modes surfaced by the pool for a single job.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job timed out")]
    Timeout,
    #[error("job cancelled")]
    Cancelled,
    #[error("job panicked: {0}")]
    Panicked(String),
    #[error("{0}")]
    Failed(String),
}

/// One entry on the result stream.
pub struct JobResult<O> {
    pub output: Result<O, JobError>,
}

/// Errors from [`WorkerPool::submit`] / [`WorkerPool::try_submit`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("queue full")]
    QueueFull,
    #[error("pool stopped")]
    Stopped,
}

/// Pool construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub workers: usize,
    /// Bound on the shared job queue; `submit` blocks and `try_submit` fails
    /// with [`SubmitError::QueueFull`] once this many jobs are queued.
    pub queue_capacity: usize,
    /// Per-job timeout; `None` means no timeout.
    pub job_timeout: Option<Duration>,
}

impl PoolConfig {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            queue_capacity: workers * 4,
            job_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity.max(1);
        self
    }
}

/// A fixed set of tasks draining a shared job queue.
///
/// `Start`/`Stop` are idempotent: calling either a second time (without the
/// matching counterpart in between) is a no-op.
pub struct WorkerPool<J: Job> {
    job_tx: Option<async_channel::Sender<(J, CancellationToken)>>,
    job_rx: async_channel::Receiver<(J, CancellationToken)>,
    result_tx: Option<async_channel::Sender<JobResult<J::Output>>>,
    result_rx: async_channel::Receiver<JobResult<J::Output>>,
    workers: usize,
    job_timeout: Option<Duration>,
    join: JoinSet<()>,
    started: bool,
    stopped: bool,
    cancel: CancellationToken,
}

impl<J: Job> WorkerPool<J> {
    pub fn new(config: PoolConfig) -> Self {
        let workers = config.workers.max(1);
        let (job_tx, job_rx) = async_channel::bounded(config.queue_capacity.max(1));
        let (result_tx, result_rx) = async_channel::unbounded();
        Self {
            job_tx: Some(job_tx),
            job_rx,
            result_tx: Some(result_tx),
            result_rx,
            workers,
            job_timeout: config.job_timeout,
            join: JoinSet::new(),
            started: false,
            stopped: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Launch exactly `workers` tasks reading from the shared queue.
    pub fn start(&mut self) {
        if self.started || self.stopped {
            return;
        }
        self.started = true;
        for _ in 0..self.workers {
            let job_rx = self.job_rx.clone();
            let result_tx = self
                .result_tx
                .clone()
                .expect("result_tx present while pool is running");
            let timeout = self.job_timeout;
            self.join.spawn(async move {
                while let Ok((job, job_cancel)) = job_rx.recv().await {
                    let output = run_job(job, job_cancel, timeout).await;
                    if result_tx.send(JobResult { output }).await.is_err() {
                        break;
                    }
                }
            });
        }
    }

    /// Submit a job, blocking until the queue has space.
    pub async fn submit(&self, job: J) -> Result<(), SubmitError> {
        let Some(tx) = &self.job_tx else {
            return Err(SubmitError::Stopped);
        };
        let cancel = self.cancel.child_token();
        tx.send((job, cancel)).await.map_err(|_| SubmitError::Stopped)
    }

    /// Submit a job without blocking; fails if the queue is full or stopped.
    pub fn try_submit(&self, job: J) -> Result<(), SubmitError> {
        let Some(tx) = &self.job_tx else {
            return Err(SubmitError::Stopped);
        };
        let cancel = self.cancel.child_token();
        tx.try_send((job, cancel)).map_err(|err| match err {
            async_channel::TrySendError::Full(_) => SubmitError::QueueFull,
            async_channel::TrySendError::Closed(_) => SubmitError::Stopped,
        })
    }

    /// A clone of the result stream; every submitted job produces exactly
    /// one entry here before `stop` returns.
    pub fn results(&self) -> async_channel::Receiver<JobResult<J::Output>> {
        self.result_rx.clone()
    }

    /// Cancel every outstanding and queued job immediately.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Close the job queue, wait for workers to drain, then close the
    /// result stream. Safe to call more than once.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.job_tx.take();
        while self.join.join_next().await.is_some() {}
        self.result_tx.take();
    }
}

async fn run_job<J: Job>(
    job: J,
    job_cancel: CancellationToken,
    timeout: Option<Duration>,
) -> Result<J::Output, JobError> {
    let exec_cancel = job_cancel.clone();
    let mut handle = tokio::spawn(async move { job.execute(exec_cancel).await });

    if let Some(timeout) = timeout {
        tokio::select! {
            res = &mut handle => return join_result(res),
            _ = tokio::time::sleep(timeout) => {
                warn!(?timeout, "job exceeded its timeout, cancelling");
                job_cancel.cancel();
            }
        }
        return match handle.await {
            Ok(_) => Err(JobError::Timeout),
            Err(err) if err.is_panic() => Err(JobError::Panicked(err.to_string())),
            Err(_) => Err(JobError::Timeout),
        };
    }

    join_result(handle.await)
}

fn join_result<O>(res: Result<Result<O, JobError>, tokio::task::JoinError>) -> Result<O, JobError> {
    match res {
        Ok(inner) => inner,
        Err(err) if err.is_cancelled() => Err(JobError::Cancelled),
        Err(err) => {
            warn!(reason = %err, "job task panicked");
            Err(JobError::Panicked(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo(u32);

    #[async_trait]
    impl Job for Echo {
        type Output = u32;
        async fn execute(&self, _cancel: CancellationToken) -> Result<u32, JobError> {
            Ok(self.0)
        }
    }

    struct AlwaysFail;

    #[async_trait]
    impl Job for AlwaysFail {
        type Output = ();
        async fn execute(&self, _cancel: CancellationToken) -> Result<(), JobError> {
            Err(JobError::Failed("boom".into()))
        }
    }

    struct Panics;

    #[async_trait]
    impl Job for Panics {
        type Output = ();
        async fn execute(&self, _cancel: CancellationToken) -> Result<(), JobError> {
            panic!("job panicked intentionally");
        }
    }

    struct Forever;

    #[async_trait]
    impl Job for Forever {
        type Output = ();
        async fn execute(&self, cancel: CancellationToken) -> Result<(), JobError> {
            cancel.cancelled().await;
            Err(JobError::Cancelled)
        }
    }

    #[tokio::test]
    async fn every_submitted_job_yields_exactly_one_result() {
        let mut pool = WorkerPool::<Echo>::new(PoolConfig::new(3));
        pool.start();
        let results = pool.results();
        for i in 0..10 {
            pool.submit(Echo(i)).await.unwrap();
        }
        let mut seen = Vec::new();
        for _ in 0..10 {
            let r = results.recv().await.unwrap();
            seen.push(r.output.unwrap());
        }
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        pool.stop().await;
    }

    #[tokio::test]
    async fn panicking_job_becomes_a_job_error_not_a_crash() {
        let mut pool = WorkerPool::<Panics>::new(PoolConfig::new(1));
        pool.start();
        let results = pool.results();
        pool.submit(Panics).await.unwrap();
        let r = results.recv().await.unwrap();
        assert!(matches!(r.output, Err(JobError::Panicked(_))));

        // Pool keeps accepting work after a worker's task panicked away.
        pool.submit(Panics).await.unwrap();
        let r = results.recv().await.unwrap();
        assert!(matches!(r.output, Err(JobError::Panicked(_))));
        pool.stop().await;
    }

    #[tokio::test]
    async fn try_submit_fails_once_queue_capacity_is_reached() {
        let config = PoolConfig::new(1).with_queue_capacity(2);
        let pool = WorkerPool::<Forever>::new(config);
        // Workers are never started, so the queue fills and stays full.
        pool.try_submit(Forever).unwrap();
        pool.try_submit(Forever).unwrap();
        assert_eq!(pool.try_submit(Forever), Err(SubmitError::QueueFull));
    }

    #[tokio::test]
    async fn submit_after_stop_fails() {
        let mut pool = WorkerPool::<Echo>::new(PoolConfig::new(1));
        pool.start();
        pool.stop().await;
        assert_eq!(pool.submit(Echo(1)).await, Err(SubmitError::Stopped));
    }

    #[tokio::test]
    async fn timeout_surfaces_as_job_error() {
        let mut pool =
            WorkerPool::<Forever>::new(PoolConfig::new(1).with_timeout(Duration::from_millis(20)));
        pool.start();
        let results = pool.results();
        pool.submit(Forever).await.unwrap();
        let r = results.recv().await.unwrap();
        assert!(matches!(r.output, Err(JobError::Timeout)));
        pool.stop().await;
    }

    #[tokio::test]
    async fn failed_jobs_do_not_block_later_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::<AlwaysFail>::new(PoolConfig::new(2));
        pool.start();
        let results = pool.results();
        for _ in 0..4 {
            pool.submit(AlwaysFail).await.unwrap();
        }
        for _ in 0..4 {
            let r = results.recv().await.unwrap();
            assert!(r.output.is_err());
            counter.fetch_add(1, Ordering::SeqCst);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        pool.stop().await;
    }
}
