use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::backends::Backend;
use crate::error::{Error, Result};
use crate::events::{EventHandlers, QueueEvents};
use crate::jobs::{Job, JobHandler, JobId, Outcome};
use crate::registry::{AnyJobHandler, HandlerRegistry};

/// The narrow callback surface a handler gets for reporting its own job's
/// fate. Implemented by [`Queue`] for every backend.
#[async_trait::async_trait]
pub trait QueueControl: Send + Sync {
    async fn complete(&self, id: &JobId) -> Result<()>;
    async fn failed(&self, id: &JobId) -> Result<()>;
    async fn retry(&self, id: &JobId) -> Result<()>;
}

/// Options for [`Queue::work`].
#[derive(Debug, Clone)]
pub struct WorkOptions {
    /// How long to sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// Return instead of sleeping once the queue is empty.
    pub stop_when_empty: bool,
}

impl Default for WorkOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            stop_when_empty: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct WorkReport {
    /// Number of jobs claimed, counting each claim of a retried job.
    pub processed: usize,
}

/// Binds a storage backend to a handler registry and event hooks, and
/// exposes the job lifecycle to producers and workers.
pub struct Queue<B> {
    backend: B,
    registry: HandlerRegistry,
    event_handlers: EventHandlers,
}

impl<B: Clone> Clone for Queue<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            registry: self.registry.clone(),
            event_handlers: self.event_handlers.clone(),
        }
    }
}

impl<B> std::fmt::Debug for Queue<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue").field("registry", &self.registry).finish()
    }
}

impl<B> Queue<B>
where
    B: Backend,
{
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            registry: HandlerRegistry::default(),
            event_handlers: EventHandlers::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn register_handler<H>(&mut self) -> Result<()>
    where
        H: JobHandler + 'static,
    {
        self.registry.register::<H>()
    }

    pub fn add_event_handler(&mut self, handler: impl QueueEvents + 'static) {
        self.event_handlers.add(handler);
    }

    /// Enqueue a new job of the given type. The payload is serialized once
    /// here and round-trips unchanged until the job is claimed.
    #[instrument(skip(self, data))]
    pub async fn add<T>(&self, job_type: &str, data: &T) -> Result<JobId>
    where
        T: Serialize,
    {
        let data = serde_json::to_string(data)?;
        let id = self.backend.add(job_type, &data).await?;
        debug!("added job {} ({})", id, job_type);
        Ok(id)
    }

    /// Claim the oldest pending job. `Ok(None)` means the queue is empty.
    ///
    /// A job whose type tag has no registered handler is marked failed and
    /// surfaced as [`Error::InvalidJobType`]; it will not be claimed again,
    /// so a poisoned tag cannot wedge a polling worker.
    pub async fn get(&self) -> Result<Option<Job>> {
        match self.claim().await? {
            None => Ok(None),
            Some((job, Some(_))) => Ok(Some(job)),
            Some((job, None)) => Err(self.fail_unresolvable(job).await?),
        }
    }

    pub async fn pending(&self, job_type: Option<&str>) -> Result<u64> {
        self.backend.pending(job_type).await
    }

    pub async fn reset(&self, job_type: Option<&str>) -> Result<()> {
        self.backend.reset(job_type).await
    }

    pub async fn purge(&self, job_type: Option<&str>) -> Result<()> {
        self.backend.purge(job_type).await
    }

    async fn claim(&self) -> Result<Option<(Job, Option<Box<dyn AnyJobHandler>>)>> {
        let snapshot = match self.backend.get().await? {
            Some(snapshot) => snapshot,
            None => return Ok(None),
        };
        let handler = self.registry.resolve(&snapshot.job_type);
        let job = Job::from_snapshot(snapshot)?;
        Ok(Some((job, handler)))
    }

    async fn fail_unresolvable(&self, job: Job) -> Result<Error> {
        self.backend.failed(job.id()).await?;
        let err = Error::InvalidJobType {
            id: job.id().clone(),
            job_type: job.job_type().to_string(),
        };
        warn!("{}", err);
        self.event_handlers.job_failed(&job, Some(&err));
        Ok(err)
    }

    /// Poll the queue and run handlers until stopped.
    ///
    /// Handler errors and unresolvable type tags mark the affected job
    /// failed and the loop keeps going; storage errors propagate out.
    #[instrument(skip(self))]
    pub async fn work(&self, options: WorkOptions) -> Result<WorkReport> {
        let mut report = WorkReport::default();
        self.event_handlers.worker_started();
        loop {
            if self.backend.pending(None).await? == 0 {
                if options.stop_when_empty {
                    break;
                }
                tokio::time::sleep(options.poll_interval).await;
                continue;
            }
            match self.claim().await? {
                // someone else got there first
                None => continue,
                Some((mut job, Some(mut handler))) => {
                    report.processed += 1;
                    self.event_handlers.job_claimed(&job);
                    match handler.handle(&mut job, self).await {
                        Ok(()) => match job.reported() {
                            None => {
                                // returning without reporting is a success
                                self.backend.complete(job.id()).await?;
                                self.event_handlers.job_succeeded(&job);
                            }
                            Some(Outcome::Completed) => {
                                self.event_handlers.job_succeeded(&job);
                            }
                            Some(Outcome::Failed) => {
                                self.event_handlers.job_failed(&job, None);
                            }
                            Some(Outcome::Retried) => {
                                self.event_handlers.job_retry_requested(&job);
                            }
                        },
                        Err(err) => {
                            self.backend.failed(job.id()).await?;
                            warn!("job {} raised: {}", job.id(), err);
                            self.event_handlers.job_exception(&job, &err);
                        }
                    }
                }
                Some((job, None)) => {
                    report.processed += 1;
                    self.event_handlers.job_claimed(&job);
                    self.fail_unresolvable(job).await?;
                }
            }
        }
        self.event_handlers.worker_stopping();
        Ok(report)
    }
}

#[async_trait::async_trait]
impl<B> QueueControl for Queue<B>
where
    B: Backend,
{
    async fn complete(&self, id: &JobId) -> Result<()> {
        self.backend.complete(id).await
    }

    async fn failed(&self, id: &JobId) -> Result<()> {
        self.backend.failed(id).await
    }

    async fn retry(&self, id: &JobId) -> Result<()> {
        self.backend.retry(id).await
    }
}
