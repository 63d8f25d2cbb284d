use std::sync::{Arc, Mutex};

use tracing::error;

use crate::error::Error;
use crate::jobs::Job;

/// Lifecycle notification hooks, invoked by the worker loop on every
/// transition. All methods default to no-ops; implement the ones you need.
pub trait QueueEvents: Send + Sync {
    fn worker_started(&self) {}
    fn job_claimed(&self, _job: &Job) {}
    fn job_succeeded(&self, _job: &Job) {}
    fn job_exception(&self, _job: &Job, _error: &Error) {}
    fn job_failed(&self, _job: &Job, _error: Option<&Error>) {}
    fn job_retry_requested(&self, _job: &Job) {}
    fn worker_stopping(&self) {}
}

#[derive(Clone, Default)]
pub(crate) struct EventHandlers {
    handlers: Arc<Mutex<Vec<Box<dyn QueueEvents>>>>,
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers").finish()
    }
}

impl EventHandlers {
    pub(crate) fn add(&mut self, handler: impl QueueEvents + 'static) {
        match self.handlers.lock() {
            Ok(mut handlers) => handlers.push(Box::new(handler)),
            Err(e) => error!("failed to lock event handlers: {}", e),
        }
    }

    fn each<F>(&self, f: F)
    where
        F: Fn(&dyn QueueEvents),
    {
        match self.handlers.lock() {
            Ok(handlers) => {
                for handler in handlers.iter() {
                    f(handler.as_ref());
                }
            }
            Err(e) => {
                error!("failed to lock event handlers: {}", e);
            }
        }
    }
}

impl QueueEvents for EventHandlers {
    fn worker_started(&self) {
        self.each(|h| h.worker_started());
    }

    fn job_claimed(&self, job: &Job) {
        self.each(|h| h.job_claimed(job));
    }

    fn job_succeeded(&self, job: &Job) {
        self.each(|h| h.job_succeeded(job));
    }

    fn job_exception(&self, job: &Job, error: &Error) {
        self.each(|h| h.job_exception(job, error));
    }

    fn job_failed(&self, job: &Job, error: Option<&Error>) {
        self.each(|h| h.job_failed(job, error));
    }

    fn job_retry_requested(&self, job: &Job) {
        self.each(|h| h.job_retry_requested(job));
    }

    fn worker_stopping(&self) {
        self.each(|h| h.worker_stopping());
    }
}
