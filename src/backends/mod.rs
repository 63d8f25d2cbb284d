#[cfg(feature = "backend-database")]
pub(crate) mod database;
pub(crate) mod memory;
#[cfg(feature = "backend-redis")]
pub(crate) mod redis;

use crate::jobs::{JobId, JobSnapshot};
use crate::Result;

/// The storage adapter contract: everything a backend must support to move
/// a job through Pending -> Working -> {deleted, Failed, re-queued}.
///
/// Transition methods that name a job id are silent no-ops when the id is
/// not in the expected state; callers must not assume an error if a job was
/// already handled concurrently.
#[async_trait::async_trait]
pub trait Backend: Clone + Send + Sync {
    /// Persist a new Pending job with a zero retry counter and return its
    /// generated id. The id must be retrievable afterward or this errors.
    async fn add(&self, job_type: &str, data: &str) -> Result<JobId>;

    /// Claim the oldest Pending job, transitioning it to Working. `None`
    /// means the queue is empty, which is not an error.
    async fn get(&self) -> Result<Option<JobSnapshot>>;

    /// Delete the job record. Idempotent: unknown ids are a no-op.
    async fn complete(&self, id: &JobId) -> Result<()>;

    /// Mark the job Failed. The list backend only moves jobs out of the
    /// working sequence; the relational backend updates by id wherever the
    /// row currently is.
    async fn failed(&self, id: &JobId) -> Result<()>;

    /// Put a claimed job back in Pending with `retries` incremented by one.
    async fn retry(&self, id: &JobId) -> Result<()>;

    /// Count of Pending jobs, optionally restricted to one type.
    async fn pending(&self, job_type: Option<&str>) -> Result<u64>;

    /// Move failed work back to Pending with retries reset to zero.
    ///
    /// Backends disagree on the exact scope and that difference is kept:
    /// the relational backend resets every non-Working row, zeroing the
    /// retry counter of already-Pending rows too, while the list backend
    /// drains only the failed sequence. Neither touches Working jobs.
    async fn reset(&self, job_type: Option<&str>) -> Result<()>;

    /// Permanently discard Failed jobs. The list backend drains the whole
    /// failed sequence regardless of the type filter.
    async fn purge(&self, job_type: Option<&str>) -> Result<()>;
}
