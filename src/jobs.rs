use crate::error::{Error, Result, StdError};
use crate::queue::QueueControl;
use nanoid::nanoid;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

const MAX_ID_LEN: usize = 180;

/// Opaque unique job identifier, stable for the job's entire lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap an existing identifier, rejecting empty or oversized ones.
    pub fn new<S>(id: S) -> Result<Self>
    where
        S: Into<String>,
    {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_ID_LEN {
            return Err(Error::InvalidJobId(id));
        }
        Ok(Self(id))
    }

    pub(crate) fn random() -> Self {
        Self(nanoid!())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}", self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Working,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Working => "Working",
            JobStatus::Failed => "Failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(JobStatus::Pending),
            "Working" => Ok(JobStatus::Working),
            "Failed" => Ok(JobStatus::Failed),
            other => Err(Error::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The serialized form of a job as a backend stores it. The payload in
/// `data` is serialized independently of the snapshot and round-trips
/// untouched between `add` and `get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub uid: JobId,
    #[serde(rename = "type")]
    pub job_type: String,
    pub data: String,
    pub status: JobStatus,
    pub retries: u32,
}

impl JobSnapshot {
    pub(crate) fn pending(uid: JobId, job_type: &str, data: String) -> Self {
        Self {
            uid,
            job_type: job_type.to_string(),
            data,
            status: JobStatus::Pending,
            retries: 0,
        }
    }

    pub(crate) fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub(crate) fn decode(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// What a handler reported back through the queue, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed,
    Failed,
    Retried,
}

/// A claimed unit of work, materialized from its stored snapshot.
///
/// Handlers report the job's fate through [`Job::complete`], [`Job::fail`]
/// or [`Job::retry`]; a handler that returns without reporting is treated
/// as successful by the worker loop.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    job_type: String,
    data: serde_json::Value,
    retries: u32,
    failed: bool,
    reported: Option<Outcome>,
}

impl Job {
    pub(crate) fn from_snapshot(snapshot: JobSnapshot) -> Result<Self> {
        let data = serde_json::from_str(&snapshot.data)?;
        Ok(Self {
            id: snapshot.uid,
            job_type: snapshot.job_type,
            data,
            retries: snapshot.retries,
            failed: false,
            reported: None,
        })
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    /// How many times this job has been retried so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Deserialize the payload into a concrete type.
    pub fn data_as<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    /// Delete the job record; the work is done.
    pub async fn complete(&mut self, queue: &dyn QueueControl) -> Result<()> {
        queue.complete(&self.id).await?;
        self.reported = Some(Outcome::Completed);
        Ok(())
    }

    /// Move the job to the failed backlog.
    pub async fn fail(&mut self, queue: &dyn QueueControl) -> Result<()> {
        queue.failed(&self.id).await?;
        self.failed = true;
        self.reported = Some(Outcome::Failed);
        Ok(())
    }

    /// Re-queue the job with its retry counter incremented.
    pub async fn retry(&mut self, queue: &dyn QueueControl) -> Result<()> {
        queue.retry(&self.id).await?;
        self.reported = Some(Outcome::Retried);
        Ok(())
    }

    pub(crate) fn reported(&self) -> Option<Outcome> {
        self.reported
    }
}

/// Execution logic for one job type.
///
/// Registered by type through [`crate::Queue::register_handler`]; a fresh
/// `Default` instance is constructed for every claimed job.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync + Default {
    const NAME: &'static str;
    type Error: Into<StdError> + Send + Sync;

    async fn handle(
        &mut self,
        job: &mut Job,
        queue: &dyn QueueControl,
    ) -> std::result::Result<(), Self::Error>;
}
