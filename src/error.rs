use crate::jobs::JobId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[cfg(feature = "backend-redis")]
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[cfg(feature = "backend-database")]
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("invalid job id '{0}'")]
    InvalidJobId(String),
    #[error("unknown job status '{0}'")]
    UnknownStatus(String),
    #[error("handler already registered for name '{0}'")]
    HandlerAlreadyRegistered(&'static str),
    #[error("no handler registered for job type '{job_type}' (job {id})")]
    InvalidJobType { id: JobId, job_type: String },
    #[error("job {id} ({job_type}) failed: {source}")]
    Handler {
        id: JobId,
        job_type: String,
        #[source]
        source: StdError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) type StdError = Box<dyn std::error::Error + Send + Sync + 'static>;
