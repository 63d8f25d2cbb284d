mod backends;
mod error;
mod events;
mod jobs;
mod queue;
mod registry;

pub use async_trait::async_trait;
#[cfg(feature = "backend-database")]
pub use backends::database::Backend as DatabaseBackend;
pub use backends::memory::Backend as MemoryBackend;
#[cfg(feature = "backend-redis")]
pub use backends::redis::Backend as RedisBackend;
pub use backends::Backend;
pub use error::{Error, Result};
pub use events::QueueEvents;
pub use jobs::{Job, JobHandler, JobId, JobSnapshot, JobStatus};
pub use queue::{Queue, QueueControl, WorkOptions, WorkReport};
pub use registry::HandlerRegistry;
