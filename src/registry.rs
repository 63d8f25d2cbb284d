use std::{collections::HashMap, sync::Arc};

use tracing::warn;

use crate::error::{Error, Result, StdError};
use crate::jobs::{Job, JobHandler};
use crate::queue::QueueControl;

/// Object-safe shim over [`JobHandler`], which has an associated error
/// type and const and therefore cannot be boxed directly.
#[async_trait::async_trait]
pub(crate) trait AnyJobHandler: Send + Sync {
    async fn handle(&mut self, job: &mut Job, queue: &dyn QueueControl) -> Result<()>;
}

#[async_trait::async_trait]
impl<T, E> AnyJobHandler for T
where
    E: Into<StdError> + Send + Sync,
    T: JobHandler<Error = E> + 'static,
{
    async fn handle(&mut self, job: &mut Job, queue: &dyn QueueControl) -> Result<()> {
        T::handle(self, job, queue).await.map_err(|e| Error::Handler {
            id: job.id().clone(),
            job_type: job.job_type().to_string(),
            source: e.into(),
        })
    }
}

type HandlerFactory = Arc<Box<dyn Fn() -> Box<dyn AnyJobHandler> + Send + Sync>>;

/// Maps stored type tags to handler factories, populated at startup.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    factories_by_name: HashMap<String, HandlerFactory>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("names", &self.factories_by_name.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn register<H>(&mut self) -> Result<()>
    where
        H: JobHandler + 'static,
    {
        if self.factories_by_name.contains_key(H::NAME) {
            let err = Error::HandlerAlreadyRegistered(H::NAME);
            warn!("{}", err);
            return Err(err);
        }
        self.factories_by_name.insert(
            H::NAME.to_string(),
            Arc::new(Box::new(|| Box::new(H::default()))),
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories_by_name.contains_key(name)
    }

    /// A fresh handler instance for the given type tag, or `None` when the
    /// tag is unknown.
    pub(crate) fn resolve(&self, name: &str) -> Option<Box<dyn AnyJobHandler>> {
        self.factories_by_name.get(name).map(|f| f())
    }
}
