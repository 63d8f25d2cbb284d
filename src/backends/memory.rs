use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use crate::jobs::{JobId, JobSnapshot, JobStatus};
use crate::Result;

/// In-process backend mirroring the list backend's three-queue model.
/// Useful for tests and single-process setups; nothing survives a restart.
#[derive(Debug, Clone, Default)]
pub struct Backend {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    pending: VecDeque<JobSnapshot>,
    working: Vec<JobSnapshot>,
    failed: Vec<JobSnapshot>,
}

impl Backend {
    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

fn take_working(state: &mut State, id: &JobId) -> Option<JobSnapshot> {
    let at = state.working.iter().position(|s| &s.uid == id)?;
    Some(state.working.remove(at))
}

#[async_trait::async_trait]
impl super::Backend for Backend {
    async fn add(&self, job_type: &str, data: &str) -> Result<JobId> {
        let uid = JobId::random();
        let snapshot = JobSnapshot::pending(uid.clone(), job_type, data.to_string());
        self.with_state(|state| state.pending.push_front(snapshot));
        Ok(uid)
    }

    async fn get(&self) -> Result<Option<JobSnapshot>> {
        Ok(self.with_state(|state| {
            // newest at the front, so the back is the oldest
            let mut snapshot = state.pending.pop_back()?;
            snapshot.status = JobStatus::Working;
            state.working.push(snapshot.clone());
            Some(snapshot)
        }))
    }

    async fn complete(&self, id: &JobId) -> Result<()> {
        self.with_state(|state| {
            take_working(state, id);
        });
        Ok(())
    }

    async fn failed(&self, id: &JobId) -> Result<()> {
        self.with_state(|state| {
            if let Some(mut snapshot) = take_working(state, id) {
                snapshot.status = JobStatus::Failed;
                state.failed.push(snapshot);
            }
        });
        Ok(())
    }

    async fn retry(&self, id: &JobId) -> Result<()> {
        self.with_state(|state| {
            if let Some(mut snapshot) = take_working(state, id) {
                snapshot.status = JobStatus::Pending;
                snapshot.retries += 1;
                state.pending.push_front(snapshot);
            }
        });
        Ok(())
    }

    async fn pending(&self, job_type: Option<&str>) -> Result<u64> {
        Ok(self.with_state(|state| {
            state
                .pending
                .iter()
                .filter(|s| job_type.map_or(true, |t| s.job_type == t))
                .count() as u64
        }))
    }

    async fn reset(&self, job_type: Option<&str>) -> Result<()> {
        self.with_state(|state| {
            let mut keep = Vec::new();
            for mut snapshot in state.failed.drain(..) {
                if job_type.map_or(true, |t| snapshot.job_type == t) {
                    snapshot.status = JobStatus::Pending;
                    snapshot.retries = 0;
                    state.pending.push_front(snapshot);
                } else {
                    keep.push(snapshot);
                }
            }
            state.failed = keep;
        });
        Ok(())
    }

    async fn purge(&self, job_type: Option<&str>) -> Result<()> {
        self.with_state(|state| {
            state
                .failed
                .retain(|s| job_type.map_or(false, |t| s.job_type != t));
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Backend;
    use crate::backends::Backend as _;
    use crate::jobs::{JobId, JobStatus};

    #[tokio::test]
    async fn claims_oldest_first() {
        let backend = Backend::default();
        let first = backend.add("t", "1").await.unwrap();
        let second = backend.add("t", "2").await.unwrap();

        let claimed = backend.get().await.unwrap().unwrap();
        assert_eq!(claimed.uid, first);
        assert_eq!(claimed.status, JobStatus::Working);
        let claimed = backend.get().await.unwrap().unwrap();
        assert_eq!(claimed.uid, second);
        assert!(backend.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transitions_ignore_unclaimed_ids() {
        let backend = Backend::default();
        let id = backend.add("t", "1").await.unwrap();

        // still pending, so none of these may touch it
        backend.failed(&id).await.unwrap();
        backend.retry(&id).await.unwrap();
        backend.complete(&JobId::new("missing").unwrap()).await.unwrap();
        assert_eq!(backend.pending(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn retry_increments_and_requeues() {
        let backend = Backend::default();
        let id = backend.add("t", "1").await.unwrap();

        for expected in 1..=3u32 {
            let claimed = backend.get().await.unwrap().unwrap();
            assert_eq!(claimed.uid, id);
            assert_eq!(claimed.retries, expected - 1);
            backend.retry(&id).await.unwrap();
        }
        let claimed = backend.get().await.unwrap().unwrap();
        assert_eq!(claimed.retries, 3);
    }
}
