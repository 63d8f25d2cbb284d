//! Exercises the list/index backend against a real server. These tests are
//! ignored by default; run them with a local redis at 127.0.0.1:6379:
//!
//!     cargo test --test redis_test -- --ignored

use anyhow::Result;
use conveyor::{async_trait, Job, JobHandler, Queue, QueueControl, RedisBackend, WorkOptions};
use serde::{Deserialize, Serialize};
use test_env_log::test as logtest;

const REDIS_URL: &str = "redis://127.0.0.1";

#[derive(Debug, Serialize, Deserialize)]
struct User {
    id: u32,
    email: String,
}

#[derive(Debug, Default)]
struct UserJob {}

#[async_trait]
impl JobHandler for UserJob {
    const NAME: &'static str = "user";
    type Error = anyhow::Error;

    async fn handle(
        &mut self,
        job: &mut Job,
        queue: &dyn QueueControl,
    ) -> Result<(), Self::Error> {
        let user: User = job.data_as()?;
        match user.id {
            1 => {
                job.complete(queue).await?;
            }
            2 => {
                job.fail(queue).await?;
            }
            3 => {
                if job.retries() < 3 {
                    job.retry(queue).await?;
                } else {
                    job.fail(queue).await?;
                }
            }
            _ => anyhow::bail!("can not do"),
        }
        Ok(())
    }
}

fn user_queue(prefix: &str) -> Result<Queue<RedisBackend>> {
    let mut queue = Queue::new(RedisBackend::with_prefix(REDIS_URL, prefix)?);
    queue.register_handler::<UserJob>()?;
    Ok(queue)
}

#[logtest(tokio::test)]
#[ignore = "requires a running redis server"]
async fn full_lifecycle_redis() -> Result<()> {
    let queue = user_queue("conveyor-test-lifecycle")?;
    // leftovers from a previous run would skew the counts
    queue.purge(None).await?;

    for (id, email) in [
        (1, "foo@example.com"),
        (2, "bar@example.com"),
        (3, "baz@example.com"),
        (4, "qux@example.com"),
    ] {
        queue
            .add(
                "user",
                &User {
                    id,
                    email: email.to_string(),
                },
            )
            .await?;
    }
    assert_eq!(queue.pending(Some("user")).await?, 4);

    let report = queue
        .work(WorkOptions {
            stop_when_empty: true,
            ..WorkOptions::default()
        })
        .await?;
    assert_eq!(report.processed, 7);
    assert_eq!(queue.pending(None).await?, 0);

    queue.reset(Some("user")).await?;
    assert_eq!(queue.pending(None).await?, 3);

    queue
        .work(WorkOptions {
            stop_when_empty: true,
            ..WorkOptions::default()
        })
        .await?;
    queue.purge(Some("user")).await?;
    assert_eq!(queue.pending(None).await?, 0);
    queue.reset(None).await?;
    assert_eq!(queue.pending(None).await?, 0);
    Ok(())
}

#[logtest(tokio::test)]
#[ignore = "requires a running redis server"]
async fn retry_monotonicity_redis() -> Result<()> {
    let queue = user_queue("conveyor-test-retry")?;
    queue.purge(None).await?;

    queue
        .add(
            "user",
            &User {
                id: 3,
                email: "baz@example.com".to_string(),
            },
        )
        .await?;
    for expected in 0..3u32 {
        let mut job = queue.get().await?.expect("job should be claimable");
        assert_eq!(job.retries(), expected);
        job.retry(&queue).await?;
    }
    let mut job = queue.get().await?.expect("job should be claimable");
    assert_eq!(job.retries(), 3);
    job.complete(&queue).await?;
    Ok(())
}

#[logtest(tokio::test)]
#[ignore = "requires a running redis server"]
async fn transitions_require_a_claim_redis() -> Result<()> {
    let queue = user_queue("conveyor-test-claimless")?;
    queue.purge(None).await?;

    let id = queue
        .add(
            "user",
            &User {
                id: 1,
                email: "foo@example.com".to_string(),
            },
        )
        .await?;

    // not claimed yet: fail/retry must leave the pending entry alone
    QueueControl::failed(&queue, &id).await?;
    QueueControl::retry(&queue, &id).await?;
    assert_eq!(queue.pending(None).await?, 1);

    let mut job = queue.get().await?.expect("job should be claimable");
    assert_eq!(job.retries(), 0);
    job.complete(&queue).await?;
    assert_eq!(queue.pending(None).await?, 0);
    Ok(())
}
