use lazy_static::lazy_static;
use redis::AsyncCommands;
use tracing::debug;

use crate::jobs::{JobId, JobSnapshot, JobStatus};
use crate::Result;

const DEFAULT_PREFIX: &str = "conveyor";

/// Shared script prologue: resolve ARGV[1] through the working index
/// (KEYS[2]), pull the matching snapshot out of the working queue (KEYS[1])
/// and drop its index entry. Leaves `payload` bound to the removed snapshot.
///
/// The stored position is the LPUSH return value, a 1-based distance from
/// the tail, so it is read back with a negative LRANGE index. Positions go
/// stale once other entries leave the queue, so the entry's uid is checked
/// and a full scan is the fallback; removal is always by value.
const FIND_AND_REMOVE_WORKING: &str = r#"
    local pos = redis.call('hget', KEYS[2], ARGV[1])
    if not pos then
        return 0
    end
    local payload = nil
    local idx = -tonumber(pos)
    local hit = redis.call('lrange', KEYS[1], idx, idx)
    if hit[1] and cjson.decode(hit[1])['uid'] == ARGV[1] then
        payload = hit[1]
    else
        local all = redis.call('lrange', KEYS[1], 0, -1)
        for i = 1, #all do
            if cjson.decode(all[i])['uid'] == ARGV[1] then
                payload = all[i]
                break
            end
        end
    end
    redis.call('hdel', KEYS[2], ARGV[1])
    if not payload then
        return 0
    end
    redis.call('lrem', KEYS[1], 1, payload)
"#;

lazy_static! {
    // KEYS: pending queue, pending index, working queue, working index
    static ref SCRIPT_CLAIM: redis::Script = redis::Script::new(
        r#"
        local payload = redis.call('rpop', KEYS[1])
        if not payload then
            return nil
        end
        local item = cjson.decode(payload)
        redis.call('hdel', KEYS[2], item.uid)
        local pos = redis.call('lpush', KEYS[3], payload)
        redis.call('hset', KEYS[4], item.uid, tostring(pos))
        return payload
        "#
    );
    // KEYS: working queue, working index
    static ref SCRIPT_COMPLETE: redis::Script = redis::Script::new(
        &format!("{}\n    return 1", FIND_AND_REMOVE_WORKING)
    );
    // KEYS: working queue, working index, failed queue, failed index
    static ref SCRIPT_FAIL: redis::Script = redis::Script::new(&format!(
        r#"{}
        local pos2 = redis.call('lpush', KEYS[3], payload)
        redis.call('hset', KEYS[4], ARGV[1], tostring(pos2))
        return 1
        "#,
        FIND_AND_REMOVE_WORKING
    ));
    // KEYS: working queue, working index, pending queue, pending index
    static ref SCRIPT_RETRY: redis::Script = redis::Script::new(&format!(
        r#"{}
        local item = cjson.decode(payload)
        item.retries = item.retries + 1
        local updated = cjson.encode(item)
        local pos2 = redis.call('lpush', KEYS[3], updated)
        redis.call('hset', KEYS[4], ARGV[1], tostring(pos2))
        return 1
        "#,
        FIND_AND_REMOVE_WORKING
    ));
    // KEYS: failed queue, failed index, pending queue, pending index
    static ref SCRIPT_RESET: redis::Script = redis::Script::new(
        r#"
        local moved = 0
        while true do
            local payload = redis.call('rpop', KEYS[1])
            if not payload then
                break
            end
            local item = cjson.decode(payload)
            redis.call('hdel', KEYS[2], item.uid)
            item.retries = 0
            local updated = cjson.encode(item)
            local pos = redis.call('lpush', KEYS[3], updated)
            redis.call('hset', KEYS[4], item.uid, tostring(pos))
            moved = moved + 1
        end
        return moved
        "#
    );
    // KEYS: failed queue, failed index
    static ref SCRIPT_PURGE: redis::Script = redis::Script::new(
        r#"
        local purged = 0
        while true do
            local payload = redis.call('rpop', KEYS[1])
            if not payload then
                break
            end
            local item = cjson.decode(payload)
            redis.call('hdel', KEYS[2], item.uid)
            purged = purged + 1
        end
        return purged
        "#
    );
}

/// List/index backend: three lists (pending, working, failed) plus three
/// uid -> position hashes under a configurable key prefix. Every multi-step
/// transition runs as one server-side script so a crash can never strand a
/// job between a queue and its index.
#[derive(Debug, Clone)]
pub struct Backend {
    redis_client: redis::Client,
    prefix: String,
}

impl Backend {
    pub fn new(redis_url: &str) -> Result<Self> {
        Self::with_prefix(redis_url, DEFAULT_PREFIX)
    }

    pub fn with_prefix(redis_url: &str, prefix: &str) -> Result<Self> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self {
            redis_client,
            prefix: prefix.to_string(),
        })
    }

    fn queue_key(&self, name: &str) -> String {
        format!("{}:queue:{}", self.prefix, name)
    }

    fn index_key(&self, name: &str) -> String {
        format!("{}:index:{}", self.prefix, name)
    }
}

#[async_trait::async_trait]
impl super::Backend for Backend {
    async fn add(&self, job_type: &str, data: &str) -> Result<JobId> {
        let uid = JobId::random();
        let snapshot = JobSnapshot::pending(uid.clone(), job_type, data.to_string());
        let payload = snapshot.encode()?;
        let mut connection = self.redis_client.get_async_connection().await?;
        let position: i64 = connection.lpush(self.queue_key("pending"), &payload).await?;
        let _: () = connection
            .hset(self.index_key("pending"), uid.as_str(), position.to_string())
            .await?;
        Ok(uid)
    }

    async fn get(&self) -> Result<Option<JobSnapshot>> {
        let mut connection = self.redis_client.get_async_connection().await?;
        let payload: Option<String> = SCRIPT_CLAIM
            .key(self.queue_key("pending"))
            .key(self.index_key("pending"))
            .key(self.queue_key("working"))
            .key(self.index_key("working"))
            .invoke_async(&mut connection)
            .await?;
        let payload = match payload {
            Some(payload) => payload,
            None => return Ok(None),
        };
        // snapshots keep their stored status string when transferred; a
        // claimed job is Working by definition
        let mut snapshot = JobSnapshot::decode(&payload)?;
        snapshot.status = JobStatus::Working;
        Ok(Some(snapshot))
    }

    async fn complete(&self, id: &JobId) -> Result<()> {
        let mut connection = self.redis_client.get_async_connection().await?;
        let removed: i64 = SCRIPT_COMPLETE
            .key(self.queue_key("working"))
            .key(self.index_key("working"))
            .arg(id.as_str())
            .invoke_async(&mut connection)
            .await?;
        if removed == 0 {
            debug!("complete: job {} not in working queue, ignoring", id);
        }
        Ok(())
    }

    async fn failed(&self, id: &JobId) -> Result<()> {
        let mut connection = self.redis_client.get_async_connection().await?;
        let _: i64 = SCRIPT_FAIL
            .key(self.queue_key("working"))
            .key(self.index_key("working"))
            .key(self.queue_key("failed"))
            .key(self.index_key("failed"))
            .arg(id.as_str())
            .invoke_async(&mut connection)
            .await?;
        Ok(())
    }

    async fn retry(&self, id: &JobId) -> Result<()> {
        let mut connection = self.redis_client.get_async_connection().await?;
        let _: i64 = SCRIPT_RETRY
            .key(self.queue_key("working"))
            .key(self.index_key("working"))
            .key(self.queue_key("pending"))
            .key(self.index_key("pending"))
            .arg(id.as_str())
            .invoke_async(&mut connection)
            .await?;
        Ok(())
    }

    async fn pending(&self, job_type: Option<&str>) -> Result<u64> {
        let mut connection = self.redis_client.get_async_connection().await?;
        match job_type {
            None => Ok(connection.llen(self.queue_key("pending")).await?),
            Some(job_type) => {
                // no secondary index by type; walk the list and count
                let payloads: Vec<String> =
                    connection.lrange(self.queue_key("pending"), 0, -1).await?;
                let mut count = 0;
                for payload in payloads {
                    if JobSnapshot::decode(&payload)?.job_type == job_type {
                        count += 1;
                    }
                }
                Ok(count)
            }
        }
    }

    async fn reset(&self, _job_type: Option<&str>) -> Result<()> {
        let mut connection = self.redis_client.get_async_connection().await?;
        let moved: i64 = SCRIPT_RESET
            .key(self.queue_key("failed"))
            .key(self.index_key("failed"))
            .key(self.queue_key("pending"))
            .key(self.index_key("pending"))
            .invoke_async(&mut connection)
            .await?;
        debug!("reset: re-queued {} failed job(s)", moved);
        Ok(())
    }

    async fn purge(&self, _job_type: Option<&str>) -> Result<()> {
        let mut connection = self.redis_client.get_async_connection().await?;
        let purged: i64 = SCRIPT_PURGE
            .key(self.queue_key("failed"))
            .key(self.index_key("failed"))
            .invoke_async(&mut connection)
            .await?;
        debug!("purge: discarded {} failed job(s)", purged);
        Ok(())
    }
}
