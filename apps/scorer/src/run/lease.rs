//! Redis lease that keeps two scoring runs from overlapping.
//!
//! `SET key token NX PX ttl` takes the lease; release deletes the key only if it
//! still holds our token, so a run that outlived its TTL cannot drop a lease
//! some later run now owns. Every Redis round trip is bounded by `call_timeout`.

use std::future::Future;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{Client as RedisClient, ErrorKind, RedisError, Script};
use tracing::debug;
use uuid::Uuid;

pub const LEASE_KEY: &str = "community-notes:scoring-run";

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct RunLease {
    client: RedisClient,
    ttl: Duration,
    call_timeout: Duration,
}

pub struct LeaseGuard {
    conn: MultiplexedConnection,
    token: String,
    call_timeout: Duration,
}

impl RunLease {
    pub fn new(client: RedisClient, ttl: Duration, call_timeout: Duration) -> Self {
        Self {
            client,
            ttl,
            call_timeout,
        }
    }

    /// Returns `None` when another run holds the lease.
    pub async fn acquire(&self) -> Result<Option<LeaseGuard>, RedisError> {
        let mut conn = bounded(
            self.call_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await?;
        let token = Uuid::new_v4().to_string();
        let ttl_ms = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);

        let set = redis::cmd("SET")
            .arg(LEASE_KEY)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .clone();
        let acquired: Option<String> =
            bounded(self.call_timeout, set.query_async(&mut conn)).await?;

        Ok(acquired.map(|_| {
            debug!("Run lease acquired for {ttl_ms}ms");
            LeaseGuard {
                conn,
                token,
                call_timeout: self.call_timeout,
            }
        }))
    }
}

impl LeaseGuard {
    pub async fn release(mut self) -> Result<(), RedisError> {
        let script = Script::new(RELEASE_SCRIPT);
        let mut invocation = script.key(LEASE_KEY);
        invocation.arg(&self.token);
        let deleted: i64 =
            bounded(self.call_timeout, invocation.invoke_async(&mut self.conn)).await?;
        if deleted == 0 {
            debug!("Run lease had already expired");
        }
        Ok(())
    }
}

/// Fails with an I/O-kind `RedisError` if `call` does not finish within `limit`.
async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, RedisError>
where
    F: Future<Output = Result<T, RedisError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| RedisError::from((ErrorKind::IoError, "Redis call timed out")))?
}
