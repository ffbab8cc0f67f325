//! Redis 共享存储
//!
//! 每个逻辑键对应一个 Hash：`data` 字段保存序列化集合，`rev` 字段保存修订号。
//! CAS 通过 Lua 脚本原子执行；每次写入后在 `{namespace}:changes:{key}` 频道
//! 发布新的修订号，作为变更通知。

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use redis::Client;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use portal_core::{PortalError, Result, namespaced_key};

use crate::domain::repository::{CasOutcome, Revision, SharedStore, StoreChange, Versioned};

const SUBSCRIBER_BUFFER: usize = 64;

const CAS_SCRIPT: &str = r#"
local current = tonumber(redis.call('HGET', KEYS[1], 'rev') or '0')
if current ~= tonumber(ARGV[1]) then
    return {0, current}
end
local next = redis.call('HINCRBY', KEYS[1], 'rev', 1)
redis.call('HSET', KEYS[1], 'data', ARGV[2])
redis.call('PUBLISH', ARGV[3], next)
return {1, next}
"#;

const WRITE_SCRIPT: &str = r#"
local next = redis.call('HINCRBY', KEYS[1], 'rev', 1)
redis.call('HSET', KEYS[1], 'data', ARGV[1])
redis.call('PUBLISH', ARGV[2], next)
return next
"#;

pub struct RedisSharedStore {
    client: Arc<Client>,
    namespace: Option<String>,
}

impl RedisSharedStore {
    pub fn new(client: Arc<Client>, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    fn data_key(&self, key: &str) -> String {
        namespaced_key(self.namespace.as_deref(), key)
    }

    fn channel(&self, key: &str) -> String {
        namespaced_key(self.namespace.as_deref(), &format!("changes:{}", key))
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(PortalError::storage)
    }
}

#[async_trait]
impl SharedStore for RedisSharedStore {
    async fn read(&self, key: &str) -> Result<Option<Versioned<String>>> {
        let mut conn = self.connection().await?;
        let (revision, data): (Option<u64>, Option<String>) = redis::cmd("HMGET")
            .arg(self.data_key(key))
            .arg("rev")
            .arg("data")
            .query_async(&mut conn)
            .await
            .map_err(PortalError::storage)?;

        Ok(data.map(|value| Versioned {
            value,
            revision: Revision::new(revision.unwrap_or(0)),
        }))
    }

    async fn write(&self, key: &str, payload: String) -> Result<Revision> {
        let mut conn = self.connection().await?;
        let next: u64 = redis::Script::new(WRITE_SCRIPT)
            .key(self.data_key(key))
            .arg(payload)
            .arg(self.channel(key))
            .invoke_async(&mut conn)
            .await
            .map_err(PortalError::storage)?;
        Ok(Revision::new(next))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Revision,
        payload: String,
    ) -> Result<CasOutcome> {
        let mut conn = self.connection().await?;
        let (committed, revision): (i64, u64) = redis::Script::new(CAS_SCRIPT)
            .key(self.data_key(key))
            .arg(expected.value())
            .arg(payload)
            .arg(self.channel(key))
            .invoke_async(&mut conn)
            .await
            .map_err(PortalError::storage)?;

        if committed == 1 {
            Ok(CasOutcome::Committed(Revision::new(revision)))
        } else {
            Ok(CasOutcome::Conflict {
                current: Revision::new(revision),
            })
        }
    }

    async fn subscribe(&self, key: &str) -> Result<mpsc::Receiver<StoreChange>> {
        let channel = self.channel(key);
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(PortalError::storage)?;
        pubsub
            .subscribe(&channel)
            .await
            .map_err(PortalError::storage)?;

        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let key = key.to_string();

        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            loop {
                let msg = tokio::select! {
                    // 订阅方已释放
                    _ = tx.closed() => break,
                    msg = messages.next() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                };
                let revision = match msg.get_payload::<u64>() {
                    Ok(rev) => Revision::new(rev),
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "invalid change payload");
                        continue;
                    }
                };
                let change = StoreChange {
                    key: key.clone(),
                    revision,
                };
                if tx.send(change).await.is_err() {
                    break;
                }
            }
            debug!(channel = %channel, "change feed closed");
        });

        Ok(rx)
    }
}
