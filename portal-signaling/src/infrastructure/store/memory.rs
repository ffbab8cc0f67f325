//! 进程内共享存储
//!
//! 基于 DashMap 的键值存储，写入时通过 broadcast 通道广播变更，
//! 多个"上下文"共享同一个实例即可模拟多浏览器标签页共享一个存储。

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace};

use portal_core::Result;

use crate::domain::repository::{CasOutcome, Revision, SharedStore, StoreChange, Versioned};

const CHANGE_BROADCAST_CAPACITY: usize = 1024;
const SUBSCRIBER_BUFFER: usize = 64;

pub struct InMemorySharedStore {
    entries: Arc<DashMap<String, Versioned<String>>>,
    changes: broadcast::Sender<StoreChange>,
}

impl InMemorySharedStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BROADCAST_CAPACITY);
        Self {
            entries: Arc::new(DashMap::new()),
            changes,
        }
    }

    /// 直接写入原始载荷（测试中用于模拟损坏数据）
    pub fn put_raw(&self, key: &str, payload: impl Into<String>) -> Revision {
        let revision = self.bump(key, payload.into());
        self.notify(key, revision);
        revision
    }

    fn bump(&self, key: &str, payload: String) -> Revision {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Versioned {
                value: String::new(),
                revision: Revision::ZERO,
            });
        entry.revision = entry.revision.next();
        entry.value = payload;
        entry.revision
    }

    fn notify(&self, key: &str, revision: Revision) {
        // 没有订阅者时发送失败是正常情况
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            revision,
        });
    }
}

impl Default for InMemorySharedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for InMemorySharedStore {
    async fn read(&self, key: &str) -> Result<Option<Versioned<String>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn write(&self, key: &str, payload: String) -> Result<Revision> {
        let revision = self.bump(key, payload);
        trace!(key, revision = %revision, "store write");
        self.notify(key, revision);
        Ok(revision)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Revision,
        payload: String,
    ) -> Result<CasOutcome> {
        let outcome = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().revision;
                if current != expected {
                    CasOutcome::Conflict { current }
                } else {
                    let next = current.next();
                    occupied.insert(Versioned {
                        value: payload,
                        revision: next,
                    });
                    CasOutcome::Committed(next)
                }
            }
            Entry::Vacant(vacant) => {
                if expected != Revision::ZERO {
                    CasOutcome::Conflict {
                        current: Revision::ZERO,
                    }
                } else {
                    let next = Revision::ZERO.next();
                    vacant.insert(Versioned {
                        value: payload,
                        revision: next,
                    });
                    CasOutcome::Committed(next)
                }
            }
        };

        if let CasOutcome::Committed(revision) = outcome {
            trace!(key, revision = %revision, "store cas committed");
            self.notify(key, revision);
        }
        Ok(outcome)
    }

    async fn subscribe(&self, key: &str) -> Result<mpsc::Receiver<StoreChange>> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut changes = self.changes.subscribe();
        let key = key.to_string();

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    // 订阅方已释放
                    _ = tx.closed() => break,
                    received = changes.recv() => received,
                };
                match received {
                    Ok(change) if change.key == key => {
                        if tx.send(change).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(key = %key, skipped, "change feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            trace!(key = %key, "change forwarder stopped");
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_write_then_read() {
        let store = InMemorySharedStore::new();
        assert!(store.read("k").await.unwrap().is_none());

        let r1 = store.write("k", "[1]".to_string()).await.unwrap();
        let r2 = store.write("k", "[1,2]".to_string()).await.unwrap();
        assert!(r2 > r1);

        let value = store.read("k").await.unwrap().unwrap();
        assert_eq!(value.value, "[1,2]");
        assert_eq!(value.revision, r2);
    }

    #[tokio::test]
    async fn test_cas_detects_stale_revision() {
        let store = InMemorySharedStore::new();
        let first = store
            .compare_and_swap("k", Revision::ZERO, "a".to_string())
            .await
            .unwrap();
        let CasOutcome::Committed(rev) = first else {
            panic!("expected commit, got {first:?}");
        };

        // 另一个上下文基于同一个修订号写入
        store.write("k", "b".to_string()).await.unwrap();
        let stale = store
            .compare_and_swap("k", rev, "c".to_string())
            .await
            .unwrap();
        assert!(matches!(stale, CasOutcome::Conflict { .. }));
        assert_eq!(store.read("k").await.unwrap().unwrap().value, "b");
    }

    #[tokio::test]
    async fn test_cas_on_missing_key_requires_zero() {
        let store = InMemorySharedStore::new();
        let outcome = store
            .compare_and_swap("k", Revision::new(3), "x".to_string())
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::Conflict { current: Revision::ZERO });
    }

    #[tokio::test]
    async fn test_dropped_subscriber_releases_forwarder() {
        let store = InMemorySharedStore::new();
        let rx = store.subscribe("watched").await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(store.changes.receiver_count(), 1);

        drop(rx);
        // 无需任何写入，转发任务也会退出
        tokio::time::timeout(Duration::from_secs(1), async {
            while store.changes.receiver_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_filters_by_key() {
        let store = InMemorySharedStore::new();
        let mut rx = store.subscribe("watched").await.unwrap();

        store.write("other", "1".to_string()).await.unwrap();
        store.write("watched", "2".to_string()).await.unwrap();

        let change = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.key, "watched");
    }
}
