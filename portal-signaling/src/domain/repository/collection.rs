//! 类型化集合
//!
//! 在原始键值存储之上提供 `Vec<T>` 语义：
//! - 读取时数据损坏视为空集合（记录告警，不向上传播）
//! - 修改走 读取 → 内存修改 → CAS 写回 的循环，冲突时重试

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use portal_core::{PortalError, Result};

use super::{CasOutcome, Revision, SharedStore, StoreChange};

/// 修改闭包的结果
#[derive(Debug)]
pub enum Mutation<R> {
    /// 集合已修改，需要写回
    Commit(R),
    /// 集合未变化，跳过写入
    Unchanged(R),
}

/// 存储键上的类型化集合
pub struct Collection<T> {
    store: Arc<dyn SharedStore>,
    key: String,
    max_retries: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            key: self.key.clone(),
            max_retries: self.max_retries,
            _marker: PhantomData,
        }
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(store: Arc<dyn SharedStore>, key: impl Into<String>, max_retries: u32) -> Self {
        Self {
            store,
            key: key.into(),
            max_retries: max_retries.max(1),
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// 读取集合；数据损坏时视为空
    pub async fn load(&self) -> Result<Vec<T>> {
        Ok(self.load_versioned().await?.0)
    }

    /// 读取集合；数据损坏时返回 `StorageParse` 错误
    pub async fn load_strict(&self) -> Result<Vec<T>> {
        match self.store.read(&self.key).await? {
            Some(versioned) => self.decode(&versioned.value),
            None => Ok(Vec::new()),
        }
    }

    /// 整体替换集合（不检查修订号）
    pub async fn replace(&self, records: &[T]) -> Result<Revision> {
        let payload = serde_json::to_string(records)?;
        self.store.write(&self.key, payload).await
    }

    /// 读取-修改-CAS 写回
    ///
    /// 闭包在每次重试时都会以最新快照重新执行，不应在闭包外产生副作用
    pub async fn update<R, F>(&self, mut mutate: F) -> Result<R>
    where
        F: FnMut(&mut Vec<T>) -> Result<Mutation<R>> + Send,
        R: Send,
    {
        for attempt in 1..=self.max_retries {
            let (mut records, revision) = self.load_versioned().await?;

            let output = match mutate(&mut records)? {
                Mutation::Unchanged(output) => return Ok(output),
                Mutation::Commit(output) => output,
            };

            let payload = serde_json::to_string(&records)?;
            match self
                .store
                .compare_and_swap(&self.key, revision, payload)
                .await?
            {
                CasOutcome::Committed(_) => return Ok(output),
                CasOutcome::Conflict { current } => {
                    debug!(
                        key = %self.key,
                        attempt,
                        expected = %revision,
                        current = %current,
                        "CAS conflict, retrying"
                    );
                }
            }
        }

        Err(PortalError::Conflict {
            key: self.key.clone(),
            attempts: self.max_retries,
        })
    }

    /// 订阅集合变更
    pub async fn subscribe(&self) -> Result<mpsc::Receiver<StoreChange>> {
        self.store.subscribe(&self.key).await
    }

    async fn load_versioned(&self) -> Result<(Vec<T>, Revision)> {
        let Some(versioned) = self.store.read(&self.key).await? else {
            return Ok((Vec::new(), Revision::ZERO));
        };

        match self.decode(&versioned.value) {
            Ok(records) => Ok((records, versioned.revision)),
            Err(err) => {
                warn!(key = %self.key, error = %err, "stored collection is malformed, treating as empty");
                Ok((Vec::new(), versioned.revision))
            }
        }
    }

    fn decode(&self, raw: &str) -> Result<Vec<T>> {
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(raw).map_err(|e| PortalError::StorageParse {
            key: self.key.clone(),
            reason: e.to_string(),
        })
    }
}
