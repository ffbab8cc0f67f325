//! 通知分发领域服务
//!
//! 把领域事件转换为接收者的通知记录：新通知插入列表头部（最新在前），
//! 超过上限时从尾部（最旧）淘汰。同一逻辑事件（类型 + 来源ID）只生成一条通知。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use portal_core::Result;

use crate::domain::event::DomainEvent;
use crate::domain::model::{Notification, Recipient};
use crate::domain::repository::{Collection, DomainEventPublisher, Mutation, SharedStore};
use crate::domain::value_object::NotificationId;

pub struct NotificationDispatcher {
    store: Arc<dyn SharedStore>,
    cap: usize,
    max_retries: u32,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn SharedStore>, cap: usize, max_retries: u32) -> Self {
        Self {
            store,
            cap: cap.max(1),
            max_retries,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    fn inbox(&self, recipient: &Recipient) -> Collection<Notification> {
        Collection::new(self.store.clone(), recipient.storage_key(), self.max_retries)
    }

    /// 分发事件，返回新生成的通知数量
    pub async fn emit(&self, event: &DomainEvent) -> Result<usize> {
        let kind = event.notification_kind();
        let source_id = event.source_id();
        let (title, message) = event.render();
        let cap = self.cap;

        let mut created = 0;
        for recipient in event.recipients() {
            let inserted = self
                .inbox(&recipient)
                .update(|inbox| {
                    if inbox.iter().any(|n| n.is_same_occurrence(&kind, &source_id)) {
                        return Ok(Mutation::Unchanged(false));
                    }
                    let id = NotificationId::next_after(inbox.iter().map(|n| n.id));
                    inbox.insert(
                        0,
                        Notification {
                            id,
                            title: title.clone(),
                            message: message.clone(),
                            date: Utc::now(),
                            kind: kind.clone(),
                            read: false,
                            source_id: source_id.clone(),
                        },
                    );
                    inbox.truncate(cap);
                    Ok(Mutation::Commit(true))
                })
                .await?;

            if inserted {
                created += 1;
                info!(
                    recipient = %recipient.user_id,
                    event_type = event.event_type(),
                    source_id = %source_id,
                    "notification created"
                );
            } else {
                debug!(
                    recipient = %recipient.user_id,
                    source_id = %source_id,
                    "duplicate event ignored"
                );
            }
        }

        Ok(created)
    }

    /// 接收者的通知列表（最新在前）
    pub async fn list(&self, recipient: &Recipient) -> Result<Vec<Notification>> {
        self.inbox(recipient).load().await
    }

    pub async fn unread_count(&self, recipient: &Recipient) -> Result<usize> {
        Ok(self.list(recipient).await?.iter().filter(|n| !n.read).count())
    }

    /// 全部标记已读，返回本次被标记的数量
    pub async fn mark_all_read(&self, recipient: &Recipient) -> Result<usize> {
        self.inbox(recipient)
            .update(|inbox| {
                let mut marked = 0;
                for notification in inbox.iter_mut().filter(|n| !n.read) {
                    notification.read = true;
                    marked += 1;
                }
                Ok(if marked == 0 {
                    Mutation::Unchanged(0)
                } else {
                    Mutation::Commit(marked)
                })
            })
            .await
    }

    /// 标记单条已读；通知不存在或已读时返回 false
    pub async fn mark_read(&self, recipient: &Recipient, id: NotificationId) -> Result<bool> {
        self.inbox(recipient)
            .update(|inbox| {
                match inbox.iter_mut().find(|n| n.id == id && !n.read) {
                    Some(notification) => {
                        notification.read = true;
                        Ok(Mutation::Commit(true))
                    }
                    None => Ok(Mutation::Unchanged(false)),
                }
            })
            .await
    }
}

#[async_trait]
impl DomainEventPublisher for NotificationDispatcher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        self.emit(&event).await.map(|_| ())
    }
}
