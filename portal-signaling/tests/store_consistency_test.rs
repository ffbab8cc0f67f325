// 集成测试 - 共享存储上的集合读写、损坏数据处理与并发 CAS

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use portal_core::PortalError;
use portal_signaling::domain::model::{
    Appointment, AppointmentDraft, CallSession, CallSessionCreateParams, Notification,
    NotificationKind,
};
use portal_signaling::domain::repository::{
    APPOINTMENTS_KEY, CALL_HISTORY_KEY, Collection, Mutation, SharedStore,
};
use portal_signaling::domain::service::AppointmentRegistry;
use portal_signaling::domain::value_object::{
    AppointmentId, CallId, NotificationId, Role, UserId,
};
use portal_signaling::infrastructure::adapters::AllowListEntitlement;
use portal_signaling::infrastructure::store::InMemorySharedStore;
use portal_signaling::domain::service::NotificationDispatcher;

fn appointments(n: u64) -> Vec<Appointment> {
    (1..=n)
        .map(|i| {
            let draft = AppointmentDraft {
                date: "2025-06-01".to_string(),
                time: "10:00".to_string(),
                purpose: format!("session {i}"),
                student_id: format!("s-{i}"),
                student_name: "Mona".to_string(),
                requested_by: Some(Role::Scad),
            }
            .validate()
            .unwrap();
            Appointment::from_draft(AppointmentId::new(i), draft, Utc::now())
        })
        .collect()
}

fn sessions(n: u64) -> Vec<CallSession> {
    (1..=n)
        .map(|i| {
            let mut session = CallSession::initiate(
                CallSessionCreateParams {
                    id: CallId::new(i),
                    appointment_id: AppointmentId::new(i),
                    caller_id: UserId::new("scad-1").unwrap(),
                    caller_role: Role::Scad,
                    callee_id: UserId::new(format!("s-{i}")).unwrap(),
                },
                Utc::now(),
            );
            if i % 2 == 0 {
                session.accept();
                session.end(Utc::now());
            }
            session
        })
        .collect()
}

fn notifications(n: u64) -> Vec<Notification> {
    (1..=n)
        .rev()
        .map(|i| Notification {
            id: NotificationId::new(i),
            title: "New message".to_string(),
            message: format!("message {i}"),
            date: Utc::now(),
            kind: NotificationKind::Message,
            read: i % 3 == 0,
            source_id: format!("chat-{i}"),
        })
        .collect()
}

async fn round_trip<T>(store: &Arc<dyn SharedStore>, key: &str, records: Vec<T>) -> Result<()>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + PartialEq + std::fmt::Debug,
{
    let collection: Collection<T> = Collection::new(store.clone(), key, 8);
    collection.replace(&records).await?;
    assert_eq!(collection.load().await?, records);
    assert_eq!(collection.load_strict().await?, records);
    Ok(())
}

#[tokio::test]
async fn test_collections_round_trip() -> Result<()> {
    let store: Arc<dyn SharedStore> = Arc::new(InMemorySharedStore::new());
    for n in [0, 1, 50] {
        round_trip(&store, APPOINTMENTS_KEY, appointments(n)).await?;
        round_trip(&store, CALL_HISTORY_KEY, sessions(n)).await?;
        round_trip(&store, "studentNotifications:s-1", notifications(n)).await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_corrupt_collection_reads_as_empty() -> Result<()> {
    let raw = Arc::new(InMemorySharedStore::new());
    raw.put_raw(APPOINTMENTS_KEY, "[{\"id\": \"oops\"");
    let store: Arc<dyn SharedStore> = raw;

    let collection: Collection<Appointment> = Collection::new(store.clone(), APPOINTMENTS_KEY, 8);
    assert!(collection.load().await?.is_empty());
    assert!(matches!(
        collection.load_strict().await,
        Err(PortalError::StorageParse { .. })
    ));

    // 损坏的集合在下一次写入时被替换
    let registry = AppointmentRegistry::new(
        store.clone(),
        8,
        Arc::new(AllowListEntitlement::default()),
        Arc::new(NotificationDispatcher::new(store, 50, 8)),
    );
    let created = registry
        .create(AppointmentDraft {
            date: "2025-06-01".to_string(),
            time: "10:00".to_string(),
            purpose: "CV review".to_string(),
            student_id: "s-1".to_string(),
            ..Default::default()
        })
        .await?;
    assert_eq!(created.id, AppointmentId::new(1));
    assert_eq!(collection.load_strict().await?.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_lose_nothing() -> Result<()> {
    let store: Arc<dyn SharedStore> = Arc::new(InMemorySharedStore::new());
    let collection: Collection<u64> = Collection::new(store, "counter", 1_000);

    let mut tasks = Vec::new();
    for worker in 0..8u64 {
        let collection = collection.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..10u64 {
                collection
                    .update(|values| {
                        values.push(worker * 100 + i);
                        Ok(Mutation::Commit(()))
                    })
                    .await?;
            }
            Ok::<_, PortalError>(())
        }));
    }
    for task in tasks {
        task.await??;
    }

    let mut values = collection.load().await?;
    values.sort_unstable();
    values.dedup();
    assert_eq!(values.len(), 80);
    Ok(())
}

#[tokio::test]
async fn test_update_gives_up_after_retries() -> Result<()> {
    let raw = Arc::new(InMemorySharedStore::new());
    let store: Arc<dyn SharedStore> = raw.clone();
    let collection: Collection<u64> = Collection::new(store, "contended", 3);

    // 每次修改期间都有另一方写入，CAS 永远失败
    let result = collection
        .update(|values| {
            raw.put_raw("contended", "[]");
            values.push(1);
            Ok(Mutation::Commit(()))
        })
        .await;
    assert!(matches!(
        result,
        Err(PortalError::Conflict { attempts: 3, .. })
    ));
    Ok(())
}
