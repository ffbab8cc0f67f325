use async_trait::async_trait;
use dashmap::DashSet;

use crate::domain::repository::EntitlementChecker;
use crate::domain::value_object::UserId;

/// 基于白名单的 pro 权益检查
#[derive(Default)]
pub struct AllowListEntitlement {
    pro_students: DashSet<UserId>,
}

impl AllowListEntitlement {
    pub fn new<I>(students: I) -> Self
    where
        I: IntoIterator<Item = UserId>,
    {
        let pro_students = DashSet::new();
        for student in students {
            pro_students.insert(student);
        }
        Self { pro_students }
    }

    pub fn grant(&self, student: UserId) {
        self.pro_students.insert(student);
    }
}

#[async_trait]
impl EntitlementChecker for AllowListEntitlement {
    async fn is_pro(&self, student: &UserId) -> bool {
        self.pro_students.contains(student)
    }
}
