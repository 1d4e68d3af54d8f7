//! 用户积分账本
//!
//! 扣减只发生在兑换事务内；这里提供查询、开户以及外部发放流程使用的加分入口。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::dto::{CreateUserRequest, CreditPointsRequest};
use crate::error::{RedemptionError, Result};
use crate::models::User;
use crate::repository::RewardsStore;
use crate::validation::validate_input;

pub struct UserLedger<S: RewardsStore> {
    store: Arc<S>,
}

impl<S: RewardsStore> UserLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn get_user(&self, id: &str) -> Result<User> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| RedemptionError::not_found("user", id))
    }

    #[instrument(skip(self, request), fields(user_id = %request.id))]
    pub async fn create_user(&self, request: CreateUserRequest, now: DateTime<Utc>) -> Result<User> {
        validate_input(&request)?;

        let user = self.store.create_user(&request.into_new_user(), now).await?;
        info!(user_id = %user.id, points = user.points, "用户创建成功");
        Ok(user)
    }

    #[instrument(skip(self, request), fields(user_id = %user_id, amount = request.amount))]
    pub async fn credit_points(
        &self,
        user_id: &str,
        request: CreditPointsRequest,
        now: DateTime<Utc>,
    ) -> Result<User> {
        validate_input(&request)?;

        let user = self
            .store
            .credit_points(user_id, request.amount, now)
            .await?
            .ok_or_else(|| RedemptionError::not_found("user", user_id))?;

        info!(user_id = %user_id, balance = user.points, "积分发放成功");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;

    fn alice() -> CreateUserRequest {
        CreateUserRequest {
            id: "alice".to_string(),
            name: "Alice".to_string(),
            email: Some("alice@example.com".to_string()),
            points: 100,
        }
    }

    #[tokio::test]
    async fn test_create_and_credit() {
        let ledger = UserLedger::new(Arc::new(MemoryStore::new()));
        let now = Utc::now();

        ledger.create_user(alice(), now).await.unwrap();
        let user = ledger
            .credit_points("alice", CreditPointsRequest { amount: 50 }, now)
            .await
            .unwrap();
        assert_eq!(user.points, 150);
        assert_eq!(ledger.get_user("alice").await.unwrap().points, 150);
    }

    #[tokio::test]
    async fn test_duplicate_user_conflicts() {
        let ledger = UserLedger::new(Arc::new(MemoryStore::new()));
        let now = Utc::now();

        ledger.create_user(alice(), now).await.unwrap();
        assert!(matches!(
            ledger.create_user(alice(), now).await,
            Err(RedemptionError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_credit_rejects_non_positive_amount() {
        let ledger = UserLedger::new(Arc::new(MemoryStore::new()));
        let now = Utc::now();
        ledger.create_user(alice(), now).await.unwrap();

        assert!(matches!(
            ledger
                .credit_points("alice", CreditPointsRequest { amount: 0 }, now)
                .await,
            Err(RedemptionError::Validation(_))
        ));
        assert!(matches!(
            ledger
                .credit_points("nobody", CreditPointsRequest { amount: 10 }, now)
                .await,
            Err(RedemptionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_credit_overflow_is_rejected_without_change() {
        let ledger = UserLedger::new(Arc::new(MemoryStore::new()));
        let now = Utc::now();
        let mut rich = alice();
        rich.points = i64::MAX - 5;
        ledger.create_user(rich, now).await.unwrap();

        // 超出单次上限，在校验阶段拒绝
        assert!(matches!(
            ledger
                .credit_points("alice", CreditPointsRequest { amount: i64::MAX }, now)
                .await,
            Err(RedemptionError::Validation(_))
        ));

        // 金额合法但余额会溢出
        let Err(RedemptionError::Validation(errors)) = ledger
            .credit_points("alice", CreditPointsRequest { amount: 10 }, now)
            .await
        else {
            panic!("expected validation error");
        };
        assert!(errors.get("amount").is_some());
        assert_eq!(ledger.get_user("alice").await.unwrap().points, i64::MAX - 5);

        let user = ledger
            .credit_points("alice", CreditPointsRequest { amount: 5 }, now)
            .await
            .unwrap();
        assert_eq!(user.points, i64::MAX);
    }
}
