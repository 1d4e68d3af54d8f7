//! 奖品目录服务
//!
//! 兑换流程只读取奖品定义；创建、修正、删除属于后台管理操作。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::dto::RewardRequest;
use crate::error::{RedemptionError, Result};
use crate::models::{Reward, RewardFilter};
use crate::repository::RewardsStore;
use crate::validation::validate_input;

pub struct RewardCatalog<S: RewardsStore> {
    store: Arc<S>,
}

impl<S: RewardsStore> RewardCatalog<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn get_reward(&self, id: i64) -> Result<Reward> {
        self.store
            .get_reward(id)
            .await?
            .ok_or_else(|| RedemptionError::not_found("reward", id))
    }

    /// 兑换窗口检查，start_date <= now <= end_date
    pub fn is_within_window(reward: &Reward, now: DateTime<Utc>) -> bool {
        reward.is_within_window(now)
    }

    pub async fn count_redemptions_by_user(&self, reward_id: i64, user_id: &str) -> Result<i64> {
        self.store.count_redemptions_by_user(reward_id, user_id).await
    }

    pub async fn count_total_redemptions(&self, reward_id: i64) -> Result<i64> {
        self.store.count_total_redemptions(reward_id).await
    }

    pub async fn list_rewards(&self, filter: &RewardFilter) -> Result<Vec<Reward>> {
        self.store.list_rewards(filter).await
    }

    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create_reward(&self, request: RewardRequest, now: DateTime<Utc>) -> Result<Reward> {
        validate_input(&request)?;

        let reward = self
            .store
            .create_reward(&request.into_new_reward(), now)
            .await?;

        info!(reward_id = reward.id, "奖品创建成功");
        Ok(reward)
    }

    /// 修正奖品定义（已有兑换记录时同样允许）
    #[instrument(skip(self, request), fields(reward_id = id))]
    pub async fn update_reward(
        &self,
        id: i64,
        request: RewardRequest,
        now: DateTime<Utc>,
    ) -> Result<Reward> {
        validate_input(&request)?;

        let reward = self
            .store
            .update_reward(id, &request.into_new_reward(), now)
            .await?
            .ok_or_else(|| RedemptionError::not_found("reward", id))?;

        info!(reward_id = id, "奖品已修正");
        Ok(reward)
    }

    /// 删除奖品，存在兑换记录引用时拒绝
    #[instrument(skip(self), fields(reward_id = id))]
    pub async fn delete_reward(&self, id: i64) -> Result<()> {
        let referenced = self.store.count_total_redemptions(id).await?;
        if referenced > 0 {
            return Err(RedemptionError::Conflict(format!(
                "reward {} is referenced by {} redemptions",
                id, referenced
            )));
        }

        if !self.store.delete_reward(id).await? {
            return Err(RedemptionError::not_found("reward", id));
        }

        info!(reward_id = id, "奖品已删除");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;
    use chrono::Duration;

    fn request(now: DateTime<Utc>) -> RewardRequest {
        RewardRequest {
            title: "Movie ticket".to_string(),
            description: Some("One ticket".to_string()),
            points: 300,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(30),
            max_each_redeem: 2,
            max_total_redeem: 50,
            category: "entertainment".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_get_update_delete() {
        let catalog = RewardCatalog::new(Arc::new(MemoryStore::new()));
        let now = Utc::now();

        let created = catalog.create_reward(request(now), now).await.unwrap();
        assert_eq!(catalog.get_reward(created.id).await.unwrap(), created);

        let mut fix = request(now);
        fix.points = 250;
        let updated = catalog.update_reward(created.id, fix, now).await.unwrap();
        assert_eq!(updated.points, 250);

        catalog.delete_reward(created.id).await.unwrap();
        assert!(matches!(
            catalog.get_reward(created.id).await,
            Err(RedemptionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_window() {
        let catalog = RewardCatalog::new(Arc::new(MemoryStore::new()));
        let now = Utc::now();

        let mut req = request(now);
        req.end_date = req.start_date - Duration::seconds(1);
        assert!(matches!(
            catalog.create_reward(req, now).await,
            Err(RedemptionError::Validation(_))
        ));
        assert!(catalog.list_rewards(&RewardFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_reward() {
        let catalog = RewardCatalog::new(Arc::new(MemoryStore::new()));
        let now = Utc::now();

        assert!(matches!(
            catalog.update_reward(99, request(now), now).await,
            Err(RedemptionError::NotFound { .. })
        ));
        assert!(matches!(
            catalog.delete_reward(99).await,
            Err(RedemptionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_category_and_window() {
        let catalog = RewardCatalog::new(Arc::new(MemoryStore::new()));
        let now = Utc::now();

        catalog.create_reward(request(now), now).await.unwrap();
        let mut future = request(now);
        future.category = "travel".to_string();
        future.start_date = now + Duration::days(10);
        catalog.create_reward(future, now).await.unwrap();

        let active = catalog
            .list_rewards(&RewardFilter {
                category: None,
                active_at: Some(now),
            })
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].category, "entertainment");

        let travel = catalog
            .list_rewards(&RewardFilter {
                category: Some("travel".to_string()),
                active_at: None,
            })
            .await
            .unwrap();
        assert_eq!(travel.len(), 1);
    }
}
