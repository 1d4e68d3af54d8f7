//! 仓储 Trait 定义
//!
//! 服务层只依赖这两个抽象：
//!
//! - `RewardsStore`：非事务读取、条件更新（CAS）以及开启事务
//! - `StoreTransaction`：兑换所需的加锁读取、计数、扣减和插入，提交前的写入对外不可见
//!
//! 事务对象被 drop 而未提交时必须回滚。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    Achievement, AchievementType, EarnedAchievement, LifecycleEvent, NewLifecycleEvent,
    NewRedemption, NewReward, NewUser, Redemption, RedemptionQuery, Reward, RewardFilter, User,
};

/// 持久化协作方
#[async_trait]
pub trait RewardsStore: Send + Sync + 'static {
    type Tx: StoreTransaction;

    /// 开启事务
    async fn begin(&self) -> Result<Self::Tx>;

    // 奖品
    async fn get_reward(&self, id: i64) -> Result<Option<Reward>>;
    async fn list_rewards(&self, filter: &RewardFilter) -> Result<Vec<Reward>>;
    async fn create_reward(&self, input: &NewReward, now: DateTime<Utc>) -> Result<Reward>;
    async fn update_reward(
        &self,
        id: i64,
        input: &NewReward,
        now: DateTime<Utc>,
    ) -> Result<Option<Reward>>;
    /// 删除奖品，返回是否存在；被兑换记录引用时返回 Conflict
    async fn delete_reward(&self, id: i64) -> Result<bool>;
    async fn count_redemptions_by_user(&self, reward_id: i64, user_id: &str) -> Result<i64>;
    async fn count_total_redemptions(&self, reward_id: i64) -> Result<i64>;

    // 用户
    async fn get_user(&self, id: &str) -> Result<Option<User>>;
    /// 用户 ID 已存在时返回 Conflict
    async fn create_user(&self, input: &NewUser, now: DateTime<Utc>) -> Result<User>;
    /// 增加积分，用户不存在返回 None，余额溢出返回 Validation
    async fn credit_points(
        &self,
        user_id: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<User>>;

    // 兑换记录
    async fn get_redemption(&self, id: i64) -> Result<Option<Redemption>>;
    /// 返回 (当前页, 总数)
    async fn list_redemptions(&self, query: &RedemptionQuery) -> Result<(Vec<Redemption>, i64)>;
    /// Pending 且 now <= collect_by 时改为 Collected，否则不修改并返回 None
    async fn mark_collected(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Redemption>>;
    /// Pending 且 now > collect_by 时改为 Expired，否则不修改并返回 None
    async fn mark_expired(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Redemption>>;
    /// 批量过期所有超期的 Pending 记录，返回影响行数
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64>;

    // 成就
    async fn get_achievement(&self, achievement_type: AchievementType)
    -> Result<Option<Achievement>>;
    /// 幂等写入，返回是否为新获得
    async fn earn_achievement(
        &self,
        user_id: &str,
        achievement_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool>;
    async fn list_user_achievements(&self, user_id: &str) -> Result<Vec<EarnedAchievement>>;
    /// 清除 notice 标记，返回记录是否存在
    async fn acknowledge_achievement(&self, user_id: &str, achievement_id: i64) -> Result<bool>;

    // 发件箱
    async fn list_undelivered_events(&self, limit: i64) -> Result<Vec<LifecycleEvent>>;
    async fn mark_event_delivered(&self, id: i64, now: DateTime<Utc>) -> Result<()>;
}

/// 兑换事务
#[async_trait]
pub trait StoreTransaction: Send {
    /// 加锁读取奖品，同一奖品上的并发兑换在此串行化
    async fn lock_reward(&mut self, id: i64) -> Result<Option<Reward>>;
    /// 加锁读取用户
    async fn lock_user(&mut self, id: &str) -> Result<Option<User>>;
    async fn count_redemptions_by_user(&mut self, reward_id: i64, user_id: &str) -> Result<i64>;
    async fn count_total_redemptions(&mut self, reward_id: i64) -> Result<i64>;
    /// 用户全部兑换次数（不区分奖品）
    async fn count_user_redemptions(&mut self, user_id: &str) -> Result<i64>;
    /// 扣减积分，余额不足时返回 InsufficientPoints
    async fn debit_points(&mut self, user_id: &str, amount: i64, now: DateTime<Utc>)
    -> Result<User>;
    async fn insert_redemption(&mut self, new: &NewRedemption) -> Result<Redemption>;
    async fn insert_event(&mut self, new: &NewLifecycleEvent) -> Result<LifecycleEvent>;
    async fn commit(self) -> Result<()>;
}
