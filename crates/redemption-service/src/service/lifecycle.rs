//! 兑换生命周期服务
//!
//! 负责判断用户能否兑换奖品、在单个事务中完成扣分与建单，并推进兑换记录的状态。
//!
//! ## 兑换流程
//!
//! 1. 加锁读取奖品 -> 2. 兑换窗口 -> 3. 单用户上限 -> 4. 总量上限
//!    -> 5. 积分余额 -> 6. 扣分 + 建单 + 写发件箱事件 -> 7. 提交
//!    -> 8. 投递事件给成就服务 -> 9. 发送确认邮件
//!
//! 第 1-7 步任何一步失败都会整体回滚；第 8、9 步失败不影响兑换结果，
//! 未投递的事件由后台 Worker 重新投递。
//!
//! ## 状态流转
//!
//! 领取和过期都是以 `status = PENDING` 为条件的更新，并发的领取、过期扫描只会有一方生效。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use rewards_shared::observability::metrics;
use tracing::{debug, info, instrument, warn};

use super::achievement::{AchievementNotifier, send_best_effort};
use super::catalog::RewardCatalog;
use crate::error::{RedemptionError, Result};
use crate::models::{
    LifecycleEvent, NewLifecycleEvent, NewRedemption, Redemption, RedemptionCreated,
    RedemptionQuery, RedemptionStatus, Reward, User,
};
use crate::notification::{MailMessage, Mailer};
use crate::repository::{RewardsStore, StoreTransaction};

/// 兑换生命周期服务
pub struct RedemptionService<S: RewardsStore> {
    store: Arc<S>,
    notifier: Arc<AchievementNotifier<S>>,
    mailer: Arc<dyn Mailer>,
    collect_window: Duration,
}

impl<S: RewardsStore> RedemptionService<S> {
    pub fn new(
        store: Arc<S>,
        notifier: Arc<AchievementNotifier<S>>,
        mailer: Arc<dyn Mailer>,
        collect_window: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            mailer,
            collect_window,
        }
    }

    pub fn collect_window(&self) -> Duration {
        self.collect_window
    }

    /// 兑换奖品
    ///
    /// 前置条件按顺序检查，第一个失败的条件决定返回的错误
    #[instrument(skip(self), fields(user_id = %user_id, reward_id = reward_id))]
    pub async fn redeem(
        &self,
        user_id: &str,
        reward_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Redemption> {
        let start = Instant::now();
        let result = self.execute_redeem(user_id, reward_id, now).await;
        let elapsed = start.elapsed().as_secs_f64();

        let (redemption, event, reward, user) = match result {
            Ok(parts) => parts,
            Err(e) => {
                metrics::record_redemption(reward_id, e.error_code(), elapsed);
                info!(error_code = e.error_code(), "兑换被拒绝: {}", e);
                return Err(e);
            }
        };
        metrics::record_redemption(reward_id, "success", elapsed);

        info!(
            redemption_id = redemption.id,
            points = reward.points,
            balance = user.points,
            collect_by = %redemption.collect_by,
            "兑换成功"
        );

        // 提交后投递，失败留给 Worker 重投
        self.deliver_event(&event, now).await;

        if let Some(email) = &user.email {
            let message = MailMessage::redemption_confirmed(
                email,
                &user.name,
                &reward.title,
                redemption.id,
                redemption.collect_by,
            );
            send_best_effort(self.mailer.as_ref(), &message).await;
        }

        Ok(redemption)
    }

    /// 事务内执行兑换，返回兑换记录、发件箱事件以及用于通知的奖品和用户快照
    async fn execute_redeem(
        &self,
        user_id: &str,
        reward_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(Redemption, LifecycleEvent, Reward, User)> {
        let mut tx = self.store.begin().await?;

        // 1-2. 奖品存在且在兑换窗口内
        let reward = match tx.lock_reward(reward_id).await? {
            Some(reward) if RewardCatalog::<S>::is_within_window(&reward, now) => reward,
            _ => return Err(RedemptionError::RewardUnavailable(reward_id)),
        };

        // 3. 单用户上限
        let by_user = tx.count_redemptions_by_user(reward_id, user_id).await?;
        if by_user >= i64::from(reward.max_each_redeem) {
            return Err(RedemptionError::PerUserCapExceeded {
                reward_id,
                limit: reward.max_each_redeem,
            });
        }

        // 4. 总量上限
        let total = tx.count_total_redemptions(reward_id).await?;
        if total >= i64::from(reward.max_total_redeem) {
            return Err(RedemptionError::TotalCapExceeded {
                reward_id,
                limit: reward.max_total_redeem,
            });
        }

        // 5. 积分余额
        let user = tx
            .lock_user(user_id)
            .await?
            .ok_or_else(|| RedemptionError::not_found("user", user_id))?;
        if !user.can_afford(reward.points) {
            return Err(RedemptionError::InsufficientPoints {
                required: reward.points,
                available: user.points,
            });
        }

        // 6. 扣分、建单、写事件
        let user = tx.debit_points(user_id, reward.points, now).await?;
        let redemption = tx
            .insert_redemption(&NewRedemption::new(
                user_id,
                reward_id,
                now,
                self.collect_window,
            ))
            .await?;

        let user_redemption_count = tx.count_user_redemptions(user_id).await?;
        let payload = RedemptionCreated {
            redemption_id: redemption.id,
            user_id: user_id.to_string(),
            reward_id,
            user_redemption_count,
        };
        let event = tx
            .insert_event(&NewLifecycleEvent::redemption_created(&payload, now)?)
            .await?;

        // 7. 提交
        tx.commit().await?;

        Ok((redemption, event, reward, user))
    }

    /// 领取兑换
    ///
    /// - Pending 且未超期：改为 Collected
    /// - Pending 且已超期：改为 Expired，返回 RedemptionExpired
    /// - Collected：原样返回，不报错
    /// - Expired：返回 RedemptionExpired
    #[instrument(skip(self), fields(redemption_id = redemption_id))]
    pub async fn collect(&self, redemption_id: i64, now: DateTime<Utc>) -> Result<Redemption> {
        let redemption = self.load(redemption_id).await?;
        self.collect_loaded(redemption, now).await
    }

    /// 领取调用者本人的兑换
    pub async fn collect_owned(
        &self,
        user_id: &str,
        redemption_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Redemption> {
        let redemption = self.load(redemption_id).await?;
        if !redemption.is_owned_by(user_id) {
            return Err(RedemptionError::Forbidden);
        }
        self.collect_loaded(redemption, now).await
    }

    async fn collect_loaded(&self, redemption: Redemption, now: DateTime<Utc>) -> Result<Redemption> {
        let id = redemption.id;
        match redemption.status {
            RedemptionStatus::Collected => {
                metrics::record_collection("already_collected");
                debug!(redemption_id = id, "重复领取，返回原记录");
                return Ok(redemption);
            }
            RedemptionStatus::Expired => {
                metrics::record_collection("expired");
                return Err(RedemptionError::RedemptionExpired(id));
            }
            RedemptionStatus::Pending => {}
        }

        if redemption.is_overdue(now) {
            if self.store.mark_expired(id, now).await?.is_none() {
                return self.settle(id).await;
            }
            metrics::record_expiration("collect", 1);
            metrics::record_collection("expired");
            info!(redemption_id = id, collect_by = %redemption.collect_by, "领取时发现已超期，标记为过期");
            return Err(RedemptionError::RedemptionExpired(id));
        }

        match self.store.mark_collected(id, now).await? {
            Some(collected) => {
                metrics::record_collection("collected");
                info!(redemption_id = id, "领取成功");
                Ok(collected)
            }
            None => self.settle(id).await,
        }
    }

    /// 条件更新未命中：并发的领取或过期已先生效，以当前状态为准
    async fn settle(&self, id: i64) -> Result<Redemption> {
        let current = self.load(id).await?;
        if !current.status.is_terminal() {
            return Err(RedemptionError::Conflict(format!(
                "redemption {} changed concurrently",
                id
            )));
        }
        match current.status {
            RedemptionStatus::Collected => {
                metrics::record_collection("already_collected");
                Ok(current)
            }
            _ => {
                metrics::record_collection("expired");
                Err(RedemptionError::RedemptionExpired(id))
            }
        }
    }

    /// 批量过期所有超期未领取的兑换
    #[instrument(skip(self))]
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64> {
        let count = self.store.expire_overdue(now).await?;
        if count > 0 {
            metrics::record_expiration("sweep", count);
            info!(count = count, "过期扫描完成");
        }
        Ok(count)
    }

    /// 查询兑换记录，读取时顺带把超期的 Pending 记录改为 Expired
    pub async fn get_redemption(&self, redemption_id: i64, now: DateTime<Utc>) -> Result<Redemption> {
        let redemption = self.load(redemption_id).await?;
        self.heal(redemption, now).await
    }

    /// 查询调用者本人的兑换记录
    pub async fn get_owned_redemption(
        &self,
        user_id: &str,
        redemption_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Redemption> {
        let redemption = self.load(redemption_id).await?;
        if !redemption.is_owned_by(user_id) {
            return Err(RedemptionError::Forbidden);
        }
        self.heal(redemption, now).await
    }

    /// 分页查询兑换记录，返回 (当前页, 总数)
    pub async fn list_redemptions(
        &self,
        query: &RedemptionQuery,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Redemption>, i64)> {
        // 先过期超期记录，状态过滤和总数才与返回的行一致
        let expired = self.store.expire_overdue(now).await?;
        if expired > 0 {
            metrics::record_expiration("read", expired);
            debug!(count = expired, "查询前标记超期记录为过期");
        }

        self.store.list_redemptions(query).await
    }

    /// 重新投递未送达的发件箱事件，返回成功投递的数量
    #[instrument(skip(self))]
    pub async fn redeliver_pending(&self, limit: i64, now: DateTime<Utc>) -> Result<usize> {
        let events = self.store.list_undelivered_events(limit).await?;
        let mut delivered = 0;
        for event in &events {
            if self.deliver_event(event, now).await {
                delivered += 1;
            }
        }

        if !events.is_empty() {
            info!(
                pending = events.len(),
                delivered = delivered,
                "发件箱事件重投完成"
            );
        }
        Ok(delivered)
    }

    async fn deliver_event(&self, event: &LifecycleEvent, now: DateTime<Utc>) -> bool {
        if let Err(e) = self.notifier.dispatch(event, now).await {
            warn!(event_id = event.id, error = %e, "事件投递失败，等待重投");
            return false;
        }
        if let Err(e) = self.store.mark_event_delivered(event.id, now).await {
            // 成就发放幂等，标记失败只会导致一次多余的重投
            warn!(event_id = event.id, error = %e, "标记事件已投递失败");
            return false;
        }
        true
    }

    async fn load(&self, redemption_id: i64) -> Result<Redemption> {
        self.store
            .get_redemption(redemption_id)
            .await?
            .ok_or_else(|| RedemptionError::not_found("redemption", redemption_id))
    }

    async fn heal(&self, redemption: Redemption, now: DateTime<Utc>) -> Result<Redemption> {
        if !redemption.needs_expiry(now) {
            return Ok(redemption);
        }

        match self.store.mark_expired(redemption.id, now).await? {
            Some(expired) => {
                metrics::record_expiration("read", 1);
                debug!(redemption_id = expired.id, "读取时标记为过期");
                Ok(expired)
            }
            None => self.load(redemption.id).await,
        }
    }
}
