//! 成就通知服务
//!
//! 消费兑换生命周期事件并发放成就。事件可能被重复投递，
//! 发放基于 (user_id, achievement_id) 唯一键幂等写入，重复投递不会重复发放。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rewards_shared::observability::metrics;
use tracing::{debug, info, instrument, warn};

use crate::error::{RedemptionError, Result};
use crate::models::{
    AchievementType, EarnedAchievement, LifecycleEvent, LifecycleEventType, RedemptionCreated,
};
use crate::notification::mailer::deliver;
use crate::notification::{MailMessage, Mailer};
use crate::repository::RewardsStore;

pub struct AchievementNotifier<S: RewardsStore> {
    store: Arc<S>,
    mailer: Arc<dyn Mailer>,
}

impl<S: RewardsStore> AchievementNotifier<S> {
    pub fn new(store: Arc<S>, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, mailer }
    }

    /// 分发一条发件箱事件
    pub async fn dispatch(&self, event: &LifecycleEvent, now: DateTime<Utc>) -> Result<()> {
        match event.event_type {
            LifecycleEventType::RedemptionCreated => {
                let payload: RedemptionCreated = serde_json::from_value(event.payload.clone())?;
                self.on_redemption_created(&payload, now).await?;
            }
        }
        Ok(())
    }

    /// 兑换创建后：用户的第一笔兑换发放 first_redemption 成就
    #[instrument(skip(self, event), fields(user_id = %event.user_id, redemption_id = event.redemption_id))]
    pub async fn on_redemption_created(
        &self,
        event: &RedemptionCreated,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !event.is_first_redemption() {
            debug!(count = event.user_redemption_count, "非首次兑换，跳过");
            return Ok(false);
        }
        self.earn(&event.user_id, AchievementType::FirstRedemption, now)
            .await
    }

    /// 发放成就，已获得时不做任何修改，返回是否为新获得
    pub async fn earn(
        &self,
        user_id: &str,
        achievement_type: AchievementType,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let achievement = self
            .store
            .get_achievement(achievement_type)
            .await?
            .ok_or_else(|| RedemptionError::not_found("achievement", achievement_type.as_str()))?;

        let earned = self
            .store
            .earn_achievement(user_id, achievement.id, now)
            .await?;
        if !earned {
            debug!(user_id = %user_id, achievement = achievement_type.as_str(), "成就已获得");
            return Ok(false);
        }

        metrics::record_achievement_grant(achievement_type.as_str());
        info!(user_id = %user_id, achievement = achievement_type.as_str(), "成就发放成功");

        // 通知邮件尽力发送
        match self.store.get_user(user_id).await {
            Ok(Some(user)) => {
                if let Some(email) = &user.email {
                    let message = MailMessage::achievement_earned(
                        email,
                        &user.name,
                        &achievement.title,
                        &achievement.description,
                    );
                    send_best_effort(self.mailer.as_ref(), &message).await;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(user_id = %user_id, error = %e, "查询用户失败，跳过成就通知邮件"),
        }

        Ok(true)
    }

    pub async fn list_achievements(&self, user_id: &str) -> Result<Vec<EarnedAchievement>> {
        self.store.list_user_achievements(user_id).await
    }

    /// 清除成就的未读标记
    pub async fn acknowledge(&self, user_id: &str, achievement_id: i64) -> Result<()> {
        if !self
            .store
            .acknowledge_achievement(user_id, achievement_id)
            .await?
        {
            return Err(RedemptionError::not_found("achievement", achievement_id));
        }
        Ok(())
    }
}

/// 发送邮件，失败只记录日志
pub(crate) async fn send_best_effort(mailer: &dyn Mailer, message: &MailMessage) {
    match deliver(mailer, message).await {
        Ok(()) => metrics::record_mail_delivery("sent"),
        Err(e) => {
            metrics::record_mail_delivery("failed");
            warn!(to = %message.to, error = %e, "邮件发送失败");
        }
    }
}
