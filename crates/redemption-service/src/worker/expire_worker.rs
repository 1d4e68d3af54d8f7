//! 兑换过期处理 Worker
//!
//! 定期执行两项维护任务：
//! 1. 将超过领取期限仍未领取的兑换标记为 Expired
//! 2. 重新投递发件箱中未送达的生命周期事件
//!
//! 过期使用条件更新完成，多实例同时运行也不会重复处理同一条记录

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rewards_shared::config::WorkerConfig;
use rewards_shared::observability::metrics;
use tracing::{error, info};

use crate::repository::RewardsStore;
use crate::service::RedemptionService;

/// 轮询间隔下限，`tokio::time::interval` 不接受零间隔
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 单次运行结果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub expired: u64,
    pub redelivered: usize,
}

/// 过期处理 Worker
pub struct ExpireWorker<S: RewardsStore> {
    service: Arc<RedemptionService<S>>,
    /// 轮询间隔
    poll_interval: Duration,
    /// 每轮重投的最大事件数
    redelivery_batch: i64,
}

impl<S: RewardsStore> ExpireWorker<S> {
    pub fn new(
        service: Arc<RedemptionService<S>>,
        poll_interval: Duration,
        redelivery_batch: i64,
    ) -> Self {
        Self {
            service,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            redelivery_batch: redelivery_batch.max(1),
        }
    }

    pub fn from_config(service: Arc<RedemptionService<S>>, config: &WorkerConfig) -> Self {
        Self::new(
            service,
            Duration::from_secs(config.poll_interval_secs),
            config.redelivery_batch,
        )
    }

    /// 主循环：持续处理直到任务被取消
    pub async fn run(&self) {
        info!(
            poll_interval = ?self.poll_interval,
            redelivery_batch = self.redelivery_batch,
            "ExpireWorker 已启动"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// 执行一轮维护，单项失败只记录日志
    pub async fn tick(&self) -> TickReport {
        let now = Utc::now();
        let mut report = TickReport::default();

        match self.service.expire_overdue(now).await {
            Ok(count) => report.expired = count,
            Err(e) => error!(error = %e, "过期扫描出错"),
        }

        match self.service.redeliver_pending(self.redelivery_batch, now).await {
            Ok(count) => report.redelivered = count,
            Err(e) => error!(error = %e, "事件重投出错"),
        }

        metrics::set_worker_last_run("expire_worker");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewReward, NewUser};
    use crate::notification::LogMailer;
    use crate::repository::{FaultPoint, MemoryStore};
    use crate::service::AchievementNotifier;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_tick_expires_and_redelivers() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store
            .create_user(
                &NewUser {
                    id: "u1".to_string(),
                    name: "Alice".to_string(),
                    email: None,
                    points: 500,
                },
                now,
            )
            .await
            .unwrap();
        store
            .create_reward(
                &NewReward {
                    title: "Tea".to_string(),
                    description: None,
                    points: 50,
                    start_date: now - ChronoDuration::days(60),
                    end_date: now + ChronoDuration::days(1),
                    max_each_redeem: 5,
                    max_total_redeem: 5,
                    category: "drinks".to_string(),
                },
                now,
            )
            .await
            .unwrap();

        let mailer = Arc::new(LogMailer);
        let notifier = Arc::new(AchievementNotifier::new(store.clone(), mailer.clone()));
        let service = Arc::new(RedemptionService::new(
            store.clone(),
            notifier,
            mailer,
            ChronoDuration::days(30),
        ));

        // 40 天前的兑换，且首次事件投递失败
        store.inject_fault(FaultPoint::EarnAchievement).await;
        service
            .redeem("u1", 1, now - ChronoDuration::days(40))
            .await
            .unwrap();
        service.redeem("u1", 1, now).await.unwrap();

        let worker = ExpireWorker::new(service, Duration::from_secs(60), 100);
        let report = worker.tick().await;
        assert_eq!(
            report,
            TickReport {
                expired: 1,
                redelivered: 1
            }
        );

        assert_eq!(worker.tick().await, TickReport::default());
        assert_eq!(store.list_user_achievements("u1").await.unwrap().len(), 1);
    }

    #[test]
    fn test_zero_interval_is_floored() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(LogMailer);
        let notifier = Arc::new(AchievementNotifier::new(store.clone(), mailer.clone()));
        let service = Arc::new(RedemptionService::new(
            store,
            notifier,
            mailer,
            ChronoDuration::days(30),
        ));

        let worker = ExpireWorker::new(service, Duration::ZERO, 0);
        assert_eq!(worker.poll_interval, MIN_POLL_INTERVAL);
        assert_eq!(worker.redelivery_batch, 1);
    }
}
