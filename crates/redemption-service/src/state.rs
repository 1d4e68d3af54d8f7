//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;

use chrono::Duration;
use rewards_shared::config::{MAX_COLLECT_WINDOW_DAYS, RedemptionConfig};

use crate::notification::Mailer;
use crate::repository::RewardsStore;
use crate::service::{AchievementNotifier, RedemptionService, RewardCatalog, UserLedger};

/// Axum 应用共享状态
///
/// 所有服务在启动时按依赖顺序构建一次，通过 Arc 在 handler 间共享
pub struct AppState<S: RewardsStore> {
    pub catalog: Arc<RewardCatalog<S>>,
    pub ledger: Arc<UserLedger<S>>,
    pub notifier: Arc<AchievementNotifier<S>>,
    pub redemptions: Arc<RedemptionService<S>>,
}

// 手动实现，避免 derive 要求 S: Clone
impl<S: RewardsStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
            ledger: self.ledger.clone(),
            notifier: self.notifier.clone(),
            redemptions: self.redemptions.clone(),
        }
    }
}

impl<S: RewardsStore> AppState<S> {
    pub fn new(store: Arc<S>, mailer: Arc<dyn Mailer>, config: &RedemptionConfig) -> Self {
        let catalog = Arc::new(RewardCatalog::new(store.clone()));
        let ledger = Arc::new(UserLedger::new(store.clone()));
        let notifier = Arc::new(AchievementNotifier::new(store.clone(), mailer.clone()));
        let redemptions = Arc::new(RedemptionService::new(
            store,
            notifier.clone(),
            mailer,
            Duration::days(config.collect_window_days.clamp(1, MAX_COLLECT_WINDOW_DAYS)),
        ));

        Self {
            catalog,
            ledger,
            notifier,
            redemptions,
        }
    }
}
