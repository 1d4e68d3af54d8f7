//! 服务层
//!
//! 实现积分兑换业务逻辑，协调仓储层与通知。
//!
//! ## 模块结构
//!
//! - `catalog`: 奖品目录（查询与后台管理）
//! - `ledger`: 用户积分账本
//! - `lifecycle`: 兑换生命周期（兑换、领取、过期）
//! - `achievement`: 成就发放与发件箱事件消费

pub mod achievement;
pub mod catalog;
pub mod ledger;
pub mod lifecycle;

pub use achievement::AchievementNotifier;
pub use catalog::RewardCatalog;
pub use ledger::UserLedger;
pub use lifecycle::RedemptionService;
