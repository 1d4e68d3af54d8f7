//! 积分兑换领域模型
//!
//! 包含奖品、用户积分、兑换记录、成就以及生命周期事件的实体定义

pub mod achievement;
pub mod enums;
pub mod event;
pub mod redemption;
pub mod reward;
pub mod user;

pub use achievement::{Achievement, EarnedAchievement, UserAchievement};
pub use enums::{AchievementType, LifecycleEventType, RedemptionStatus};
pub use event::{LifecycleEvent, NewLifecycleEvent, RedemptionCreated};
pub use redemption::{
    DEFAULT_COLLECT_WINDOW_DAYS, NewRedemption, Redemption, RedemptionQuery, RedemptionSortField,
    SortOrder,
};
pub use reward::{NewReward, Reward, RewardFilter};
pub use user::{NewUser, User};
