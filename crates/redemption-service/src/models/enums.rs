//! 兑换服务枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 兑换记录状态
///
/// 状态只能从 Pending 单向流转到两个终态之一：
///
/// ```text
/// Pending --(领取, now <= collect_by)--> Collected
/// Pending --(now > collect_by)---------> Expired
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedemptionStatus {
    /// 待领取 - 已扣减积分，等待线下/权益领取
    #[default]
    Pending,
    /// 已领取
    Collected,
    /// 已过期 - 超过领取期限未领取
    Expired,
}

impl RedemptionStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// 检查状态流转是否合法
    pub fn can_transition_to(&self, next: RedemptionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Collected) | (Self::Pending, Self::Expired)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Collected => "COLLECTED",
            Self::Expired => "EXPIRED",
        }
    }
}

/// 成就类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum AchievementType {
    /// 首次兑换
    FirstRedemption,
}

impl AchievementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstRedemption => "first_redemption",
        }
    }
}

/// 生命周期事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleEventType {
    /// 兑换记录已创建
    RedemptionCreated,
}
