//! 奖品目录实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 奖品
///
/// 定义可用积分兑换的奖品，以及兑换时间窗口和数量上限
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: i64,
    pub title: String,
    #[sqlx(default)]
    pub description: Option<String>,
    /// 兑换所需积分
    pub points: i64,
    /// 可兑换开始时间（含）
    pub start_date: DateTime<Utc>,
    /// 可兑换结束时间（含）
    pub end_date: DateTime<Utc>,
    /// 单用户兑换次数上限
    pub max_each_redeem: i32,
    /// 全局兑换次数上限
    pub max_total_redeem: i32,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reward {
    /// 检查当前时间是否在兑换窗口内（两端均包含）
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now <= self.end_date
    }
}

/// 新建/修正奖品时写入的字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReward {
    pub title: String,
    pub description: Option<String>,
    pub points: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub max_each_redeem: i32,
    pub max_total_redeem: i32,
    pub category: String,
}

/// 奖品列表过滤条件
#[derive(Debug, Clone, Default)]
pub struct RewardFilter {
    pub category: Option<String>,
    /// 只返回在该时间点可兑换的奖品
    pub active_at: Option<DateTime<Utc>>,
}

impl RewardFilter {
    pub fn matches(&self, reward: &Reward) -> bool {
        self.category.as_ref().is_none_or(|c| &reward.category == c)
            && self.active_at.is_none_or(|t| reward.is_within_window(t))
    }
}
