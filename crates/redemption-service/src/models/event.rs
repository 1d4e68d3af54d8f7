//! 生命周期事件（事务性发件箱）
//!
//! 事件与积分扣减、兑换记录写在同一个事务里，提交后再投递给下游。
//! 投递失败的事件保留 delivered_at = NULL，由后台 Worker 重新投递。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::LifecycleEventType;

/// 发件箱中的事件记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub id: i64,
    pub event_type: LifecycleEventType,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl LifecycleEvent {
    pub fn is_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }
}

/// 兑换创建事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionCreated {
    pub redemption_id: i64,
    pub user_id: String,
    pub reward_id: i64,
    /// 创建后该用户的兑换总数（事务内计算，重复投递时保持不变）
    pub user_redemption_count: i64,
}

impl RedemptionCreated {
    pub fn is_first_redemption(&self) -> bool {
        self.user_redemption_count == 1
    }
}

/// 待写入的事件
#[derive(Debug, Clone, PartialEq)]
pub struct NewLifecycleEvent {
    pub event_type: LifecycleEventType,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl NewLifecycleEvent {
    pub fn redemption_created(
        event: &RedemptionCreated,
        now: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_type: LifecycleEventType::RedemptionCreated,
            payload: serde_json::to_value(event)?,
            created_at: now,
        })
    }
}
