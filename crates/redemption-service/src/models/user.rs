//! 用户积分账户

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户
///
/// 积分余额只会被兑换扣减或外部发放流程增加，永不为负
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    #[sqlx(default)]
    pub email: Option<String>,
    pub points: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn can_afford(&self, cost: i64) -> bool {
        self.points >= cost
    }
}

/// 新建用户时写入的字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub points: i64,
}
