//! 成就相关实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::AchievementType;

/// 成就定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: i64,
    pub achievement_type: AchievementType,
    pub title: String,
    pub description: String,
}

impl Achievement {
    /// 系统内置成就（迁移脚本中也会写入同样的数据）
    pub fn builtin() -> Vec<Achievement> {
        vec![Achievement {
            id: 1,
            achievement_type: AchievementType::FirstRedemption,
            title: "First Redemption".to_string(),
            description: "Redeemed a reward for the first time".to_string(),
        }]
    }
}

/// 用户获得的成就
///
/// (user_id, achievement_id) 唯一，notice 标记前端尚未展示过
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserAchievement {
    pub user_id: String,
    pub achievement_id: i64,
    pub earned_at: DateTime<Utc>,
    pub notice: bool,
}

/// 用户成就视图（关联成就定义）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EarnedAchievement {
    pub achievement_id: i64,
    pub achievement_type: AchievementType,
    pub title: String,
    pub description: String,
    pub earned_at: DateTime<Utc>,
    pub notice: bool,
}

impl EarnedAchievement {
    pub fn from_parts(achievement: &Achievement, earned: &UserAchievement) -> Self {
        Self {
            achievement_id: achievement.id,
            achievement_type: achievement.achievement_type,
            title: achievement.title.clone(),
            description: achievement.description.clone(),
            earned_at: earned.earned_at,
            notice: earned.notice,
        }
    }
}
