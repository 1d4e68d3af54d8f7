//! 兑换记录实体定义
//!
//! 兑换记录从不删除，只做状态流转，构成完整的审计轨迹

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::enums::RedemptionStatus;

/// 默认领取期限（天）
pub const DEFAULT_COLLECT_WINDOW_DAYS: i64 = 30;

/// 兑换记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub id: i64,
    pub user_id: String,
    pub reward_id: i64,
    pub status: RedemptionStatus,
    pub created_at: DateTime<Utc>,
    /// 领取截止时间 = 创建时间 + 领取期限
    pub collect_by: DateTime<Utc>,
    #[sqlx(default)]
    pub collected_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Redemption {
    /// 是否已超过领取期限（截止时间当刻仍可领取）
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        now > self.collect_by
    }

    /// 仍处于待领取状态但已超期，需要转为 Expired
    pub fn needs_expiry(&self, now: DateTime<Utc>) -> bool {
        self.status.can_transition_to(RedemptionStatus::Expired) && self.is_overdue(now)
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// 新建兑换记录
#[derive(Debug, Clone, PartialEq)]
pub struct NewRedemption {
    pub user_id: String,
    pub reward_id: i64,
    pub created_at: DateTime<Utc>,
    pub collect_by: DateTime<Utc>,
}

impl NewRedemption {
    pub fn new(user_id: &str, reward_id: i64, now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            user_id: user_id.to_string(),
            reward_id,
            created_at: now,
            collect_by: now + window,
        }
    }
}

/// 排序字段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RedemptionSortField {
    #[default]
    CreatedAt,
    CollectBy,
}

impl RedemptionSortField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::CollectBy => "collect_by",
        }
    }
}

/// 排序方向
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// 兑换记录查询条件（过滤 + 排序 + 分页）
#[derive(Debug, Clone)]
pub struct RedemptionQuery {
    pub user_id: Option<String>,
    pub reward_id: Option<i64>,
    pub status: Option<RedemptionStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub sort_by: RedemptionSortField,
    pub order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

impl Default for RedemptionQuery {
    fn default() -> Self {
        Self {
            user_id: None,
            reward_id: None,
            status: None,
            created_from: None,
            created_to: None,
            sort_by: RedemptionSortField::default(),
            order: SortOrder::default(),
            limit: 20,
            offset: 0,
        }
    }
}

impl RedemptionQuery {
    /// 过滤条件判断（内存实现使用，SQL 实现由查询条件表达）
    pub fn matches(&self, r: &Redemption) -> bool {
        self.user_id.as_ref().is_none_or(|u| &r.user_id == u)
            && self.reward_id.is_none_or(|id| r.reward_id == id)
            && self.status.is_none_or(|s| r.status == s)
            && self.created_from.is_none_or(|t| r.created_at >= t)
            && self.created_to.is_none_or(|t| r.created_at <= t)
    }

    /// 排序键，id 作为次级键保证排序稳定
    pub fn sort_key(&self, r: &Redemption) -> (DateTime<Utc>, i64) {
        match self.sort_by {
            RedemptionSortField::CreatedAt => (r.created_at, r.id),
            RedemptionSortField::CollectBy => (r.collect_by, r.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redemption(status: RedemptionStatus, created_at: DateTime<Utc>) -> Redemption {
        Redemption {
            id: 1,
            user_id: "user-1".to_string(),
            reward_id: 7,
            status,
            created_at,
            collect_by: created_at + Duration::days(DEFAULT_COLLECT_WINDOW_DAYS),
            collected_at: None,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_new_redemption_sets_deadline() {
        let now = Utc::now();
        let new = NewRedemption::new("user-1", 7, now, Duration::days(30));
        assert_eq!(new.collect_by - new.created_at, Duration::days(30));
    }

    #[test]
    fn test_overdue_boundary() {
        let created = Utc::now();
        let r = redemption(RedemptionStatus::Pending, created);

        assert!(!r.is_overdue(r.collect_by));
        assert!(r.is_overdue(r.collect_by + Duration::seconds(1)));
        assert!(r.needs_expiry(created + Duration::days(31)));

        let collected = redemption(RedemptionStatus::Collected, created);
        assert!(!collected.needs_expiry(created + Duration::days(31)));
    }

    #[test]
    fn test_query_matches() {
        let now = Utc::now();
        let r = redemption(RedemptionStatus::Pending, now);

        assert!(RedemptionQuery::default().matches(&r));
        assert!(
            RedemptionQuery {
                user_id: Some("user-1".to_string()),
                status: Some(RedemptionStatus::Pending),
                created_from: Some(now - Duration::hours(1)),
                created_to: Some(now),
                ..Default::default()
            }
            .matches(&r)
        );
        assert!(
            !RedemptionQuery {
                reward_id: Some(8),
                ..Default::default()
            }
            .matches(&r)
        );
        assert!(
            !RedemptionQuery {
                created_from: Some(now + Duration::seconds(1)),
                ..Default::default()
            }
            .matches(&r)
        );
    }

    #[test]
    fn test_sort_field_columns() {
        assert_eq!(RedemptionSortField::CreatedAt.column(), "created_at");
        assert_eq!(RedemptionSortField::CollectBy.column(), "collect_by");
        assert_eq!(SortOrder::default().sql(), "DESC");
    }
}
