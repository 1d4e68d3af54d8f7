//! 请求 DTO 定义
//!
//! 所有 REST API 的请求参数和请求体结构

use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::models::{
    NewReward, NewUser, RedemptionQuery, RedemptionSortField, RedemptionStatus, RewardFilter,
    SortOrder,
};
use crate::validation::{FieldErrors, InputSchema};

/// 兑换请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    #[validate(range(min = 1, message = "奖品 ID 无效"))]
    pub reward_id: i64,
}

impl InputSchema for RedeemRequest {}

/// 创建/修正奖品请求
///
/// 修正时整体替换奖品定义
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RewardRequest {
    #[validate(length(min = 1, max = 200, message = "奖品名称长度必须在1-200个字符之间"))]
    pub title: String,
    #[validate(length(max = 2000, message = "奖品描述不能超过2000个字符"))]
    pub description: Option<String>,
    #[validate(range(min = 0, message = "兑换积分不能为负数"))]
    pub points: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[validate(range(min = 1, message = "单用户兑换上限必须大于0"))]
    pub max_each_redeem: i32,
    #[validate(range(min = 1, message = "兑换总量上限必须大于0"))]
    pub max_total_redeem: i32,
    #[validate(length(min = 1, max = 100, message = "分类长度必须在1-100个字符之间"))]
    pub category: String,
}

impl InputSchema for RewardRequest {
    fn check_schema(&self, errors: &mut FieldErrors) {
        if self.start_date > self.end_date {
            errors.add("end_date", "结束时间不能早于开始时间");
        }
        if self.max_each_redeem > self.max_total_redeem {
            errors.add("max_each_redeem", "单用户兑换上限不能超过兑换总量上限");
        }
    }
}

impl RewardRequest {
    pub fn into_new_reward(self) -> NewReward {
        NewReward {
            title: self.title,
            description: self.description,
            points: self.points,
            start_date: self.start_date,
            end_date: self.end_date,
            max_each_redeem: self.max_each_redeem,
            max_total_redeem: self.max_total_redeem,
            category: self.category,
        }
    }
}

/// 创建用户请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 100, message = "用户 ID 长度必须在1-100个字符之间"))]
    pub id: String,
    #[validate(length(min = 1, max = 200, message = "用户名长度必须在1-200个字符之间"))]
    pub name: String,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, message = "初始积分不能为负数"))]
    pub points: i64,
}

impl InputSchema for CreateUserRequest {}

impl CreateUserRequest {
    pub fn into_new_user(self) -> NewUser {
        NewUser {
            id: self.id,
            name: self.name,
            email: self.email,
            points: self.points,
        }
    }
}

/// 单次发放积分上限
pub const MAX_CREDIT_AMOUNT: i64 = 1_000_000_000;

/// 积分发放请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreditPointsRequest {
    #[validate(range(min = 1, max = MAX_CREDIT_AMOUNT, message = "发放积分必须在1到10亿之间"))]
    pub amount: i64,
}

impl InputSchema for CreditPointsRequest {}

/// 分页参数
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

/// 页码上限
pub const MAX_PAGE: i64 = 10_000;

impl PaginationParams {
    /// 计算数据库查询的 offset
    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }

    /// 获取限制条数（最大100）
    pub fn limit(&self) -> i64 {
        self.page_size.clamp(1, 100)
    }

    /// 页码，限制在 1..=MAX_PAGE
    pub fn page(&self) -> i64 {
        self.page.clamp(1, MAX_PAGE)
    }
}

/// 兑换记录查询参数
///
/// 普通用户查询时 user_id 会被强制设为调用者本人
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionListParams {
    pub user_id: Option<String>,
    pub reward_id: Option<i64>,
    pub status: Option<RedemptionStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sort_by: RedemptionSortField,
    #[serde(default)]
    pub order: SortOrder,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl RedemptionListParams {
    pub fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page.unwrap_or_else(default_page),
            page_size: self.page_size.unwrap_or_else(default_page_size),
        }
    }

    pub fn to_query(&self) -> RedemptionQuery {
        let page = self.pagination();
        RedemptionQuery {
            user_id: self.user_id.clone(),
            reward_id: self.reward_id,
            status: self.status,
            created_from: self.created_from,
            created_to: self.created_to,
            sort_by: self.sort_by,
            order: self.order,
            limit: page.limit(),
            offset: page.offset(),
        }
    }
}

/// 奖品列表查询参数
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardListParams {
    pub category: Option<String>,
    pub active_at: Option<DateTime<Utc>>,
}

impl From<RewardListParams> for RewardFilter {
    fn from(params: RewardListParams) -> Self {
        RewardFilter {
            category: params.category,
            active_at: params.active_at,
        }
    }
}
