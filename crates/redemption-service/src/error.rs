//! 兑换服务错误类型
//!
//! 定义服务层的业务错误和系统错误，以及到 HTTP 响应的映射

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::validation::FieldErrors;

/// 兑换服务错误类型
#[derive(Debug, Error)]
pub enum RedemptionError {
    // === 通用错误 ===
    #[error("{entity} 不存在: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("参数校验失败: {0}")]
    Validation(FieldErrors),

    // === 兑换前置条件 ===
    #[error("奖品当前不可兑换: reward_id={0}")]
    RewardUnavailable(i64),

    #[error("已达到单用户兑换上限: reward_id={reward_id}, limit={limit}")]
    PerUserCapExceeded { reward_id: i64, limit: i32 },

    #[error("已达到奖品兑换总量上限: reward_id={reward_id}, limit={limit}")]
    TotalCapExceeded { reward_id: i64, limit: i32 },

    #[error("积分不足: 需要 {required}, 可用 {available}")]
    InsufficientPoints { required: i64, available: i64 },

    // === 领取相关 ===
    #[error("兑换记录已过期: redemption_id={0}")]
    RedemptionExpired(i64),

    // === 访问控制 ===
    #[error("无权访问该资源")]
    Forbidden,

    #[error("未授权: {0}")]
    Unauthorized(String),

    #[error("资源冲突: {0}")]
    Conflict(String),

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 兑换服务 Result 类型别名
pub type Result<T> = std::result::Result<T, RedemptionError>;

impl RedemptionError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// 单个字段的校验错误
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }

        /// 发放后余额超出 i64 表示范围
    pub fn balance_overflow() -> Self {
        Self::invalid_field("amount", "发放后积分余额超出上限")
    }

        /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Storage(_) | Self::Serialization(_) | Self::Internal(_)
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::RewardUnavailable(_) => "REWARD_UNAVAILABLE",
            Self::PerUserCapExceeded { .. } => "PER_USER_CAP_EXCEEDED",
            Self::TotalCapExceeded { .. } => "TOTAL_CAP_EXCEEDED",
            Self::InsufficientPoints { .. } => "INSUFFICIENT_POINTS",
            Self::RedemptionExpired(_) => "REDEMPTION_EXPIRED",
            Self::Forbidden => "FORBIDDEN",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Conflict(_) => "CONFLICT",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::RewardUnavailable(_)
            | Self::PerUserCapExceeded { .. }
            | Self::TotalCapExceeded { .. }
            | Self::InsufficientPoints { .. }
            | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RedemptionExpired(_) => StatusCode::GONE,
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Serialization(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RedemptionError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息记录到日志
        let message = match &self {
            Self::Storage(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务暂时不可用，请稍后重试".to_string()
            }
            Self::Serialization(e) => {
                tracing::error!(error = %e, "序列化失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let data = match &self {
            Self::Validation(fields) => json!({ "fields": fields }),
            _ => serde_json::Value::Null,
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": data
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for RedemptionError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(FieldErrors::from(errors))
    }
}
