//! 用户积分 API 处理器（后台）

use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use tracing::info;

use crate::auth::Caller;
use crate::dto::{ApiResponse, CreateUserRequest, CreditPointsRequest};
use crate::error::RedemptionError;
use crate::models::User;
use crate::repository::RewardsStore;
use crate::state::AppState;

/// 创建用户
///
/// POST /api/admin/users
pub async fn create_user<S: RewardsStore>(
    State(state): State<AppState<S>>,
    caller: Caller,
    Json(req): Json<CreateUserRequest>,
) -> Result<ApiResponse<User>, RedemptionError> {
    caller.require_admin()?;
    let user = state.ledger.create_user(req, Utc::now()).await?;
    Ok(ApiResponse::success(user))
}

/// 发放积分
///
/// POST /api/admin/users/{id}/credit
pub async fn credit_points<S: RewardsStore>(
    State(state): State<AppState<S>>,
    caller: Caller,
    Path(user_id): Path<String>,
    Json(req): Json<CreditPointsRequest>,
) -> Result<ApiResponse<User>, RedemptionError> {
    caller.require_admin()?;
    let amount = req.amount;
    let user = state
        .ledger
        .credit_points(&user_id, req, Utc::now())
        .await?;
    info!(operator = %caller.user_id, user_id = %user_id, amount = amount, "后台发放积分");
    Ok(ApiResponse::success(user))
}
