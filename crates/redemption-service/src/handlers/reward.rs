//! 奖品 API 处理器

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::Utc;

use crate::auth::Caller;
use crate::dto::{ApiResponse, RewardListParams, RewardRequest};
use crate::error::RedemptionError;
use crate::models::Reward;
use crate::repository::RewardsStore;
use crate::state::AppState;

/// 奖品列表
///
/// GET /api/rewards
pub async fn list_rewards<S: RewardsStore>(
    State(state): State<AppState<S>>,
    Query(params): Query<RewardListParams>,
) -> Result<ApiResponse<Vec<Reward>>, RedemptionError> {
    let rewards = state.catalog.list_rewards(&params.into()).await?;
    Ok(ApiResponse::success(rewards))
}

/// 奖品详情
///
/// GET /api/rewards/{id}
pub async fn get_reward<S: RewardsStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<Reward>, RedemptionError> {
    let reward = state.catalog.get_reward(id).await?;
    Ok(ApiResponse::success(reward))
}

/// 创建奖品
///
/// POST /api/admin/rewards
pub async fn create_reward<S: RewardsStore>(
    State(state): State<AppState<S>>,
    caller: Caller,
    Json(req): Json<RewardRequest>,
) -> Result<ApiResponse<Reward>, RedemptionError> {
    caller.require_admin()?;
    let reward = state.catalog.create_reward(req, Utc::now()).await?;
    Ok(ApiResponse::success(reward))
}

/// 修正奖品
///
/// PUT /api/admin/rewards/{id}
pub async fn update_reward<S: RewardsStore>(
    State(state): State<AppState<S>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<RewardRequest>,
) -> Result<ApiResponse<Reward>, RedemptionError> {
    caller.require_admin()?;
    let reward = state.catalog.update_reward(id, req, Utc::now()).await?;
    Ok(ApiResponse::success(reward))
}

/// 删除奖品
///
/// DELETE /api/admin/rewards/{id}
pub async fn delete_reward<S: RewardsStore>(
    State(state): State<AppState<S>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<ApiResponse<()>, RedemptionError> {
    caller.require_admin()?;
    state.catalog.delete_reward(id).await?;
    Ok(ApiResponse::success_empty())
}
