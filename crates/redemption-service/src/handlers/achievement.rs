//! 成就 API 处理器

use axum::extract::{Path, State};

use crate::auth::Caller;
use crate::dto::ApiResponse;
use crate::error::RedemptionError;
use crate::models::EarnedAchievement;
use crate::repository::RewardsStore;
use crate::state::AppState;

/// 本人已获得的成就
///
/// GET /api/achievements
pub async fn list_achievements<S: RewardsStore>(
    State(state): State<AppState<S>>,
    caller: Caller,
) -> Result<ApiResponse<Vec<EarnedAchievement>>, RedemptionError> {
    let achievements = state.notifier.list_achievements(&caller.user_id).await?;
    Ok(ApiResponse::success(achievements))
}

/// 标记成就通知已读
///
/// POST /api/achievements/{id}/ack
pub async fn acknowledge<S: RewardsStore>(
    State(state): State<AppState<S>>,
    caller: Caller,
    Path(achievement_id): Path<i64>,
) -> Result<ApiResponse<()>, RedemptionError> {
    state
        .notifier
        .acknowledge(&caller.user_id, achievement_id)
        .await?;
    Ok(ApiResponse::success_empty())
}
