//! 兑换 API 处理器

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use tracing::info;

use crate::auth::Caller;
use crate::dto::{ApiResponse, ExpireSweepResponse, PageResponse, RedeemRequest, RedemptionListParams};
use crate::error::RedemptionError;
use crate::models::Redemption;
use crate::repository::RewardsStore;
use crate::state::AppState;
use crate::validation::validate_input;

type ApiResult<T> = Result<ApiResponse<T>, RedemptionError>;

/// 兑换奖品
///
/// POST /api/redemptions
pub async fn redeem<S: RewardsStore>(
    State(state): State<AppState<S>>,
    caller: Caller,
    Json(req): Json<RedeemRequest>,
) -> ApiResult<Redemption> {
    validate_input(&req)?;

    let redemption = state
        .redemptions
        .redeem(&caller.user_id, req.reward_id, Utc::now())
        .await?;
    Ok(ApiResponse::success(redemption))
}

/// 查询本人的兑换记录
///
/// GET /api/redemptions
pub async fn list_my_redemptions<S: RewardsStore>(
    State(state): State<AppState<S>>,
    caller: Caller,
    Query(mut params): Query<RedemptionListParams>,
) -> ApiResult<PageResponse<Redemption>> {
    params.user_id = Some(caller.user_id);
    list(&state, &params).await
}

/// 查询兑换详情
///
/// GET /api/redemptions/{id}
pub async fn get_redemption<S: RewardsStore>(
    State(state): State<AppState<S>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<Redemption> {
    let redemption = state
        .redemptions
        .get_owned_redemption(&caller.user_id, id, Utc::now())
        .await?;
    Ok(ApiResponse::success(redemption))
}

/// 领取兑换
///
/// POST /api/redemptions/{id}/collect
pub async fn collect<S: RewardsStore>(
    State(state): State<AppState<S>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<Redemption> {
    let redemption = state
        .redemptions
        .collect_owned(&caller.user_id, id, Utc::now())
        .await?;
    Ok(ApiResponse::success(redemption))
}

/// 后台查询全部兑换记录
///
/// GET /api/admin/redemptions
pub async fn admin_list_redemptions<S: RewardsStore>(
    State(state): State<AppState<S>>,
    caller: Caller,
    Query(params): Query<RedemptionListParams>,
) -> ApiResult<PageResponse<Redemption>> {
    caller.require_admin()?;
    list(&state, &params).await
}

/// 立即执行一次过期扫描
///
/// POST /api/admin/redemptions/expire
pub async fn run_expire_sweep<S: RewardsStore>(
    State(state): State<AppState<S>>,
    caller: Caller,
) -> ApiResult<ExpireSweepResponse> {
    caller.require_admin()?;

    let expired = state.redemptions.expire_overdue(Utc::now()).await?;
    info!(operator = %caller.user_id, expired = expired, "手动执行过期扫描");
    Ok(ApiResponse::success(ExpireSweepResponse { expired }))
}

async fn list<S: RewardsStore>(
    state: &AppState<S>,
    params: &RedemptionListParams,
) -> ApiResult<PageResponse<Redemption>> {
    let page = params.pagination();
    let (items, total) = state
        .redemptions
        .list_redemptions(&params.to_query(), Utc::now())
        .await?;
    Ok(ApiResponse::success(PageResponse::new(
        items,
        total,
        page.page(),
        page.limit(),
    )))
}
