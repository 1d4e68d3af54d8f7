//! 路由配置模块
//!
//! 定义所有 REST API 端点的路由映射

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use rewards_shared::observability::middleware as obs_middleware;

use crate::handlers;
use crate::repository::RewardsStore;
use crate::state::AppState;

/// C 端路由：兑换、成就、奖品浏览
fn user_routes<S: RewardsStore>() -> Router<AppState<S>> {
    Router::new()
        .route(
            "/redemptions",
            post(handlers::redemption::redeem::<S>)
                .get(handlers::redemption::list_my_redemptions::<S>),
        )
        .route(
            "/redemptions/{id}",
            get(handlers::redemption::get_redemption::<S>),
        )
        .route(
            "/redemptions/{id}/collect",
            post(handlers::redemption::collect::<S>),
        )
        .route(
            "/achievements",
            get(handlers::achievement::list_achievements::<S>),
        )
        .route(
            "/achievements/{id}/ack",
            post(handlers::achievement::acknowledge::<S>),
        )
        .route("/rewards", get(handlers::reward::list_rewards::<S>))
        .route("/rewards/{id}", get(handlers::reward::get_reward::<S>))
}

/// 后台路由，处理器内部校验管理员身份
fn admin_routes<S: RewardsStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/rewards", post(handlers::reward::create_reward::<S>))
        .route(
            "/rewards/{id}",
            put(handlers::reward::update_reward::<S>).delete(handlers::reward::delete_reward::<S>),
        )
        .route("/users", post(handlers::user::create_user::<S>))
        .route(
            "/users/{id}/credit",
            post(handlers::user::credit_points::<S>),
        )
        .route(
            "/redemptions",
            get(handlers::redemption::admin_list_redemptions::<S>),
        )
        .route(
            "/redemptions/expire",
            post(handlers::redemption::run_expire_sweep::<S>),
        )
}

/// 构建 `/api` 下的全部路由
pub fn api_routes<S: RewardsStore>() -> Router<AppState<S>> {
    Router::new()
        .merge(user_routes())
        .nest("/admin", admin_routes())
}

/// 构建完整应用路由（含请求追踪与请求 ID 中间件）
pub fn build_router<S: RewardsStore>(state: AppState<S>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .route("/health", get(handlers::health::health))
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}
