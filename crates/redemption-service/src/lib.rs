//! 积分兑换服务
//!
//! 用户用积分兑换奖品，兑换后需在领取期限内领取，逾期自动过期。
//!
//! ## 核心功能
//!
//! - **兑换**：在单个事务内校验奖品窗口、个人与总量上限、积分余额，扣减积分并写入兑换记录
//! - **领取/过期**：基于条件更新的状态迁移，领取幂等，逾期记录读取时自动修正
//! - **成就**：兑换事件通过发件箱投递，首次兑换发放成就，重复投递不重复发放
//! - **后台管理**：奖品维护、用户积分发放、全量兑换查询与手动过期扫描
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `validation`: 请求字段校验
//! - `repository`: 存储抽象与 PostgreSQL / 内存实现
//! - `service`: 业务服务层
//! - `notification`: 邮件通知
//! - `worker`: 后台过期与事件重投
//! - `handlers` / `routes`: REST API

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod models;
pub mod notification;
pub mod repository;
pub mod routes;
pub mod service;
pub mod state;
pub mod validation;
pub mod worker;

pub use auth::Caller;
pub use error::{RedemptionError, Result};
pub use models::*;
pub use notification::{LogMailer, Mailer};
pub use repository::{MemoryStore, PgStore, RewardsStore, StoreTransaction};
pub use routes::build_router;
pub use service::{AchievementNotifier, RedemptionService, RewardCatalog, UserLedger};
pub use state::AppState;
pub use worker::ExpireWorker;

/// 数据库迁移脚本
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
