//! 数据库仓储层
//!
//! 提供所有实体的数据访问接口，封装 SQL 操作细节。
//!
//! ## 设计原则
//!
//! - 仓储只负责数据持久化，不包含业务逻辑
//! - 兑换的原子性由 `StoreTransaction` 保证，事务控制由服务层决定
//! - 提供 PostgreSQL 与内存两种实现，服务层对二者无感知

mod memory;
mod pg_store;
mod traits;

pub use memory::{FaultPoint, MemoryStore, MemoryTransaction};
pub use pg_store::{PgStore, PgTransaction};
pub use traits::{RewardsStore, StoreTransaction};
