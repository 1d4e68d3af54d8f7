//! HTTP 处理器
//!
//! 处理器只负责提取参数、校验身份并调用服务层，业务规则都在 service 模块中

pub mod achievement;
pub mod health;
pub mod redemption;
pub mod reward;
pub mod user;
