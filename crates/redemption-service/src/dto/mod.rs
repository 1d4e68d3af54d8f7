//! 数据传输对象
//!
//! 请求体/查询参数的类型化结构与统一响应包装

pub mod request;
pub mod response;

pub use request::*;
pub use response::*;
