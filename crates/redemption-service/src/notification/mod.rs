//! 通知模块
//!
//! 兑换成功、获得成就后向用户发送邮件。投递失败只记录日志，不回滚业务操作。

pub mod mailer;

pub use mailer::{DeliveryError, HttpMailer, LogMailer, MailMessage, Mailer};

#[cfg(test)]
pub use mailer::MockMailer;
