//! 邮件发送
//!
//! 邮件投递是尽力而为的：调用方只记录失败，不影响兑换或成就的状态流转。

use std::time::Duration;

use async_trait::async_trait;
use rewards_shared::config::MailConfig;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

/// 邮件投递错误
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("邮件网关请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("邮件网关拒绝: status={status}")]
    Rejected { status: u16 },

    #[error("收件人地址无效: {0}")]
    InvalidRecipient(String),
}

/// 邮件内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    pub fn redemption_confirmed(
        to: &str,
        user_name: &str,
        reward_title: &str,
        redemption_id: i64,
        collect_by: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("兑换成功：{}", reward_title),
            body: format!(
                "{}，您已成功兑换「{}」（兑换单号 {}），请在 {} 之前完成领取。",
                user_name,
                reward_title,
                redemption_id,
                collect_by.format("%Y-%m-%d %H:%M UTC")
            ),
        }
    }

    pub fn achievement_earned(to: &str, user_name: &str, title: &str, description: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("获得新成就：{}", title),
            body: format!("{}，恭喜您获得成就「{}」：{}", user_name, title, description),
        }
    }
}

/// 邮件协作方
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

/// 发送一封邮件
pub async fn deliver(mailer: &dyn Mailer, message: &MailMessage) -> Result<(), DeliveryError> {
    mailer
        .send_mail(&message.to, &message.subject, &message.body)
        .await
}

/// 仅写日志的邮件实现（未配置邮件网关时使用）
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        if !to.contains('@') {
            return Err(DeliveryError::InvalidRecipient(to.to_string()));
        }
        info!(to = %to, subject = %subject, body_length = body.len(), "邮件已记录（未配置邮件网关）");
        Ok(())
    }
}

#[derive(Serialize)]
struct GatewayRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// 通过 HTTP 邮件网关发送
pub struct HttpMailer {
    client: reqwest::Client,
    gateway_url: String,
    from_address: String,
}

impl HttpMailer {
    pub fn new(
        gateway_url: impl Into<String>,
        from_address: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            gateway_url: gateway_url.into(),
            from_address: from_address.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        debug!(to = %to, gateway = %self.gateway_url, "发送邮件");

        let response = self
            .client
            .post(&self.gateway_url)
            .json(&GatewayRequest {
                from: &self.from_address,
                to,
                subject,
                body,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
            });
        }

        info!(to = %to, subject = %subject, "邮件发送成功");
        Ok(())
    }
}

/// 根据配置构建邮件实现
pub fn from_config(config: &MailConfig) -> Result<Box<dyn Mailer>, DeliveryError> {
    match &config.gateway_url {
        Some(url) => Ok(Box::new(HttpMailer::new(
            url.clone(),
            config.from_address.clone(),
            Duration::from_millis(config.timeout_ms),
        )?)),
        None => Ok(Box::new(LogMailer)),
    }
}
