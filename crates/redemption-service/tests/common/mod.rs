//! 集成测试公共夹具

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redemption::models::{NewReward, NewUser, Reward};
use redemption::notification::{DeliveryError, Mailer};
use redemption::{AppState, MemoryStore, RewardsStore};
use rewards_shared::config::RedemptionConfig;

/// 记录所有发送请求的邮件实现
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    /// 已发送邮件的 (收件人, 主题)
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_mail(&self, to: &str, subject: &str, _body: &str) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub state: AppState<MemoryStore>,
}

pub fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::new(store.clone(), mailer.clone(), &RedemptionConfig::default());
    TestApp {
        store,
        mailer,
        state,
    }
}

pub fn reward_input(points: i64, max_each: i32, max_total: i32, now: DateTime<Utc>) -> NewReward {
    NewReward {
        title: "Movie Ticket".to_string(),
        description: Some("One free ticket".to_string()),
        points,
        start_date: now - Duration::days(1),
        end_date: now + Duration::days(7),
        max_each_redeem: max_each,
        max_total_redeem: max_total,
        category: "entertainment".to_string(),
    }
}

pub async fn seed_reward<S: RewardsStore>(
    store: &S,
    points: i64,
    max_each: i32,
    max_total: i32,
    now: DateTime<Utc>,
) -> Reward {
    store
        .create_reward(&reward_input(points, max_each, max_total, now), now)
        .await
        .unwrap()
}

pub async fn seed_user<S: RewardsStore>(
    store: &S,
    id: &str,
    points: i64,
    email: Option<&str>,
    now: DateTime<Utc>,
) {
    store
        .create_user(
            &NewUser {
                id: id.to_string(),
                name: format!("User {id}"),
                email: email.map(String::from),
                points,
            },
            now,
        )
        .await
        .unwrap();
}
