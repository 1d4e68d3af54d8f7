//! 内存存储实现
//!
//! 用于本地运行和测试。所有状态放在一把异步互斥锁之后：
//! 事务持有锁的所有权直到提交或丢弃，写入先落在暂存副本上，提交时整体替换，丢弃即回滚。
//! 因此并发兑换与 PostgreSQL 行锁一样被串行化。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::traits::{RewardsStore, StoreTransaction};
use crate::error::{RedemptionError, Result};
use crate::models::{
    Achievement, AchievementType, EarnedAchievement, LifecycleEvent, NewLifecycleEvent,
    NewRedemption, NewReward, NewUser, Redemption, RedemptionQuery, RedemptionStatus, Reward,
    RewardFilter, SortOrder, User, UserAchievement,
};

/// 可注入的故障点，触发一次后自动清除
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    InsertRedemption,
    InsertEvent,
    Commit,
    EarnAchievement,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    rewards: BTreeMap<i64, Reward>,
    users: HashMap<String, User>,
    redemptions: BTreeMap<i64, Redemption>,
    achievements: Vec<Achievement>,
    user_achievements: BTreeMap<(String, i64), UserAchievement>,
    events: BTreeMap<i64, LifecycleEvent>,
    next_reward_id: i64,
    next_redemption_id: i64,
    next_event_id: i64,
}

impl Tables {
    fn seeded() -> Self {
        Self {
            achievements: Achievement::builtin(),
            next_reward_id: 1,
            next_redemption_id: 1,
            next_event_id: 1,
            ..Default::default()
        }
    }

    fn count_by_user(&self, reward_id: i64, user_id: &str) -> i64 {
        self.redemptions
            .values()
            .filter(|r| r.reward_id == reward_id && r.user_id == user_id)
            .count() as i64
    }

    fn count_total(&self, reward_id: i64) -> i64 {
        self.redemptions
            .values()
            .filter(|r| r.reward_id == reward_id)
            .count() as i64
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: Tables,
    faults: Vec<FaultPoint>,
}

impl MemoryState {
    fn take_fault(&mut self, point: FaultPoint) -> Result<()> {
        match self.faults.iter().position(|f| *f == point) {
            Some(idx) => {
                self.faults.remove(idx);
                Err(RedemptionError::Internal(format!(
                    "injected fault: {:?}",
                    point
                )))
            }
            None => Ok(()),
        }
    }
}

/// 内存存储
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                tables: Tables::seeded(),
                faults: Vec::new(),
            })),
        }
    }

    /// 注入一次性故障
    pub async fn inject_fault(&self, point: FaultPoint) {
        self.state.lock().await.faults.push(point);
    }

    /// 所有兑换记录（测试断言用）
    pub async fn all_redemptions(&self) -> Vec<Redemption> {
        self.state
            .lock()
            .await
            .tables
            .redemptions
            .values()
            .cloned()
            .collect()
    }

    /// 所有发件箱事件（测试断言用）
    pub async fn all_events(&self) -> Vec<LifecycleEvent> {
        self.state
            .lock()
            .await
            .tables
            .events
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RewardsStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.tables.clone();
        Ok(MemoryTransaction { guard, staged })
    }

    async fn get_reward(&self, id: i64) -> Result<Option<Reward>> {
        Ok(self.state.lock().await.tables.rewards.get(&id).cloned())
    }

    async fn list_rewards(&self, filter: &RewardFilter) -> Result<Vec<Reward>> {
        let state = self.state.lock().await;
        Ok(state
            .tables
            .rewards
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn create_reward(&self, input: &NewReward, now: DateTime<Utc>) -> Result<Reward> {
        let mut state = self.state.lock().await;
        let tables = &mut state.tables;
        let id = tables.next_reward_id;
        tables.next_reward_id += 1;

        let reward = Reward {
            id,
            title: input.title.clone(),
            description: input.description.clone(),
            points: input.points,
            start_date: input.start_date,
            end_date: input.end_date,
            max_each_redeem: input.max_each_redeem,
            max_total_redeem: input.max_total_redeem,
            category: input.category.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.rewards.insert(id, reward.clone());
        Ok(reward)
    }

    async fn update_reward(
        &self,
        id: i64,
        input: &NewReward,
        now: DateTime<Utc>,
    ) -> Result<Option<Reward>> {
        let mut state = self.state.lock().await;
        let Some(reward) = state.tables.rewards.get_mut(&id) else {
            return Ok(None);
        };

        reward.title = input.title.clone();
        reward.description = input.description.clone();
        reward.points = input.points;
        reward.start_date = input.start_date;
        reward.end_date = input.end_date;
        reward.max_each_redeem = input.max_each_redeem;
        reward.max_total_redeem = input.max_total_redeem;
        reward.category = input.category.clone();
        reward.updated_at = now;
        Ok(Some(reward.clone()))
    }

    async fn delete_reward(&self, id: i64) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.tables.count_total(id) > 0 {
            return Err(RedemptionError::Conflict(format!(
                "reward {} is referenced by redemptions",
                id
            )));
        }
        Ok(state.tables.rewards.remove(&id).is_some())
    }

    async fn count_redemptions_by_user(&self, reward_id: i64, user_id: &str) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .await
            .tables
            .count_by_user(reward_id, user_id))
    }

    async fn count_total_redemptions(&self, reward_id: i64) -> Result<i64> {
        Ok(self.state.lock().await.tables.count_total(reward_id))
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.state.lock().await.tables.users.get(id).cloned())
    }

    async fn create_user(&self, input: &NewUser, now: DateTime<Utc>) -> Result<User> {
        let mut state = self.state.lock().await;
        if state.tables.users.contains_key(&input.id) {
            return Err(RedemptionError::Conflict(format!(
                "user {} already exists",
                input.id
            )));
        }

        let user = User {
            id: input.id.clone(),
            name: input.name.clone(),
            email: input.email.clone(),
            points: input.points,
            created_at: now,
            updated_at: now,
        };
        state.tables.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn credit_points(
        &self,
        user_id: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let mut state = self.state.lock().await;
        let Some(user) = state.tables.users.get_mut(user_id) else {
            return Ok(None);
        };
        user.points = user
            .points
            .checked_add(amount)
            .ok_or_else(RedemptionError::balance_overflow)?;
        user.updated_at = now;
        Ok(Some(user.clone()))
    }

    async fn get_redemption(&self, id: i64) -> Result<Option<Redemption>> {
        Ok(self.state.lock().await.tables.redemptions.get(&id).cloned())
    }

    async fn list_redemptions(&self, query: &RedemptionQuery) -> Result<(Vec<Redemption>, i64)> {
        let state = self.state.lock().await;
        let mut matched: Vec<Redemption> = state
            .tables
            .redemptions
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();

        matched.sort_by_key(|r| query.sort_key(r));
        if query.order == SortOrder::Desc {
            matched.reverse();
        }

        let total = matched.len() as i64;
        let page = matched
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn mark_collected(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Redemption>> {
        let mut state = self.state.lock().await;
        Ok(match state.tables.redemptions.get_mut(&id) {
            Some(r)
                if r.status.can_transition_to(RedemptionStatus::Collected)
                    && !r.is_overdue(now) =>
            {
                r.status = RedemptionStatus::Collected;
                r.collected_at = Some(now);
                r.updated_at = now;
                Some(r.clone())
            }
            _ => None,
        })
    }

    async fn mark_expired(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Redemption>> {
        let mut state = self.state.lock().await;
        Ok(match state.tables.redemptions.get_mut(&id) {
            Some(r) if r.needs_expiry(now) => {
                r.status = RedemptionStatus::Expired;
                r.updated_at = now;
                Some(r.clone())
            }
            _ => None,
        })
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut count = 0;
        for r in state.tables.redemptions.values_mut() {
            if r.needs_expiry(now) {
                r.status = RedemptionStatus::Expired;
                r.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn get_achievement(
        &self,
        achievement_type: AchievementType,
    ) -> Result<Option<Achievement>> {
        let state = self.state.lock().await;
        Ok(state
            .tables
            .achievements
            .iter()
            .find(|a| a.achievement_type == achievement_type)
            .cloned())
    }

    async fn earn_achievement(
        &self,
        user_id: &str,
        achievement_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.take_fault(FaultPoint::EarnAchievement)?;

        let key = (user_id.to_string(), achievement_id);
        if state.tables.user_achievements.contains_key(&key) {
            return Ok(false);
        }
        state.tables.user_achievements.insert(
            key,
            UserAchievement {
                user_id: user_id.to_string(),
                achievement_id,
                earned_at: now,
                notice: true,
            },
        );
        Ok(true)
    }

    async fn list_user_achievements(&self, user_id: &str) -> Result<Vec<EarnedAchievement>> {
        let state = self.state.lock().await;
        let tables = &state.tables;
        let mut earned: Vec<EarnedAchievement> = tables
            .user_achievements
            .values()
            .filter(|ua| ua.user_id == user_id)
            .filter_map(|ua| {
                tables
                    .achievements
                    .iter()
                    .find(|a| a.id == ua.achievement_id)
                    .map(|a| EarnedAchievement::from_parts(a, ua))
            })
            .collect();
        earned.sort_by_key(|e| (e.earned_at, e.achievement_id));
        Ok(earned)
    }

    async fn acknowledge_achievement(&self, user_id: &str, achievement_id: i64) -> Result<bool> {
        let mut state = self.state.lock().await;
        let key = (user_id.to_string(), achievement_id);
        Ok(match state.tables.user_achievements.get_mut(&key) {
            Some(ua) => {
                ua.notice = false;
                true
            }
            None => false,
        })
    }

    async fn list_undelivered_events(&self, limit: i64) -> Result<Vec<LifecycleEvent>> {
        let state = self.state.lock().await;
        Ok(state
            .tables
            .events
            .values()
            .filter(|e| !e.is_delivered())
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_event_delivered(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(event) = state.tables.events.get_mut(&id) {
            event.delivered_at.get_or_insert(now);
        }
        Ok(())
    }
}

/// 内存事务
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: Tables,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_reward(&mut self, id: i64) -> Result<Option<Reward>> {
        Ok(self.staged.rewards.get(&id).cloned())
    }

    async fn lock_user(&mut self, id: &str) -> Result<Option<User>> {
        Ok(self.staged.users.get(id).cloned())
    }

    async fn count_redemptions_by_user(&mut self, reward_id: i64, user_id: &str) -> Result<i64> {
        Ok(self.staged.count_by_user(reward_id, user_id))
    }

    async fn count_total_redemptions(&mut self, reward_id: i64) -> Result<i64> {
        Ok(self.staged.count_total(reward_id))
    }

    async fn count_user_redemptions(&mut self, user_id: &str) -> Result<i64> {
        Ok(self
            .staged
            .redemptions
            .values()
            .filter(|r| r.user_id == user_id)
            .count() as i64)
    }

    async fn debit_points(
        &mut self,
        user_id: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let user = self
            .staged
            .users
            .get_mut(user_id)
            .ok_or_else(|| RedemptionError::not_found("user", user_id))?;

        if user.points < amount {
            return Err(RedemptionError::InsufficientPoints {
                required: amount,
                available: user.points,
            });
        }
        user.points -= amount;
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn insert_redemption(&mut self, new: &NewRedemption) -> Result<Redemption> {
        self.guard.take_fault(FaultPoint::InsertRedemption)?;

        let id = self.staged.next_redemption_id;
        self.staged.next_redemption_id += 1;
        let redemption = Redemption {
            id,
            user_id: new.user_id.clone(),
            reward_id: new.reward_id,
            status: RedemptionStatus::Pending,
            created_at: new.created_at,
            collect_by: new.collect_by,
            collected_at: None,
            updated_at: new.created_at,
        };
        self.staged.redemptions.insert(id, redemption.clone());
        Ok(redemption)
    }

    async fn insert_event(&mut self, new: &NewLifecycleEvent) -> Result<LifecycleEvent> {
        self.guard.take_fault(FaultPoint::InsertEvent)?;

        let id = self.staged.next_event_id;
        self.staged.next_event_id += 1;
        let event = LifecycleEvent {
            id,
            event_type: new.event_type,
            payload: new.payload.clone(),
            created_at: new.created_at,
            delivered_at: None,
        };
        self.staged.events.insert(id, event.clone());
        Ok(event)
    }

    async fn commit(mut self) -> Result<()> {
        self.guard.take_fault(FaultPoint::Commit)?;
        self.guard.tables = self.staged;
        Ok(())
    }
}
