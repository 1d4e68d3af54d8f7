//! PostgreSQL 存储实现
//!
//! 兑换事务内对奖品行和用户行使用 `SELECT ... FOR UPDATE` 加锁；
//! 状态流转使用 `WHERE status = 'PENDING'` 条件更新，并发下只会有一方成功。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use super::traits::{RewardsStore, StoreTransaction};
use crate::error::{RedemptionError, Result};
use crate::models::{
    Achievement, AchievementType, EarnedAchievement, LifecycleEvent, NewLifecycleEvent,
    NewRedemption, NewReward, NewUser, Redemption, RedemptionQuery, Reward, RewardFilter, User,
};

const REWARD_COLUMNS: &str = "id, title, description, points, start_date, end_date, \
     max_each_redeem, max_total_redeem, category, created_at, updated_at";

const USER_COLUMNS: &str = "id, name, email, points, created_at, updated_at";

const REDEMPTION_COLUMNS: &str =
    "id, user_id, reward_id, status, created_at, collect_by, collected_at, updated_at";

const EVENT_COLUMNS: &str = "id, event_type, payload, created_at, delivered_at";

/// PostgreSQL 存储
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// 唯一约束/外键冲突映射为业务冲突
fn map_constraint(err: sqlx::Error, message: impl FnOnce() -> String) -> RedemptionError {
    match &err {
        sqlx::Error::Database(db)
            if db.is_unique_violation() || db.is_foreign_key_violation() =>
        {
            RedemptionError::Conflict(message())
        }
        _ => RedemptionError::Storage(err),
    }
}

fn push_redemption_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &RedemptionQuery) {
    qb.push(" WHERE 1 = 1");
    if let Some(user_id) = &query.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.clone());
    }
    if let Some(reward_id) = query.reward_id {
        qb.push(" AND reward_id = ").push_bind(reward_id);
    }
    if let Some(status) = query.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(from) = query.created_from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = query.created_to {
        qb.push(" AND created_at <= ").push_bind(to);
    }
}

#[async_trait]
impl RewardsStore for PgStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction> {
        Ok(PgTransaction {
            tx: self.pool.begin().await?,
        })
    }

    async fn get_reward(&self, id: i64) -> Result<Option<Reward>> {
        let reward = sqlx::query_as::<_, Reward>(&format!(
            "SELECT {} FROM rewards WHERE id = $1",
            REWARD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reward)
    }

    async fn list_rewards(&self, filter: &RewardFilter) -> Result<Vec<Reward>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM rewards WHERE 1 = 1",
            REWARD_COLUMNS
        ));
        if let Some(category) = &filter.category {
            qb.push(" AND category = ").push_bind(category.clone());
        }
        if let Some(at) = filter.active_at {
            qb.push(" AND start_date <= ")
                .push_bind(at)
                .push(" AND end_date >= ")
                .push_bind(at);
        }
        qb.push(" ORDER BY id ASC");

        let rewards = qb.build_query_as::<Reward>().fetch_all(&self.pool).await?;
        Ok(rewards)
    }

    async fn create_reward(&self, input: &NewReward, now: DateTime<Utc>) -> Result<Reward> {
        let reward = sqlx::query_as::<_, Reward>(&format!(
            r#"
            INSERT INTO rewards (title, description, points, start_date, end_date,
                                 max_each_redeem, max_total_redeem, category, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING {}
            "#,
            REWARD_COLUMNS
        ))
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.points)
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(input.max_each_redeem)
        .bind(input.max_total_redeem)
        .bind(&input.category)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(reward)
    }

    async fn update_reward(
        &self,
        id: i64,
        input: &NewReward,
        now: DateTime<Utc>,
    ) -> Result<Option<Reward>> {
        let reward = sqlx::query_as::<_, Reward>(&format!(
            r#"
            UPDATE rewards
            SET title = $2, description = $3, points = $4, start_date = $5, end_date = $6,
                max_each_redeem = $7, max_total_redeem = $8, category = $9, updated_at = $10
            WHERE id = $1
            RETURNING {}
            "#,
            REWARD_COLUMNS
        ))
        .bind(id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.points)
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(input.max_each_redeem)
        .bind(input.max_total_redeem)
        .bind(&input.category)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reward)
    }

    async fn delete_reward(&self, id: i64) -> Result<bool> {
        let referenced: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM redemptions WHERE reward_id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        if referenced {
            return Err(RedemptionError::Conflict(format!(
                "reward {} is referenced by redemptions",
                id
            )));
        }

        // 检查与删除之间插入的兑换记录由外键兜底
        let result = sqlx::query("DELETE FROM rewards WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                map_constraint(e, || format!("reward {} is referenced by redemptions", id))
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_redemptions_by_user(&self, reward_id: i64, user_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM redemptions WHERE reward_id = $1 AND user_id = $2",
        )
        .bind(reward_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_total_redemptions(&self, reward_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM redemptions WHERE reward_id = $1")
            .bind(reward_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_user(&self, input: &NewUser, now: DateTime<Utc>) -> Result<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, name, email, points, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&input.id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(input.points)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_constraint(e, || format!("user {} already exists", input.id)))
    }

    async fn credit_points(
        &self,
        user_id: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        // 余额上限条件放在 WHERE 中，溢出时不更新
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET points = points + $2, updated_at = $3 \
             WHERE id = $1 AND points <= $4 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(amount)
        .bind(now)
        .bind(i64::MAX.saturating_sub(amount))
        .fetch_optional(&self.pool)
        .await?;

        if user.is_some() {
            return Ok(user);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Err(RedemptionError::balance_overflow())
        } else {
            Ok(None)
        }
    }

    async fn get_redemption(&self, id: i64) -> Result<Option<Redemption>> {
        let redemption = sqlx::query_as::<_, Redemption>(&format!(
            "SELECT {} FROM redemptions WHERE id = $1",
            REDEMPTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(redemption)
    }

    async fn list_redemptions(&self, query: &RedemptionQuery) -> Result<(Vec<Redemption>, i64)> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM redemptions");
        push_redemption_filters(&mut count_qb, query);
        let total = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM redemptions",
            REDEMPTION_COLUMNS
        ));
        push_redemption_filters(&mut qb, query);
        // 排序列和方向来自枚举，不拼接用户输入
        qb.push(format!(
            " ORDER BY {col} {dir}, id {dir}",
            col = query.sort_by.column(),
            dir = query.order.sql()
        ));
        qb.push(" LIMIT ")
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(query.offset);

        let items = qb
            .build_query_as::<Redemption>()
            .fetch_all(&self.pool)
            .await?;
        Ok((items, total))
    }

    async fn mark_collected(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Redemption>> {
        let redemption = sqlx::query_as::<_, Redemption>(&format!(
            r#"
            UPDATE redemptions
            SET status = 'COLLECTED', collected_at = $2, updated_at = $2
            WHERE id = $1 AND status = 'PENDING' AND collect_by >= $2
            RETURNING {}
            "#,
            REDEMPTION_COLUMNS
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(redemption)
    }

    async fn mark_expired(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Redemption>> {
        let redemption = sqlx::query_as::<_, Redemption>(&format!(
            r#"
            UPDATE redemptions
            SET status = 'EXPIRED', updated_at = $2
            WHERE id = $1 AND status = 'PENDING' AND collect_by < $2
            RETURNING {}
            "#,
            REDEMPTION_COLUMNS
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(redemption)
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE redemptions
            SET status = 'EXPIRED', updated_at = $1
            WHERE status = 'PENDING' AND collect_by < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn get_achievement(
        &self,
        achievement_type: AchievementType,
    ) -> Result<Option<Achievement>> {
        let achievement = sqlx::query_as::<_, Achievement>(
            "SELECT id, achievement_type, title, description FROM achievements WHERE achievement_type = $1",
        )
        .bind(achievement_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(achievement)
    }

    async fn earn_achievement(
        &self,
        user_id: &str,
        achievement_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_achievements (user_id, achievement_id, earned_at, notice)
            VALUES ($1, $2, $3, TRUE)
            ON CONFLICT (user_id, achievement_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(achievement_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_user_achievements(&self, user_id: &str) -> Result<Vec<EarnedAchievement>> {
        let earned = sqlx::query_as::<_, EarnedAchievement>(
            r#"
            SELECT a.id AS achievement_id, a.achievement_type, a.title, a.description,
                   ua.earned_at, ua.notice
            FROM user_achievements ua
            JOIN achievements a ON a.id = ua.achievement_id
            WHERE ua.user_id = $1
            ORDER BY ua.earned_at ASC, a.id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(earned)
    }

    async fn acknowledge_achievement(&self, user_id: &str, achievement_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE user_achievements SET notice = FALSE WHERE user_id = $1 AND achievement_id = $2",
        )
        .bind(user_id)
        .bind(achievement_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_undelivered_events(&self, limit: i64) -> Result<Vec<LifecycleEvent>> {
        let events = sqlx::query_as::<_, LifecycleEvent>(&format!(
            r#"
            SELECT {}
            FROM lifecycle_events
            WHERE delivered_at IS NULL
            ORDER BY id ASC
            LIMIT $1
            "#,
            EVENT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn mark_event_delivered(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE lifecycle_events SET delivered_at = $2 WHERE id = $1 AND delivered_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// PostgreSQL 事务
///
/// drop 时未提交的 sqlx 事务自动回滚
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn lock_reward(&mut self, id: i64) -> Result<Option<Reward>> {
        let reward = sqlx::query_as::<_, Reward>(&format!(
            "SELECT {} FROM rewards WHERE id = $1 FOR UPDATE",
            REWARD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(reward)
    }

    async fn lock_user(&mut self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn count_redemptions_by_user(&mut self, reward_id: i64, user_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM redemptions WHERE reward_id = $1 AND user_id = $2",
        )
        .bind(reward_id)
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count)
    }

    async fn count_total_redemptions(&mut self, reward_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM redemptions WHERE reward_id = $1")
            .bind(reward_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(count)
    }

    async fn count_user_redemptions(&mut self, user_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM redemptions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(count)
    }

    async fn debit_points(
        &mut self,
        user_id: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET points = points - $2, updated_at = $3
            WHERE id = $1 AND points >= $2
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(amount)
        .bind(now)
        .fetch_optional(&mut *self.tx)
        .await?;

        match user {
            Some(user) => Ok(user),
            None => {
                let available: Option<i64> =
                    sqlx::query_scalar("SELECT points FROM users WHERE id = $1")
                        .bind(user_id)
                        .fetch_optional(&mut *self.tx)
                        .await?;
                match available {
                    Some(available) => Err(RedemptionError::InsufficientPoints {
                        required: amount,
                        available,
                    }),
                    None => Err(RedemptionError::not_found("user", user_id)),
                }
            }
        }
    }

    async fn insert_redemption(&mut self, new: &NewRedemption) -> Result<Redemption> {
        let redemption = sqlx::query_as::<_, Redemption>(&format!(
            r#"
            INSERT INTO redemptions (user_id, reward_id, status, created_at, collect_by, updated_at)
            VALUES ($1, $2, 'PENDING', $3, $4, $3)
            RETURNING {}
            "#,
            REDEMPTION_COLUMNS
        ))
        .bind(&new.user_id)
        .bind(new.reward_id)
        .bind(new.created_at)
        .bind(new.collect_by)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(redemption)
    }

    async fn insert_event(&mut self, new: &NewLifecycleEvent) -> Result<LifecycleEvent> {
        let event = sqlx::query_as::<_, LifecycleEvent>(&format!(
            r#"
            INSERT INTO lifecycle_events (event_type, payload, created_at)
            VALUES ($1, $2, $3)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(new.event_type)
        .bind(&new.payload)
        .bind(new.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(event)
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
