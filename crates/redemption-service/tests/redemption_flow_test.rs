//! 兑换全流程集成测试
//!
//! 使用内存存储驱动完整的服务栈：兑换、并发上限、领取与过期、成就投递。

mod common;

use chrono::{Duration, Utc};
use redemption::models::{AchievementType, RedemptionStatus};
use redemption::repository::FaultPoint;
use redemption::{RedemptionError, RewardsStore};
use tokio::task::JoinSet;

use common::{seed_reward, seed_user, test_app};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redeem_respects_total_cap() {
    let app = test_app();
    let now = Utc::now();
    let reward = seed_reward(app.store.as_ref(), 100, 1, 1, now).await;
    for i in 0..10 {
        seed_user(app.store.as_ref(), &format!("user-{i}"), 1000, None, now).await;
    }

    let mut tasks = JoinSet::new();
    for i in 0..10 {
        let service = app.state.redemptions.clone();
        tasks.spawn(async move { service.redeem(&format!("user-{i}"), reward.id, now).await });
    }

    let mut succeeded = 0;
    let mut capped = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => succeeded += 1,
            Err(RedemptionError::TotalCapExceeded { .. }) => capped += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(capped, 9);
    assert_eq!(app.store.count_total_redemptions(reward.id).await.unwrap(), 1);

    // 只有成功的用户被扣分
    let mut balances = Vec::new();
    for i in 0..10 {
        let user = app.store.get_user(&format!("user-{i}")).await.unwrap().unwrap();
        balances.push(user.points);
    }
    assert_eq!(balances.iter().filter(|&&p| p == 900).count(), 1);
    assert_eq!(balances.iter().filter(|&&p| p == 1000).count(), 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redeem_by_same_user_respects_per_user_cap() {
    let app = test_app();
    let now = Utc::now();
    let reward = seed_reward(app.store.as_ref(), 10, 2, 100, now).await;
    seed_user(app.store.as_ref(), "u1", 1000, None, now).await;

    let mut tasks = JoinSet::new();
    for _ in 0..6 {
        let service = app.state.redemptions.clone();
        tasks.spawn(async move { service.redeem("u1", reward.id, now).await });
    }

    let mut succeeded = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert_eq!(e.error_code(), "PER_USER_CAP_EXCEEDED"),
        }
    }

    assert_eq!(succeeded, 2);
    let user = app.store.get_user("u1").await.unwrap().unwrap();
    assert_eq!(user.points, 980);
}

#[tokio::test]
async fn test_insufficient_points_changes_nothing() {
    let app = test_app();
    let now = Utc::now();
    let reward = seed_reward(app.store.as_ref(), 100, 1, 10, now).await;
    seed_user(app.store.as_ref(), "u1", 50, None, now).await;

    let err = app
        .state
        .redemptions
        .redeem("u1", reward.id, now)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RedemptionError::InsufficientPoints {
            required: 100,
            available: 50
        }
    ));

    let user = app.store.get_user("u1").await.unwrap().unwrap();
    assert_eq!(user.points, 50);
    assert!(app.store.all_redemptions().await.is_empty());
    assert!(app.store.all_events().await.is_empty());
}

#[tokio::test]
async fn test_precondition_order() {
    let app = test_app();
    let now = Utc::now();
    let reward = seed_reward(app.store.as_ref(), 100, 1, 1, now).await;
    seed_user(app.store.as_ref(), "rich", 1000, None, now).await;
    seed_user(app.store.as_ref(), "poor", 0, None, now).await;

    let service = &app.state.redemptions;
    service.redeem("rich", reward.id, now).await.unwrap();

    // 个人上限先于总量上限
    assert_eq!(
        service.redeem("rich", reward.id, now).await.unwrap_err().error_code(),
        "PER_USER_CAP_EXCEEDED"
    );
    // 总量上限先于积分余额
    assert_eq!(
        service.redeem("poor", reward.id, now).await.unwrap_err().error_code(),
        "TOTAL_CAP_EXCEEDED"
    );
    // 兑换窗口先于其他所有条件
    assert_eq!(
        service
            .redeem("rich", reward.id, now + Duration::days(30))
            .await
            .unwrap_err()
            .error_code(),
        "REWARD_UNAVAILABLE"
    );
    assert_eq!(
        service.redeem("rich", 9999, now).await.unwrap_err().error_code(),
        "REWARD_UNAVAILABLE"
    );
}

#[tokio::test]
async fn test_collect_after_window_expires() {
    let app = test_app();
    let now = Utc::now();
    let reward = seed_reward(app.store.as_ref(), 100, 1, 10, now).await;
    seed_user(app.store.as_ref(), "u1", 500, None, now).await;

    let service = &app.state.redemptions;
    let r = service.redeem("u1", reward.id, now).await.unwrap();
    assert_eq!(r.status, RedemptionStatus::Pending);
    assert_eq!(r.collect_by, now + Duration::days(30));

    let later = now + Duration::days(31);
    assert!(matches!(
        service.collect_owned("u1", r.id, later).await,
        Err(RedemptionError::RedemptionExpired(id)) if id == r.id
    ));

    let stored = app.store.get_redemption(r.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RedemptionStatus::Expired);

    // 积分不退还
    let user = app.store.get_user("u1").await.unwrap().unwrap();
    assert_eq!(user.points, 400);
}

#[tokio::test]
async fn test_collect_twice_is_idempotent() {
    let app = test_app();
    let now = Utc::now();
    let reward = seed_reward(app.store.as_ref(), 100, 1, 10, now).await;
    seed_user(app.store.as_ref(), "u1", 500, None, now).await;

    let service = &app.state.redemptions;
    let r = service.redeem("u1", reward.id, now).await.unwrap();

    let first = service
        .collect_owned("u1", r.id, now + Duration::days(1))
        .await
        .unwrap();
    let second = service
        .collect_owned("u1", r.id, now + Duration::days(2))
        .await
        .unwrap();

    assert_eq!(first.status, RedemptionStatus::Collected);
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_collect_and_sweep_settle_once() {
    let app = test_app();
    let now = Utc::now();
    let reward = seed_reward(app.store.as_ref(), 1, 1, 10, now).await;
    seed_user(app.store.as_ref(), "u1", 10, None, now).await;

    let service = app.state.redemptions.clone();
    let r = service.redeem("u1", reward.id, now).await.unwrap();
    let deadline = r.collect_by;

    let collector = {
        let service = service.clone();
        tokio::spawn(async move { service.collect(r.id, deadline).await })
    };
    let sweeper = {
        let service = service.clone();
        tokio::spawn(async move { service.expire_overdue(deadline).await })
    };

    // 截止时刻本身仍可领取，扫描不会过期该记录
    let collected = collector.await.unwrap().unwrap();
    assert_eq!(collected.status, RedemptionStatus::Collected);
    assert_eq!(sweeper.await.unwrap().unwrap(), 0);
}

#[tokio::test]
async fn test_first_redemption_achievement_and_mail() {
    let app = test_app();
    let now = Utc::now();
    let reward = seed_reward(app.store.as_ref(), 100, 5, 10, now).await;
    seed_user(app.store.as_ref(), "u1", 1000, Some("u1@example.com"), now).await;

    let service = &app.state.redemptions;
    service.redeem("u1", reward.id, now).await.unwrap();
    service.redeem("u1", reward.id, now).await.unwrap();

    let earned = app.state.notifier.list_achievements("u1").await.unwrap();
    assert_eq!(earned.len(), 1);
    assert_eq!(earned[0].achievement_type, AchievementType::FirstRedemption);
    assert!(earned[0].notice);

    // 两封确认邮件 + 一封成就邮件
    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(
        sent.iter()
            .filter(|(_, subject)| subject.starts_with("获得新成就"))
            .count(),
        1
    );
    assert!(sent.iter().all(|(to, _)| to == "u1@example.com"));
}

#[tokio::test]
async fn test_duplicate_event_delivery_grants_once() {
    let app = test_app();
    let now = Utc::now();
    let reward = seed_reward(app.store.as_ref(), 100, 1, 10, now).await;
    seed_user(app.store.as_ref(), "u1", 1000, None, now).await;

    app.state.redemptions.redeem("u1", reward.id, now).await.unwrap();

    let events = app.store.all_events().await;
    assert_eq!(events.len(), 1);
    assert!(events[0].is_delivered());

    // 重复投递同一事件
    app.state.notifier.dispatch(&events[0], now).await.unwrap();
    app.state.notifier.dispatch(&events[0], now).await.unwrap();

    assert_eq!(app.state.notifier.list_achievements("u1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_delivery_is_picked_up_by_redelivery() {
    let app = test_app();
    let now = Utc::now();
    let reward = seed_reward(app.store.as_ref(), 100, 1, 10, now).await;
    seed_user(app.store.as_ref(), "u1", 1000, None, now).await;

    app.store.inject_fault(FaultPoint::EarnAchievement).await;
    app.state.redemptions.redeem("u1", reward.id, now).await.unwrap();

    // 兑换本身成功，成就尚未发放
    assert!(app.state.notifier.list_achievements("u1").await.unwrap().is_empty());
    assert_eq!(app.store.list_undelivered_events(10).await.unwrap().len(), 1);

    let redelivered = app.state.redemptions.redeliver_pending(10, now).await.unwrap();
    assert_eq!(redelivered, 1);
    assert_eq!(app.state.notifier.list_achievements("u1").await.unwrap().len(), 1);
    assert!(app.store.list_undelivered_events(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_commit_failure_rolls_back_everything() {
    let app = test_app();
    let now = Utc::now();
    let reward = seed_reward(app.store.as_ref(), 100, 1, 10, now).await;
    seed_user(app.store.as_ref(), "u1", 1000, None, now).await;

    for fault in [
        FaultPoint::InsertRedemption,
        FaultPoint::InsertEvent,
        FaultPoint::Commit,
    ] {
        app.store.inject_fault(fault).await;
        assert!(app.state.redemptions.redeem("u1", reward.id, now).await.is_err());

        let user = app.store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.points, 1000, "balance changed after {fault:?}");
        assert!(app.store.all_redemptions().await.is_empty());
        assert!(app.store.all_events().await.is_empty());
    }

    // 故障清除后可正常兑换
    app.state.redemptions.redeem("u1", reward.id, now).await.unwrap();
}
