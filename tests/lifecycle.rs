mod common;

use chrono::{Duration, Utc};
use common::{dec, draft, Harness};
use live_auction_service::auction::{AuctionState, DomainEvent, LifecycleError};
use live_auction_service::identity::Identity;
use live_auction_service::identity::Role;
use live_auction_service::storage::AuctionStore;

/// 생성된 경매는 예정 상태이고 현재가는 시작가
#[tokio::test]
async fn test_create_starts_scheduled() {
    let h = Harness::new();

    let auction = h
        .lifecycle
        .create("seller", draft("lamp", 100, Some(10)))
        .await
        .unwrap();

    assert_eq!(auction.state, AuctionState::Scheduled);
    assert_eq!(auction.current_price, dec(100));
    assert_eq!(auction.version, 1);
    assert!(!h.lifecycle.is_active(auction.id).await.unwrap());
}

/// 잘못된 생성 요청은 Invalid
#[tokio::test]
async fn test_create_rejects_invalid_drafts() {
    let h = Harness::new();

    let result = h.lifecycle.create("seller", draft("free", 0, None)).await;
    assert!(matches!(result, Err(LifecycleError::Invalid(_))));

    let mut past = draft("late", 100, None);
    past.start_time = Some(Utc::now() - Duration::hours(2));
    let result = h.lifecycle.create("seller", past).await;
    assert!(matches!(result, Err(LifecycleError::Invalid(_))));
}

/// 시작은 소유자만 가능하고, 다시 시작해도 그대로
#[tokio::test]
async fn test_start_is_owner_only_and_idempotent() {
    let h = Harness::new();
    let auction = h.lifecycle.create("seller", draft("clock", 50, None)).await.unwrap();

    // 소유자가 아니면 변화 없음
    assert!(h.lifecycle.start(auction.id, "intruder").await.unwrap().is_none());
    let snapshot = h.lifecycle.get_snapshot(auction.id).await.unwrap().unwrap();
    assert_eq!(snapshot.state, AuctionState::Scheduled);

    let started = h.lifecycle.start(auction.id, "seller").await.unwrap().unwrap();
    assert_eq!(started.state, AuctionState::Active);
    assert!(started.start_time.is_some());

    let again = h.lifecycle.start(auction.id, "seller").await.unwrap().unwrap();
    assert_eq!(again.version, started.version);

    // 없는 경매
    assert!(h.lifecycle.start(9999, "seller").await.unwrap().is_none());
}

/// 종료된 경매는 다시 시작할 수 없다
#[tokio::test]
async fn test_finished_auction_cannot_restart() {
    let h = Harness::new();
    let auction = h.active_auction("seller", 100, None).await;

    h.lifecycle.end(auction.id, "seller").await.unwrap().unwrap();
    let result = h.lifecycle.start(auction.id, "seller").await;
    assert!(matches!(result, Err(LifecycleError::RuleViolation(_))));
}

/// 종료 시 최고 입찰자가 낙찰자로 발행된다
#[tokio::test]
async fn test_end_announces_the_leading_bidder() {
    let h = Harness::new();
    let auction = h.active_auction("seller", 100, Some(10)).await;
    h.users.register("ana", "Ana");
    h.users.register("bruno", "Bruno");

    let ana = Identity::new("ana", Role::Participant);
    let bruno = Identity::new("bruno", Role::Participant);
    h.pipeline.submit_bid(auction.id, &ana, dec(110)).await.unwrap();
    h.pipeline.submit_bid(auction.id, &bruno, dec(150)).await.unwrap();

    let ended = h.lifecycle.end(auction.id, "seller").await.unwrap().unwrap();
    assert_eq!(ended.state, AuctionState::Finished);

    let finished: Vec<_> = h
        .publisher
        .events()
        .into_iter()
        .filter(|e| matches!(e, DomainEvent::AuctionFinished { .. }))
        .collect();
    assert_eq!(finished.len(), 1);
    match &finished[0] {
        DomainEvent::AuctionFinished { winner, .. } => assert_eq!(winner.as_deref(), Some("Bruno")),
        other => panic!("unexpected event {:?}", other),
    }

    // 이미 종료된 경매는 그대로, 이벤트 없음
    let again = h.lifecycle.end(auction.id, "seller").await.unwrap().unwrap();
    assert_eq!(again.version, ended.version);
    let finished_count = h
        .publisher
        .events()
        .iter()
        .filter(|e| matches!(e, DomainEvent::AuctionFinished { .. }))
        .count();
    assert_eq!(finished_count, 1);
}

/// 입찰 없는 경매 종료는 낙찰자 없음
#[tokio::test]
async fn test_end_without_bids_has_no_winner() {
    let h = Harness::new();
    let auction = h.active_auction("seller", 100, None).await;

    h.lifecycle.end(auction.id, "seller").await.unwrap().unwrap();

    assert!(h.publisher.events().iter().any(|e| matches!(
        e,
        DomainEvent::AuctionFinished { winner: None, .. }
    )));
}

/// 10분 남은 경매를 60분 연장하면 종료 시간 + 60분, 이벤트 1건
#[tokio::test]
async fn test_extend_adds_minutes_to_the_end_time() {
    let h = Harness::new();
    let mut request = draft("vase", 100, None);
    request.end_time = Some(Utc::now() + Duration::minutes(10));
    let created = h.lifecycle.create("seller", request).await.unwrap();
    let auction = h.lifecycle.start(created.id, "seller").await.unwrap().unwrap();
    let old_end = auction.end_time.unwrap();

    let extended = h
        .lifecycle
        .extend(auction.id, "seller", 60)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(extended.end_time, Some(old_end + Duration::minutes(60)));

    let extensions: Vec<_> = h
        .publisher
        .events()
        .into_iter()
        .filter(|e| matches!(e, DomainEvent::AuctionExtended { .. }))
        .collect();
    assert_eq!(extensions.len(), 1);
    assert_eq!(
        extensions[0],
        DomainEvent::AuctionExtended {
            auction_id: auction.id,
            new_end_time: old_end + Duration::minutes(60),
            minutes_added: 60,
        }
    );
}

/// 연장 거부 조건
#[tokio::test]
async fn test_extend_rejections() {
    let h = Harness::new();
    let auction = h.active_auction("seller", 100, None).await;

    let result = h.lifecycle.extend(auction.id, "seller", 0).await;
    assert!(matches!(result, Err(LifecycleError::Invalid(_))));

    assert!(h.lifecycle.extend(auction.id, "intruder", 30).await.unwrap().is_none());

    h.lifecycle.end(auction.id, "seller").await.unwrap();
    let result = h.lifecycle.extend(auction.id, "seller", 30).await;
    assert!(matches!(result, Err(LifecycleError::RuleViolation(_))));

    assert!(!h
        .publisher
        .events()
        .iter()
        .any(|e| matches!(e, DomainEvent::AuctionExtended { .. })));
}

/// 범위를 넘는 연장과 기간은 400 으로 거부하고 아무것도 바꾸지 않는다
#[tokio::test]
async fn test_out_of_range_durations_are_invalid() {
    let h = Harness::new();
    let auction = h.active_auction("seller", 100, None).await;

    let result = h.lifecycle.extend(auction.id, "seller", i64::MAX / 2).await;
    assert!(matches!(result, Err(LifecycleError::Invalid(_))), "{:?}", result);
    let snapshot = h.lifecycle.get_snapshot(auction.id).await.unwrap().unwrap();
    assert_eq!(snapshot.end_time, auction.end_time);
    assert_eq!(snapshot.version, auction.version);

    let mut endless = draft("endless", 100, None);
    endless.duration_days = Some(i64::MAX / 2);
    let result = h.lifecycle.create("seller", endless).await;
    assert!(matches!(result, Err(LifecycleError::Invalid(_))), "{:?}", result);
    assert_eq!(h.lifecycle.list().await.unwrap().len(), 1);
}

/// 종료 시간이 없는 예정 경매는 미래의 시작 시간부터 연장한다
#[tokio::test]
async fn test_extend_counts_from_a_future_start() {
    let h = Harness::new();
    let start = Utc::now() + Duration::hours(3);
    let mut later = draft("later", 100, None);
    later.start_time = Some(start);
    let auction = h.lifecycle.create("seller", later).await.unwrap();
    assert!(auction.end_time.is_none());

    let extended = h
        .lifecycle
        .extend(auction.id, "seller", 30)
        .await
        .unwrap()
        .unwrap();
    let end = extended.end_time.unwrap();
    assert_eq!(end, start + Duration::minutes(30));
    assert!(end > start);
}

/// 진행자 입장은 이벤트만 발행하고 상태는 그대로
#[tokio::test]
async fn test_moderation_session_signals_presence() {
    let h = Harness::new();
    let auction = h.active_auction("seller", 100, None).await;

    let joined = h
        .lifecycle
        .join_moderation_session(auction.id, "seller")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(joined.version, auction.version);
    assert!(h.publisher.events().iter().any(|e| matches!(
        e,
        DomainEvent::ModeratorJoined { moderator_name, .. } if moderator_name == "seller"
    )));

    assert!(h
        .lifecycle
        .join_moderation_session(auction.id, "intruder")
        .await
        .unwrap()
        .is_none());
    assert!(h
        .lifecycle
        .leave_moderation_session(auction.id, "seller")
        .await
        .unwrap()
        .is_some());
}

/// 진행 중 경매 삭제 거부, 그 외에는 소유자만 삭제
#[tokio::test]
async fn test_delete_rules() {
    let h = Harness::new();
    let active = h.active_auction("seller", 100, None).await;
    let result = h.lifecycle.delete(active.id, "seller").await;
    assert!(matches!(result, Err(LifecycleError::RuleViolation(_))));

    let scheduled = h.lifecycle.create("seller", draft("chair", 20, None)).await.unwrap();
    assert!(!h.lifecycle.delete(scheduled.id, "intruder").await.unwrap());
    assert!(h.lifecycle.delete(scheduled.id, "seller").await.unwrap());
    assert!(h.lifecycle.get_snapshot(scheduled.id).await.unwrap().is_none());
}

/// 가격 반영은 version 과 금액을 모두 확인한다
#[tokio::test]
async fn test_advance_price_is_version_checked() {
    let h = Harness::new();
    let auction = h.active_auction("seller", 100, None).await;

    let stale = h
        .lifecycle
        .advance_price(auction.id, auction.version - 1, dec(200))
        .await
        .unwrap();
    assert!(stale.is_none());

    let lower = h
        .lifecycle
        .advance_price(auction.id, auction.version, dec(100))
        .await
        .unwrap();
    assert!(lower.is_none());

    let updated = h
        .lifecycle
        .advance_price(auction.id, auction.version, dec(200))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.current_price, dec(200));
    assert_eq!(updated.version, auction.version + 1);
}

/// 가격 되돌리기는 version 이 그대로이고 시작가 이상일 때만
#[tokio::test]
async fn test_revert_price_is_version_checked() {
    let h = Harness::new();
    let auction = h.active_auction("seller", 100, None).await;
    let advanced = h
        .lifecycle
        .advance_price(auction.id, auction.version, dec(200))
        .await
        .unwrap()
        .unwrap();

    // 그 사이 다른 변경이 있었다면 덮어쓰지 않는다
    let stale = h
        .lifecycle
        .revert_price(auction.id, auction.version, dec(100))
        .await
        .unwrap();
    assert!(stale.is_none());

    let below_start = h
        .lifecycle
        .revert_price(auction.id, advanced.version, dec(50))
        .await
        .unwrap();
    assert!(below_start.is_none());

    let reverted = h
        .lifecycle
        .revert_price(auction.id, advanced.version, dec(100))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reverted.current_price, dec(100));
    assert_eq!(reverted.version, advanced.version + 1);
}

/// 종료 시간이 지난 진행 중 경매만 자동 종료
#[tokio::test]
async fn test_close_expired_finishes_due_auctions() {
    let h = Harness::new();
    let due = h.active_auction("seller", 100, None).await;
    let open = h.active_auction("seller", 100, None).await;

    // 저장소에서 종료 시간을 과거로 당긴다
    let mut past_due = due.clone();
    past_due.end_time = Some(Utc::now() - Duration::seconds(5));
    h.auctions.replace(&past_due).await.unwrap().unwrap();

    let closed = h.lifecycle.close_expired(Utc::now()).await.unwrap();

    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].id, due.id);
    assert_eq!(
        h.lifecycle.get_snapshot(open.id).await.unwrap().unwrap().state,
        AuctionState::Active
    );
    assert!(h.publisher.events().iter().any(|e| matches!(
        e,
        DomainEvent::AuctionFinished { auction_id, .. } if *auction_id == due.id
    )));
}
