use chrono::Utc;
use live_auction_service::auction::DomainEvent;
use live_auction_service::fanout::{EventFanout, EventPublisher, FanoutSettings, SlowConsumerPolicy};
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;

fn new_bid(auction_id: i64, price: i64) -> DomainEvent {
    DomainEvent::NewBid {
        auction_id,
        new_price: Decimal::from(price),
        bidder_name: "ana".to_string(),
        timestamp: Utc::now(),
    }
}

fn fanout_with(capacity: usize, policy: SlowConsumerPolicy) -> EventFanout {
    EventFanout::new(FanoutSettings {
        queue_capacity: capacity,
        slow_consumer_policy: policy,
    })
}

/// 같은 룸의 모든 연결에 전달되고 다른 룸에는 가지 않는다
#[tokio::test]
async fn test_broadcast_reaches_every_member_of_the_room() {
    let fanout = EventFanout::default();
    let mut a = fanout.connect("a");
    let mut b = fanout.connect("b");
    let mut c = fanout.connect("c");
    fanout.join(a.id, 1).unwrap();
    fanout.join(b.id, 1).unwrap();
    fanout.join(c.id, 2).unwrap();

    let delivered = fanout.broadcast(1, &new_bid(1, 110)).unwrap();
    assert_eq!(delivered, 2);

    for conn in [&mut a, &mut b] {
        let payload = conn.outbound.recv().await.unwrap();
        let json: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(json["event"], "nueva_puja");
        assert_eq!(json["data"]["subastaId"], 1);
    }
    assert!(c.outbound.try_recv().is_err());
}

/// 두 번 입장하면 마지막 룸에만 속한다
#[test]
fn test_joining_twice_keeps_only_the_latest_room() {
    let fanout = EventFanout::default();
    let conn = fanout.connect("ana");

    fanout.join(conn.id, 1).unwrap();
    fanout.join(conn.id, 2).unwrap();

    assert_eq!(fanout.room_of(conn.id), Some(2));
    assert_eq!(fanout.room_size(1), 0);
    assert_eq!(fanout.room_size(2), 1);
    assert_eq!(fanout.stats().active_rooms, 1);

    // 같은 룸 재입장
    fanout.join(conn.id, 2).unwrap();
    assert_eq!(fanout.room_size(2), 1);
}

/// 연결 해제는 룸과 큐를 모두 정리한다
#[tokio::test]
async fn test_disconnect_releases_room_and_queue() {
    let fanout = EventFanout::default();
    let mut conn = fanout.connect("ana");
    fanout.join(conn.id, 5).unwrap();
    assert_eq!(fanout.stats().active_sessions, 1);

    fanout.disconnect(conn.id);

    let stats = fanout.stats();
    assert_eq!(stats.active_sessions, 0);
    assert_eq!(stats.active_rooms, 0);
    assert!(conn.outbound.recv().await.is_none());
    assert_eq!(fanout.broadcast(5, &new_bid(5, 200)).unwrap(), 0);
}

/// 수신 측이 닫힌 연결은 broadcast 중에 제거된다
#[test]
fn test_closed_connections_are_swept_during_broadcast() {
    let fanout = EventFanout::default();
    let alive = fanout.connect("alive");
    let gone = fanout.connect("gone");
    fanout.join(alive.id, 3).unwrap();
    fanout.join(gone.id, 3).unwrap();

    let gone_id = gone.id;
    drop(gone);

    let delivered = fanout.broadcast(3, &new_bid(3, 150)).unwrap();
    assert_eq!(delivered, 1);
    assert_eq!(fanout.room_size(3), 1);
    assert_eq!(fanout.room_of(gone_id), None);
    assert_eq!(fanout.stats().active_sessions, 1);
}

/// 큐가 가득 찬 연결은 기본 정책에서 끊기고 세션에 알린다
#[tokio::test]
async fn test_slow_consumer_is_disconnected_by_default() {
    let fanout = fanout_with(1, SlowConsumerPolicy::Disconnect);
    let slow = fanout.connect("slow");
    let mut fast = fanout.connect("fast");
    fanout.join(slow.id, 8).unwrap();
    fanout.join(fast.id, 8).unwrap();

    assert_eq!(fanout.broadcast(8, &new_bid(8, 110)).unwrap(), 2);
    fast.outbound.recv().await.unwrap();

    // slow 는 아직 첫 메시지를 읽지 않았다
    assert_eq!(fanout.broadcast(8, &new_bid(8, 120)).unwrap(), 1);
    assert_eq!(fanout.room_of(slow.id), None);
    assert_eq!(fanout.room_size(8), 1);

    tokio::time::timeout(Duration::from_secs(1), slow.closed.notified())
        .await
        .expect("세션 종료 알림이 없음");
}

/// drop 정책이면 메시지만 버리고 연결은 유지
#[test]
fn test_drop_policy_keeps_slow_consumers() {
    let fanout = fanout_with(1, SlowConsumerPolicy::DropMessage);
    let mut slow = fanout.connect("slow");
    fanout.join(slow.id, 8).unwrap();

    assert_eq!(fanout.broadcast(8, &new_bid(8, 110)).unwrap(), 1);
    assert_eq!(fanout.broadcast(8, &new_bid(8, 120)).unwrap(), 0);

    assert_eq!(fanout.room_of(slow.id), Some(8));
    let first = slow.outbound.try_recv().unwrap();
    assert!(first.contains("110"));
    assert!(slow.outbound.try_recv().is_err());
}

/// EventPublisher 로 발행하면 이벤트의 경매 룸으로 간다
#[tokio::test]
async fn test_publisher_routes_by_event_auction() {
    let fanout = EventFanout::default();
    let mut conn = fanout.connect("ana");
    fanout.join(conn.id, 4).unwrap();

    let event = DomainEvent::AuctionFinished {
        auction_id: 4,
        winner: Some("Bruno".to_string()),
        finish_time: Utc::now(),
    };
    assert_eq!(fanout.publish(&event).await.unwrap(), 1);

    let json: Value = serde_json::from_str(&conn.outbound.recv().await.unwrap()).unwrap();
    assert_eq!(json["event"], "subasta_finalizada");
    assert_eq!(json["data"]["ganador"], "Bruno");
}

/// 룸 없는 경매로의 broadcast 는 아무 일도 하지 않는다
#[test]
fn test_broadcast_to_empty_room() {
    let fanout = EventFanout::default();
    assert_eq!(fanout.broadcast(77, &new_bid(77, 1)).unwrap(), 0);
    assert_eq!(fanout.stats().active_rooms, 0);
}
