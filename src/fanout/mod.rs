//! 경매 룸 단위 실시간 이벤트 전파
//!
//! rooms: 경매 id -> 연결 집합, room_of: 연결 -> 경매 id.
//! 연결 하나는 최대 한 룸에만 속한다.
//! 연결마다 bounded mpsc 큐와 전송 태스크가 있고, broadcast 는 `try_send` 만 사용하므로
//! 느린 연결이 다른 연결을 막지 않는다.
pub mod session;

// region:    --- Imports
use crate::auction::events::DomainEvent;
use crate::auction::model::AuctionId;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

// endregion: --- Imports

pub type ConnectionId = u64;

// region:    --- Settings
/// 큐가 가득 찬 연결 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlowConsumerPolicy {
    /// 전송 실패로 보고 연결을 끊는다
    #[default]
    Disconnect,
    /// 해당 연결에서만 이번 메시지를 버린다
    DropMessage,
}

#[derive(Debug, Clone)]
pub struct FanoutSettings {
    pub queue_capacity: usize,
    pub slow_consumer_policy: SlowConsumerPolicy,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            slow_consumer_policy: SlowConsumerPolicy::Disconnect,
        }
    }
}
// endregion: --- Settings

// region:    --- Errors
#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("이벤트 직렬화 실패: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("등록되지 않은 연결: {0}")]
    UnknownConnection(ConnectionId),
}
// endregion: --- Errors

// region:    --- Publisher
/// 도메인 이벤트 발행 인터페이스
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// 전달된 연결 수를 돌려준다
    async fn publish(&self, event: &DomainEvent) -> Result<usize, FanoutError>;
}
// endregion: --- Publisher

// region:    --- Connection
struct ConnectionHandle {
    subject: String,
    outbound: mpsc::Sender<Arc<str>>,
    closed: Arc<Notify>,
}

/// 세션 쪽에 넘겨주는 연결 끝점
pub struct Connection {
    pub id: ConnectionId,
    pub outbound: mpsc::Receiver<Arc<str>>,
    /// 서버가 연결을 끊을 때 알림
    pub closed: Arc<Notify>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutStats {
    pub active_sessions: usize,
    pub active_rooms: usize,
}
// endregion: --- Connection

// region:    --- Event Fanout
pub struct EventFanout {
    settings: FanoutSettings,
    next_id: AtomicU64,
    connections: DashMap<ConnectionId, ConnectionHandle>,
    rooms: DashMap<AuctionId, HashSet<ConnectionId>>,
    room_of: DashMap<ConnectionId, AuctionId>,
}

impl EventFanout {
    pub fn new(settings: FanoutSettings) -> Self {
        Self {
            settings,
            next_id: AtomicU64::new(1),
            connections: DashMap::new(),
            rooms: DashMap::new(),
            room_of: DashMap::new(),
        }
    }

    /// 인증된 연결 등록
    pub fn connect(&self, subject: &str) -> Connection {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.settings.queue_capacity.max(1));
        let closed = Arc::new(Notify::new());

        self.connections.insert(
            id,
            ConnectionHandle {
                subject: subject.to_string(),
                outbound: tx,
                closed: Arc::clone(&closed),
            },
        );
        debug!("{:<12} --> 연결 등록: conn={}, {}", "Fanout", id, subject);

        Connection {
            id,
            outbound: rx,
            closed,
        }
    }

    /// 룸 입장 (기존 룸에서 먼저 나간다)
    pub fn join(&self, connection: ConnectionId, auction_id: AuctionId) -> Result<(), FanoutError> {
        if !self.connections.contains_key(&connection) {
            return Err(FanoutError::UnknownConnection(connection));
        }

        self.leave(connection);
        self.rooms.entry(auction_id).or_default().insert(connection);
        self.room_of.insert(connection, auction_id);

        info!(
            "{:<12} --> 룸 입장: conn={}, auction={}",
            "Fanout", connection, auction_id
        );
        Ok(())
    }

    /// 현재 룸에서 나가기. 빈 룸은 제거
    pub fn leave(&self, connection: ConnectionId) -> Option<AuctionId> {
        let (_, auction_id) = self.room_of.remove(&connection)?;

        if let Some(mut members) = self.rooms.get_mut(&auction_id) {
            members.remove(&connection);
        }
        self.rooms.remove_if(&auction_id, |_, members| members.is_empty());

        debug!(
            "{:<12} --> 룸 퇴장: conn={}, auction={}",
            "Fanout", connection, auction_id
        );
        Some(auction_id)
    }

    /// 룸 퇴장 후 연결 등록과 큐 해제
    pub fn disconnect(&self, connection: ConnectionId) {
        self.leave(connection);
        if let Some((_, handle)) = self.connections.remove(&connection) {
            handle.closed.notify_one();
            debug!(
                "{:<12} --> 연결 해제: conn={}, {}",
                "Fanout", connection, handle.subject
            );
        }
    }

    /// 룸 전체에 이벤트 전송 (직렬화는 한 번만)
    pub fn broadcast(&self, auction_id: AuctionId, event: &DomainEvent) -> Result<usize, FanoutError> {
        let payload: Arc<str> = Arc::from(serde_json::to_string(event)?);

        // 전송 중에는 룸 락을 잡지 않는다
        let members: Vec<ConnectionId> = match self.rooms.get(&auction_id) {
            Some(room) => room.iter().copied().collect(),
            None => return Ok(0),
        };

        let mut delivered = 0;
        let mut failed = Vec::new();

        for id in members {
            let Some(handle) = self.connections.get(&id) else {
                failed.push(id);
                continue;
            };
            match handle.outbound.try_send(Arc::clone(&payload)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Closed(_)) => failed.push(id),
                Err(TrySendError::Full(_)) => match self.settings.slow_consumer_policy {
                    SlowConsumerPolicy::Disconnect => {
                        warn!("{:<12} --> 큐 초과로 연결 종료: conn={}", "Fanout", id);
                        failed.push(id);
                    }
                    SlowConsumerPolicy::DropMessage => {
                        warn!("{:<12} --> 큐 초과로 메시지 누락: conn={}", "Fanout", id);
                    }
                },
            }
        }

        for id in failed {
            self.disconnect(id);
        }

        debug!(
            "{:<12} --> {} 전송: auction={}, 수신 {}",
            "Fanout",
            event.name(),
            auction_id,
            delivered
        );
        Ok(delivered)
    }

    /// 특정 연결에만 메시지 전송 (오류 알림 등)
    pub fn send_to(&self, connection: ConnectionId, payload: &str) -> bool {
        self.connections
            .get(&connection)
            .is_some_and(|handle| handle.outbound.try_send(Arc::from(payload)).is_ok())
    }

    pub fn room_of(&self, connection: ConnectionId) -> Option<AuctionId> {
        self.room_of.get(&connection).map(|entry| *entry)
    }

    pub fn room_size(&self, auction_id: AuctionId) -> usize {
        self.rooms.get(&auction_id).map_or(0, |room| room.len())
    }

    pub fn stats(&self) -> FanoutStats {
        FanoutStats {
            active_sessions: self.connections.len(),
            active_rooms: self.rooms.len(),
        }
    }
}

impl Default for EventFanout {
    fn default() -> Self {
        Self::new(FanoutSettings::default())
    }
}

#[async_trait]
impl EventPublisher for EventFanout {
    async fn publish(&self, event: &DomainEvent) -> Result<usize, FanoutError> {
        self.broadcast(event.auction_id(), event)
    }
}
// endregion: --- Event Fanout
