#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use live_auction_service::auction::{Auction, AuctionDraft, AuctionLifecycleManager, DomainEvent};
use live_auction_service::bidding::{AdmissionSettings, BidAdmissionPipeline};
use live_auction_service::clients::InMemoryUserDirectory;
use live_auction_service::fanout::{EventPublisher, FanoutError};
use live_auction_service::identity::Claims;
use live_auction_service::storage::{InMemoryAuctionStore, InMemoryBidStore, InMemorySettlement};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const SECRET: &str = "integration-test-secret";

/// 트레이싱 초기화 (여러 번 호출해도 안전)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .without_time()
        .with_target(false)
        .with_test_writer()
        .try_init();
}

pub fn dec(v: i64) -> Decimal {
    Decimal::from(v)
}

/// 테스트용 JWT 발급
pub fn token(subject: &str, role: &str) -> String {
    let claims = Claims {
        sub: subject.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
        role: Some(role.to_string()),
        token_type: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("토큰 생성 실패")
}

pub fn draft(description: &str, starting_price: i64, increment: Option<i64>) -> AuctionDraft {
    AuctionDraft {
        description: description.to_string(),
        category: "test".to_string(),
        starting_price: dec(starting_price),
        minimum_increment: increment.map(dec),
        start_time: None,
        end_time: None,
        duration_days: None,
    }
}

// region:    --- Recording Publisher
/// 발행된 이벤트를 기록하는 발행기
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DomainEvent>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        let publisher = Self::default();
        publisher.fail.store(true, Ordering::SeqCst);
        publisher
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<usize, FanoutError> {
        self.events.lock().push(event.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(FanoutError::UnknownConnection(0));
        }
        Ok(1)
    }
}
// endregion: --- Recording Publisher

// region:    --- Harness
/// 인메모리 구성 요소 묶음
pub struct Harness {
    pub auctions: Arc<InMemoryAuctionStore>,
    pub bids: Arc<InMemoryBidStore>,
    pub settlement: Arc<InMemorySettlement>,
    pub publisher: Arc<RecordingPublisher>,
    pub users: Arc<InMemoryUserDirectory>,
    pub lifecycle: Arc<AuctionLifecycleManager>,
    pub pipeline: Arc<BidAdmissionPipeline>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_publisher(RecordingPublisher::default())
    }

    pub fn with_publisher(publisher: RecordingPublisher) -> Self {
        init_tracing();
        let auctions = Arc::new(InMemoryAuctionStore::new());
        let bids = Arc::new(InMemoryBidStore::new());
        let publisher = Arc::new(publisher);
        let users = Arc::new(InMemoryUserDirectory::new(true));
        let settlement = Arc::new(InMemorySettlement::new(auctions.clone(), bids.clone()));

        let lifecycle = Arc::new(AuctionLifecycleManager::new(
            auctions.clone(),
            bids.clone(),
            publisher.clone(),
            10,
        ));
        let pipeline = Arc::new(BidAdmissionPipeline::new(
            lifecycle.clone(),
            settlement.clone(),
            users.clone(),
            bids.clone(),
            publisher.clone(),
            AdmissionSettings::default(),
        ));

        Self {
            auctions,
            bids,
            settlement,
            publisher,
            users,
            lifecycle,
            pipeline,
        }
    }

    /// 생성 후 시작까지 마친 경매
    pub async fn active_auction(&self, owner: &str, starting_price: i64, increment: Option<i64>) -> Auction {
        let created = self
            .lifecycle
            .create(owner, draft("test auction", starting_price, increment))
            .await
            .expect("경매 생성 실패");
        self.lifecycle
            .start(created.id, owner)
            .await
            .expect("경매 시작 실패")
            .expect("소유자 시작이 거부됨")
    }
}
// endregion: --- Harness
