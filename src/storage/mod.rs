//! 경매, 입찰 저장소 트레이트
//!
//! 구현체는 두 가지다. 테스트와 로컬 실행에 쓰는 인메모리 구현(`memory`)과
//! `crate::database` 의 Postgres 구현.
pub mod memory;

// region:    --- Imports
use crate::auction::model::{Auction, AuctionId, NewAuction};
use crate::bidding::model::{Bid, BidId, NewBid, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use memory::{InMemoryAuctionStore, InMemoryBidStore, InMemorySettlement};
// endregion: --- Imports

// region:    --- Store Error
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("데이터베이스 오류: {0}")]
    Database(#[from] sqlx::Error),

    #[error("저장된 데이터가 손상되었습니다: {0}")]
    Corrupt(String),
}
// endregion: --- Store Error

// region:    --- Store Traits
/// 경매 저장소
///
/// `replace` 는 낙관적 잠금으로 동작한다. 저장된 version 이 인자의 version 과 같을
/// 때만 기록하고 version 을 1 올린 결과를 돌려준다. 다르면 `None`.
#[async_trait]
pub trait AuctionStore: Send + Sync {
    async fn insert(&self, auction: NewAuction) -> Result<Auction, StoreError>;

    async fn find(&self, id: AuctionId) -> Result<Option<Auction>, StoreError>;

    async fn list(&self) -> Result<Vec<Auction>, StoreError>;

    async fn replace(&self, auction: &Auction) -> Result<Option<Auction>, StoreError>;

    async fn delete(&self, id: AuctionId) -> Result<bool, StoreError>;

    /// 종료 시간이 지난 진행 중 경매
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Auction>, StoreError>;
}

/// 입찰 저장소 (목록은 항상 입력 순서)
#[async_trait]
pub trait BidStore: Send + Sync {
    async fn insert(&self, bid: NewBid) -> Result<Bid, StoreError>;

    async fn find(&self, id: BidId) -> Result<Option<Bid>, StoreError>;

    async fn list_for_auction(&self, auction_id: AuctionId) -> Result<Vec<Bid>, StoreError>;

    async fn list_for_bidder(&self, bidder_id: UserId) -> Result<Vec<Bid>, StoreError>;

    async fn delete(&self, id: BidId) -> Result<bool, StoreError>;
}
// endregion: --- Store Traits
