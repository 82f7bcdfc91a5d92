use super::*;
use crate::auction::model::AuctionState;
use crate::clients::{BidSettlement, CollaboratorError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// 인메모리 경매 저장소
///
/// 단위 테스트와 DATABASE_URL 없는 로컬 실행에 사용.
#[derive(Debug, Default)]
pub struct InMemoryAuctionStore {
    inner: RwLock<AuctionTable>,
}

#[derive(Debug, Default)]
struct AuctionTable {
    next_id: AuctionId,
    rows: BTreeMap<AuctionId, Auction>,
}

impl InMemoryAuctionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuctionStore for InMemoryAuctionStore {
    async fn insert(&self, auction: NewAuction) -> Result<Auction, StoreError> {
        let mut table = self.inner.write();
        table.next_id += 1;
        let stored = Auction {
            id: table.next_id,
            description: auction.description,
            category: auction.category,
            starting_price: auction.starting_price,
            current_price: auction.current_price,
            minimum_increment: auction.minimum_increment,
            start_time: auction.start_time,
            end_time: auction.end_time,
            duration_days: auction.duration_days,
            owner: auction.owner,
            state: auction.state,
            version: 1,
            created_at: auction.created_at,
        };
        table.rows.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find(&self, id: AuctionId) -> Result<Option<Auction>, StoreError> {
        Ok(self.inner.read().rows.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Auction>, StoreError> {
        Ok(self.inner.read().rows.values().cloned().collect())
    }

    async fn replace(&self, auction: &Auction) -> Result<Option<Auction>, StoreError> {
        let mut table = self.inner.write();
        match table.rows.get_mut(&auction.id) {
            Some(row) if row.version == auction.version => {
                *row = Auction {
                    version: auction.version + 1,
                    ..auction.clone()
                };
                Ok(Some(row.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: AuctionId) -> Result<bool, StoreError> {
        Ok(self.inner.write().rows.remove(&id).is_some())
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Auction>, StoreError> {
        Ok(self
            .inner
            .read()
            .rows
            .values()
            .filter(|a| a.state == AuctionState::Active && a.end_time.is_some_and(|end| end <= now))
            .cloned()
            .collect())
    }
}

/// 인메모리 입찰 저장소
///
/// id 는 단조 증가하므로 BTreeMap 순회 순서가 곧 입력 순서.
#[derive(Debug, Default)]
pub struct InMemoryBidStore {
    inner: RwLock<BidTable>,
}

#[derive(Debug, Default)]
struct BidTable {
    next_id: BidId,
    rows: BTreeMap<BidId, Bid>,
}

impl InMemoryBidStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_row(&self, bid: NewBid) -> Bid {
        let mut table = self.inner.write();
        table.next_id += 1;
        let stored = Bid {
            id: table.next_id,
            auction_id: bid.auction_id,
            bidder_id: bid.bidder_id,
            bidder_name: bid.bidder_name,
            amount: bid.amount,
            created_at: bid.created_at,
        };
        table.rows.insert(stored.id, stored.clone());
        stored
    }
}

#[async_trait]
impl BidStore for InMemoryBidStore {
    async fn insert(&self, bid: NewBid) -> Result<Bid, StoreError> {
        Ok(self.insert_row(bid))
    }

    async fn find(&self, id: BidId) -> Result<Option<Bid>, StoreError> {
        Ok(self.inner.read().rows.get(&id).cloned())
    }

    async fn list_for_auction(&self, auction_id: AuctionId) -> Result<Vec<Bid>, StoreError> {
        Ok(self
            .inner
            .read()
            .rows
            .values()
            .filter(|b| b.auction_id == auction_id)
            .cloned()
            .collect())
    }

    async fn list_for_bidder(&self, bidder_id: UserId) -> Result<Vec<Bid>, StoreError> {
        Ok(self
            .inner
            .read()
            .rows
            .values()
            .filter(|b| b.bidder_id == bidder_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: BidId) -> Result<bool, StoreError> {
        Ok(self.inner.write().rows.remove(&id).is_some())
    }
}

/// 인메모리 입찰 확정
///
/// 경매 테이블 쓰기 잠금을 잡은 채 version 확인, 입찰 저장, 가격 반영을 한다.
/// 잠금 순서는 항상 경매 -> 입찰.
#[derive(Debug)]
pub struct InMemorySettlement {
    auctions: Arc<InMemoryAuctionStore>,
    bids: Arc<InMemoryBidStore>,
}

impl InMemorySettlement {
    pub fn new(auctions: Arc<InMemoryAuctionStore>, bids: Arc<InMemoryBidStore>) -> Self {
        Self { auctions, bids }
    }
}

#[async_trait]
impl BidSettlement for InMemorySettlement {
    async fn settle(&self, snapshot: &Auction, bid: NewBid) -> Result<Option<Bid>, CollaboratorError> {
        let mut table = self.auctions.inner.write();
        let Some(row) = table.rows.get_mut(&snapshot.id) else {
            return Ok(None);
        };
        if row.version != snapshot.version || bid.amount <= row.current_price {
            return Ok(None);
        }

        let amount = bid.amount;
        let stored = self.bids.insert_row(bid);
        row.current_price = amount;
        row.version += 1;
        Ok(Some(stored))
    }
}
