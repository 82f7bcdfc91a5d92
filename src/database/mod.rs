//! Postgres 저장소 구현
pub mod queries;

// region:    --- Imports
use crate::auction::model::{Auction, AuctionId, AuctionState, NewAuction};
use crate::bidding::model::{Bid, BidId, NewBid, UserId};
use crate::clients::{BidSettlement, CollaboratorError};
use crate::storage::{AuctionStore, BidStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::sync::Arc;
use tracing::info;

// endregion: --- Imports

// region:    --- Database Manager
pub struct DatabaseManager {
    pub pool: Arc<PgPool>,
}

impl DatabaseManager {
    /// 데이터베이스 매니저 생성
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// 데이터베이스 풀 가져오기
    pub fn get_pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    /// 스키마 초기화 (존재하면 유지)
    pub async fn initialize_database(&self) -> Result<(), sqlx::Error> {
        let create_schema_sql = include_str!("../sql/01-create-schema.sql");
        self.execute_multi_query(create_schema_sql).await?;
        info!("{:<12} --> 스키마 초기화 완료", "Database");
        Ok(())
    }

    /// 여러 쿼리 실행
    async fn execute_multi_query(&self, sql: &str) -> Result<(), sqlx::Error> {
        for query in sql.split(';') {
            let query = query.trim();
            if !query.is_empty() {
                sqlx::query(query).execute(&*self.pool).await?;
            }
        }
        Ok(())
    }
}
// endregion: --- Database Manager

// region:    --- Rows
#[derive(FromRow)]
struct AuctionRow {
    id: i64,
    description: String,
    category: String,
    starting_price: Decimal,
    current_price: Decimal,
    minimum_increment: Option<Decimal>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    duration_days: i64,
    owner: String,
    state: String,
    version: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuctionRow> for Auction {
    type Error = StoreError;

    fn try_from(row: AuctionRow) -> Result<Self, Self::Error> {
        let state: AuctionState = row.state.parse().map_err(StoreError::Corrupt)?;
        Ok(Auction {
            id: row.id,
            description: row.description,
            category: row.category,
            starting_price: row.starting_price,
            current_price: row.current_price,
            minimum_increment: row.minimum_increment,
            start_time: row.start_time,
            end_time: row.end_time,
            duration_days: row.duration_days,
            owner: row.owner,
            state,
            version: row.version,
            created_at: row.created_at,
        })
    }
}

fn into_auctions(rows: Vec<AuctionRow>) -> Result<Vec<Auction>, StoreError> {
    rows.into_iter().map(Auction::try_from).collect()
}
// endregion: --- Rows

// region:    --- Postgres Auction Store
pub struct PgAuctionStore {
    pool: Arc<PgPool>,
}

impl PgAuctionStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuctionStore for PgAuctionStore {
    async fn insert(&self, auction: NewAuction) -> Result<Auction, StoreError> {
        let row = sqlx::query_as::<_, AuctionRow>(queries::INSERT_AUCTION)
            .bind(&auction.description)
            .bind(&auction.category)
            .bind(auction.starting_price)
            .bind(auction.current_price)
            .bind(auction.minimum_increment)
            .bind(auction.start_time)
            .bind(auction.end_time)
            .bind(auction.duration_days)
            .bind(&auction.owner)
            .bind(auction.state.as_str())
            .bind(auction.created_at)
            .fetch_one(&*self.pool)
            .await?;
        row.try_into()
    }

    async fn find(&self, id: AuctionId) -> Result<Option<Auction>, StoreError> {
        sqlx::query_as::<_, AuctionRow>(queries::GET_AUCTION)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?
            .map(Auction::try_from)
            .transpose()
    }

    async fn list(&self) -> Result<Vec<Auction>, StoreError> {
        let rows = sqlx::query_as::<_, AuctionRow>(queries::GET_ALL_AUCTIONS)
            .fetch_all(&*self.pool)
            .await?;
        into_auctions(rows)
    }

    async fn replace(&self, auction: &Auction) -> Result<Option<Auction>, StoreError> {
        sqlx::query_as::<_, AuctionRow>(queries::REPLACE_AUCTION)
            .bind(auction.id)
            .bind(auction.version)
            .bind(&auction.description)
            .bind(&auction.category)
            .bind(auction.current_price)
            .bind(auction.minimum_increment)
            .bind(auction.start_time)
            .bind(auction.end_time)
            .bind(auction.duration_days)
            .bind(auction.state.as_str())
            .fetch_optional(&*self.pool)
            .await?
            .map(Auction::try_from)
            .transpose()
    }

    async fn delete(&self, id: AuctionId) -> Result<bool, StoreError> {
        let result = sqlx::query(queries::DELETE_AUCTION)
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Auction>, StoreError> {
        let rows = sqlx::query_as::<_, AuctionRow>(queries::GET_EXPIRED_AUCTIONS)
            .bind(now)
            .fetch_all(&*self.pool)
            .await?;
        into_auctions(rows)
    }
}
// endregion: --- Postgres Auction Store

// region:    --- Postgres Bid Store
pub struct PgBidStore {
    pool: Arc<PgPool>,
}

impl PgBidStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BidStore for PgBidStore {
    async fn insert(&self, bid: NewBid) -> Result<Bid, StoreError> {
        Ok(sqlx::query_as::<_, Bid>(queries::INSERT_BID)
            .bind(bid.auction_id)
            .bind(bid.bidder_id)
            .bind(&bid.bidder_name)
            .bind(bid.amount)
            .bind(bid.created_at)
            .fetch_one(&*self.pool)
            .await?)
    }

    async fn find(&self, id: BidId) -> Result<Option<Bid>, StoreError> {
        Ok(sqlx::query_as::<_, Bid>(queries::GET_BID)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?)
    }

    async fn list_for_auction(&self, auction_id: AuctionId) -> Result<Vec<Bid>, StoreError> {
        Ok(sqlx::query_as::<_, Bid>(queries::GET_AUCTION_BIDS)
            .bind(auction_id)
            .fetch_all(&*self.pool)
            .await?)
    }

    async fn list_for_bidder(&self, bidder_id: UserId) -> Result<Vec<Bid>, StoreError> {
        Ok(sqlx::query_as::<_, Bid>(queries::GET_BIDDER_BIDS)
            .bind(bidder_id)
            .fetch_all(&*self.pool)
            .await?)
    }

    async fn delete(&self, id: BidId) -> Result<bool, StoreError> {
        let result = sqlx::query(queries::DELETE_BID)
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
// endregion: --- Postgres Bid Store

// region:    --- Postgres Settlement
/// 가격 반영과 입찰 저장을 한 트랜잭션으로 처리
pub struct PgSettlement {
    pool: Arc<PgPool>,
}

impl PgSettlement {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn settle_in_tx(&self, snapshot: &Auction, bid: NewBid) -> Result<Option<Bid>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let advanced = sqlx::query(queries::ADVANCE_PRICE)
            .bind(snapshot.id)
            .bind(snapshot.version)
            .bind(bid.amount)
            .execute(&mut *tx)
            .await?;
        if advanced.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let stored = sqlx::query_as::<_, Bid>(queries::INSERT_BID)
            .bind(bid.auction_id)
            .bind(bid.bidder_id)
            .bind(&bid.bidder_name)
            .bind(bid.amount)
            .bind(bid.created_at)
            .fetch_one(&mut *tx)
            .await;

        match stored {
            Ok(stored) => {
                tx.commit().await?;
                Ok(Some(stored))
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl BidSettlement for PgSettlement {
    async fn settle(&self, snapshot: &Auction, bid: NewBid) -> Result<Option<Bid>, CollaboratorError> {
        Ok(self.settle_in_tx(snapshot, bid).await?)
    }
}
// endregion: --- Postgres Settlement
