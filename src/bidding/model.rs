use crate::auction::AuctionId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type BidId = i64;
pub type UserId = i64;

// 입찰 모델 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: BidId,
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    pub bidder_name: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

// 저장 전 입찰
#[derive(Debug, Clone)]
pub struct NewBid {
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    pub bidder_name: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// 입찰 요청 본문
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidRequest {
    pub bid_price: Decimal,
}

/// 가장 높은 입찰 선택 (동일 금액이면 먼저 들어온 입찰)
pub fn highest<'a>(bids: impl IntoIterator<Item = &'a Bid>) -> Option<&'a Bid> {
    bids.into_iter().fold(None, |best: Option<&Bid>, bid| match best {
        Some(current) if current.amount >= bid.amount => Some(current),
        _ => Some(bid),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(id: BidId, amount: i64) -> Bid {
        Bid {
            id,
            auction_id: 1,
            bidder_id: id,
            bidder_name: format!("bidder-{}", id),
            amount: Decimal::from(amount),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn highest_prefers_earliest_on_ties() {
        let bids = vec![bid(1, 110), bid(2, 130), bid(3, 130), bid(4, 120)];
        let top = highest(&bids).unwrap();
        assert_eq!(top.id, 2);
        assert_eq!(top.amount, Decimal::from(130));
    }

    #[test]
    fn highest_of_nothing_is_none() {
        assert!(highest(&Vec::<Bid>::new()).is_none());
    }
}
