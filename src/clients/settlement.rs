//! 경매 서비스가 따로 떠 있을 때의 입찰 확정
//!
//! 가격은 원격에, 입찰은 로컬 저장소에 있으므로 한 트랜잭션으로 묶을 수 없다.
//! 가격 반영 뒤 입찰 저장이 실패하면 올린 가격을 version 비교로 되돌린다.
//! 되돌리기 전에 다른 변경이 끼어들면 가격은 그대로 남고 오류로 기록된다.
// region:    --- Imports
use super::{AuctionLedger, BidSettlement, CollaboratorError};
use crate::auction::model::{Auction, AuctionId};
use crate::bidding::model::{Bid, NewBid};
use crate::storage::BidStore;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

// endregion: --- Imports

pub struct RemoteSettlement {
    ledger: Arc<dyn AuctionLedger>,
    bids: Arc<dyn BidStore>,
    call_timeout: Duration,
}

impl RemoteSettlement {
    pub fn new(ledger: Arc<dyn AuctionLedger>, bids: Arc<dyn BidStore>, call_timeout: Duration) -> Self {
        Self {
            ledger,
            bids,
            call_timeout,
        }
    }
}

#[async_trait]
impl BidSettlement for RemoteSettlement {
    async fn settle(&self, snapshot: &Auction, bid: NewBid) -> Result<Option<Bid>, CollaboratorError> {
        // 호출 측이 취소돼도 보상까지는 끝까지 수행
        let task = tokio::spawn(run(
            self.ledger.clone(),
            self.bids.clone(),
            self.call_timeout,
            Advance {
                id: snapshot.id,
                version: snapshot.version,
                previous_price: snapshot.current_price,
            },
            bid,
        ));
        task.await
            .map_err(|e| CollaboratorError::Transport(format!("입찰 확정 작업 중단: {}", e)))?
    }
}

/// 반영하려는 가격 변경의 기준 스냅샷
struct Advance {
    id: AuctionId,
    version: i64,
    previous_price: Decimal,
}

async fn run(
    ledger: Arc<dyn AuctionLedger>,
    bids: Arc<dyn BidStore>,
    limit: Duration,
    advance: Advance,
    bid: NewBid,
) -> Result<Option<Bid>, CollaboratorError> {
    let advanced = timeout(limit, ledger.advance_price(advance.id, advance.version, bid.amount))
        .await
        .map_err(|_| CollaboratorError::Timeout(limit))??;
    if !advanced {
        return Ok(None);
    }

    let amount = bid.amount;
    let err = match bids.insert(bid).await {
        Ok(stored) => return Ok(Some(stored)),
        Err(e) => e,
    };
    error!(
        "{:<12} --> 가격 반영 후 입찰 저장 실패: auction={}, amount={}, {}",
        "Settlement", advance.id, amount, err
    );

    // 반영에 성공했으므로 지금 version 은 기준 + 1
    let reverted = timeout(
        limit,
        ledger.revert_price(advance.id, advance.version + 1, advance.previous_price),
    )
    .await;
    match reverted {
        Ok(Ok(true)) => info!(
            "{:<12} --> 가격 복구: auction={}, price={}",
            "Settlement", advance.id, advance.previous_price
        ),
        Ok(Ok(false)) => warn!(
            "{:<12} --> 가격 복구 불가 (그 사이 경매 변경): auction={}",
            "Settlement", advance.id
        ),
        Ok(Err(e)) => error!(
            "{:<12} --> 가격 복구 실패: auction={}, {}",
            "Settlement", advance.id, e
        ),
        Err(_) => error!(
            "{:<12} --> 가격 복구 시간 초과: auction={} ({:?})",
            "Settlement", advance.id, limit
        ),
    }

    Err(CollaboratorError::Store(err))
}
