/// 입찰 승인 파이프라인
/// 1. 경매 스냅샷 조회
/// 2. 검증 (상태 -> 시작 -> 종료 -> 소유자 -> 최저가), 첫 실패에서 중단
/// 3. 입찰자 조회
/// 4. 가격 반영(version 비교)과 입찰 저장을 한 단위로 확정 (`BidSettlement`)
/// 5. 새 입찰 이벤트 발행 (실패는 기록만)
///
/// 같은 경매에 대한 승인은 프로세스 안에서는 경매별 mutex 로,
/// 프로세스 사이에서는 version 비교로 직렬화된다.
// region:    --- Imports
use super::model::{highest, Bid, BidId, NewBid, UserId};
use crate::auction::events::DomainEvent;
use crate::auction::model::{check_money, Auction, AuctionId, AuctionState};
use crate::clients::{AuctionReader, BidSettlement, CollaboratorError, UserLookup, UserProfile};
use crate::fanout::EventPublisher;
use crate::identity::Identity;
use crate::storage::{BidStore, StoreError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};
// endregion: --- Imports

// region:    --- Admission Error
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    RuleViolation(String),

    #[error("일시적인 오류로 입찰을 처리하지 못했습니다: {0}")]
    Transient(String),

    #[error("버전 충돌로 {0}회 재시도 후 실패")]
    Contention(u32),

    #[error(transparent)]
    Store(#[from] StoreError),
}
// endregion: --- Admission Error

// region:    --- Settings
#[derive(Debug, Clone)]
pub struct AdmissionSettings {
    /// 협력자 호출 한 번의 시간 제한
    pub collaborator_timeout: Duration,
    /// version 충돌 시 최대 재시도 횟수
    pub max_retries: u32,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            collaborator_timeout: Duration::from_secs(3),
            max_retries: 100,
        }
    }
}
// endregion: --- Settings

// region:    --- Admission Locks
/// 경매별 비동기 mutex
/// 마지막 보유자가 놓으면 항목을 지운다.
#[derive(Debug, Default)]
pub struct AdmissionLocks {
    locks: DashMap<AuctionId, Arc<Mutex<()>>>,
}

pub struct AdmissionGuard<'a> {
    locks: &'a AdmissionLocks,
    auction_id: AuctionId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl AdmissionLocks {
    pub async fn acquire(&self, auction_id: AuctionId) -> AdmissionGuard<'_> {
        let lock = self
            .locks
            .entry(auction_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;

        AdmissionGuard {
            locks: self,
            auction_id,
            guard: Some(guard),
        }
    }

    /// 현재 잡혀 있거나 대기 중인 경매 수
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // 대기자가 없으면 맵에만 남아 있다
        self.locks
            .locks
            .remove_if(&self.auction_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
// endregion: --- Admission Locks

/// 검증만 통과한 입찰 (dry run 결과)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidQuote {
    pub auction_id: AuctionId,
    pub bid_price: Decimal,
    pub minimum_bid: Decimal,
    pub valid: bool,
}

// region:    --- Pipeline
pub struct BidAdmissionPipeline {
    auctions: Arc<dyn AuctionReader>,
    settlement: Arc<dyn BidSettlement>,
    users: Arc<dyn UserLookup>,
    bids: Arc<dyn BidStore>,
    publisher: Arc<dyn EventPublisher>,
    locks: AdmissionLocks,
    settings: AdmissionSettings,
}

impl BidAdmissionPipeline {
    pub fn new(
        auctions: Arc<dyn AuctionReader>,
        settlement: Arc<dyn BidSettlement>,
        users: Arc<dyn UserLookup>,
        bids: Arc<dyn BidStore>,
        publisher: Arc<dyn EventPublisher>,
        settings: AdmissionSettings,
    ) -> Self {
        Self {
            auctions,
            settlement,
            users,
            bids,
            publisher,
            locks: AdmissionLocks::default(),
            settings,
        }
    }

    /// 1. 입찰
    pub async fn submit_bid(
        &self,
        auction_id: AuctionId,
        bidder: &Identity,
        amount: Decimal,
    ) -> Result<Bid, AdmissionError> {
        info!(
            "{:<12} --> 입찰 요청 처리 시작: auction={}, bidder={}, amount={}",
            "Admission", auction_id, bidder.subject, amount
        );

        let _guard = self.locks.acquire(auction_id).await;
        let mut profile: Option<UserProfile> = None;
        let mut retries = 0;

        loop {
            let auction = self.fetch_snapshot(auction_id).await?;
            let now = Utc::now();
            check_admissible(&auction, &bidder.subject, amount, now)?;

            let bidder_profile = match profile.take() {
                Some(cached) => cached,
                None => self.resolve_bidder(&bidder.subject).await?,
            };

            let settled = self
                .settle(
                    &auction,
                    NewBid {
                        auction_id,
                        bidder_id: bidder_profile.id,
                        bidder_name: bidder_profile.display_name.clone(),
                        amount,
                        created_at: now,
                    },
                )
                .await?;

            if let Some(bid) = settled {
                info!(
                    "{:<12} --> 입찰 승인: auction={}, bid={}, amount={}",
                    "Admission", auction_id, bid.id, bid.amount
                );
                self.emit(DomainEvent::NewBid {
                    auction_id,
                    new_price: amount,
                    bidder_name: bid.bidder_name.clone(),
                    timestamp: now,
                })
                .await;
                return Ok(bid);
            }

            retries += 1;
            if retries > self.settings.max_retries {
                warn!(
                    "{:<12} --> 최대 재시도 횟수 초과: auction={}",
                    "Admission", auction_id
                );
                return Err(AdmissionError::Contention(self.settings.max_retries));
            }
            warn!(
                "{:<12} --> 낙관적 업데이트로 인한 버전 충돌: 재시도 ({})",
                "Admission", retries
            );
            profile = Some(bidder_profile);
        }
    }

    /// 2. 입찰 검증만 수행 (부작용 없음)
    pub async fn validate_bid(
        &self,
        auction_id: AuctionId,
        bidder: &Identity,
        amount: Decimal,
    ) -> Result<BidQuote, AdmissionError> {
        let auction = self.fetch_snapshot(auction_id).await?;
        check_admissible(&auction, &bidder.subject, amount, Utc::now())?;

        Ok(BidQuote {
            auction_id,
            bid_price: amount,
            minimum_bid: auction.bid_floor(),
            valid: true,
        })
    }

    /// 3. 입찰 삭제
    /// 경매와 입찰자가 모두 일치할 때만 지우고, 아니면 아무것도 하지 않는다.
    pub async fn delete_bid(
        &self,
        auction_id: AuctionId,
        bid_id: BidId,
        bidder_id: UserId,
    ) -> Result<bool, AdmissionError> {
        let owned = self
            .bids
            .find(bid_id)
            .await?
            .is_some_and(|bid| bid.auction_id == auction_id && bid.bidder_id == bidder_id);
        if !owned {
            return Ok(false);
        }

        let deleted = self.bids.delete(bid_id).await?;
        if deleted {
            info!(
                "{:<12} --> 입찰 삭제: auction={}, bid={}",
                "Admission", auction_id, bid_id
            );
        }
        Ok(deleted)
    }

    // region:    --- Queries
    pub async fn bids_for_auction(&self, auction_id: AuctionId) -> Result<Vec<Bid>, AdmissionError> {
        Ok(self.bids.list_for_auction(auction_id).await?)
    }

    pub async fn highest_bid(&self, auction_id: AuctionId) -> Result<Option<Bid>, AdmissionError> {
        let bids = self.bids.list_for_auction(auction_id).await?;
        Ok(highest(&bids).cloned())
    }

    pub async fn bid_by_id(
        &self,
        auction_id: AuctionId,
        bid_id: BidId,
    ) -> Result<Option<Bid>, AdmissionError> {
        Ok(self
            .bids
            .find(bid_id)
            .await?
            .filter(|bid| bid.auction_id == auction_id))
    }

    pub async fn bids_for_bidder(&self, bidder_id: UserId) -> Result<Vec<Bid>, AdmissionError> {
        Ok(self.bids.list_for_bidder(bidder_id).await?)
    }
    // endregion: --- Queries

    /// subject 로 입찰자 번호와 표시 이름 조회
    async fn resolve_bidder(&self, subject: &str) -> Result<UserProfile, AdmissionError> {
        self.call("사용자 조회", self.users.resolve(subject)).await
    }

    /// 등록된 입찰자만 조회 (없으면 None, 새로 등록하지 않음)
    pub async fn find_bidder(&self, subject: &str) -> Result<Option<UserProfile>, AdmissionError> {
        self.call("사용자 조회", self.users.find(subject)).await
    }

    async fn fetch_snapshot(&self, auction_id: AuctionId) -> Result<Auction, AdmissionError> {
        self.call("경매 조회", self.auctions.snapshot(auction_id))
            .await?
            .ok_or_else(|| AdmissionError::NotFound(format!("경매를 찾을 수 없습니다: {}", auction_id)))
    }

    /// 확정은 구현체가 자기 호출마다 시간 제한을 건다.
    /// 여기서 끊으면 가격만 반영된 채 남을 수 있다.
    async fn settle(&self, auction: &Auction, bid: NewBid) -> Result<Option<Bid>, AdmissionError> {
        let auction_id = auction.id;
        self.settlement.settle(auction, bid).await.map_err(|e| {
            if let CollaboratorError::Store(_) = &e {
                error!(
                    "{:<12} --> 입찰 확정 실패: auction={}, {}",
                    "Admission", auction_id, e
                );
            }
            self.failure("입찰 확정", e)
        })
    }

    /// 협력자 호출에 시간 제한 적용
    /// 시간 초과와 전송 실패는 Transient 로 본다.
    async fn call<T>(
        &self,
        what: &str,
        request: impl Future<Output = Result<T, CollaboratorError>>,
    ) -> Result<T, AdmissionError> {
        match tokio::time::timeout(self.settings.collaborator_timeout, request).await {
            Ok(result) => result.map_err(|e| self.failure(what, e)),
            Err(_) => {
                warn!(
                    "{:<12} --> {} 시간 초과 ({:?})",
                    "Admission", what, self.settings.collaborator_timeout
                );
                Err(AdmissionError::Transient(format!("{} 시간 초과", what)))
            }
        }
    }

    fn failure(&self, what: &str, err: CollaboratorError) -> AdmissionError {
        match err {
            CollaboratorError::UnknownUser(subject) => {
                AdmissionError::NotFound(format!("사용자를 찾을 수 없습니다: {}", subject))
            }
            CollaboratorError::Store(e) => AdmissionError::Store(e),
            e => {
                warn!("{:<12} --> {} 실패: {}", "Admission", what, e);
                AdmissionError::Transient(format!("{} 실패", what))
            }
        }
    }

    /// 이벤트 발행 실패는 입찰 결과에 영향을 주지 않는다
    async fn emit(&self, event: DomainEvent) {
        if let Err(e) = self.publisher.publish(&event).await {
            error!(
                "{:<12} --> 이벤트 발행 실패: {} (auction={}): {}",
                "Admission",
                event.name(),
                event.auction_id(),
                e
            );
        }
    }
}
// endregion: --- Pipeline

// region:    --- Validation
/// 입찰 가능 여부 검증 (순서 고정)
pub fn check_admissible(
    auction: &Auction,
    bidder: &str,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<(), AdmissionError> {
    let violation = |msg: String| Err(AdmissionError::RuleViolation(msg));

    if auction.state != AuctionState::Active {
        return violation(format!("진행 중인 경매가 아닙니다 (상태: {})", auction.state));
    }
    if auction.start_time.is_some_and(|start| start > now) {
        return violation("경매가 아직 시작되지 않았습니다".to_string());
    }
    if auction.end_time.is_some_and(|end| end < now) {
        return violation("경매가 이미 종료되었습니다".to_string());
    }
    if auction.is_owned_by(bidder) {
        return violation("자신의 경매에는 입찰할 수 없습니다".to_string());
    }

    let floor = auction.bid_floor();
    if amount < floor {
        return violation(format!(
            "입찰 금액은 최소 {} 이상이어야 합니다 (입찰: {})",
            floor, amount
        ));
    }
    if let Err(msg) = check_money(amount) {
        return violation(msg);
    }
    Ok(())
}
// endregion: --- Validation

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn active_auction() -> Auction {
        let now = Utc::now();
        Auction {
            id: 1,
            description: "guitar".into(),
            category: "music".into(),
            starting_price: Decimal::from(100),
            current_price: Decimal::from(100),
            minimum_increment: Some(Decimal::from(10)),
            start_time: Some(now - ChronoDuration::hours(1)),
            end_time: Some(now + ChronoDuration::hours(1)),
            duration_days: 0,
            owner: "seller".into(),
            state: AuctionState::Active,
            version: 1,
            created_at: now,
        }
    }

    fn rejection(result: Result<(), AdmissionError>) -> String {
        match result {
            Err(AdmissionError::RuleViolation(msg)) => msg,
            other => panic!("expected rule violation, got {:?}", other),
        }
    }

    #[test]
    fn state_is_checked_before_price() {
        let mut auction = active_auction();
        auction.state = AuctionState::Scheduled;
        let msg = rejection(check_admissible(&auction, "ana", Decimal::from(1), Utc::now()));
        assert!(msg.contains("SCHEDULED"));
    }

    #[test]
    fn owner_cannot_bid_even_above_the_floor() {
        let auction = active_auction();
        let msg = rejection(check_admissible(&auction, "seller", Decimal::from(500), Utc::now()));
        assert!(msg.contains("자신의 경매"));
    }

    #[test]
    fn floor_is_current_price_plus_increment() {
        let auction = active_auction();
        let msg = rejection(check_admissible(&auction, "ana", Decimal::from(105), Utc::now()));
        assert!(msg.contains("110"));
        assert!(check_admissible(&auction, "ana", Decimal::from(110), Utc::now()).is_ok());
    }

    #[test]
    fn amounts_finer_than_cents_are_rejected() {
        let auction = active_auction();
        let msg = rejection(check_admissible(&auction, "ana", Decimal::new(110_001, 3), Utc::now()));
        assert!(msg.contains("소수점"));
        assert!(check_admissible(&auction, "ana", Decimal::new(11_050, 2), Utc::now()).is_ok());
        assert!(check_admissible(&auction, "ana", Decimal::new(1_105_000, 4), Utc::now()).is_ok());
    }

    #[test]
    fn expired_end_time_rejects_even_when_still_active() {
        let mut auction = active_auction();
        auction.end_time = Some(Utc::now() - ChronoDuration::minutes(1));
        let msg = rejection(check_admissible(&auction, "ana", Decimal::from(200), Utc::now()));
        assert!(msg.contains("종료"));
    }

    #[tokio::test]
    async fn lock_entries_are_released_with_their_last_guard() {
        let locks = AdmissionLocks::default();
        {
            let _a = locks.acquire(1).await;
            let _b = locks.acquire(2).await;
            assert_eq!(locks.len(), 2);
        }
        assert!(locks.is_empty());
    }
}
