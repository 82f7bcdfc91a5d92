//! 경매 생명주기 관리
//!
//! 상태 전이: SCHEDULED -> ACTIVE -> FINISHED (역방향 없음)
//! 모든 전이는 소유자만 가능하다. 소유자가 아니거나 경매가 없으면 오류 대신
//! `Ok(None)` / `Ok(false)` 를 돌려준다.
//! 읽고-수정-쓰기는 version 비교 후 충돌 시 재시도한다.
// region:    --- Imports
use super::events::DomainEvent;
use super::model::{
    check_money, duration_days, Auction, AuctionDraft, AuctionId, AuctionState, NewAuction,
};
use crate::bidding::model::highest;
use crate::clients::{AuctionReader, CollaboratorError, PriceRatchet};
use crate::fanout::EventPublisher;
use crate::storage::{AuctionStore, BidStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// 경매 시작 시간 허용 오차 (과거 1분까지 허용)
const START_TIME_GRACE_MINUTES: i64 = 1;

// 시작과 종료 사이 최소 간격
const MIN_AUCTION_HOURS: i64 = 1;

// region:    --- Lifecycle Error
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    RuleViolation(String),

    #[error("버전 충돌로 {0}회 재시도 후 실패")]
    Contention(u32),

    #[error(transparent)]
    Store(#[from] StoreError),
}
// endregion: --- Lifecycle Error

/// 수정 함수의 결과
enum Change {
    Write,
    Unchanged,
}

/// 커밋된 결과와 실제 기록 여부
struct Committed {
    auction: Auction,
    written: bool,
}

// region:    --- Lifecycle Manager
pub struct AuctionLifecycleManager {
    auctions: Arc<dyn AuctionStore>,
    bids: Arc<dyn BidStore>,
    publisher: Arc<dyn EventPublisher>,
    max_retries: u32,
}

impl AuctionLifecycleManager {
    pub fn new(
        auctions: Arc<dyn AuctionStore>,
        bids: Arc<dyn BidStore>,
        publisher: Arc<dyn EventPublisher>,
        max_retries: u32,
    ) -> Self {
        Self {
            auctions,
            bids,
            publisher,
            max_retries,
        }
    }

    /// 1. 경매 생성 (SCHEDULED, 현재가 = 시작가)
    pub async fn create(&self, owner: &str, draft: AuctionDraft) -> Result<Auction, LifecycleError> {
        let now = Utc::now();
        let auction = validate_draft(owner, draft, now)?;
        let stored = self.auctions.insert(auction).await?;
        info!(
            "{:<12} --> 경매 생성: id={}, owner={}",
            "Lifecycle", stored.id, stored.owner
        );
        Ok(stored)
    }

    /// 2. 최신 커밋 상태 조회
    pub async fn get_snapshot(&self, id: AuctionId) -> Result<Option<Auction>, LifecycleError> {
        Ok(self.auctions.find(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<Auction>, LifecycleError> {
        Ok(self.auctions.list().await?)
    }

    pub async fn is_active(&self, id: AuctionId) -> Result<bool, LifecycleError> {
        Ok(self
            .auctions
            .find(id)
            .await?
            .is_some_and(|a| a.state == AuctionState::Active))
    }

    /// 3. 경매 시작 (이미 진행 중이면 그대로 반환)
    pub async fn start(&self, id: AuctionId, actor: &str) -> Result<Option<Auction>, LifecycleError> {
        let now = Utc::now();
        let committed = self
            .update_with_retry(id, Some(actor), |auction| match auction.state {
                AuctionState::Active => Ok(Change::Unchanged),
                AuctionState::Finished => Err(LifecycleError::RuleViolation(
                    "종료된 경매는 다시 시작할 수 없습니다".to_string(),
                )),
                AuctionState::Scheduled => {
                    auction.state = AuctionState::Active;
                    if auction.start_time.is_none() {
                        auction.start_time = Some(now);
                    }
                    Ok(Change::Write)
                }
            })
            .await?;

        Ok(committed.map(|c| {
            if c.written {
                info!("{:<12} --> 경매 시작: id={}", "Lifecycle", id);
            }
            c.auction
        }))
    }

    /// 4. 경매 종료 (종료 시 낙찰자와 함께 이벤트 발행)
    pub async fn end(&self, id: AuctionId, actor: &str) -> Result<Option<Auction>, LifecycleError> {
        let now = Utc::now();
        let Some(committed) = self
            .update_with_retry(id, Some(actor), |auction| finish(auction, now))
            .await?
        else {
            return Ok(None);
        };

        if committed.written {
            info!("{:<12} --> 경매 종료: id={}", "Lifecycle", id);
            self.announce_finished(&committed.auction, now).await;
        }
        Ok(Some(committed.auction))
    }

    /// 5. 종료 시간 연장
    pub async fn extend(
        &self,
        id: AuctionId,
        actor: &str,
        minutes: i64,
    ) -> Result<Option<Auction>, LifecycleError> {
        if minutes <= 0 {
            return Err(LifecycleError::Invalid(
                "연장 시간(분)은 0보다 커야 합니다".to_string(),
            ));
        }

        let now = Utc::now();
        let mut new_end = now;
        let Some(committed) = self
            .update_with_retry(id, Some(actor), |auction| {
                if auction.state == AuctionState::Finished {
                    return Err(LifecycleError::RuleViolation(
                        "종료된 경매는 연장할 수 없습니다".to_string(),
                    ));
                }
                new_end = auction.push_end_time(minutes, now).ok_or_else(|| {
                    LifecycleError::Invalid(format!("연장 시간이 너무 깁니다: {}분", minutes))
                })?;
                Ok(Change::Write)
            })
            .await?
        else {
            return Ok(None);
        };

        info!(
            "{:<12} --> 경매 연장: id={}, +{}분, 종료={}",
            "Lifecycle", id, minutes, new_end
        );
        self.emit(DomainEvent::AuctionExtended {
            auction_id: id,
            new_end_time: new_end,
            minutes_added: minutes,
        })
        .await;

        Ok(Some(committed.auction))
    }

    /// 6. 진행자 세션 입장 (상태 변경 없음)
    pub async fn join_moderation_session(
        &self,
        id: AuctionId,
        actor: &str,
    ) -> Result<Option<Auction>, LifecycleError> {
        let Some(auction) = self.owned_snapshot(id, actor).await? else {
            return Ok(None);
        };

        info!("{:<12} --> 진행자 입장: id={}, {}", "Lifecycle", id, actor);
        self.emit(DomainEvent::ModeratorJoined {
            auction_id: id,
            moderator_name: actor.to_string(),
            join_time: Utc::now(),
        })
        .await;
        Ok(Some(auction))
    }

    /// 7. 진행자 세션 퇴장 (이벤트 없음)
    pub async fn leave_moderation_session(
        &self,
        id: AuctionId,
        actor: &str,
    ) -> Result<Option<Auction>, LifecycleError> {
        let auction = self.owned_snapshot(id, actor).await?;
        if auction.is_some() {
            info!("{:<12} --> 진행자 퇴장: id={}, {}", "Lifecycle", id, actor);
        }
        Ok(auction)
    }

    /// 8. 경매 삭제 (진행 중이면 거부)
    pub async fn delete(&self, id: AuctionId, actor: &str) -> Result<bool, LifecycleError> {
        let Some(auction) = self.owned_snapshot(id, actor).await? else {
            return Ok(false);
        };
        if auction.state == AuctionState::Active {
            return Err(LifecycleError::RuleViolation(
                "진행 중인 경매는 삭제할 수 없습니다".to_string(),
            ));
        }

        let deleted = self.auctions.delete(id).await?;
        if deleted {
            info!("{:<12} --> 경매 삭제: id={}", "Lifecycle", id);
        }
        Ok(deleted)
    }

    /// 입찰 승인용 가격 반영
    /// version 이 그대로이고 새 가격이 현재가보다 높을 때만 기록한다.
    pub async fn advance_price(
        &self,
        id: AuctionId,
        expected_version: i64,
        price: Decimal,
    ) -> Result<Option<Auction>, LifecycleError> {
        let Some(mut auction) = self.auctions.find(id).await? else {
            return Ok(None);
        };
        if auction.version != expected_version || price <= auction.current_price {
            debug!(
                "{:<12} --> 가격 반영 거부: id={}, version {} != {}",
                "Lifecycle", id, auction.version, expected_version
            );
            return Ok(None);
        }

        auction.current_price = price;
        Ok(self.auctions.replace(&auction).await?)
    }

    /// 반영한 가격 되돌리기 (가격 반영 뒤 입찰 저장에 실패했을 때)
    /// version 이 그대로이고 시작가 이상, 현재가 미만일 때만 기록한다.
    pub async fn revert_price(
        &self,
        id: AuctionId,
        expected_version: i64,
        price: Decimal,
    ) -> Result<Option<Auction>, LifecycleError> {
        let Some(mut auction) = self.auctions.find(id).await? else {
            return Ok(None);
        };
        if auction.version != expected_version
            || price >= auction.current_price
            || price < auction.starting_price
        {
            debug!(
                "{:<12} --> 가격 되돌림 거부: id={}, version {} != {}",
                "Lifecycle", id, auction.version, expected_version
            );
            return Ok(None);
        }

        warn!(
            "{:<12} --> 가격 되돌림: id={}, {} -> {}",
            "Lifecycle", id, auction.current_price, price
        );
        auction.current_price = price;
        Ok(self.auctions.replace(&auction).await?)
    }

    /// 종료 시간이 지난 진행 중 경매를 종료 (시스템 동작, 소유자 확인 없음)
    pub async fn close_expired(&self, now: DateTime<Utc>) -> Result<Vec<Auction>, LifecycleError> {
        let expired = self.auctions.list_expired(now).await?;
        let mut closed = Vec::with_capacity(expired.len());

        for candidate in expired {
            let result = self
                .update_with_retry(candidate.id, None, |auction| {
                    let due = auction.end_time.is_some_and(|end| end <= now);
                    if auction.state == AuctionState::Active && due {
                        auction.state = AuctionState::Finished;
                        Ok(Change::Write)
                    } else {
                        Ok(Change::Unchanged)
                    }
                })
                .await;

            match result {
                Ok(Some(committed)) if committed.written => {
                    info!(
                        "{:<12} --> 종료 시간 도달로 경매 종료: id={}",
                        "Lifecycle", candidate.id
                    );
                    let finish_time = committed.auction.end_time.unwrap_or(now);
                    self.announce_finished(&committed.auction, finish_time).await;
                    closed.push(committed.auction);
                }
                Ok(_) => {}
                Err(e) => error!(
                    "{:<12} --> 경매 자동 종료 실패: id={}, {}",
                    "Lifecycle", candidate.id, e
                ),
            }
        }

        Ok(closed)
    }

    // region:    --- Helpers
    async fn owned_snapshot(
        &self,
        id: AuctionId,
        actor: &str,
    ) -> Result<Option<Auction>, LifecycleError> {
        Ok(self
            .auctions
            .find(id)
            .await?
            .filter(|auction| auction.is_owned_by(actor)))
    }

    /// 낙관적 잠금 기반 읽고-수정-쓰기
    /// `owner` 가 주어지면 소유자가 아닐 때 `None`.
    async fn update_with_retry<F>(
        &self,
        id: AuctionId,
        owner: Option<&str>,
        mut apply: F,
    ) -> Result<Option<Committed>, LifecycleError>
    where
        F: FnMut(&mut Auction) -> Result<Change, LifecycleError> + Send,
    {
        let mut retries = 0;

        loop {
            let Some(mut auction) = self.auctions.find(id).await? else {
                return Ok(None);
            };
            if let Some(actor) = owner {
                if !auction.is_owned_by(actor) {
                    warn!(
                        "{:<12} --> 소유자가 아닌 요청 무시: id={}, actor={}",
                        "Lifecycle", id, actor
                    );
                    return Ok(None);
                }
            }

            if let Change::Unchanged = apply(&mut auction)? {
                return Ok(Some(Committed {
                    auction,
                    written: false,
                }));
            }

            match self.auctions.replace(&auction).await? {
                Some(stored) => {
                    return Ok(Some(Committed {
                        auction: stored,
                        written: true,
                    }))
                }
                None => {
                    retries += 1;
                    if retries > self.max_retries {
                        return Err(LifecycleError::Contention(self.max_retries));
                    }
                    warn!(
                        "{:<12} --> 낙관적 업데이트로 인한 버전 충돌: 재시도 ({})",
                        "Lifecycle", retries
                    );
                }
            }
        }
    }

    async fn announce_finished(&self, auction: &Auction, finish_time: DateTime<Utc>) {
        let winner = match self.bids.list_for_auction(auction.id).await {
            Ok(bids) => highest(&bids).map(|bid| bid.bidder_name.clone()),
            Err(e) => {
                error!(
                    "{:<12} --> 낙찰자 조회 실패: id={}, {}",
                    "Lifecycle", auction.id, e
                );
                None
            }
        };

        self.emit(DomainEvent::AuctionFinished {
            auction_id: auction.id,
            winner,
            finish_time,
        })
        .await;
    }

    /// 이벤트 발행 실패는 기록만 한다
    async fn emit(&self, event: DomainEvent) {
        if let Err(e) = self.publisher.publish(&event).await {
            error!(
                "{:<12} --> 이벤트 발행 실패: {} (auction={}): {}",
                "Lifecycle",
                event.name(),
                event.auction_id(),
                e
            );
        }
    }
    // endregion: --- Helpers
}
// endregion: --- Lifecycle Manager

// region:    --- Collaborator Impl
#[async_trait]
impl AuctionReader for AuctionLifecycleManager {
    async fn snapshot(&self, id: AuctionId) -> Result<Option<Auction>, CollaboratorError> {
        self.get_snapshot(id).await.map_err(into_collaborator)
    }
}

#[async_trait]
impl PriceRatchet for AuctionLifecycleManager {
    async fn advance_price(
        &self,
        id: AuctionId,
        expected_version: i64,
        price: Decimal,
    ) -> Result<bool, CollaboratorError> {
        AuctionLifecycleManager::advance_price(self, id, expected_version, price)
            .await
            .map(|stored| stored.is_some())
            .map_err(into_collaborator)
    }

    async fn revert_price(
        &self,
        id: AuctionId,
        expected_version: i64,
        price: Decimal,
    ) -> Result<bool, CollaboratorError> {
        AuctionLifecycleManager::revert_price(self, id, expected_version, price)
            .await
            .map(|stored| stored.is_some())
            .map_err(into_collaborator)
    }
}

fn into_collaborator(err: LifecycleError) -> CollaboratorError {
    match err {
        LifecycleError::Store(e) => CollaboratorError::Store(e),
        other => CollaboratorError::Transport(other.to_string()),
    }
}
// endregion: --- Collaborator Impl

// region:    --- Validation
fn finish(auction: &mut Auction, now: DateTime<Utc>) -> Result<Change, LifecycleError> {
    if auction.state == AuctionState::Finished {
        return Ok(Change::Unchanged);
    }
    auction.state = AuctionState::Finished;
    // 조기 종료면 종료 시간을 지금으로 당긴다
    if auction.end_time.map_or(true, |end| end > now) {
        let start = auction.start_time.unwrap_or(auction.created_at);
        let earliest = start.checked_add_signed(Duration::seconds(1)).unwrap_or(start);
        auction.end_time = Some(now.max(earliest));
    }
    Ok(Change::Write)
}

/// 생성 요청 검증 후 저장할 경매로 변환
fn validate_draft(
    owner: &str,
    draft: AuctionDraft,
    now: DateTime<Utc>,
) -> Result<NewAuction, LifecycleError> {
    let invalid = |msg: &str| Err(LifecycleError::Invalid(msg.to_string()));

    if draft.description.trim().is_empty() {
        return invalid("경매 설명은 비어 있을 수 없습니다");
    }
    if draft.starting_price <= Decimal::ZERO {
        return invalid("시작 가격은 0보다 커야 합니다");
    }
    if draft.minimum_increment.is_some_and(|inc| inc <= Decimal::ZERO) {
        return invalid("최소 입찰 단위는 0보다 커야 합니다");
    }
    for amount in std::iter::once(draft.starting_price).chain(draft.minimum_increment) {
        check_money(amount).map_err(LifecycleError::Invalid)?;
    }
    if draft
        .start_time
        .is_some_and(|start| start < now - Duration::minutes(START_TIME_GRACE_MINUTES))
    {
        return invalid("시작 시간은 과거일 수 없습니다");
    }
    if draft.duration_days.is_some_and(|days| days <= 0) {
        return invalid("경매 기간(일)은 0보다 커야 합니다");
    }

    let end_time = match (draft.end_time, draft.duration_days) {
        (Some(end), _) => Some(end),
        (None, Some(days)) => {
            let end = Duration::try_days(days)
                .and_then(|span| draft.start_time.unwrap_or(now).checked_add_signed(span));
            match end {
                Some(end) => Some(end),
                None => return invalid("경매 기간(일)이 너무 깁니다"),
            }
        }
        (None, None) => None,
    };

    if let (Some(start), Some(end)) = (draft.start_time, end_time) {
        if end <= start {
            return invalid("종료 시간은 시작 시간 이후여야 합니다");
        }
        if end - start < Duration::hours(MIN_AUCTION_HOURS) {
            return invalid("경매 기간은 최소 1시간 이상이어야 합니다");
        }
    }

    let days = match end_time {
        Some(end) => duration_days(draft.start_time.unwrap_or(now), end),
        None => draft.duration_days.unwrap_or(0),
    };

    Ok(NewAuction {
        description: draft.description,
        category: draft.category,
        starting_price: draft.starting_price,
        current_price: draft.starting_price,
        minimum_increment: draft.minimum_increment,
        start_time: draft.start_time,
        end_time,
        duration_days: days,
        owner: owner.to_string(),
        state: AuctionState::Scheduled,
        created_at: now,
    })
}
// endregion: --- Validation
