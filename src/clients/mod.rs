//! 입찰 승인에서 호출하는 외부 협력자 인터페이스
//!
//! 같은 프로세스 안에서는 `AuctionLifecycleManager` 와 `InMemoryUserDirectory` 가
//! 구현하고, 서비스가 분리된 배포에서는 `http` 모듈의 클라이언트가 구현한다.
//! 조회 시간 제한은 호출하는 쪽(`BidAdmissionPipeline`)이 걸고,
//! 입찰 확정(`BidSettlement`)은 구현체가 자기 호출마다 건다.
pub mod directory;
pub mod http;
pub mod settlement;

// region:    --- Imports
use crate::auction::model::{Auction, AuctionId};
use crate::bidding::model::{Bid, NewBid, UserId};
use crate::storage::StoreError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use directory::InMemoryUserDirectory;
pub use http::{HttpAuctionClient, HttpUserDirectory};
pub use settlement::RemoteSettlement;
// endregion: --- Imports

// region:    --- Collaborator Error
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("호출 시간 초과 ({0:?})")]
    Timeout(Duration),

    #[error("전송 오류: {0}")]
    Transport(String),

    #[error("예상하지 못한 응답 상태: {0}")]
    UnexpectedStatus(u16),

    #[error("응답 해석 실패: {0}")]
    Decode(String),

    #[error("사용자를 찾을 수 없습니다: {0}")]
    UnknownUser(String),

    #[error("저장소 오류: {0}")]
    Store(#[from] StoreError),
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CollaboratorError::Timeout(Duration::ZERO)
        } else if err.is_decode() {
            CollaboratorError::Decode(err.to_string())
        } else {
            CollaboratorError::Transport(err.to_string())
        }
    }
}
// endregion: --- Collaborator Error

// region:    --- Auction Collaborator
/// 경매 스냅샷 조회
#[async_trait]
pub trait AuctionReader: Send + Sync {
    /// 호출 시점에 커밋된 최신 상태. 없으면 `None`
    async fn snapshot(&self, id: AuctionId) -> Result<Option<Auction>, CollaboratorError>;
}

/// 승인된 입찰가 반영
#[async_trait]
pub trait PriceRatchet: Send + Sync {
    /// 저장된 version 이 `expected_version` 과 같고 `price` 가 현재가보다 높을 때만
    /// 반영한다. 반영했으면 `true`, 버전 충돌이면 `false`.
    async fn advance_price(
        &self,
        id: AuctionId,
        expected_version: i64,
        price: Decimal,
    ) -> Result<bool, CollaboratorError>;

    /// 반영한 가격을 되돌린다. 반영 직후 입찰 저장에 실패했을 때만 쓴다.
    /// 저장된 version 이 `expected_version` 이고 `price` 가 현재가보다 낮을 때만 기록한다.
    async fn revert_price(
        &self,
        id: AuctionId,
        expected_version: i64,
        price: Decimal,
    ) -> Result<bool, CollaboratorError>;
}

/// 입찰 승인이 필요로 하는 경매 쪽 기능 전체
pub trait AuctionLedger: AuctionReader + PriceRatchet {}

impl<T: AuctionReader + PriceRatchet + ?Sized> AuctionLedger for T {}

/// 승인된 입찰 확정
///
/// 가격 반영과 입찰 저장을 한 단위로 처리한다. 경매 version 이 `snapshot.version`
/// 그대로이고 입찰가가 현재가보다 높을 때만 확정하고, 충돌이면 `None`.
/// 오류로 끝나면 가격도 입찰도 남지 않는다.
#[async_trait]
pub trait BidSettlement: Send + Sync {
    async fn settle(&self, snapshot: &Auction, bid: NewBid) -> Result<Option<Bid>, CollaboratorError>;
}
// endregion: --- Auction Collaborator

// region:    --- User Collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
}

/// subject 로 사용자 번호와 표시 이름 조회
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn resolve(&self, subject: &str) -> Result<UserProfile, CollaboratorError>;

    /// 등록된 사용자만 조회 (새로 발급하지 않음)
    async fn find(&self, subject: &str) -> Result<Option<UserProfile>, CollaboratorError> {
        match self.resolve(subject).await {
            Ok(profile) => Ok(Some(profile)),
            Err(CollaboratorError::UnknownUser(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
// endregion: --- User Collaborator
