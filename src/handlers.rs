// region:    --- Imports
use crate::app::AppState;
use crate::auction::{Auction, AuctionDraft, AuctionId};
use crate::bidding::{Bid, BidId, BidQuote, BidRequest, UserId};
use crate::error::AppError;
use crate::fanout::FanoutStats;
use crate::identity::{AuthenticatedUser, Identity, Role};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

// endregion: --- Imports

// region:    --- Request Types
#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    pub minutes: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdateRequest {
    pub expected_version: i64,
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBidParams {
    #[serde(default)]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionStatus {
    pub auction_id: AuctionId,
    pub active: bool,
}
// endregion: --- Request Types

/// 경매 변경은 진행자, 관리자만
fn require_moderator(identity: &Identity) -> Result<(), AppError> {
    if identity.can_moderate() {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "경매를 변경할 권한이 없습니다".to_string(),
        ))
    }
}

fn not_permitted(id: AuctionId) -> AppError {
    AppError::NotFound(format!("경매가 없거나 권한이 없습니다: {}", id))
}

// region:    --- Auction Handlers

/// 경매 생성
pub async fn create_auction(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Json(draft): Json<AuctionDraft>,
) -> Result<(StatusCode, Json<Auction>), AppError> {
    require_moderator(&identity)?;
    let auction = state.lifecycle.create(&identity.subject, draft).await?;
    Ok((StatusCode::CREATED, Json(auction)))
}

/// 경매 목록
pub async fn list_auctions(State(state): State<AppState>) -> Result<Json<Vec<Auction>>, AppError> {
    Ok(Json(state.lifecycle.list().await?))
}

/// 경매 조회
pub async fn get_auction(
    State(state): State<AppState>,
    Path(id): Path<AuctionId>,
) -> Result<Json<Auction>, AppError> {
    state
        .lifecycle
        .get_snapshot(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("경매를 찾을 수 없습니다: {}", id)))
}

/// 경매 삭제
pub async fn delete_auction(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(id): Path<AuctionId>,
) -> Result<StatusCode, AppError> {
    require_moderator(&identity)?;
    if state.lifecycle.delete(id, &identity.subject).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_permitted(id))
    }
}

/// 진행 여부
pub async fn auction_status(
    State(state): State<AppState>,
    Path(id): Path<AuctionId>,
) -> Result<Json<AuctionStatus>, AppError> {
    let active = state.lifecycle.is_active(id).await?;
    Ok(Json(AuctionStatus {
        auction_id: id,
        active,
    }))
}

pub async fn start_auction(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(id): Path<AuctionId>,
) -> Result<Json<Auction>, AppError> {
    require_moderator(&identity)?;
    state
        .lifecycle
        .start(id, &identity.subject)
        .await?
        .map(Json)
        .ok_or_else(|| not_permitted(id))
}

pub async fn end_auction(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(id): Path<AuctionId>,
) -> Result<Json<Auction>, AppError> {
    require_moderator(&identity)?;
    state
        .lifecycle
        .end(id, &identity.subject)
        .await?
        .map(Json)
        .ok_or_else(|| not_permitted(id))
}

pub async fn extend_auction(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(id): Path<AuctionId>,
    Json(body): Json<ExtendRequest>,
) -> Result<Json<Auction>, AppError> {
    require_moderator(&identity)?;
    state
        .lifecycle
        .extend(id, &identity.subject, body.minutes)
        .await?
        .map(Json)
        .ok_or_else(|| not_permitted(id))
}

pub async fn join_moderation(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(id): Path<AuctionId>,
) -> Result<Json<Auction>, AppError> {
    require_moderator(&identity)?;
    state
        .lifecycle
        .join_moderation_session(id, &identity.subject)
        .await?
        .map(Json)
        .ok_or_else(|| not_permitted(id))
}

pub async fn leave_moderation(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(id): Path<AuctionId>,
) -> Result<StatusCode, AppError> {
    require_moderator(&identity)?;
    match state
        .lifecycle
        .leave_moderation_session(id, &identity.subject)
        .await?
    {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(not_permitted(id)),
    }
}

/// 내부용 가격 반영 (원격 입찰 서비스 전용)
/// 충돌이면 409, 경매가 없으면 404
pub async fn update_price(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(id): Path<AuctionId>,
    Json(body): Json<PriceUpdateRequest>,
) -> Result<Json<Auction>, AppError> {
    if identity.role != Role::Administrator {
        return Err(AppError::Forbidden(
            "관리자만 가격을 반영할 수 있습니다".to_string(),
        ));
    }

    match state
        .lifecycle
        .advance_price(id, body.expected_version, body.price)
        .await?
    {
        Some(updated) => Ok(Json(updated)),
        None => Err(price_rejection(&state, id).await),
    }
}

/// 반영한 가격 되돌리기 (관리자 전용, 가격 반영 뒤 입찰 저장에 실패한 경우)
pub async fn revert_price(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(id): Path<AuctionId>,
    Json(body): Json<PriceUpdateRequest>,
) -> Result<Json<Auction>, AppError> {
    if identity.role != Role::Administrator {
        return Err(AppError::Forbidden(
            "관리자만 가격을 되돌릴 수 있습니다".to_string(),
        ));
    }

    match state
        .lifecycle
        .revert_price(id, body.expected_version, body.price)
        .await?
    {
        Some(updated) => Ok(Json(updated)),
        None => Err(price_rejection(&state, id).await),
    }
}

/// 가격 변경 거부 사유: 경매가 있으면 409, 없으면 404
async fn price_rejection(state: &AppState, id: AuctionId) -> AppError {
    match state.lifecycle.get_snapshot(id).await {
        Ok(Some(current)) => AppError::RuleViolation(format!(
            "버전 충돌: 현재 version={}, 현재가={}",
            current.version, current.current_price
        )),
        Ok(None) => AppError::NotFound(format!("경매를 찾을 수 없습니다: {}", id)),
        Err(e) => e.into(),
    }
}
// endregion: --- Auction Handlers

// region:    --- Bid Handlers

/// 입찰 요청 처리
pub async fn place_bid(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(id): Path<AuctionId>,
    Json(body): Json<BidRequest>,
) -> Result<(StatusCode, Json<Bid>), AppError> {
    let bid = state
        .pipeline
        .submit_bid(id, &identity, body.bid_price)
        .await?;
    Ok((StatusCode::CREATED, Json(bid)))
}

/// 입찰 검증 (저장하지 않음)
pub async fn validate_bid(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(id): Path<AuctionId>,
    Json(body): Json<BidRequest>,
) -> Result<Json<BidQuote>, AppError> {
    let quote = state
        .pipeline
        .validate_bid(id, &identity, body.bid_price)
        .await?;
    Ok(Json(quote))
}

/// 입찰 기록 조회
pub async fn list_bids(
    State(state): State<AppState>,
    Path(id): Path<AuctionId>,
) -> Result<Json<Vec<Bid>>, AppError> {
    Ok(Json(state.pipeline.bids_for_auction(id).await?))
}

/// 최고 입찰 조회
pub async fn highest_bid(
    State(state): State<AppState>,
    Path(id): Path<AuctionId>,
) -> Result<Json<Bid>, AppError> {
    state
        .pipeline
        .highest_bid(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("입찰이 없습니다: {}", id)))
}

pub async fn get_bid(
    State(state): State<AppState>,
    Path((id, bid_id)): Path<(AuctionId, BidId)>,
) -> Result<Json<Bid>, AppError> {
    state
        .pipeline
        .bid_by_id(id, bid_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("입찰을 찾을 수 없습니다: {}", bid_id)))
}

/// 입찰 삭제
/// 본인 입찰이 아니면 아무것도 하지 않고 204
pub async fn delete_bid(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path((id, bid_id)): Path<(AuctionId, BidId)>,
    Query(params): Query<DeleteBidParams>,
) -> Result<StatusCode, AppError> {
    // 등록되지 않은 호출자는 지울 입찰도 없다
    let Some(caller) = state.pipeline.find_bidder(&identity.subject).await? else {
        info!(
            "{:<12} --> 등록되지 않은 사용자의 입찰 삭제 요청 무시: bid={}, {}",
            "Handler", bid_id, identity.subject
        );
        return Ok(StatusCode::NO_CONTENT);
    };
    if params.user_id.is_some_and(|user_id| user_id != caller.id) {
        info!(
            "{:<12} --> 다른 사용자의 입찰 삭제 요청 무시: bid={}, {}",
            "Handler", bid_id, identity.subject
        );
        return Ok(StatusCode::NO_CONTENT);
    }

    state.pipeline.delete_bid(id, bid_id, caller.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 사용자 입찰 기록
pub async fn bids_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Vec<Bid>>, AppError> {
    Ok(Json(state.pipeline.bids_for_bidder(user_id).await?))
}
// endregion: --- Bid Handlers

/// 실시간 연결 현황
pub async fn ws_stats(State(state): State<AppState>) -> Json<FanoutStats> {
    Json(state.fanout.stats())
}
