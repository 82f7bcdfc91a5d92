//! 구성 요소 조립과 라우터
// region:    --- Imports
use crate::auction::AuctionLifecycleManager;
use crate::bidding::{AdmissionSettings, BidAdmissionPipeline};
use crate::clients::{
    AuctionReader, BidSettlement, CollaboratorError, HttpAuctionClient, HttpUserDirectory,
    InMemoryUserDirectory, RemoteSettlement, UserLookup,
};
use crate::config::Config;
use crate::database::{PgAuctionStore, PgBidStore, PgSettlement};
use crate::fanout::{session, EventFanout, FanoutSettings};
use crate::handlers;
use crate::identity::{IdentityVerifier, JwtVerifier};
use crate::storage::{
    AuctionStore, BidStore, InMemoryAuctionStore, InMemoryBidStore, InMemorySettlement,
};
use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

// endregion: --- Imports

// region:    --- Storage
/// 저장소 묶음
/// `settlement` 는 같은 저장소 위에서 가격 반영과 입찰 저장을 함께 확정한다.
#[derive(Clone)]
pub struct Storage {
    pub auctions: Arc<dyn AuctionStore>,
    pub bids: Arc<dyn BidStore>,
    pub settlement: Arc<dyn BidSettlement>,
}

impl Storage {
    pub fn in_memory() -> Self {
        let auctions = Arc::new(InMemoryAuctionStore::new());
        let bids = Arc::new(InMemoryBidStore::new());
        let settlement: Arc<dyn BidSettlement> =
            Arc::new(InMemorySettlement::new(auctions.clone(), bids.clone()));
        Self {
            auctions,
            bids,
            settlement,
        }
    }

    pub fn postgres(pool: Arc<PgPool>) -> Self {
        Self {
            auctions: Arc::new(PgAuctionStore::new(Arc::clone(&pool))),
            bids: Arc::new(PgBidStore::new(Arc::clone(&pool))),
            settlement: Arc::new(PgSettlement::new(pool)),
        }
    }
}
// endregion: --- Storage

// region:    --- App State
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<AuctionLifecycleManager>,
    pub pipeline: Arc<BidAdmissionPipeline>,
    pub fanout: Arc<EventFanout>,
    pub verifier: Arc<dyn IdentityVerifier>,
}

/// 설정에 따라 구성 요소 연결
/// 원격 서비스 URL 이 있으면 HTTP 클라이언트, 없으면 프로세스 내부 구현을 쓴다.
pub fn build_state(config: &Config, storage: Storage) -> Result<AppState, CollaboratorError> {
    let fanout = Arc::new(EventFanout::new(FanoutSettings {
        queue_capacity: config.room_queue_capacity,
        slow_consumer_policy: config.slow_consumer_policy,
    }));

    let lifecycle = Arc::new(AuctionLifecycleManager::new(
        storage.auctions,
        Arc::clone(&storage.bids),
        fanout.clone(),
        config.max_admission_retries,
    ));

    // 원격 경매 서비스면 가격과 입찰이 다른 저장소에 있으므로 보상 방식으로 확정
    let auctions: Arc<dyn AuctionReader>;
    let settlement: Arc<dyn BidSettlement>;
    match &config.auction_service_url {
        Some(url) => {
            info!("{:<12} --> 원격 경매 서비스 사용: {}", "Config", url);
            let client = Arc::new(HttpAuctionClient::new(
                url,
                config.service_token.clone(),
                config.collaborator_timeout,
            )?);
            settlement = Arc::new(RemoteSettlement::new(
                client.clone(),
                Arc::clone(&storage.bids),
                config.collaborator_timeout,
            ));
            auctions = client;
        }
        None => {
            auctions = lifecycle.clone();
            settlement = storage.settlement;
        }
    }

    let users: Arc<dyn UserLookup> = match &config.user_service_url {
        Some(url) => {
            info!("{:<12} --> 원격 사용자 서비스 사용: {}", "Config", url);
            Arc::new(HttpUserDirectory::new(
                url,
                config.service_token.clone(),
                config.collaborator_timeout,
            )?)
        }
        None => Arc::new(InMemoryUserDirectory::new(true)),
    };

    let pipeline = Arc::new(BidAdmissionPipeline::new(
        auctions,
        settlement,
        users,
        storage.bids,
        fanout.clone(),
        AdmissionSettings {
            collaborator_timeout: config.collaborator_timeout,
            max_retries: config.max_admission_retries,
        },
    ));

    Ok(AppState {
        lifecycle,
        pipeline,
        fanout,
        verifier: Arc::new(JwtVerifier::from_secret(config.jwt_secret.as_bytes())),
    })
}
// endregion: --- App State

// region:    --- Router
pub fn app_router(state: AppState) -> Router {
    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // 경매
        .route(
            "/auctions",
            post(handlers::create_auction).get(handlers::list_auctions),
        )
        .route(
            "/auctions/:id",
            get(handlers::get_auction).delete(handlers::delete_auction),
        )
        .route("/auctions/:id/status", get(handlers::auction_status))
        .route("/auctions/:id/start", post(handlers::start_auction))
        .route("/auctions/:id/end", post(handlers::end_auction))
        .route("/auctions/:id/extend", post(handlers::extend_auction))
        .route(
            "/auctions/:id/moderation-session",
            post(handlers::join_moderation).delete(handlers::leave_moderation),
        )
        .route("/auctions/:id/price", put(handlers::update_price))
        .route("/auctions/:id/price/revert", put(handlers::revert_price))
        // 입찰
        .route(
            "/auctions/:id/bids",
            post(handlers::place_bid).get(handlers::list_bids),
        )
        .route("/auctions/:id/bids/validate", post(handlers::validate_bid))
        .route("/auctions/:id/bids/highest", get(handlers::highest_bid))
        .route(
            "/auctions/:id/bids/:bid_id",
            get(handlers::get_bid).delete(handlers::delete_bid),
        )
        .route("/users/:user_id/bids", get(handlers::bids_for_user))
        // 실시간
        .route("/ws", get(session::ws_handler))
        .route("/ws/stats", get(handlers::ws_stats))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
// endregion: --- Router
