// region:    --- Imports
use live_auction_service::app::{app_router, build_state, Storage};
use live_auction_service::config::Config;
use live_auction_service::database::DatabaseManager;
use live_auction_service::scheduler::AuctionClock;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let config = Config::from_env().map_err(|e| {
        error!("{:<12} --> 설정 로드 실패: {}", "Main", e);
        e
    })?;

    // 저장소 선택 (DATABASE_URL 없으면 인메모리)
    let storage = match &config.database_url {
        Some(url) => {
            let db_manager =
                DatabaseManager::new(url, config.database_max_connections).await?;
            if let Err(e) = db_manager.initialize_database().await {
                error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
                return Err(e.into());
            }
            info!("{:<12} --> 데이터베이스 초기화 성공", "Main");
            Storage::postgres(db_manager.get_pool())
        }
        None => {
            info!("{:<12} --> DATABASE_URL 미설정: 인메모리 저장소 사용", "Main");
            Storage::in_memory()
        }
    };

    let state = build_state(&config, storage)?;

    // 종료 시간이 지난 경매 정리
    AuctionClock::new(Arc::clone(&state.lifecycle), config.clock_interval).start();

    let routes_all = app_router(state);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main
