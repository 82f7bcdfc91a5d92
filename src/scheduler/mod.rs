/// 경매 시계
/// 종료 시간이 지난 진행 중 경매를 주기적으로 종료한다.
/// 경매 시작은 소유자 동작이므로 여기서 하지 않는다.
// region:    --- Imports
use crate::auction::AuctionLifecycleManager;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

// endregion: --- Imports

// region:    --- Auction Clock
pub struct AuctionClock {
    lifecycle: Arc<AuctionLifecycleManager>,
    period: Duration,
}

impl AuctionClock {
    pub fn new(lifecycle: Arc<AuctionLifecycleManager>, period: Duration) -> Self {
        Self { lifecycle, period }
    }

    /// 백그라운드 태스크로 시작
    pub fn start(self) -> JoinHandle<()> {
        info!("{:<12} --> 경매 시계 시작 ({:?} 주기)", "Clock", self.period);
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }

    /// 한 번 실행. 종료한 경매 수 반환
    pub async fn tick(&self) -> usize {
        match self.lifecycle.close_expired(Utc::now()).await {
            Ok(closed) => {
                if !closed.is_empty() {
                    debug!("{:<12} --> 경매 {}건 종료", "Clock", closed.len());
                }
                closed.len()
            }
            Err(e) => {
                error!("{:<12} --> 경매 상태 업데이트 중 오류 발생: {}", "Clock", e);
                0
            }
        }
    }
}
// endregion: --- Auction Clock
