use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type AuctionId = i64;

/// 최소 입찰 단위 기본값
pub const DEFAULT_MIN_INCREMENT: Decimal = Decimal::ONE;

/// 금액 소수 자릿수 (컬럼은 NUMERIC(18, 2))
pub const MONEY_SCALE: u32 = 2;

/// 금액 상한. 이 아래의 2자리 금액은 f64 로 직렬화해도 그대로 돌아온다.
pub const MONEY_LIMIT: i64 = 10_000_000_000_000;

// 경매 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionState {
    Scheduled,
    Active,
    Finished,
}

impl AuctionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionState::Scheduled => "SCHEDULED",
            AuctionState::Active => "ACTIVE",
            AuctionState::Finished => "FINISHED",
        }
    }
}

impl fmt::Display for AuctionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuctionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(AuctionState::Scheduled),
            "ACTIVE" => Ok(AuctionState::Active),
            "FINISHED" => Ok(AuctionState::Finished),
            other => Err(format!("알 수 없는 경매 상태: {}", other)),
        }
    }
}

// 경매 모델
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: AuctionId,
    pub description: String,
    pub category: String,
    pub starting_price: Decimal,
    pub current_price: Decimal,
    pub minimum_increment: Option<Decimal>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_days: i64,
    pub owner: String,
    pub state: AuctionState,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Auction {
    /// 다음 입찰이 넘어야 하는 최저 금액
    pub fn bid_floor(&self) -> Decimal {
        self.current_price + self.minimum_increment.unwrap_or(DEFAULT_MIN_INCREMENT)
    }

    pub fn is_owned_by(&self, subject: &str) -> bool {
        self.owner == subject
    }

    /// 종료 시간 연장 후 기간(일) 재계산
    /// 종료 시간이 없으면 시작 시간과 현재 중 늦은 쪽에서 센다.
    /// 시간 범위를 넘으면 아무것도 바꾸지 않고 None.
    pub fn push_end_time(&mut self, minutes: i64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let base = self
            .end_time
            .unwrap_or_else(|| self.start_time.map_or(now, |start| start.max(now)));
        let new_end = base.checked_add_signed(Duration::try_minutes(minutes)?)?;

        self.end_time = Some(new_end);
        self.duration_days = duration_days(self.start_time.unwrap_or(self.created_at), new_end);
        Some(new_end)
    }
}

/// 경매 생성 요청
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionDraft {
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub starting_price: Decimal,
    #[serde(default)]
    pub minimum_increment: Option<Decimal>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_days: Option<i64>,
}

/// 저장소에 넣기 직전의 경매 (id, version 미할당)
#[derive(Debug, Clone)]
pub struct NewAuction {
    pub description: String,
    pub category: String,
    pub starting_price: Decimal,
    pub current_price: Decimal,
    pub minimum_increment: Option<Decimal>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_days: i64,
    pub owner: String,
    pub state: AuctionState,
    pub created_at: DateTime<Utc>,
}

pub fn duration_days(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_days().max(0)
}

/// 저장 가능한 금액인지 확인 (소수 2자리, 상한 미만)
pub fn check_money(amount: Decimal) -> Result<(), String> {
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(format!(
            "금액은 소수점 {}자리까지만 허용됩니다: {}",
            MONEY_SCALE, amount
        ));
    }
    if amount.abs() >= Decimal::from(MONEY_LIMIT) {
        return Err(format!("금액이 허용 범위를 넘었습니다: {}", amount));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn sample() -> Auction {
        let now = Utc::now();
        Auction {
            id: 1,
            description: "camera".into(),
            category: "photo".into(),
            starting_price: dec(100),
            current_price: dec(100),
            minimum_increment: None,
            start_time: Some(now),
            end_time: Some(now + Duration::days(2)),
            duration_days: 2,
            owner: "seller".into(),
            state: AuctionState::Active,
            version: 1,
            created_at: now,
        }
    }

    #[test]
    fn floor_defaults_to_one_unit_increment() {
        let mut auction = sample();
        assert_eq!(auction.bid_floor(), dec(101));
        auction.minimum_increment = Some(dec(10));
        assert_eq!(auction.bid_floor(), dec(110));
    }

    #[test]
    fn pushing_end_time_recomputes_duration_days() {
        let mut auction = sample();
        let old_end = auction.end_time.unwrap();
        let new_end = auction.push_end_time(24 * 60, Utc::now());
        assert_eq!(new_end, Some(old_end + Duration::days(1)));
        assert_eq!(auction.duration_days, 3);
    }

    #[test]
    fn open_ended_auction_extends_from_its_future_start() {
        let now = Utc::now();
        let mut auction = sample();
        let start = now + Duration::hours(3);
        auction.start_time = Some(start);
        auction.end_time = None;

        let new_end = auction.push_end_time(30, now).unwrap();
        assert_eq!(new_end, start + Duration::minutes(30));
    }

    #[test]
    fn out_of_range_extension_leaves_the_auction_alone() {
        let mut auction = sample();
        let before = auction.clone();
        assert_eq!(auction.push_end_time(i64::MAX / 2, Utc::now()), None);
        assert_eq!(auction, before);
    }

    #[test]
    fn money_is_limited_to_cents() {
        assert!(check_money(Decimal::new(10_050, 2)).is_ok());
        assert!(check_money(Decimal::new(100_000, 3)).is_ok());
        assert!(check_money(Decimal::new(100_001, 3)).is_err());
        assert!(check_money(Decimal::from(MONEY_LIMIT)).is_err());
    }

    #[test]
    fn state_round_trips_through_its_column_text() {
        for state in [
            AuctionState::Scheduled,
            AuctionState::Active,
            AuctionState::Finished,
        ] {
            assert_eq!(state.as_str().parse::<AuctionState>(), Ok(state));
        }
        assert!("activa".parse::<AuctionState>().is_err());
    }
}
