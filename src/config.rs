// region:    --- Imports
use crate::fanout::SlowConsumerPolicy;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Config Error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("환경 변수 {0} 가 설정되지 않았습니다")]
    Missing(&'static str),

    #[error("환경 변수 {name} 값이 잘못되었습니다: {value}")]
    Invalid { name: &'static str, value: String },
}
// endregion: --- Config Error

// region:    --- Config
/// 서비스 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub auction_service_url: Option<String>,
    pub service_token: Option<String>,
    pub user_service_url: Option<String>,
    pub collaborator_timeout: Duration,
    pub max_admission_retries: u32,
    pub room_queue_capacity: usize,
    pub slow_consumer_policy: SlowConsumerPolicy,
    pub clock_interval: Duration,
}

impl Config {
    /// 환경 변수(.env 포함)에서 설정 로드
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let listen_addr = parse_var("AUCTION_LISTEN_ADDR", "0.0.0.0:3000")?;
        let jwt_secret = optional_var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let slow_consumer_policy = parse_policy(optional_var("SLOW_CONSUMER_POLICY").as_deref())?;

        Ok(Self {
            listen_addr,
            database_url: optional_var("DATABASE_URL"),
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", "5")?,
            jwt_secret,
            auction_service_url: optional_var("AUCTION_SERVICE_URL"),
            service_token: optional_var("SERVICE_TOKEN"),
            user_service_url: optional_var("USER_SERVICE_URL"),
            collaborator_timeout: Duration::from_millis(parse_var(
                "COLLABORATOR_TIMEOUT_MS",
                "3000",
            )?),
            max_admission_retries: parse_var("MAX_ADMISSION_RETRIES", "100")?,
            room_queue_capacity: parse_var("ROOM_QUEUE_CAPACITY", "64")?,
            slow_consumer_policy,
            clock_interval: Duration::from_secs(parse_var("CLOCK_INTERVAL_SECS", "1")?),
        })
    }

    /// 외부 의존성 없이 동작하는 기본 설정 (테스트, 로컬 실행용)
    pub fn local(jwt_secret: impl Into<String>) -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_url: None,
            database_max_connections: 5,
            jwt_secret: jwt_secret.into(),
            auction_service_url: None,
            service_token: None,
            user_service_url: None,
            collaborator_timeout: Duration::from_secs(3),
            max_admission_retries: 100,
            room_queue_capacity: 64,
            slow_consumer_policy: SlowConsumerPolicy::Disconnect,
            clock_interval: Duration::from_secs(1),
        }
    }
}

fn optional_var(name: &'static str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_policy(raw: Option<&str>) -> Result<SlowConsumerPolicy, ConfigError> {
    match raw {
        None | Some("disconnect") => Ok(SlowConsumerPolicy::Disconnect),
        Some("drop") => Ok(SlowConsumerPolicy::DropMessage),
        Some(other) => Err(ConfigError::Invalid {
            name: "SLOW_CONSUMER_POLICY",
            value: other.to_string(),
        }),
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    let raw = optional_var(name).unwrap_or_else(|| default.to_string());
    raw.parse()
        .map_err(|_| ConfigError::Invalid { name, value: raw })
}
// endregion: --- Config
