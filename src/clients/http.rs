// region:    --- Imports
use super::{AuctionReader, CollaboratorError, PriceRatchet, UserLookup, UserProfile};
use crate::auction::model::{Auction, AuctionId};
use crate::bidding::model::UserId;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

// endregion: --- Imports

fn build_client(timeout: Duration) -> Result<Client, CollaboratorError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CollaboratorError::Transport(e.to_string()))
}

/// base URL 뒤에 경로 세그먼트 추가 (세그먼트는 인코딩됨)
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, CollaboratorError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| CollaboratorError::Transport(format!("잘못된 base URL: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn parse_base(base_url: &str) -> Result<Url, CollaboratorError> {
    Url::parse(base_url).map_err(|e| CollaboratorError::Transport(format!("{}: {}", base_url, e)))
}

fn with_token(request: RequestBuilder, token: &Option<String>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

// region:    --- Auction Client
/// 원격 경매 서비스 클라이언트
pub struct HttpAuctionClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PriceUpdate {
    expected_version: i64,
    price: Decimal,
}

impl HttpAuctionClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: parse_base(base_url)?,
            token,
            timeout,
        })
    }

    /// PUT /auctions/{id}/<path> 로 version 검사 가격 변경 요청
    async fn put_price(
        &self,
        id: AuctionId,
        path: &[&str],
        expected_version: i64,
        price: Decimal,
    ) -> Result<bool, CollaboratorError> {
        let id = id.to_string();
        let mut segments = vec!["auctions", id.as_str()];
        segments.extend_from_slice(path);
        let url = endpoint(&self.base_url, &segments)?;
        let body = PriceUpdate {
            expected_version,
            price,
        };

        let response = with_token(self.http.put(url), &self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.timed_out(e))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            // 버전 충돌 또는 그 사이 삭제됨: 호출 측이 스냅샷부터 다시 읽는다
            StatusCode::CONFLICT | StatusCode::NOT_FOUND => Ok(false),
            status => {
                warn!("{:<12} --> 가격 변경 실패: status={}", "Client", status);
                Err(CollaboratorError::UnexpectedStatus(status.as_u16()))
            }
        }
    }

    fn timed_out(&self, err: reqwest::Error) -> CollaboratorError {
        match CollaboratorError::from(err) {
            CollaboratorError::Timeout(_) => CollaboratorError::Timeout(self.timeout),
            other => other,
        }
    }
}

#[async_trait]
impl AuctionReader for HttpAuctionClient {
    async fn snapshot(&self, id: AuctionId) -> Result<Option<Auction>, CollaboratorError> {
        let url = endpoint(&self.base_url, &["auctions", &id.to_string()])?;
        debug!("{:<12} --> 경매 스냅샷 요청: {}", "Client", url);

        let response = with_token(self.http.get(url), &self.token)
            .send()
            .await
            .map_err(|e| self.timed_out(e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let auction = response.json::<Auction>().await.map_err(|e| self.timed_out(e))?;
                Ok(Some(auction))
            }
            status => Err(CollaboratorError::UnexpectedStatus(status.as_u16())),
        }
    }
}

#[async_trait]
impl PriceRatchet for HttpAuctionClient {
    async fn advance_price(
        &self,
        id: AuctionId,
        expected_version: i64,
        price: Decimal,
    ) -> Result<bool, CollaboratorError> {
        self.put_price(id, &["price"], expected_version, price).await
    }

    async fn revert_price(
        &self,
        id: AuctionId,
        expected_version: i64,
        price: Decimal,
    ) -> Result<bool, CollaboratorError> {
        self.put_price(id, &["price", "revert"], expected_version, price).await
    }
}
// endregion: --- Auction Client

// region:    --- User Client
/// 원격 사용자 서비스 클라이언트
pub struct HttpUserDirectory {
    http: Client,
    base_url: Url,
    token: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteUser {
    id: UserId,
    username: String,
    #[serde(default)]
    display_name: Option<String>,
}

impl HttpUserDirectory {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: parse_base(base_url)?,
            token,
            timeout,
        })
    }
}

#[async_trait]
impl UserLookup for HttpUserDirectory {
    async fn resolve(&self, subject: &str) -> Result<UserProfile, CollaboratorError> {
        let url = endpoint(&self.base_url, &["users", "by-username", subject])?;
        let response = with_token(self.http.get(url), &self.token)
            .send()
            .await
            .map_err(|e| match CollaboratorError::from(e) {
                CollaboratorError::Timeout(_) => CollaboratorError::Timeout(self.timeout),
                other => other,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(CollaboratorError::UnknownUser(subject.to_string())),
            status if status.is_success() => {
                let user = response
                    .json::<RemoteUser>()
                    .await
                    .map_err(|e| CollaboratorError::Decode(e.to_string()))?;
                Ok(UserProfile {
                    id: user.id,
                    display_name: user.display_name.unwrap_or_else(|| user.username.clone()),
                    username: user.username,
                })
            }
            status => Err(CollaboratorError::UnexpectedStatus(status.as_u16())),
        }
    }
}
// endregion: --- User Client
