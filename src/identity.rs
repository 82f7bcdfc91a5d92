// region:    --- Imports
use crate::app::AppState;
use crate::error::AppError;
use axum::{async_trait, extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// endregion: --- Imports

// region:    --- Identity
/// 권한 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Participant,
    Moderator,
    Administrator,
}

impl Role {
    /// 클레임 문자열 해석. 알 수 없거나 없으면 참가자
    pub fn from_claim(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Role::Participant;
        };
        let normalized = raw.trim().to_ascii_uppercase();
        match normalized.trim_start_matches("ROLE_") {
            "MODERADOR" | "MODERATOR" => Role::Moderator,
            "ADMINISTRADOR" | "ADMINISTRATOR" | "ADMIN" => Role::Administrator,
            _ => Role::Participant,
        }
    }
}

/// 검증된 호출자 (subject, role)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject: String,
    pub role: Role,
}

impl Identity {
    pub fn new(subject: impl Into<String>, role: Role) -> Self {
        Self {
            subject: subject.into(),
            role,
        }
    }

    /// 경매 변경 권한 (진행자, 관리자)
    pub fn can_moderate(&self) -> bool {
        matches!(self.role, Role::Moderator | Role::Administrator)
    }
}
// endregion: --- Identity

// region:    --- Verifier
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("인증 정보가 없습니다")]
    Missing,

    #[error("유효하지 않은 토큰: {0}")]
    Invalid(String),

    #[error("만료된 토큰")]
    Expired,

    #[error("리프레시 토큰은 사용할 수 없습니다")]
    RefreshToken,
}

/// 베어러 자격 증명 검증기
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<Identity, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, rename = "type")]
    pub token_type: Option<String>,
}

/// HS256 JWT 검증기
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn from_secret(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        let token = strip_bearer(credential);
        if token.is_empty() {
            return Err(AuthError::Missing);
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(e.to_string()),
            }
        })?;

        if data.claims.token_type.as_deref() == Some("refresh") {
            return Err(AuthError::RefreshToken);
        }
        if data.claims.sub.trim().is_empty() {
            return Err(AuthError::Invalid("subject 가 비어 있습니다".to_string()));
        }

        Ok(Identity {
            role: Role::from_claim(data.claims.role.as_deref()),
            subject: data.claims.sub,
        })
    }
}

/// "Bearer " 접두사 제거
pub fn strip_bearer(credential: &str) -> &str {
    let credential = credential.trim();
    credential
        .strip_prefix("Bearer ")
        .or_else(|| credential.strip_prefix("bearer "))
        .unwrap_or(credential)
        .trim()
}
// endregion: --- Verifier

// region:    --- Extractor
/// 인증된 사용자 추출기
pub struct AuthenticatedUser(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized(AuthError::Missing.to_string()))?
            .to_str()
            .map_err(|_| AppError::Unauthorized("잘못된 Authorization 헤더".to_string()))?;

        state
            .verifier
            .verify(header)
            .map(AuthenticatedUser)
            .map_err(|e| AppError::Unauthorized(e.to_string()))
    }
}
// endregion: --- Extractor
