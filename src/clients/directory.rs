use super::{CollaboratorError, UserLookup, UserProfile};
use crate::bidding::model::UserId;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// 인메모리 사용자 디렉터리
///
/// `auto_register` 가 켜져 있으면 처음 보는 subject 에 새 번호를 발급한다.
/// USER_SERVICE_URL 이 없는 로컬 실행에서 사용.
#[derive(Debug)]
pub struct InMemoryUserDirectory {
    users: DashMap<String, UserProfile>,
    next_id: AtomicI64,
    auto_register: bool,
}

impl InMemoryUserDirectory {
    pub fn new(auto_register: bool) -> Self {
        Self {
            users: DashMap::new(),
            next_id: AtomicI64::new(0),
            auto_register,
        }
    }

    /// 사용자 등록 (이미 있으면 기존 프로필 반환)
    pub fn register(&self, subject: &str, display_name: &str) -> UserProfile {
        self.users
            .entry(subject.to_string())
            .or_insert_with(|| UserProfile {
                id: self.allocate_id(),
                username: subject.to_string(),
                display_name: display_name.to_string(),
            })
            .clone()
    }

    pub fn id_of(&self, subject: &str) -> Option<UserId> {
        self.users.get(subject).map(|u| u.id)
    }

    fn allocate_id(&self) -> UserId {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl UserLookup for InMemoryUserDirectory {
    async fn resolve(&self, subject: &str) -> Result<UserProfile, CollaboratorError> {
        if let Some(profile) = self.users.get(subject) {
            return Ok(profile.clone());
        }
        if self.auto_register {
            return Ok(self.register(subject, subject));
        }
        Err(CollaboratorError::UnknownUser(subject.to_string()))
    }

    async fn find(&self, subject: &str) -> Result<Option<UserProfile>, CollaboratorError> {
        Ok(self.users.get(subject).map(|profile| profile.clone()))
    }
}
