//! # 会话上下文
//!
//! 显式初始化、显式清理的当前用户上下文，以 `Arc<SessionContext>` 注入到需要它的组件。

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{FlareError, Result};

/// 已登录用户的身份与资料快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub points: i64,
}

impl AuthSession {
    pub fn new<U: Into<String>, N: Into<String>>(user_id: U, username: N) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            full_name: None,
            avatar_url: None,
            points: 0,
        }
    }

    pub fn with_points(mut self, points: i64) -> Self {
        self.points = points;
        self
    }

    pub fn with_avatar<T: Into<String>>(mut self, avatar_url: T) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }
}

/// 会话上下文
#[derive(Debug, Default)]
pub struct SessionContext {
    inner: RwLock<Option<AuthSession>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以已登录用户初始化
    pub fn signed_in(session: AuthSession) -> Self {
        Self {
            inner: RwLock::new(Some(session)),
        }
    }

    pub async fn sign_in(&self, session: AuthSession) {
        info!(user_id = %session.user_id, "session signed in");
        *self.inner.write().await = Some(session);
    }

    pub async fn sign_out(&self) {
        if let Some(previous) = self.inner.write().await.take() {
            info!(user_id = %previous.user_id, "session signed out");
        }
    }

    /// 当前用户；未登录时返回 `Unauthenticated`
    pub async fn current(&self) -> Result<AuthSession> {
        self.inner
            .read()
            .await
            .clone()
            .ok_or_else(FlareError::unauthenticated)
    }

    pub async fn is_signed_in(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// 用服务端返回的积分总数刷新快照
    pub async fn update_points(&self, total: i64) {
        if let Some(session) = self.inner.write().await.as_mut() {
            debug!(user_id = %session.user_id, from = session.points, to = total, "session points refreshed");
            session.points = total;
        }
    }
}
