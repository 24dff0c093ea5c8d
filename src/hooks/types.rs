use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorBuilder, ErrorCode, FlareError};

/// 主操作成功后触发的增强事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnrichmentEvent {
    Liked {
        actor_id: String,
        post_id: String,
        owner_id: String,
    },
    Unliked {
        actor_id: String,
        post_id: String,
        owner_id: String,
    },
    Followed {
        follower_id: String,
        followee_id: String,
    },
    Unfollowed {
        follower_id: String,
        followee_id: String,
    },
    Commented {
        actor_id: String,
        post_id: String,
        owner_id: String,
        comment_id: String,
        excerpt: String,
    },
    PostCreated {
        author_id: String,
        post_id: String,
    },
    PostPurchased {
        buyer_id: String,
        seller_id: String,
        post_id: String,
        price: i64,
    },
    MessageSent {
        sender_id: String,
        receiver_id: String,
        conversation_id: String,
        message_id: String,
        preview: String,
    },
}

impl EnrichmentEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EnrichmentEvent::Liked { .. } => "liked",
            EnrichmentEvent::Unliked { .. } => "unliked",
            EnrichmentEvent::Followed { .. } => "followed",
            EnrichmentEvent::Unfollowed { .. } => "unfollowed",
            EnrichmentEvent::Commented { .. } => "commented",
            EnrichmentEvent::PostCreated { .. } => "post_created",
            EnrichmentEvent::PostPurchased { .. } => "post_purchased",
            EnrichmentEvent::MessageSent { .. } => "message_sent",
        }
    }

    /// 触发事件的用户
    pub fn actor_id(&self) -> &str {
        match self {
            EnrichmentEvent::Liked { actor_id, .. }
            | EnrichmentEvent::Unliked { actor_id, .. }
            | EnrichmentEvent::Commented { actor_id, .. } => actor_id,
            EnrichmentEvent::Followed { follower_id, .. }
            | EnrichmentEvent::Unfollowed { follower_id, .. } => follower_id,
            EnrichmentEvent::PostCreated { author_id, .. } => author_id,
            EnrichmentEvent::PostPurchased { buyer_id, .. } => buyer_id,
            EnrichmentEvent::MessageSent { sender_id, .. } => sender_id,
        }
    }

    /// 被作用的内容所有者
    pub fn target_owner(&self) -> Option<&str> {
        match self {
            EnrichmentEvent::Liked { owner_id, .. }
            | EnrichmentEvent::Unliked { owner_id, .. }
            | EnrichmentEvent::Commented { owner_id, .. } => Some(owner_id),
            EnrichmentEvent::Followed { followee_id, .. }
            | EnrichmentEvent::Unfollowed { followee_id, .. } => Some(followee_id),
            EnrichmentEvent::PostPurchased { seller_id, .. } => Some(seller_id),
            EnrichmentEvent::MessageSent { receiver_id, .. } => Some(receiver_id),
            EnrichmentEvent::PostCreated { .. } => None,
        }
    }

    /// 操作者与内容所有者为同一人
    pub fn is_self_interaction(&self) -> bool {
        self.target_owner() == Some(self.actor_id())
    }
}

/// Hook 调用上下文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookContext {
    pub actor_id: String,
    pub trace_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl HookContext {
    pub fn new<T: Into<String>>(actor_id: T) -> Self {
        Self {
            actor_id: actor_id.into(),
            trace_id: None,
            occurred_at: Utc::now(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_trace<T: Into<String>>(mut self, trace_id: T) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_attribute<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Hook 执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Completed,
    /// 事件与该 Hook 无关（例如自我互动）
    Skipped,
    Failed(FlareError),
}

impl HookOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, HookOutcome::Completed)
    }
}

/// Hook 失败处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HookErrorPolicy {
    /// 失败后写入补偿队列，稍后重试
    Retry,
    /// 失败时只记录告警
    #[default]
    Ignore,
}

/// 增强 Hook
#[async_trait]
pub trait EnrichmentHook: Send + Sync {
    async fn handle(&self, ctx: &HookContext, event: &EnrichmentEvent) -> HookOutcome;
}

#[async_trait]
impl<T> EnrichmentHook for Arc<T>
where
    T: EnrichmentHook + ?Sized,
{
    async fn handle(&self, ctx: &HookContext, event: &EnrichmentEvent) -> HookOutcome {
        (**self).handle(ctx, event).await
    }
}

/// Hook 注册元信息
#[derive(Debug, Clone)]
pub struct HookMetadata {
    pub name: Arc<str>,
    pub description: Option<Arc<str>>,
    pub priority: i32,
    pub timeout: std::time::Duration,
    pub max_retries: u32,
    pub error_policy: HookErrorPolicy,
}

impl Default for HookMetadata {
    fn default() -> Self {
        Self {
            name: Arc::from("anonymous"),
            description: None,
            priority: 0,
            timeout: std::time::Duration::from_millis(3_000),
            max_retries: 0,
            error_policy: HookErrorPolicy::Ignore,
        }
    }
}

impl HookMetadata {
    pub fn with_name<T: Into<Arc<str>>>(mut self, name: T) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description<T: Into<Arc<str>>>(mut self, description: Option<T>) -> Self {
        self.description = description.map(Into::into);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_error_policy(mut self, policy: HookErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn build_error(&self, code: ErrorCode, message: &str) -> FlareError {
        ErrorBuilder::new(code, message)
            .details(format!("hook={}", self.name))
            .build_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_interaction_detection() {
        let own = EnrichmentEvent::Liked {
            actor_id: "u1".into(),
            post_id: "p1".into(),
            owner_id: "u1".into(),
        };
        let other = EnrichmentEvent::Commented {
            actor_id: "u1".into(),
            post_id: "p1".into(),
            owner_id: "u2".into(),
            comment_id: "c1".into(),
            excerpt: "hi".into(),
        };
        let created = EnrichmentEvent::PostCreated {
            author_id: "u1".into(),
            post_id: "p1".into(),
        };
        assert!(own.is_self_interaction());
        assert!(!other.is_self_interaction());
        assert!(!created.is_self_interaction());
        assert_eq!(other.kind(), "commented");
    }
}
