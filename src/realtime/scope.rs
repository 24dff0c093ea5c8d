use std::sync::Arc;

use tracing::{debug, warn};

use super::listener::{ChangeHandler, RealtimeListener};
use crate::backend::{SubscriptionCapability, SubscriptionScope};
use crate::error::Result;

/// 与屏幕生命周期绑定的一组监听器
///
/// 绑定新的范围键之前总是先释放旧订阅；绑定相同的键不做任何事。
/// 释放发生在 `release`、重新绑定或自身被丢弃时。
#[derive(Debug, Default)]
pub struct ScopedListener {
    key: Option<String>,
    listeners: Vec<RealtimeListener>,
}

impl ScopedListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn is_bound_to(&self, key: &str) -> bool {
        self.key.as_deref() == Some(key)
    }

    /// 绑定到新的范围键；返回是否实际打开了新订阅
    pub async fn bind<B>(
        &mut self,
        key: &str,
        backend: &B,
        scopes: Vec<(SubscriptionScope, Arc<dyn ChangeHandler>)>,
    ) -> Result<bool>
    where
        B: SubscriptionCapability + ?Sized,
    {
        if self.is_bound_to(key) {
            debug!(key, "listener already bound to scope key");
            return Ok(false);
        }
        self.release();

        let mut opened = Vec::with_capacity(scopes.len());
        for (scope, handler) in scopes {
            match RealtimeListener::open(backend, scope, handler).await {
                Ok(listener) => opened.push(listener),
                Err(err) => {
                    warn!(key, error = %err, "failed to open realtime listener");
                    return Err(err);
                }
            }
        }

        self.listeners = opened;
        self.key = Some(key.to_string());
        debug!(key, subscriptions = self.listeners.len(), "listener bound");
        Ok(true)
    }

    /// 关闭全部订阅
    pub fn release(&mut self) {
        if let Some(key) = self.key.take() {
            let released = self.listeners.len();
            self.listeners.clear();
            debug!(key = %key, released, "listener released");
        }
    }

    /// 处理所有监听器中已到达的事件
    pub async fn drain_ready(&mut self) -> usize {
        let mut processed = 0;
        for listener in &mut self.listeners {
            processed += listener.drain_ready().await;
        }
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ChangeEvent, InMemoryBackend};
    use crate::realtime::ReconcileOutcome;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl ChangeHandler for Noop {
        async fn on_insert(&self, _event: &ChangeEvent) -> ReconcileOutcome {
            ReconcileOutcome::Ignored
        }

        async fn on_update(&self, _event: &ChangeEvent) -> ReconcileOutcome {
            ReconcileOutcome::Ignored
        }

        async fn on_delete(&self, _event: &ChangeEvent) -> ReconcileOutcome {
            ReconcileOutcome::Ignored
        }
    }

    fn scopes(conversation: &str) -> Vec<(SubscriptionScope, Arc<dyn ChangeHandler>)> {
        vec![
            (
                SubscriptionScope::filtered("messages", "conversation_id", conversation),
                Arc::new(Noop) as Arc<dyn ChangeHandler>,
            ),
            (
                SubscriptionScope::table("message_reactions"),
                Arc::new(Noop) as Arc<dyn ChangeHandler>,
            ),
        ]
    }

    #[tokio::test]
    async fn test_rebinding_never_accumulates_subscriptions() {
        let backend = InMemoryBackend::new();
        let mut scoped = ScopedListener::new();

        assert!(scoped.bind("c1", &backend, scopes("c1")).await.unwrap());
        assert!(!scoped.bind("c1", &backend, scopes("c1")).await.unwrap());
        assert_eq!(backend.active_subscriptions(), 2);

        assert!(scoped.bind("c2", &backend, scopes("c2")).await.unwrap());
        assert_eq!(backend.active_subscriptions(), 2);
        assert_eq!(scoped.current_key(), Some("c2"));

        scoped.release();
        assert_eq!(backend.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_failed_bind_leaves_nothing_open() {
        let backend = InMemoryBackend::new();
        backend.fail_next("subscribe:message_reactions");
        let mut scoped = ScopedListener::new();

        assert!(scoped.bind("c1", &backend, scopes("c1")).await.is_err());
        assert_eq!(backend.active_subscriptions(), 0);
        assert_eq!(scoped.current_key(), None);
    }
}
