use std::sync::Arc;

use async_trait::async_trait;

use flare_social_core::Result;
use flare_social_core::backend::{Backend, Subscription, SubscriptionCapability, SubscriptionScope};

/// 把完整后端收窄为只暴露订阅能力的变更源
pub struct BackendChangeFeed {
    backend: Arc<dyn Backend>,
}

impl BackendChangeFeed {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SubscriptionCapability for BackendChangeFeed {
    async fn subscribe(&self, scope: SubscriptionScope) -> Result<Subscription> {
        self.backend.subscribe(scope).await
    }
}
