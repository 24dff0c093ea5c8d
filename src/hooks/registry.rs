use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::ErrorCode;

use super::selector::HookSelector;
use super::types::{EnrichmentEvent, EnrichmentHook, HookContext, HookMetadata, HookOutcome};

#[derive(Clone)]
struct RegistryEntry {
    metadata: HookMetadata,
    selector: HookSelector,
    handler: Arc<dyn EnrichmentHook>,
}

/// Hook 执行计划
#[derive(Clone)]
pub struct HookPlan {
    metadata: HookMetadata,
    handler: Arc<dyn EnrichmentHook>,
}

impl HookPlan {
    pub fn metadata(&self) -> &HookMetadata {
        &self.metadata
    }

    /// 带超时执行一次
    pub async fn execute(&self, ctx: &HookContext, event: &EnrichmentEvent) -> HookOutcome {
        let fut = self.handler.handle(ctx, event);
        match tokio::time::timeout(self.metadata.timeout, fut).await {
            Ok(outcome) => outcome,
            Err(_) => HookOutcome::Failed(
                self.metadata
                    .build_error(ErrorCode::OperationTimeout, "enrichment hook timed out"),
            ),
        }
    }
}

/// 增强 Hook 注册中心，按 priority 升序执行
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<Vec<RegistryEntry>>,
}

impl HookRegistry {
    pub fn builder() -> HookRegistryBuilder {
        HookRegistryBuilder::default()
    }

    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register(
        &self,
        metadata: HookMetadata,
        selector: HookSelector,
        handler: Arc<dyn EnrichmentHook>,
    ) {
        let mut guard = self.hooks.write().await;
        guard.push(RegistryEntry {
            metadata,
            selector,
            handler,
        });
        guard.sort_by(|a, b| a.metadata.priority.cmp(&b.metadata.priority));
    }

    pub async fn plan(&self, ctx: &HookContext, event: &EnrichmentEvent) -> Vec<HookPlan> {
        let guard = self.hooks.read().await;
        guard
            .iter()
            .filter(|entry| entry.selector.matches(ctx, event))
            .map(|entry| HookPlan {
                metadata: entry.metadata.clone(),
                handler: Arc::clone(&entry.handler),
            })
            .collect()
    }

    /// 按名称查找（补偿队列重试时使用）
    pub async fn find(&self, name: &str) -> Option<HookPlan> {
        let guard = self.hooks.read().await;
        guard
            .iter()
            .find(|entry| entry.metadata.name.as_ref() == name)
            .map(|entry| HookPlan {
                metadata: entry.metadata.clone(),
                handler: Arc::clone(&entry.handler),
            })
    }

    pub async fn len(&self) -> usize {
        self.hooks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.hooks.read().await.is_empty()
    }
}

/// 同步构建注册中心
#[derive(Default)]
pub struct HookRegistryBuilder {
    entries: Vec<RegistryEntry>,
}

impl HookRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        metadata: HookMetadata,
        selector: HookSelector,
        handler: Arc<dyn EnrichmentHook>,
    ) -> Self {
        self.entries.push(RegistryEntry {
            metadata,
            selector,
            handler,
        });
        self
    }

    pub fn build(mut self) -> Arc<HookRegistry> {
        self.entries
            .sort_by(|a, b| a.metadata.priority.cmp(&b.metadata.priority));
        Arc::new(HookRegistry {
            hooks: RwLock::new(self.entries),
        })
    }
}
