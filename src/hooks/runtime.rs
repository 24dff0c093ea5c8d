use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::EnrichmentConfig;
use crate::error::FlareError;
use crate::metrics::METRICS;

use super::outbox::{EnrichmentOutbox, OutboxEntry};
use super::registry::{HookPlan, HookRegistry};
use super::types::{EnrichmentEvent, HookContext, HookErrorPolicy, HookOutcome};

/// 一次增强调度的结果
#[derive(Debug, Clone, Default)]
pub struct EnrichmentReport {
    pub completed: Vec<Arc<str>>,
    pub skipped: Vec<Arc<str>>,
    pub failed: Vec<(Arc<str>, FlareError)>,
    /// 写入补偿队列的数量
    pub queued: usize,
}

impl EnrichmentReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn merge(&mut self, other: EnrichmentReport) {
        self.completed.extend(other.completed);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
        self.queued += other.queued;
    }
}

/// Hook 调度器
///
/// 主操作成功后调用；任何 Hook 失败都只记录并计入报告，不会向调用方返回错误。
#[derive(Clone)]
pub struct HookDispatcher {
    registry: Arc<HookRegistry>,
    outbox: Arc<EnrichmentOutbox>,
    background: bool,
    default_timeout: Duration,
}

impl HookDispatcher {
    pub fn new(registry: Arc<HookRegistry>) -> Self {
        Self::with_config(registry, &EnrichmentConfig::default())
    }

    pub fn with_config(registry: Arc<HookRegistry>, config: &EnrichmentConfig) -> Self {
        Self {
            registry,
            outbox: Arc::new(EnrichmentOutbox::new(config.outbox_capacity)),
            background: config.background,
            default_timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }

    pub fn outbox(&self) -> &Arc<EnrichmentOutbox> {
        &self.outbox
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// 按配置执行：后台模式下派生任务并立即返回 None
    pub async fn enrich(&self, ctx: HookContext, event: EnrichmentEvent) -> Option<EnrichmentReport> {
        if self.background {
            drop(self.dispatch_in_background(ctx, event));
            None
        } else {
            Some(self.dispatch(&ctx, &event).await)
        }
    }

    pub fn dispatch_in_background(
        &self,
        ctx: HookContext,
        event: EnrichmentEvent,
    ) -> JoinHandle<EnrichmentReport> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.dispatch(&ctx, &event).await })
    }

    pub async fn dispatch(&self, ctx: &HookContext, event: &EnrichmentEvent) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();
        for plan in self.registry.plan(ctx, event).await {
            let outcome = plan.execute(ctx, event).await;
            report.merge(self.settle(&plan, ctx, event, outcome, 1).await);
        }
        if !report.is_clean() {
            debug!(event = event.kind(), failed = report.failed.len(), queued = report.queued, "enrichment finished with failures");
        }
        report
    }

    /// 重新执行补偿队列中的条目；超过最大重试次数的条目被丢弃
    pub async fn retry_outbox(&self) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();
        for entry in self.outbox.drain().await {
            let Some(plan) = self.registry.find(&entry.hook).await else {
                warn!(hook = %entry.hook, "hook no longer registered, dropping outbox entry");
                continue;
            };
            let outcome = plan.execute(&entry.ctx, &entry.event).await;
            report.merge(
                self.settle(&plan, &entry.ctx, &entry.event, outcome, entry.attempts + 1)
                    .await,
            );
        }
        report
    }

    async fn settle(
        &self,
        plan: &HookPlan,
        ctx: &HookContext,
        event: &EnrichmentEvent,
        outcome: HookOutcome,
        attempts: u32,
    ) -> EnrichmentReport {
        let metadata = plan.metadata();
        let mut report = EnrichmentReport::default();
        match outcome {
            HookOutcome::Completed => report.completed.push(metadata.name.clone()),
            HookOutcome::Skipped => report.skipped.push(metadata.name.clone()),
            HookOutcome::Failed(err) => {
                METRICS.record_hook_failure(&metadata.name);
                warn!(
                    hook = %metadata.name,
                    event = event.kind(),
                    attempts,
                    error = %err,
                    "enrichment hook failed"
                );
                let retry = metadata.error_policy == HookErrorPolicy::Retry
                    && attempts <= metadata.max_retries;
                if retry {
                    self.outbox
                        .push(OutboxEntry {
                            hook: metadata.name.clone(),
                            ctx: ctx.clone(),
                            event: event.clone(),
                            attempts,
                            last_error: err.clone(),
                        })
                        .await;
                    report.queued += 1;
                } else if metadata.error_policy == HookErrorPolicy::Retry {
                    warn!(hook = %metadata.name, attempts, "enrichment retries exhausted");
                }
                report.failed.push((metadata.name.clone(), err));
            }
        }
        report
    }
}
