//! # Prometheus 指标收集模块
//!
//! 为乐观更新、实时同步和增强副作用提供统一的 Prometheus 指标收集能力。

use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, IntGauge, Opts, Registry};

/// 全局指标注册表
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// 全局客户端指标
pub static METRICS: Lazy<ClientMetrics> = Lazy::new(|| ClientMetrics::new(&REGISTRY));

/// 客户端指标
pub struct ClientMetrics {
    /// 乐观更新总数（kind: like/follow/comment/message/purchase，outcome: applied/rolled_back/skipped/rejected）
    pub optimistic_mutations_total: IntCounterVec,
    /// 实时事件处理总数（outcome: applied/duplicate/unmatched/ignored）
    pub realtime_events_total: IntCounterVec,
    /// 增强副作用 Hook 失败次数
    pub enrichment_hook_failures_total: IntCounterVec,
    /// 当前活跃订阅数
    pub active_subscriptions: IntGauge,
}

impl ClientMetrics {
    pub fn new(registry: &Registry) -> Self {
        let optimistic_mutations_total = IntCounterVec::new(
            Opts::new(
                "optimistic_mutations_total",
                "Total number of optimistic mutations by kind and outcome",
            ),
            &["kind", "outcome"],
        )
        .expect("Failed to create optimistic_mutations_total metric");

        let realtime_events_total = IntCounterVec::new(
            Opts::new(
                "realtime_events_total",
                "Total number of realtime change events reconciled into local state",
            ),
            &["table", "change", "outcome"],
        )
        .expect("Failed to create realtime_events_total metric");

        let enrichment_hook_failures_total = IntCounterVec::new(
            Opts::new(
                "enrichment_hook_failures_total",
                "Total number of failed best-effort enrichment hooks",
            ),
            &["hook"],
        )
        .expect("Failed to create enrichment_hook_failures_total metric");

        let active_subscriptions = IntGauge::with_opts(Opts::new(
            "active_subscriptions",
            "Number of open realtime subscriptions",
        ))
        .expect("Failed to create active_subscriptions metric");

        for collector in [
            Box::new(optimistic_mutations_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(realtime_events_total.clone()),
            Box::new(enrichment_hook_failures_total.clone()),
            Box::new(active_subscriptions.clone()),
        ] {
            if let Err(err) = registry.register(collector) {
                tracing::warn!(error = %err, "failed to register client metric");
            }
        }

        Self {
            optimistic_mutations_total,
            realtime_events_total,
            enrichment_hook_failures_total,
            active_subscriptions,
        }
    }

    pub fn record_mutation(&self, kind: &str, outcome: &str) {
        self.optimistic_mutations_total
            .with_label_values(&[kind, outcome])
            .inc();
    }

    pub fn record_realtime_event(&self, table: &str, change: &str, outcome: &str) {
        self.realtime_events_total
            .with_label_values(&[table, change, outcome])
            .inc();
    }

    pub fn record_hook_failure(&self, hook: &str) {
        self.enrichment_hook_failures_total
            .with_label_values(&[hook])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_on_private_registry() {
        let registry = Registry::new();
        let metrics = ClientMetrics::new(&registry);
        metrics.record_mutation("like", "applied");
        metrics.record_mutation("like", "applied");
        assert_eq!(
            metrics
                .optimistic_mutations_total
                .with_label_values(&["like", "applied"])
                .get(),
            2
        );
        assert!(!registry.gather().is_empty());
    }
}
