use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use super::inflight::InFlightRegistry;
use super::state::{ToggleState, ViewCell};
use crate::error::Result;
use crate::metrics::METRICS;

/// 开关变更结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// 已确认的最终状态
    Applied(ToggleState),
    /// 该实体已有进行中的变更，本次被忽略
    Skipped,
}

/// 开关类乐观变更控制器（点赞、关注）
#[derive(Debug, Clone)]
pub struct ToggleController {
    kind: &'static str,
    inflight: Arc<InFlightRegistry>,
}

impl ToggleController {
    pub fn new(kind: &'static str) -> Self {
        Self::with_registry(kind, InFlightRegistry::new())
    }

    pub fn with_registry(kind: &'static str, inflight: Arc<InFlightRegistry>) -> Self {
        Self { kind, inflight }
    }

    pub fn registry(&self) -> &Arc<InFlightRegistry> {
        &self.inflight
    }

    /// 翻转开关
    ///
    /// 先把预测状态写入视图，再执行远程写入；远程闭包收到预测的目标状态，
    /// 可返回服务端的权威计数替换预测值。任何失败都会把视图恢复到调用前的状态并返回错误。
    pub async fn toggle<F, Fut>(
        &self,
        key: &str,
        cell: &ViewCell<ToggleState>,
        remote: F,
    ) -> Result<ToggleOutcome>
    where
        F: FnOnce(ToggleState) -> Fut,
        Fut: Future<Output = Result<Option<u64>>>,
    {
        let Some(guard) = self.inflight.try_acquire(key) else {
            debug!(kind = self.kind, key, "toggle ignored, mutation already in flight");
            METRICS.record_mutation(self.kind, "skipped");
            return Ok(ToggleOutcome::Skipped);
        };

        let previous = cell.snapshot().await;
        let predicted = previous.flipped();
        cell.set(predicted).await;
        debug!(kind = self.kind, key, token = guard.token(), ?previous, ?predicted, "optimistic toggle applied");

        match remote(predicted).await {
            Ok(authoritative) => {
                let confirmed = match authoritative {
                    Some(count) => ToggleState::new(predicted.active, count),
                    None => predicted,
                };
                if confirmed != predicted {
                    cell.set(confirmed).await;
                }
                METRICS.record_mutation(self.kind, "applied");
                Ok(ToggleOutcome::Applied(confirmed))
            }
            Err(err) => {
                cell.set(previous).await;
                warn!(kind = self.kind, key, error = %err, "remote toggle failed, rolled back");
                debug!(kind = self.kind, key, restored = ?previous, "toggle state restored");
                METRICS.record_mutation(self.kind, "rolled_back");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlareError;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_failed_remote_restores_previous_state() {
        let controller = ToggleController::new("like");
        let cell = ViewCell::new(ToggleState::new(false, 5));

        let result = controller
            .toggle("post:p1", &cell, |_| async {
                Err(FlareError::remote_write("boom"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(cell.snapshot().await, ToggleState::new(false, 5));
        assert!(!controller.registry().is_busy("post:p1"));
    }

    #[tokio::test]
    async fn test_authoritative_count_replaces_prediction() {
        let controller = ToggleController::new("like");
        let cell = ViewCell::new(ToggleState::new(false, 5));

        let outcome = controller
            .toggle("post:p1", &cell, |target| async move {
                assert!(target.active);
                Ok(Some(9))
            })
            .await
            .unwrap();

        assert_eq!(outcome, ToggleOutcome::Applied(ToggleState::new(true, 9)));
        assert_eq!(cell.snapshot().await, ToggleState::new(true, 9));
    }

    #[tokio::test]
    async fn test_concurrent_toggle_on_same_entity_is_skipped() {
        let controller = ToggleController::new("follow");
        let cell = ViewCell::new(ToggleState::new(false, 0));
        let (release, wait) = oneshot::channel::<()>();

        let first = {
            let controller = controller.clone();
            let cell = cell.clone();
            tokio::spawn(async move {
                controller
                    .toggle("profile:u2", &cell, |_| async move {
                        let _ = wait.await;
                        Ok(None)
                    })
                    .await
            })
        };
        while !controller.registry().is_busy("profile:u2") {
            tokio::task::yield_now().await;
        }

        let second = controller
            .toggle("profile:u2", &cell, |_| async { Ok(None) })
            .await
            .unwrap();
        assert_eq!(second, ToggleOutcome::Skipped);

        let _ = release.send(());
        let first = first.await.unwrap().unwrap();
        assert_eq!(first, ToggleOutcome::Applied(ToggleState::new(true, 1)));
    }
}
