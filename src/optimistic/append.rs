use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use super::inflight::InFlightRegistry;
use super::state::ViewCell;
use crate::error::Result;
use crate::metrics::METRICS;
use crate::realtime::Keyed;
use crate::utils::is_temp_id;

/// 有序列表中的实体
pub trait ListEntity: Keyed + Clone + Send + Sync {
    /// 是否为尚未确认的本地临时实体
    fn is_provisional(&self) -> bool {
        is_temp_id(self.entity_id())
    }

    /// 本权威实体是否确认了给定的临时实体
    fn reconciles(&self, provisional: &Self) -> bool;
}

/// 权威实体与本地列表的合并结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// 主键已存在
    Duplicate,
    /// 原位替换了对应的临时实体
    Reconciled,
    /// 没有对应实体，由调用方决定是否追加
    Unmatched,
}

/// 把一条权威实体合并进本地列表：已存在则跳过，匹配临时实体则原位替换
pub fn reconcile_authoritative<T: ListEntity>(list: &mut [T], item: &T) -> Reconciliation {
    if list.iter().any(|existing| existing.entity_id() == item.entity_id()) {
        return Reconciliation::Duplicate;
    }
    match list
        .iter()
        .position(|existing| existing.is_provisional() && item.reconciles(existing))
    {
        Some(index) => {
            list[index] = item.clone();
            Reconciliation::Reconciled
        }
        None => Reconciliation::Unmatched,
    }
}

/// 追加变更结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome<T> {
    Confirmed(T),
    Skipped,
}

/// 追加类乐观变更控制器（评论、消息）
#[derive(Debug, Clone)]
pub struct AppendController {
    kind: &'static str,
    inflight: Arc<InFlightRegistry>,
}

impl AppendController {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            inflight: InFlightRegistry::new(),
        }
    }

    pub fn registry(&self) -> &Arc<InFlightRegistry> {
        &self.inflight
    }

    /// 追加一条临时实体并执行远程插入
    ///
    /// 成功时按临时 ID 原位替换为权威实体（若实时事件已先行完成替换则不做改动）；
    /// 失败时移除临时实体，列表恢复原状。
    pub async fn append<T, F, Fut>(
        &self,
        key: &str,
        list: &ViewCell<Vec<T>>,
        provisional: T,
        remote: F,
    ) -> Result<AppendOutcome<T>>
    where
        T: ListEntity,
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(_guard) = self.inflight.try_acquire(key) else {
            debug!(kind = self.kind, key, "append ignored, mutation already in flight");
            METRICS.record_mutation(self.kind, "skipped");
            return Ok(AppendOutcome::Skipped);
        };

        let temp_id = provisional.entity_id().to_string();
        list.update(|items| items.push(provisional.clone())).await;
        debug!(kind = self.kind, key, temp_id = %temp_id, "provisional entity appended");

        match remote(provisional).await {
            Ok(authoritative) => {
                list.update(|items| {
                    let temp_index = items.iter().position(|item| item.entity_id() == temp_id);
                    let already_present = items
                        .iter()
                        .any(|item| item.entity_id() == authoritative.entity_id());
                    match (temp_index, already_present) {
                        (Some(index), false) => items[index] = authoritative.clone(),
                        (Some(index), true) => {
                            items.remove(index);
                        }
                        (None, _) => {}
                    }
                })
                .await;
                debug!(
                    kind = self.kind,
                    key,
                    temp_id = %temp_id,
                    id = authoritative.entity_id(),
                    "provisional entity confirmed"
                );
                METRICS.record_mutation(self.kind, "applied");
                Ok(AppendOutcome::Confirmed(authoritative))
            }
            Err(err) => {
                list.update(|items| items.retain(|item| item.entity_id() != temp_id))
                    .await;
                warn!(kind = self.kind, key, error = %err, "remote append failed, provisional entity removed");
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
    use crate::utils::new_temp_id;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Note {
        id: String,
        author: String,
        text: String,
    }

    impl Keyed for Note {
        fn entity_id(&self) -> &str {
            &self.id
        }
    }

    impl ListEntity for Note {
        fn reconciles(&self, provisional: &Self) -> bool {
            self.author == provisional.author && self.text == provisional.text
        }
    }

    fn note(id: &str, text: &str) -> Note {
        Note {
            id: id.to_string(),
            author: "u1".to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_success_swaps_in_place() {
        let controller = AppendController::new("comment");
        let list = ViewCell::new(vec![note("c0", "first")]);
        let provisional = note(&new_temp_id(), "second");

        let outcome = controller
            .append("post:p1", &list, provisional, |_| async { Ok(note("c1", "second")) })
            .await
            .unwrap();

        assert_eq!(outcome, AppendOutcome::Confirmed(note("c1", "second")));
        let items = list.snapshot().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].id, "c1");
    }

    #[tokio::test]
    async fn test_failure_restores_list() {
        let controller = AppendController::new("comment");
        let before = vec![note("c0", "first")];
        let list = ViewCell::new(before.clone());

        let result = controller
            .append("post:p1", &list, note(&new_temp_id(), "second"), |_| async {
                Err(FlareError::remote_write("offline"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(list.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_realtime_first_then_confirmation_keeps_single_copy() {
        let controller = AppendController::new("message");
        let list = ViewCell::new(Vec::new());
        let echo = list.clone();

        controller
            .append("conversation:c1", &list, note(&new_temp_id(), "hey"), |_| async move {
                let authoritative = note("m1", "hey");
                echo.update(|items| {
                    reconcile_authoritative(items, &authoritative);
                })
                .await;
                Ok(authoritative)
            })
            .await
            .unwrap();

        assert_eq!(list.snapshot().await, vec![note("m1", "hey")]);
    }

    #[test]
    fn test_reconcile_detects_duplicates() {
        let mut items = vec![note("m1", "hey")];
        assert_eq!(
            reconcile_authoritative(&mut items, &note("m1", "hey")),
            Reconciliation::Duplicate
        );
        assert_eq!(
            reconcile_authoritative(&mut items, &note("m2", "other")),
            Reconciliation::Unmatched
        );
    }
}
