use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backend::{ChangeEvent, ChangeKind, Subscription, SubscriptionCapability, SubscriptionScope};
use crate::error::Result;
use crate::metrics::METRICS;

/// 单个变更事件的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// 已合并到本地状态
    Applied,
    /// 主键已存在，跳过
    Duplicate,
    /// 本地没有对应实体，丢弃
    Unmatched,
    /// 与本视图无关
    Ignored,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied => "applied",
            ReconcileOutcome::Duplicate => "duplicate",
            ReconcileOutcome::Unmatched => "unmatched",
            ReconcileOutcome::Ignored => "ignored",
        }
    }
}

/// 变更事件处理器
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    async fn on_insert(&self, event: &ChangeEvent) -> ReconcileOutcome;

    async fn on_update(&self, event: &ChangeEvent) -> ReconcileOutcome;

    async fn on_delete(&self, event: &ChangeEvent) -> ReconcileOutcome;
}

/// 把事件分发到处理器对应的回调
pub async fn dispatch_event(handler: &dyn ChangeHandler, event: &ChangeEvent) -> ReconcileOutcome {
    let outcome = match event.kind {
        ChangeKind::Insert => handler.on_insert(event).await,
        ChangeKind::Update => handler.on_update(event).await,
        ChangeKind::Delete => handler.on_delete(event).await,
    };
    debug!(
        table = %event.table,
        change = %event.kind,
        id = event.primary_key().unwrap_or_default(),
        outcome = outcome.as_str(),
        "realtime event reconciled"
    );
    METRICS.record_realtime_event(&event.table, event.kind.as_str(), outcome.as_str());
    outcome
}

/// 实时同步监听器：一个订阅 + 一个处理器
pub struct RealtimeListener {
    subscription: Subscription,
    handler: Arc<dyn ChangeHandler>,
}

impl RealtimeListener {
    pub async fn open<B>(
        backend: &B,
        scope: SubscriptionScope,
        handler: Arc<dyn ChangeHandler>,
    ) -> Result<Self>
    where
        B: SubscriptionCapability + ?Sized,
    {
        let subscription = backend.subscribe(scope).await?;
        info!(scope = %subscription.scope().key(), "realtime listener opened");
        Ok(Self {
            subscription,
            handler,
        })
    }

    pub fn scope(&self) -> &SubscriptionScope {
        self.subscription.scope()
    }

    /// 处理所有已到达的事件，返回处理数量
    pub async fn drain_ready(&mut self) -> usize {
        let mut processed = 0;
        while let Some(event) = self.subscription.try_recv() {
            dispatch_event(self.handler.as_ref(), &event).await;
            processed += 1;
        }
        processed
    }

    /// 等待并处理下一个事件；订阅关闭时返回 None
    pub async fn next(&mut self) -> Option<ReconcileOutcome> {
        let event = self.subscription.recv().await?;
        Some(dispatch_event(self.handler.as_ref(), &event).await)
    }

    /// 在后台任务中持续处理事件
    pub fn spawn(mut self) -> ListenerHandle {
        let key = self.scope().key();
        let task = tokio::spawn(async move { while self.next().await.is_some() {} });
        ListenerHandle {
            key,
            task: Some(task),
        }
    }
}

impl fmt::Debug for RealtimeListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeListener")
            .field("scope", self.scope())
            .finish()
    }
}

/// 后台监听任务句柄；丢弃即中止任务并关闭订阅
#[derive(Debug)]
pub struct ListenerHandle {
    key: String,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 中止任务并等待其结束，返回时订阅已关闭
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            debug!(scope = %self.key, "realtime listener stopped");
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
