use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::error::FlareError;

use super::types::{EnrichmentEvent, HookContext};

/// 待重试的增强调用
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub hook: Arc<str>,
    pub ctx: HookContext,
    pub event: EnrichmentEvent,
    pub attempts: u32,
    pub last_error: FlareError,
}

/// 有界的增强补偿队列；满时丢弃最旧的条目
#[derive(Debug)]
pub struct EnrichmentOutbox {
    capacity: usize,
    entries: Mutex<VecDeque<OutboxEntry>>,
}

impl EnrichmentOutbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn push(&self, entry: OutboxEntry) {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.capacity {
            if let Some(dropped) = entries.pop_front() {
                warn!(
                    hook = %dropped.hook,
                    event = dropped.event.kind(),
                    "enrichment outbox full, dropping oldest entry"
                );
            }
        }
        entries.push_back(entry);
    }

    /// 取出全部条目
    pub async fn drain(&self) -> Vec<OutboxEntry> {
        self.entries.lock().await.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn pending(&self) -> Vec<OutboxEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(post: &str) -> OutboxEntry {
        OutboxEntry {
            hook: Arc::from("reward_points"),
            ctx: HookContext::new("u1"),
            event: EnrichmentEvent::PostCreated {
                author_id: "u1".into(),
                post_id: post.into(),
            },
            attempts: 1,
            last_error: FlareError::remote_write("offline"),
        }
    }

    #[tokio::test]
    async fn test_capacity_drops_oldest() {
        let outbox = EnrichmentOutbox::new(2);
        outbox.push(entry("p1")).await;
        outbox.push(entry("p2")).await;
        outbox.push(entry("p3")).await;

        let drained = outbox.drain().await;
        let posts: Vec<_> = drained
            .iter()
            .map(|e| match &e.event {
                EnrichmentEvent::PostCreated { post_id, .. } => post_id.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(posts, ["p2", "p3"]);
        assert!(outbox.is_empty().await);
    }
}
