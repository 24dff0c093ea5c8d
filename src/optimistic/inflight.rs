use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// 每个实体的进行中变更标记
///
/// 同一实体同一时刻最多一个未确认的预测；每次占用分配单调递增的请求令牌，
/// 释放时只移除自己的令牌。
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    entries: DashMap<String, u64>,
    next_token: AtomicU64,
}

impl InFlightRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 尝试占用实体；已有进行中的变更时返回 None
    pub fn try_acquire(self: &Arc<Self>, key: &str) -> Option<InFlightGuard> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;
                slot.insert(token);
                Some(InFlightGuard {
                    registry: Arc::clone(self),
                    key: key.to_string(),
                    token,
                })
            }
        }
    }

    pub fn is_busy(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// 令牌是否仍是该实体当前的占用者
    pub fn is_current(&self, key: &str, token: u64) -> bool {
        self.entries.get(key).map(|t| *t == token).unwrap_or(false)
    }

    pub fn in_flight(&self) -> usize {
        self.entries.len()
    }
}

/// 占用凭证，丢弃即释放（包括 panic 与取消）
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    key: String,
    token: u64,
}

impl InFlightGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn is_current(&self) -> bool {
        self.registry.is_current(&self.key, self.token)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let token = self.token;
        self.registry
            .entries
            .remove_if(&self.key, |_, current| *current == token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused_until_release() {
        let registry = InFlightRegistry::new();
        let guard = registry.try_acquire("post:p1").unwrap();
        assert!(registry.try_acquire("post:p1").is_none());
        assert!(registry.try_acquire("post:p2").is_some());
        drop(guard);
        assert!(!registry.is_busy("post:p1"));
        let again = registry.try_acquire("post:p1").unwrap();
        assert!(again.token() > 1);
    }
}
