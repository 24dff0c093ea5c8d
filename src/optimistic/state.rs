use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// 屏幕持有的本地视图状态
///
/// 克隆得到的是同一份状态的句柄，便于把同一个单元交给实时监听器与变更控制器。
#[derive(Debug, Default)]
pub struct ViewCell<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> Clone for ViewCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync> ViewCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
        }
    }

    pub async fn snapshot(&self) -> T {
        self.inner.read().await.clone()
    }

    pub async fn set(&self, value: T) {
        *self.inner.write().await = value;
    }

    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.write().await;
        f(&mut guard)
    }

    pub async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.read().await;
        f(&guard)
    }
}

/// 开关类状态：布尔关系 + 配对计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleState {
    pub active: bool,
    pub count: u64,
}

impl ToggleState {
    pub fn new(active: bool, count: u64) -> Self {
        Self { active, count }
    }

    /// 翻转后的预测状态，计数不低于 0
    pub fn flipped(&self) -> Self {
        if self.active {
            Self {
                active: false,
                count: self.count.saturating_sub(1),
            }
        } else {
            Self {
                active: true,
                count: self.count + 1,
            }
        }
    }
}
