//! # 实时同步
//!
//! 订阅服务端推送的行级变更，并合并到屏幕持有的本地状态：
//! 插入按主键去重，更新按主键原位修改，删除按主键移除。

pub mod keyed;
pub mod listener;
pub mod scope;

pub use keyed::{Keyed, contains_key, insert_unique, move_to_front, remove_by_key, update_by_key};
pub use listener::{ChangeHandler, ListenerHandle, RealtimeListener, ReconcileOutcome, dispatch_event};
pub use scope::ScopedListener;
