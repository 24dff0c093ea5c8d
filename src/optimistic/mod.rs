//! # 乐观变更
//!
//! 开关（点赞、关注）与追加（评论、消息）两类变更：先更新本地视图，
//! 再执行远程写入，失败时回滚。

pub mod append;
pub mod inflight;
pub mod state;
pub mod toggle;

pub use append::{AppendController, AppendOutcome, ListEntity, Reconciliation, reconcile_authoritative};
pub use inflight::{InFlightGuard, InFlightRegistry};
pub use state::{ToggleState, ViewCell};
pub use toggle::{ToggleController, ToggleOutcome};
