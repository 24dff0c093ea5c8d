//! 增强副作用 Hook 模块
//!
//! - 主操作（点赞、评论、关注、发消息等）成功后触发的积分奖励与通知
//! - Hook 失败与主操作隔离：只记录、计数，按策略写入补偿队列
//! - 注册中心按优先级编排，选择器按事件类型筛选

mod outbox;
mod registry;
mod runtime;
mod selector;
mod types;

pub use outbox::{EnrichmentOutbox, OutboxEntry};
pub use registry::{HookPlan, HookRegistry, HookRegistryBuilder};
pub use runtime::{EnrichmentReport, HookDispatcher};
pub use selector::{HookSelector, MatchRule};
pub use types::{
    EnrichmentEvent, EnrichmentHook, HookContext, HookErrorPolicy, HookMetadata, HookOutcome,
};
