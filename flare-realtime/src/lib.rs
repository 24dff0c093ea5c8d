//! # Flare Realtime
//!
//! 实时模块：私信会话、消息表情回应、收件箱与通知中心。
//!
//! ## 架构设计
//!
//! - **domain层**：领域模型与屏幕状态、仓储接口、变更事件处理器、私信与通知领域服务
//! - **application层**：命令与查询处理器，把错误转换为屏幕反馈
//! - **infrastructure层**：基于后端协作接口的仓储与变更源
//! - **service层**：依赖注入与启动
//!
//! 每个屏幕独占自己的订阅，离开屏幕或切换会话时订阅随之释放。

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod service;

pub use domain::model::{
    ChatScreen, Conversation, ConversationSummary, InboxScreen, Message, Notification,
    NotificationCenter, Reaction,
};
pub use domain::service::{ChatDomainService, NotificationDomainService};
pub use service::{ApplicationBootstrap, ApplicationContext};
