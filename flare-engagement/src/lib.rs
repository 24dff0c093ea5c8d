//! # Flare Engagement
//!
//! 社交互动模块：点赞、关注、评论、付费内容解锁、发帖、信息流与资料页。
//!
//! ## 架构设计
//!
//! - **domain层**：领域模型、仓储接口、互动领域服务（乐观变更 + 增强调度）
//! - **application层**：命令与查询处理器，把错误转换为屏幕反馈
//! - **infrastructure层**：基于后端协作接口的仓储、积分与通知 Hook
//! - **service层**：依赖注入与启动

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod service;

pub use domain::model::{Comment, FeedItem, Post, PostRef, PremiumAccess, PremiumPostRef, Profile, ProfileView};
pub use domain::service::EngagementDomainService;
pub use service::{ApplicationBootstrap, ApplicationContext};
