//! Flare Social Core 公共库
//!
//! 提供社交客户端的统一配置、错误模型、后端协作接口、会话上下文、
//! 乐观变更控制器、实时同步监听器、增强 Hook 与等级体系

pub mod backend;
pub mod config;
pub mod error;
pub mod gamification;
pub mod hooks;
pub mod metrics;
pub mod optimistic;
pub mod realtime;
pub mod session;
pub mod tracing;
pub mod utils;

pub use backend::{
    Backend, InMemoryBackend, ObjectStorage, ProcedureCapability, QueryCapability,
    SubscriptionCapability, WriteCapability,
};
pub use config::{
    ConfigManager, EnrichmentConfig, FeedConfig, FlareSocialConfig, LoggingConfig,
    ObjectStoreConfig, RealtimeConfig, RewardConfig, app_config, load_config,
    load_config_from_source, load_config_with_validation,
};
pub use error::*;
pub use session::{AuthSession, SessionContext};
