//! Wire 风格的依赖注入模块
//!
//! 类似 Go 的 Wire 框架，提供简单的依赖构建方法

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use flare_social_core::backend::{Backend, SubscriptionCapability};
use flare_social_core::config::FlareSocialConfig;
use flare_social_core::hooks::{HookDispatcher, HookRegistry};
use flare_social_core::session::SessionContext;

use crate::application::handlers::{RealtimeCommandHandler, RealtimeQueryHandler};
use crate::domain::repository::{ChatRepository, NotificationRepository};
use crate::domain::service::{ChatDomainService, NotificationDomainService};
use crate::infrastructure::BackendChangeFeed;
use crate::infrastructure::persistence::{BackendChatRepository, BackendNotificationRepository};

/// 应用上下文 - 包含所有已初始化的服务
pub struct ApplicationContext {
    pub command_handler: Arc<RealtimeCommandHandler>,
    pub query_handler: Arc<RealtimeQueryHandler>,
    pub chat_service: Arc<ChatDomainService>,
    pub notification_service: Arc<NotificationDomainService>,
}

/// 构建应用上下文
///
/// 按照依赖顺序构建所有组件
///
/// # 参数
/// * `config` - 应用配置
/// * `backend` - 后端协作接口
/// * `session` - 当前用户上下文
/// * `enrichment` - 与互动模块共享的增强调度器；为空时不执行任何增强
pub async fn initialize(
    config: &FlareSocialConfig,
    backend: Arc<dyn Backend>,
    session: Arc<SessionContext>,
    enrichment: Option<HookDispatcher>,
) -> Result<ApplicationContext> {
    // 1. 校验配置引用
    config
        .validate_references()
        .context("Failed to validate realtime configuration")?;

    // 2. 创建仓储与变更源
    let chats: Arc<dyn ChatRepository> = Arc::new(BackendChatRepository::new(backend.clone()));
    let notifications: Arc<dyn NotificationRepository> =
        Arc::new(BackendNotificationRepository::new(backend.clone()));
    let feed: Arc<dyn SubscriptionCapability> = Arc::new(BackendChangeFeed::new(backend));

    // 3. 增强调度器
    let enrichment = enrichment.unwrap_or_else(|| {
        HookDispatcher::with_config(HookRegistry::builder().build(), &config.enrichment)
    });

    // 4. 构建领域服务
    let chat_service = Arc::new(ChatDomainService::new(
        chats,
        feed.clone(),
        session.clone(),
        enrichment.clone(),
    ));
    let notification_service = Arc::new(NotificationDomainService::new(
        notifications,
        feed,
        session,
        config.realtime.notification_limit,
    ));

    // 5. 构建命令处理器与查询处理器
    let command_handler = Arc::new(RealtimeCommandHandler::new(
        chat_service.clone(),
        notification_service.clone(),
    ));
    let query_handler = Arc::new(RealtimeQueryHandler::new(
        chat_service.clone(),
        notification_service.clone(),
    ));

    info!(
        hooks = enrichment.registry().len().await,
        full_delete_payloads = config.realtime.full_delete_payloads,
        "Realtime context initialized"
    );

    Ok(ApplicationContext {
        command_handler,
        query_handler,
        chat_service,
        notification_service,
    })
}
