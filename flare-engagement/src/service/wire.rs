//! Wire 风格的依赖注入模块
//!
//! 类似 Go 的 Wire 框架，提供简单的依赖构建方法

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use flare_social_core::backend::Backend;
use flare_social_core::config::FlareSocialConfig;
use flare_social_core::hooks::{
    HookDispatcher, HookErrorPolicy, HookMetadata, HookRegistry, HookSelector,
};
use flare_social_core::session::SessionContext;

use crate::application::handlers::{EngagementCommandHandler, EngagementQueryHandler};
use crate::domain::repository::EngagementRepository;
use crate::domain::service::{EngagementDomainConfig, EngagementDomainService};
use crate::infrastructure::enrichment::{NotificationHook, RewardPointsHook};
use crate::infrastructure::persistence::BackendEngagementRepository;

/// 应用上下文 - 包含所有已初始化的服务
pub struct ApplicationContext {
    pub command_handler: Arc<EngagementCommandHandler>,
    pub query_handler: Arc<EngagementQueryHandler>,
    pub domain_service: Arc<EngagementDomainService>,
    pub enrichment: HookDispatcher,
}

/// 构建应用上下文
///
/// 按照依赖顺序构建所有组件
///
/// # 参数
/// * `config` - 应用配置
/// * `backend` - 后端协作接口
/// * `session` - 当前用户上下文
pub async fn initialize(
    config: &FlareSocialConfig,
    backend: Arc<dyn Backend>,
    session: Arc<SessionContext>,
) -> Result<ApplicationContext> {
    // 1. 校验配置引用
    config
        .validate_references()
        .context("Failed to validate engagement configuration")?;

    // 2. 创建仓储
    let repo: Arc<dyn EngagementRepository> = Arc::new(BackendEngagementRepository::new(backend));

    // 3. 注册增强 Hook：积分先于通知
    let enrichment_config = &config.enrichment;
    let metadata = |name: &str, priority: i32| {
        HookMetadata::default()
            .with_name(name)
            .with_priority(priority)
            .with_timeout(Duration::from_millis(enrichment_config.timeout_ms))
            .with_max_retries(enrichment_config.max_retries)
            .with_error_policy(HookErrorPolicy::Retry)
    };
    let registry = HookRegistry::builder()
        .register(
            metadata(RewardPointsHook::NAME, 10),
            HookSelector::for_events(["liked", "unliked", "commented", "post_created", "followed"]),
            Arc::new(RewardPointsHook::new(repo.clone(), config.rewards.clone())),
        )
        .register(
            metadata(NotificationHook::NAME, 20),
            HookSelector::for_events([
                "liked",
                "unliked",
                "commented",
                "followed",
                "unfollowed",
                "post_purchased",
            ]),
            Arc::new(NotificationHook::new(repo.clone())),
        )
        .build();

    // 4. 创建增强调度器
    let enrichment = HookDispatcher::with_config(registry, enrichment_config);

    // 5. 构建领域服务
    let domain_service = Arc::new(EngagementDomainService::new(
        repo,
        session,
        enrichment.clone(),
        EngagementDomainConfig::from_app_config(config),
    ));

    // 6. 构建命令处理器与查询处理器
    let command_handler = Arc::new(EngagementCommandHandler::new(domain_service.clone()));
    let query_handler = Arc::new(EngagementQueryHandler::new(domain_service.clone()));

    info!(
        hooks = enrichment.registry().len().await,
        background = enrichment_config.background,
        "Engagement context initialized"
    );

    Ok(ApplicationContext {
        command_handler,
        query_handler,
        domain_service,
        enrichment,
    })
}
