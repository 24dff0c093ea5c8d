use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use flare_social_core::backend::{InMemoryBackend, InMemoryBackendBuilder};
use flare_social_core::config::{FlareSocialConfig, load_config_from_source};
use flare_social_core::session::SessionContext;

mod wire;

pub use wire::{ApplicationContext, initialize};

/// 应用启动器
pub struct ApplicationBootstrap;

impl ApplicationBootstrap {
    /// 以内存后端构建应用上下文（本地开发与测试）
    pub async fn in_memory(
        config: &FlareSocialConfig,
        session: Arc<SessionContext>,
    ) -> Result<(ApplicationContext, Arc<InMemoryBackend>)> {
        let backend = Arc::new(InMemoryBackendBuilder::from_config(config).build());
        let context = wire::initialize(config, backend.clone(), session, None).await?;
        info!("Realtime bootstrap created with in-memory backend");
        Ok((context, backend))
    }

    /// 从配置文件或目录加载配置后以内存后端构建
    pub async fn in_memory_from_path(
        path: &Path,
        environment: Option<&str>,
        session: Arc<SessionContext>,
    ) -> Result<(ApplicationContext, Arc<InMemoryBackend>)> {
        let config = load_config_from_source(path, environment)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        Self::in_memory(&config, session).await
    }
}
