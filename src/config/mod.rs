//! Flare Social Core 配置模块
//!
//! 该模块提供了客户端运行所需的配置管理功能，包括：
//! - 配置文件加载和解析（单文件或目录合并）
//! - 环境特定配置覆盖
//! - 积分奖励、增强副作用、实时订阅、对象存储等配置定义

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use toml::Value;
use tracing::{debug, warn};

mod manager;
pub use manager::ConfigManager;

/// 全局应用配置实例，使用 OnceLock 确保只初始化一次
static APP_CONFIG: OnceLock<FlareSocialConfig> = OnceLock::new();

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（RUST_LOG 优先）
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub with_target: bool,
    #[serde(default)]
    pub with_thread_ids: bool,
    #[serde(default)]
    pub with_file: bool,
    #[serde(default)]
    pub with_line_number: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: false,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
        }
    }
}

/// 积分奖励配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// 内容被点赞时作者获得的积分
    pub like_received: i64,
    /// 发表评论者获得的积分
    pub comment_written: i64,
    /// 内容被评论时作者获得的积分
    pub comment_received: i64,
    /// 发帖获得的积分
    pub post_created: i64,
    /// 被关注时获得的积分（0 表示关闭）
    pub follow_received: i64,
    /// 取消点赞时是否收回作者的点赞奖励
    pub revoke_on_unlike: bool,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            like_received: 2,
            comment_written: 1,
            comment_received: 2,
            post_created: 5,
            follow_received: 0,
            revoke_on_unlike: true,
        }
    }
}

/// 增强副作用（积分、通知）执行配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// 单个 Hook 超时时间（毫秒）
    pub timeout_ms: u64,
    /// 失败重试次数上限（仅 Retry 策略）
    pub max_retries: u32,
    /// 待重试队列容量
    pub outbox_capacity: usize,
    /// 是否在后台任务中执行
    pub background: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3_000,
            max_retries: 3,
            outbox_capacity: 1_024,
            background: false,
        }
    }
}

/// 实时订阅配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// 删除事件是否携带完整行（否则只有主键）
    pub full_delete_payloads: bool,
    /// 通知中心加载的条数上限
    pub notification_limit: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            full_delete_payloads: false,
            notification_limit: 50,
        }
    }
}

/// 信息流配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub page_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { page_size: 10 }
    }
}

/// 后端服务配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendConfig {
    /// 后端地址
    #[serde(default)]
    pub url: Option<String>,
    /// 匿名访问密钥
    #[serde(default)]
    pub anon_key: Option<String>,
    /// 请求超时（毫秒）
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// 对象存储配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ObjectStoreConfig {
    /// 存储类型（如 memory, s3 等）
    pub profile_type: String,
    /// 存储服务端点
    #[serde(default)]
    pub endpoint: Option<String>,
    /// 存储桶名称
    #[serde(default)]
    pub bucket: Option<String>,
    /// 公开访问基础 URL
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// 上传路径前缀
    #[serde(default)]
    pub upload_prefix: Option<String>,
}

/// Flare Social 客户端配置主结构体
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FlareSocialConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub rewards: RewardConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    /// 对象存储配置映射
    #[serde(default)]
    pub object_storage: HashMap<String, ObjectStoreConfig>,
    /// 媒体上传使用的对象存储配置名
    #[serde(default)]
    pub media_profile: Option<String>,
}

impl FlareSocialConfig {
    /// 从 TOML 字符串解析
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut cfg: FlareSocialConfig =
            toml::from_str(content).context("invalid config format")?;
        cfg.ensure_defaults();
        Ok(cfg)
    }

    /// 获取对象存储配置
    pub fn object_store_profile(&self, name: &str) -> Option<&ObjectStoreConfig> {
        self.object_storage.get(name)
    }

    /// 媒体上传使用的存储桶
    pub fn media_bucket(&self) -> String {
        let profile = self.media_profile.as_deref().unwrap_or("media");
        ConfigManager::select_object_store_config(self, profile)
            .and_then(|store| store.bucket)
            .unwrap_or_else(|| "post-images".to_string())
    }

    /// 校验配置引用
    pub fn validate_references(&self) -> Result<()> {
        if let Some(profile) = self.media_profile.as_deref() {
            if !self.object_storage.contains_key(profile) {
                return Err(anyhow!(
                    "media_profile `{profile}` does not reference a configured object_storage entry"
                ));
            }
        }
        if self.feed.page_size == 0 {
            return Err(anyhow!("feed.page_size must be greater than zero"));
        }
        Ok(())
    }

    /// 确保配置有默认值
    fn ensure_defaults(&mut self) {
        if self.feed.page_size == 0 {
            self.feed.page_size = FeedConfig::default().page_size;
        }
        if self.enrichment.timeout_ms == 0 {
            self.enrichment.timeout_ms = EnrichmentConfig::default().timeout_ms;
        }
        if self.realtime.notification_limit == 0 {
            self.realtime.notification_limit = RealtimeConfig::default().notification_limit;
        }
    }
}

/// 加载全局配置，环境名取自 FLARE_ENV
pub fn load_config(path: Option<&str>) -> &'static FlareSocialConfig {
    APP_CONFIG.get_or_init(|| {
        let environment = ConfigManager::get_environment();
        let candidates = match path {
            Some(p) => vec![PathBuf::from(p)],
            None => vec![PathBuf::from("config"), PathBuf::from("config.toml")],
        };
        for candidate in &candidates {
            match load_config_from_source(candidate, Some(&environment)) {
                Ok(cfg) => return cfg,
                Err(err) => warn!(path = %candidate.display(), error = %err, "config source skipped"),
            }
        }
        warn!("no configuration source succeeded, falling back to defaults");
        FlareSocialConfig::default()
    })
}

/// 加载并校验配置
pub fn load_config_with_validation(
    path: Option<&str>,
    strict: bool,
) -> Result<&'static FlareSocialConfig> {
    let config = load_config(path);
    if strict {
        config
            .validate_references()
            .context("configuration validation failed")?;
        return Ok(config);
    }

    if let Err(e) = config.validate_references() {
        warn!("configuration reference validation failed: {}", e);
    }
    Ok(config)
}

/// 获取应用配置（未初始化时返回默认配置）
pub fn app_config() -> &'static FlareSocialConfig {
    APP_CONFIG.get_or_init(FlareSocialConfig::default)
}

/// 从文件或目录加载配置（不写入全局实例）
///
/// 目录必须包含 `base.toml`；给定环境名时再叠加 `environments/{environment}.toml`。
pub fn load_config_from_source(path: &Path, environment: Option<&str>) -> Result<FlareSocialConfig> {
    if path.is_file() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file: {}", path.display()))?;
        return FlareSocialConfig::from_toml_str(&content)
            .with_context(|| format!("invalid config file: {}", path.display()));
    }
    if !path.is_dir() {
        return Err(anyhow!("configuration path {} does not exist", path.display()));
    }

    let base_file = path.join("base.toml");
    let content = fs::read_to_string(&base_file)
        .with_context(|| format!("missing base configuration: {}", base_file.display()))?;
    let mut cfg = FlareSocialConfig::from_toml_str(&content)
        .with_context(|| format!("invalid base configuration: {}", base_file.display()))?;

    if let Some(environment) = environment {
        let applied = ConfigManager::load_environment_config(&mut cfg, path, environment)?;
        debug!(environment, applied, "environment overlay resolved");
    }
    Ok(cfg)
}

/// 递归合并：表按键合并，其余值直接覆盖
pub(crate) fn merge_value(base: &mut Value, overlay: Value) {
    match overlay {
        Value::Table(overlay_table) => {
            if let Value::Table(base_table) = base {
                for (key, overlay_value) in overlay_table.into_iter() {
                    match base_table.get_mut(&key) {
                        Some(base_value) => merge_value(base_value, overlay_value),
                        None => {
                            base_table.insert(key, overlay_value);
                        }
                    }
                }
            } else {
                *base = Value::Table(overlay_table);
            }
        }
        other => {
            *base = other;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let cfg = FlareSocialConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.rewards.like_received, 2);
        assert_eq!(cfg.rewards.comment_written, 1);
        assert_eq!(cfg.rewards.comment_received, 2);
        assert!(cfg.rewards.revoke_on_unlike);
        assert_eq!(cfg.feed.page_size, 10);
        assert_eq!(cfg.enrichment.timeout_ms, 3_000);
        assert!(!cfg.realtime.full_delete_payloads);
        assert_eq!(cfg.realtime.notification_limit, 50);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_partial_override() {
        let cfg = FlareSocialConfig::from_toml_str(
            r#"
            media_profile = "media"

            [rewards]
            like_received = 3

            [object_storage.media]
            profile_type = "memory"
            bucket = "images"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.rewards.like_received, 3);
        assert_eq!(cfg.rewards.comment_received, 2);
        assert_eq!(cfg.media_bucket(), "images");
        assert!(cfg.validate_references().is_ok());
    }

    #[test]
    fn test_dangling_media_profile_rejected() {
        let cfg = FlareSocialConfig::from_toml_str(r#"media_profile = "missing""#).unwrap();
        assert!(cfg.validate_references().is_err());
    }

    fn shipped_config_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("config")
    }

    #[test]
    fn test_shipped_base_config_loads() {
        let cfg = load_config_from_source(&shipped_config_dir(), None).unwrap();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.rewards.post_created, 5);
        assert_eq!(cfg.backend.timeout_ms, Some(10_000));
        assert_eq!(cfg.enrichment.outbox_capacity, 1024);
        assert_eq!(cfg.media_profile.as_deref(), Some("media"));
        assert!(cfg.validate_references().is_ok());
    }

    #[test]
    fn test_development_overlay_merges_onto_base() {
        let cfg = load_config_from_source(&shipped_config_dir(), Some("development")).unwrap();
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.with_file);
        assert!(cfg.logging.with_target);
        assert_eq!(cfg.rewards.like_received, 2);
        assert_eq!(cfg.realtime.notification_limit, 50);
        assert_eq!(
            cfg.object_store_profile("media").and_then(|s| s.bucket.as_deref()),
            Some("post-images")
        );
    }

    #[test]
    fn test_unknown_environment_keeps_base() {
        let cfg = load_config_from_source(&shipped_config_dir(), Some("staging")).unwrap();
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let missing = shipped_config_dir().join("absent");
        assert!(load_config_from_source(&missing, None).is_err());
    }

    #[test]
    fn test_merge_value_overrides_nested_keys() {
        let mut base: Value = toml::from_str("[rewards]\nlike_received = 2\npost_created = 5").unwrap();
        let overlay: Value = toml::from_str("[rewards]\nlike_received = 4").unwrap();
        merge_value(&mut base, overlay);
        let cfg: FlareSocialConfig = base.try_into().unwrap();
        assert_eq!(cfg.rewards.like_received, 4);
        assert_eq!(cfg.rewards.post_created, 5);
    }
}
