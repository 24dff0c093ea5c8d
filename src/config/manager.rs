//! 配置管理器：媒体存储配置选择与环境覆盖层合并

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use toml::Value;

use super::{FlareSocialConfig, ObjectStoreConfig};

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 选择对象存储配置，环境变量 FLARE_MEDIA_PROFILE 优先于配置中的名称
    pub fn select_object_store_config(
        config: &FlareSocialConfig,
        profile_name: &str,
    ) -> Option<ObjectStoreConfig> {
        let env_profile = env::var("FLARE_MEDIA_PROFILE").ok();
        Self::resolve_object_store(config, profile_name, env_profile.as_deref())
    }

    /// 覆盖名指向不存在的配置时回退到 `profile_name`
    pub fn resolve_object_store(
        config: &FlareSocialConfig,
        profile_name: &str,
        override_name: Option<&str>,
    ) -> Option<ObjectStoreConfig> {
        override_name
            .and_then(|name| config.object_store_profile(name))
            .or_else(|| config.object_store_profile(profile_name))
            .cloned()
    }

    /// 获取当前环境名称，未设置 FLARE_ENV 时为 "development"
    pub fn get_environment() -> String {
        env::var("FLARE_ENV").unwrap_or_else(|_| "development".to_string())
    }

    /// 叠加 `{config_dir}/environments/{environment}.toml`；文件不存在时返回 `false`
    pub fn load_environment_config(
        base_config: &mut FlareSocialConfig,
        config_dir: &Path,
        environment: &str,
    ) -> Result<bool> {
        let overlay_path = config_dir
            .join("environments")
            .join(format!("{environment}.toml"));
        if !overlay_path.is_file() {
            return Ok(false);
        }

        let content = fs::read_to_string(&overlay_path)
            .with_context(|| format!("unable to read environment config: {}", overlay_path.display()))?;
        let overlay: Value = toml::from_str(&content)
            .with_context(|| format!("invalid environment config: {}", overlay_path.display()))?;
        Self::apply_overlay(base_config, overlay)?;
        Ok(true)
    }

    /// 将覆盖配置合并到已有配置上
    ///
    /// 先把当前配置还原为 TOML 值（只还原覆盖层可能涉及的段），合并后重新反序列化。
    pub fn apply_overlay(base_config: &mut FlareSocialConfig, overlay: Value) -> Result<()> {
        let mut merged = Self::to_value(base_config);
        super::merge_value(&mut merged, overlay);
        *base_config = merged
            .try_into()
            .context("invalid configuration after applying environment overlay")?;
        base_config.ensure_defaults();
        Ok(())
    }

    fn to_value(config: &FlareSocialConfig) -> Value {
        let mut root = toml::map::Map::new();

        let mut logging = toml::map::Map::new();
        logging.insert("level".into(), Value::String(config.logging.level.clone()));
        logging.insert("with_target".into(), Value::Boolean(config.logging.with_target));
        logging.insert(
            "with_thread_ids".into(),
            Value::Boolean(config.logging.with_thread_ids),
        );
        logging.insert("with_file".into(), Value::Boolean(config.logging.with_file));
        logging.insert(
            "with_line_number".into(),
            Value::Boolean(config.logging.with_line_number),
        );
        root.insert("logging".into(), Value::Table(logging));

        let rewards = &config.rewards;
        let mut rewards_table = toml::map::Map::new();
        rewards_table.insert("like_received".into(), Value::Integer(rewards.like_received));
        rewards_table.insert(
            "comment_written".into(),
            Value::Integer(rewards.comment_written),
        );
        rewards_table.insert(
            "comment_received".into(),
            Value::Integer(rewards.comment_received),
        );
        rewards_table.insert("post_created".into(), Value::Integer(rewards.post_created));
        rewards_table.insert(
            "follow_received".into(),
            Value::Integer(rewards.follow_received),
        );
        rewards_table.insert(
            "revoke_on_unlike".into(),
            Value::Boolean(rewards.revoke_on_unlike),
        );
        root.insert("rewards".into(), Value::Table(rewards_table));

        let enrichment = &config.enrichment;
        let mut enrichment_table = toml::map::Map::new();
        enrichment_table.insert(
            "timeout_ms".into(),
            Value::Integer(enrichment.timeout_ms as i64),
        );
        enrichment_table.insert(
            "max_retries".into(),
            Value::Integer(enrichment.max_retries as i64),
        );
        enrichment_table.insert(
            "outbox_capacity".into(),
            Value::Integer(enrichment.outbox_capacity as i64),
        );
        enrichment_table.insert("background".into(), Value::Boolean(enrichment.background));
        root.insert("enrichment".into(), Value::Table(enrichment_table));

        let mut realtime = toml::map::Map::new();
        realtime.insert(
            "full_delete_payloads".into(),
            Value::Boolean(config.realtime.full_delete_payloads),
        );
        realtime.insert(
            "notification_limit".into(),
            Value::Integer(config.realtime.notification_limit as i64),
        );
        root.insert("realtime".into(), Value::Table(realtime));

        let mut feed = toml::map::Map::new();
        feed.insert(
            "page_size".into(),
            Value::Integer(config.feed.page_size as i64),
        );
        root.insert("feed".into(), Value::Table(feed));

        let mut backend = toml::map::Map::new();
        if let Some(url) = &config.backend.url {
            backend.insert("url".into(), Value::String(url.clone()));
        }
        if let Some(key) = &config.backend.anon_key {
            backend.insert("anon_key".into(), Value::String(key.clone()));
        }
        if let Some(timeout) = config.backend.timeout_ms {
            backend.insert("timeout_ms".into(), Value::Integer(timeout as i64));
        }
        root.insert("backend".into(), Value::Table(backend));

        let mut storage = toml::map::Map::new();
        for (name, store) in &config.object_storage {
            let mut table = toml::map::Map::new();
            table.insert(
                "profile_type".into(),
                Value::String(store.profile_type.clone()),
            );
            for (key, value) in [
                ("endpoint", &store.endpoint),
                ("bucket", &store.bucket),
                ("public_base_url", &store.public_base_url),
                ("upload_prefix", &store.upload_prefix),
            ] {
                if let Some(value) = value {
                    table.insert(key.into(), Value::String(value.clone()));
                }
            }
            storage.insert(name.clone(), Value::Table(table));
        }
        root.insert("object_storage".into(), Value::Table(storage));

        if let Some(profile) = &config.media_profile {
            root.insert("media_profile".into(), Value::String(profile.clone()));
        }

        Value::Table(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_keeps_untouched_sections() {
        let mut cfg = FlareSocialConfig::from_toml_str(
            r#"
            [rewards]
            post_created = 7

            [feed]
            page_size = 20
            "#,
        )
        .unwrap();
        let overlay: Value = toml::from_str("[rewards]\nlike_received = 9").unwrap();

        ConfigManager::apply_overlay(&mut cfg, overlay).unwrap();

        assert_eq!(cfg.rewards.like_received, 9);
        assert_eq!(cfg.rewards.post_created, 7);
        assert_eq!(cfg.feed.page_size, 20);
    }

    #[test]
    fn test_media_profile_override_and_fallback() {
        let cfg = FlareSocialConfig::from_toml_str(
            r#"
            [object_storage.media]
            profile_type = "memory"
            bucket = "post-images"

            [object_storage.archive]
            profile_type = "s3"
            bucket = "cold-storage"
            "#,
        )
        .unwrap();

        let chosen = ConfigManager::resolve_object_store(&cfg, "media", Some("archive")).unwrap();
        assert_eq!(chosen.bucket.as_deref(), Some("cold-storage"));

        let fallback = ConfigManager::resolve_object_store(&cfg, "media", Some("missing")).unwrap();
        assert_eq!(fallback.bucket.as_deref(), Some("post-images"));

        assert!(ConfigManager::resolve_object_store(&cfg, "nope", None).is_none());
    }
}
