use std::time::Duration;

use anyhow::{ensure, Result};

use crate::backend::{BackendMode, MtSettings};
use crate::memory::PromotionConfig;

#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub database_url: Option<String>,

    // Translation backend
    pub mt_url: String,
    pub mt_backend: BackendMode,
    pub mt_enabled: bool,
    pub ollama_url: String,
    pub ollama_model: String,
    pub mt_timeout: Duration,

    // Request defaults
    pub default_src_lang: String,
    pub default_tgt_lang: String,

    // Translation memory
    pub tm_pool_limit: usize,
    pub promotion: PromotionConfig,
}

/// `false`, `0`, `no` and `off` disable a flag; anything else enables it.
fn parse_flag(value: Option<String>, default: bool) -> bool {
    match value {
        Some(v) => !matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "false" | "0" | "no" | "off"
        ),
        None => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = PromotionConfig::default();
        let config = Self {
            port: lookup("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3333),
            database_url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),

            mt_url: lookup("MT_URL")
                .unwrap_or_else(|| "http://localhost:8001/llm-translate".to_string()),
            mt_backend: lookup("MT_BACKEND")
                .map(|v| BackendMode::parse(&v))
                .unwrap_or(BackendMode::Http),
            mt_enabled: parse_flag(lookup("MT_ENABLED"), true),
            ollama_url: lookup("OLLAMA_URL")
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            ollama_model: lookup("OLLAMA_MODEL")
                .unwrap_or_else(|| "qwen2.5:7b-instruct".to_string()),
            mt_timeout: Duration::from_secs(
                lookup("MT_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            ),

            default_src_lang: lookup("MT_SRC").unwrap_or_else(|| "en".to_string()),
            default_tgt_lang: lookup("MT_TGT").unwrap_or_else(|| "pt-BR".to_string()),

            tm_pool_limit: lookup("TM_POOL_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            promotion: PromotionConfig {
                fuzzy_promote_min: lookup("TM_FUZZY_PROMOTE_MIN")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.fuzzy_promote_min),
                max_len_delta: lookup("TM_FUZZY_MAX_LEN_DELTA")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.max_len_delta),
                require_patch: parse_flag(lookup("TM_FUZZY_REQUIRE_PATCH"), defaults.require_patch),
            },
        };

        ensure!(
            (0.0..=1.0).contains(&config.promotion.fuzzy_promote_min),
            "TM_FUZZY_PROMOTE_MIN must be between 0 and 1, got {}",
            config.promotion.fuzzy_promote_min
        );
        ensure!(
            config.promotion.max_len_delta >= 0.0,
            "TM_FUZZY_MAX_LEN_DELTA must not be negative, got {}",
            config.promotion.max_len_delta
        );

        Ok(config)
    }

    pub fn mt_settings(&self) -> MtSettings {
        MtSettings {
            mt_url: self.mt_url.clone(),
            mode: self.mt_backend,
            enabled: self.mt_enabled,
            ollama_url: Some(self.ollama_url.clone()).filter(|u| !u.trim().is_empty()),
            ollama_model: self.ollama_model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.port, 3333);
        assert!(config.database_url.is_none());
        assert_eq!(config.mt_url, "http://localhost:8001/llm-translate");
        assert_eq!(config.mt_backend, BackendMode::Http);
        assert!(config.mt_enabled);
        assert_eq!(config.ollama_model, "qwen2.5:7b-instruct");
        assert_eq!(config.mt_timeout, Duration::from_secs(120));
        assert_eq!(config.default_src_lang, "en");
        assert_eq!(config.default_tgt_lang, "pt-BR");
        assert_eq!(config.tm_pool_limit, 500);
        assert_eq!(config.promotion, PromotionConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/tm"),
            ("MT_BACKEND", "ollama-direct"),
            ("MT_ENABLED", "false"),
            ("TM_POOL_LIMIT", "50"),
            ("TM_FUZZY_PROMOTE_MIN", "0.85"),
            ("TM_FUZZY_MAX_LEN_DELTA", "0.2"),
            ("TM_FUZZY_REQUIRE_PATCH", "0"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/tm"));
        assert_eq!(config.mt_backend, BackendMode::OllamaDirect);
        assert!(!config.mt_enabled);
        assert_eq!(config.tm_pool_limit, 50);
        assert!((config.promotion.fuzzy_promote_min - 0.85).abs() < 1e-9);
        assert!((config.promotion.max_len_delta - 0.2).abs() < 1e-9);
        assert!(!config.promotion.require_patch);
    }

    #[test]
    fn test_unparsable_numbers_fall_back() {
        let config = config_from(&[("PORT", "abc"), ("TM_POOL_LIMIT", "-3")]).unwrap();
        assert_eq!(config.port, 3333);
        assert_eq!(config.tm_pool_limit, 500);
    }

    #[test]
    fn test_out_of_range_threshold_is_rejected() {
        assert!(config_from(&[("TM_FUZZY_PROMOTE_MIN", "1.5")]).is_err());
        assert!(config_from(&[("TM_FUZZY_MAX_LEN_DELTA", "-0.1")]).is_err());
    }

    #[test]
    fn test_blank_database_url_is_none() {
        let config = config_from(&[("DATABASE_URL", "  ")]).unwrap();
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_mt_settings() {
        let settings = config_from(&[("OLLAMA_URL", "")]).unwrap().mt_settings();
        assert!(settings.enabled);
        assert!(settings.ollama_url.is_none());
    }
}
