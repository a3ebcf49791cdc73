//! Config - ランタイム設定
//!
//! 環境変数・JSON のどちらからでも読めます。不正な環境変数は警告を出して既定値に戻します。
//!
//! | 環境変数                          | 項目                    | 既定値          |
//! |-----------------------------------|-------------------------|-----------------|
//! | `COURIER_RETRY_EVENT_MAX_DIFF`    | `retry_max_age_ms`      | 43200000 (12h)  |
//! | `COURIER_ERROR_COLLECTION`        | `error_collection`      | `event-errors`  |
//! | `COURIER_ERROR_TTL_DAYS`          | `error_ttl_days`        | 14              |
//! | `FUNCTIONS_EMULATOR`              | `emulator`              | false           |
//! | `COURIER_LEGACY_STATUS_MAPPING`   | `legacy_status_mapping` | false           |

use crate::domain::decision::{DEFAULT_MAX_EVENT_AGE, RetryPolicy};
use crate::domain::status::StatusMapping;
use crate::ports::RouteOptions;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_RETRY_MAX_AGE: &str = "COURIER_RETRY_EVENT_MAX_DIFF";
pub const ENV_ERROR_COLLECTION: &str = "COURIER_ERROR_COLLECTION";
pub const ENV_ERROR_TTL_DAYS: &str = "COURIER_ERROR_TTL_DAYS";
pub const ENV_EMULATOR: &str = "FUNCTIONS_EMULATOR";
pub const ENV_LEGACY_STATUS_MAPPING: &str = "COURIER_LEGACY_STATUS_MAPPING";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub retry_max_age_ms: u64,
    pub error_collection: String,
    pub error_ttl_days: u32,
    /// ローカル/エミュレータ環境（publish 失敗を握りつぶす）
    pub emulator: bool,
    /// 429 を旧来どおり permission-denied に写す
    pub legacy_status_mapping: bool,
    /// 全ルート共通のプラットフォームオプション
    pub defaults: RouteOptions,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            retry_max_age_ms: DEFAULT_MAX_EVENT_AGE.as_millis() as u64,
            error_collection: "event-errors".to_string(),
            error_ttl_days: 14,
            emulator: false,
            legacy_status_mapping: false,
            defaults: RouteOptions::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
}

impl CourierConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意の参照関数から読む（テストでは HashMap を渡す）
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            retry_max_age_ms: parse_or(&lookup, ENV_RETRY_MAX_AGE, defaults.retry_max_age_ms),
            error_collection: lookup(ENV_ERROR_COLLECTION)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.error_collection),
            error_ttl_days: parse_or(&lookup, ENV_ERROR_TTL_DAYS, defaults.error_ttl_days),
            emulator: lookup(ENV_EMULATOR).is_some_and(|v| v.trim() == "true"),
            legacy_status_mapping: parse_or(
                &lookup,
                ENV_LEGACY_STATUS_MAPPING,
                defaults.legacy_status_mapping,
            ),
            defaults: defaults.defaults,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(self.retry_max_age_ms))
    }

    pub fn status_mapping(&self) -> StatusMapping {
        StatusMapping {
            legacy_rate_limit: self.legacy_status_mapping,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Debug,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, ?default, "invalid config value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = CourierConfig::from_lookup(lookup(&[]));
        assert_eq!(config, CourierConfig::default());
        assert_eq!(config.retry_policy().max_age, DEFAULT_MAX_EVENT_AGE);
        assert!(!config.status_mapping().legacy_rate_limit);
    }

    #[test]
    fn env_values_override() {
        let config = CourierConfig::from_lookup(lookup(&[
            (ENV_RETRY_MAX_AGE, "60000"),
            (ENV_ERROR_COLLECTION, "failures"),
            (ENV_EMULATOR, "true"),
            (ENV_LEGACY_STATUS_MAPPING, "true"),
        ]));
        assert_eq!(config.retry_max_age_ms, 60_000);
        assert_eq!(config.error_collection, "failures");
        assert!(config.emulator);
        assert!(config.legacy_status_mapping);
    }

    #[test]
    fn invalid_numbers_fall_back_to_default() {
        let config = CourierConfig::from_lookup(lookup(&[
            (ENV_RETRY_MAX_AGE, "soon"),
            (ENV_ERROR_TTL_DAYS, "-3"),
        ]));
        assert_eq!(config.retry_max_age_ms, 43_200_000);
        assert_eq!(config.error_ttl_days, 14);
    }

    #[test]
    fn json_fills_missing_fields() {
        let config =
            CourierConfig::from_json(r#"{ "error_ttl_days": 7, "defaults": { "region": "us-east1" } }"#)
                .unwrap();
        assert_eq!(config.error_ttl_days, 7);
        assert_eq!(config.error_collection, "event-errors");
        assert_eq!(config.defaults.region.as_deref(), Some("us-east1"));
    }
}
