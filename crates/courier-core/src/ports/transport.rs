//! Transport port - プラットフォームへのハンドラ登録
//!
//! `App::export` が各ルートを `register_handler` に渡し、
//! プラットフォーム固有の「公開関数」を受け取ります。

use crate::app::{BusDispatcher, CallableDispatcher, CustomDispatcher, PubSubDispatcher};
use crate::domain::event::EventKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// プラットフォームに渡すルートごとのオプション
///
/// 未指定の項目はアプリケーションの既定値で埋められます（`merged_with`）。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteOptions {
    pub retry: Option<bool>,
    pub region: Option<String>,
    pub timeout_seconds: Option<u32>,
    pub preserve_external_changes: Option<bool>,
}

impl RouteOptions {
    pub fn merged_with(&self, defaults: &RouteOptions) -> RouteOptions {
        RouteOptions {
            retry: self.retry.or(defaults.retry),
            region: self.region.clone().or_else(|| defaults.region.clone()),
            timeout_seconds: self.timeout_seconds.or(defaults.timeout_seconds),
            preserve_external_changes: self
                .preserve_external_changes
                .or(defaults.preserve_external_changes),
        }
    }
}

/// 登録されるルートの宣言
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub kind: EventKind,
    /// Naming Strategy が決めた一意キー
    pub key: String,
    /// callable 名 / topic / event type / custom 名
    pub trigger: String,
    pub options: RouteOptions,
}

/// 登録されるディスパッチャ
#[derive(Clone)]
pub enum Endpoint {
    Callable(Arc<CallableDispatcher>),
    PubSub(Arc<PubSubDispatcher>),
    Bus(Arc<BusDispatcher>),
    Custom(Arc<CustomDispatcher>),
}

impl Endpoint {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Callable(_) => EventKind::Callable,
            Self::PubSub(_) => EventKind::PubSub,
            Self::Bus(_) => EventKind::Bus,
            Self::Custom(_) => EventKind::Custom,
        }
    }
}

pub trait Transport {
    type Exported;

    fn register_handler(&mut self, registration: &Registration, endpoint: Endpoint) -> Self::Exported;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_options_fall_back_to_defaults() {
        let defaults = RouteOptions {
            retry: Some(true),
            region: Some("southamerica-east1".into()),
            timeout_seconds: Some(60),
            preserve_external_changes: None,
        };
        let route = RouteOptions {
            retry: Some(false),
            ..RouteOptions::default()
        };

        let merged = route.merged_with(&defaults);
        assert_eq!(merged.retry, Some(false));
        assert_eq!(merged.region.as_deref(), Some("southamerica-east1"));
        assert_eq!(merged.timeout_seconds, Some(60));
        assert_eq!(merged.preserve_external_changes, None);
    }
}
