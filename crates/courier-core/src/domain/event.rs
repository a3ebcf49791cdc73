//! Inbound events - トランスポートから届くイベントの形
//!
//! - **Callable**: 同期 RPC 呼び出し
//! - **PubSub**: トピックに publish されたメッセージ
//! - **Bus**: イベントバスの CloudEvent（data にエンベロープを持つ）
//! - **Custom**: 呼び出し側が任意に起動するトリガ

use super::ids::TraceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Callable,
    PubSub,
    Bus,
    Custom,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [Self::Callable, Self::PubSub, Self::Bus, Self::Custom];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Callable => "callable",
            Self::PubSub => "pubsub",
            Self::Bus => "bus",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_specversion() -> String {
    "1.0".to_string()
}

/// CloudEvents 形式のイベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default = "default_specversion")]
    pub specversion: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub time: DateTime<Utc>,
    /// W3C trace context: `00-<trace-id>-<span-id>-<flags>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceparent: Option<String>,
    pub data: T,
}

impl<T> CloudEvent<T> {
    /// traceparent の 2 番目のセグメント
    pub fn trace_id(&self) -> Option<TraceId> {
        self.traceparent
            .as_deref()
            .and_then(|header| header.split('-').nth(1))
            .filter(|segment| !segment.is_empty())
            .map(TraceId::new)
    }

    /// 空文字の id は「なし」とみなす
    pub fn execution_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubSubMessage {
    #[serde(default)]
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessagePublishedData {
    pub message: PubSubMessage,
    #[serde(default)]
    pub subscription: String,
}

/// 同期 RPC 呼び出し
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallableInvocation {
    /// エンベロープ（未デコード）
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Value>,
    /// `X-Cloud-Trace-Context` 形式: `<trace-id>/<span-id>;o=1`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
}

impl CallableInvocation {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    pub fn trace_id(&self) -> Option<TraceId> {
        self.trace_header
            .as_deref()
            .and_then(|header| header.split('/').next())
            .filter(|segment| !segment.is_empty())
            .map(TraceId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cloud_event_trace_id_from_traceparent() {
        let event: CloudEvent<Value> = serde_json::from_value(json!({
            "id": "evt-1",
            "type": "user.created",
            "time": "2024-01-01T00:00:00Z",
            "traceparent": "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            "data": {}
        }))
        .unwrap();

        assert_eq!(
            event.trace_id().unwrap().as_str(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
        assert_eq!(event.specversion, "1.0");
        assert_eq!(event.execution_id(), Some("evt-1"));
    }

    #[test]
    fn empty_event_id_is_not_an_execution_id() {
        let event = CloudEvent {
            id: Some(String::new()),
            source: "test".into(),
            specversion: "1.0".into(),
            event_type: "t".into(),
            subject: None,
            time: Utc::now(),
            traceparent: Some("garbage".into()),
            data: (),
        };
        assert_eq!(event.execution_id(), None);
        assert_eq!(event.trace_id(), None);
    }

    #[test]
    fn callable_trace_header_takes_first_segment() {
        let mut invocation = CallableInvocation::new(json!({}));
        invocation.trace_header = Some("105445aa7843bc8bf206b12000100000/1;o=1".into());
        assert_eq!(
            invocation.trace_id().unwrap().as_str(),
            "105445aa7843bc8bf206b12000100000"
        );
    }

    #[test]
    fn pubsub_message_parses_camel_case() {
        let data: MessagePublishedData = serde_json::from_value(json!({
            "message": { "messageId": "m-1", "json": { "a": 1 }, "attributes": { "k": "v" } },
            "subscription": "sub"
        }))
        .unwrap();
        assert_eq!(data.message.message_id, "m-1");
        assert_eq!(data.message.attributes["k"], "v");
    }
}
