//! ErrorRecord - 終端失敗の永続化ドキュメント
//!
//! 1 件の終端失敗につき 1 回だけ書き込まれ、更新されません。
//! `ttl` を過ぎたドキュメントはストア側で削除されます。

use super::event::{CloudEvent, EventKind};
use super::ids::{CorrelationId, ExecutionId, TraceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 型のない失敗の元の表現
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginalError {
    /// 循環安全な JSON を文字列化したもの
    pub json: String,
    pub string: String,
}

/// 失敗したイベントのメタデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    pub specversion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub time: DateTime<Utc>,
    /// data を JSON 文字列化したもの
    pub data: String,
}

impl EventMeta {
    pub fn from_event<T: Serialize>(event: &CloudEvent<T>) -> Self {
        let data = serde_json::to_string(&event.data).unwrap_or_else(|e| format!("<unserializable: {e}>"));
        Self {
            specversion: event.specversion.clone(),
            id: event.id.clone(),
            source: event.source.clone(),
            subject: event.subject.clone(),
            event_type: event.event_type.clone(),
            time: event.time,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub trace_id: TraceId,
    pub correlation_id: CorrelationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<ExecutionId>,
    /// Exception の JSON（型のない失敗は UnknownError に置き換える）
    pub error: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_error: Option<OriginalError>,
    pub date: DateTime<Utc>,
    pub is_exception: bool,
    pub ttl: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// topic / event type / custom name
    pub route: String,
    pub data: Value,
    pub event_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventMeta>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_serializes_with_wire_field_names() {
        let now = Utc::now();
        let record = ErrorRecord {
            trace_id: "t".into(),
            correlation_id: "c".into(),
            execution_id: None,
            error: json!({ "status": 500 }),
            original_error: Some(OriginalError {
                json: "{}".into(),
                string: "boom".into(),
            }),
            date: now,
            is_exception: false,
            ttl: now,
            kind: EventKind::PubSub,
            route: "audit-log".into(),
            data: json!(null),
            event_timestamp: now,
            event: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["traceId"], "t");
        assert_eq!(value["type"], "pubsub");
        assert_eq!(value["originalError"]["string"], "boom");
        assert!(value.get("executionId").is_none());
        assert!(value.get("event").is_none());
    }
}
