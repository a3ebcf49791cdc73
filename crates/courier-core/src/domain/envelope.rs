//! Envelope - 共通ワイヤエンベロープ
//!
//! ```json
//! { "body": ..., "correlationId": "...", "traceId": "...", "originExecutionId": "...", "attributes": {} }
//! ```
//!
//! `decode` は形だけを検証する純粋関数です。業務ペイロード（`body`）の検証は
//! ルートごとのスキーマが担当します。

use super::ids::{CorrelationId, ExecutionId, TraceId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 受信イベントごとに作られるエンベロープ
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_execution_id: Option<ExecutionId>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// 形の不一致 1 件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatIssue {
    pub path: String,
    pub expected: &'static str,
    pub received: &'static str,
}

impl fmt::Display for FormatIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "<root>" } else { &self.path };
        write!(f, "{path}: expected {}, received {}", self.expected, self.received)
    }
}

/// エンベロープのデコード失敗
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", self.diff())]
pub struct FormatError {
    pub issues: Vec<FormatIssue>,
}

impl FormatError {
    /// 期待値と実際の構造の差分（人間向け）
    pub fn diff(&self) -> String {
        self.issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

const ID_FIELDS: [&str; 3] = ["correlationId", "traceId", "originExecutionId"];

impl Envelope {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    /// 生の JSON からエンベロープをデコード
    ///
    /// 問題はまとめて収集し、1 つの `FormatError` として返します。
    pub fn decode(raw: &Value) -> Result<Self, FormatError> {
        let Some(object) = raw.as_object() else {
            return Err(FormatError {
                issues: vec![FormatIssue {
                    path: String::new(),
                    expected: "object",
                    received: kind_of(raw),
                }],
            });
        };

        let mut issues = Vec::new();
        for field in ID_FIELDS {
            match object.get(field) {
                None | Some(Value::String(_)) => {}
                Some(other) => issues.push(FormatIssue {
                    path: field.to_string(),
                    expected: "string",
                    received: kind_of(other),
                }),
            }
        }
        match object.get("attributes") {
            None | Some(Value::Object(_)) => {}
            Some(other) => issues.push(FormatIssue {
                path: "attributes".to_string(),
                expected: "object",
                received: kind_of(other),
            }),
        }
        if !issues.is_empty() {
            return Err(FormatError { issues });
        }

        let text = |field: &str| object.get(field).and_then(Value::as_str).map(str::to_owned);
        Ok(Self {
            body: object.get("body").cloned().unwrap_or(Value::Null),
            correlation_id: text("correlationId").map(CorrelationId::new),
            trace_id: text("traceId").map(TraceId::new),
            origin_execution_id: text("originExecutionId").map(ExecutionId::new),
            attributes: object
                .get("attributes")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        })
    }

    /// ワイヤ形式に戻す
    pub fn encode(&self) -> Value {
        let mut out = Map::new();
        out.insert("body".into(), self.body.clone());
        if let Some(id) = &self.correlation_id {
            out.insert("correlationId".into(), Value::String(id.to_string()));
        }
        if let Some(id) = &self.trace_id {
            out.insert("traceId".into(), Value::String(id.to_string()));
        }
        if let Some(id) = &self.origin_execution_id {
            out.insert("originExecutionId".into(), Value::String(id.to_string()));
        }
        out.insert("attributes".into(), Value::Object(self.attributes.clone()));
        Value::Object(out)
    }
}

/// JSON 値の種類名
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
