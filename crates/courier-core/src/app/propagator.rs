//! Id Propagator - 相関 ID / トレース ID / 実行 ID の導出とマージ
//!
//! - `correlationId = envelope.correlationId ?? 新規`
//! - `traceId = envelope.traceId ?? トランスポートのトレースヘッダ ?? 新規`
//! - `executionId = トランスポートイベントの id`（あれば）
//!
//! 空文字の ID は「なし」と同じ扱いです。下流に空の ID は流れません。

use super::context::ExecutionContext;
use crate::domain::envelope::Envelope;
use crate::domain::ids::{CorrelationId, ExecutionId, TraceId};
use crate::ports::{Container, IdGenerator};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// メッセージ属性のキー
pub const CORRELATION_ID_KEY: &str = "correlationId";
pub const TRACE_ID_KEY: &str = "traceId";
pub const ORIGIN_EXECUTION_ID_KEY: &str = "originExecutionId";

/// 1 ディスパッチ分の ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionIds {
    pub correlation_id: CorrelationId,
    pub trace_id: TraceId,
    pub execution_id: Option<ExecutionId>,
}

pub struct IdPropagator {
    ids: Arc<dyn IdGenerator>,
}

impl IdPropagator {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self { ids }
    }

    /// エンベロープ（デコードに失敗していれば None）とトランスポート情報から ID を決める
    pub fn derive(
        &self,
        envelope: Option<&Envelope>,
        transport_trace: Option<TraceId>,
        execution_id: Option<&str>,
    ) -> ExecutionIds {
        self.resolve(
            envelope.and_then(|e| e.correlation_id.clone()),
            envelope.and_then(|e| e.trace_id.clone()).filter(|t| !t.is_empty()).or(transport_trace),
            execution_id.map(ExecutionId::new),
        )
    }

    /// 既に分かっている ID を補完する（欠けていれば生成）
    pub fn resolve(
        &self,
        correlation_id: Option<CorrelationId>,
        trace_id: Option<TraceId>,
        execution_id: Option<ExecutionId>,
    ) -> ExecutionIds {
        ExecutionIds {
            correlation_id: correlation_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| self.ids.generate_correlation_id()),
            trace_id: trace_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| self.ids.generate_trace_id()),
            execution_id: execution_id.filter(|id| !id.is_empty()),
        }
    }

    /// メッセージ属性に ID を書き戻す（既にある値は尊重する）
    pub fn merge_into_attributes(
        &self,
        attributes: &mut BTreeMap<String, String>,
        transport_trace: Option<TraceId>,
        execution_id: Option<&str>,
    ) -> ExecutionIds {
        let existing = |key: &str| attributes.get(key).filter(|v| !v.is_empty()).cloned();
        let ids = self.resolve(
            existing(CORRELATION_ID_KEY).map(CorrelationId::new),
            existing(TRACE_ID_KEY).map(TraceId::new).or(transport_trace),
            execution_id.map(ExecutionId::new),
        );
        attributes.insert(CORRELATION_ID_KEY.to_string(), ids.correlation_id.to_string());
        attributes.insert(TRACE_ID_KEY.to_string(), ids.trace_id.to_string());
        ids
    }

    pub fn context(
        &self,
        ids: ExecutionIds,
        scope: Option<String>,
        container: Arc<dyn Container>,
    ) -> ExecutionContext {
        ExecutionContext {
            trace_id: ids.trace_id,
            correlation_id: ids.correlation_id,
            execution_id: ids.execution_id,
            scope,
            container,
        }
    }
}

/// エンベロープの属性（JSON）に ID を補う。空でない文字列が既にあれば残す
pub fn merge_into_map(attributes: &mut Map<String, Value>, ids: &ExecutionIds) {
    for (key, id) in [
        (CORRELATION_ID_KEY, ids.correlation_id.as_str()),
        (TRACE_ID_KEY, ids.trace_id.as_str()),
    ] {
        let present = attributes
            .get(key)
            .and_then(Value::as_str)
            .is_some_and(|v| !v.is_empty());
        if !present {
            attributes.insert(key.to_string(), Value::String(id.to_string()));
        }
    }
}
