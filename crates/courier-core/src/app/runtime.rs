//! Runtime - ディスパッチャ共通の依存と失敗の決着（settle）
//!
//! # 決着の規則
//! - **Callable**: 常にステータスマップ済みのエラーを呼び出し側に返す（握りつぶさない）
//! - **PubSub / Bus / Custom**:
//!   1. 再配信シグナルかつ時間窓内 → 再送出（プラットフォームが再配信）
//!   2. `throw_error` が有効 → ログの後に再送出
//!   3. それ以外 → Error Sink に記録して ack（記録失敗はログのみ）

use super::context::try_current;
use super::propagator::{ExecutionIds, IdPropagator};
use super::status::{DispatchCounts, DispatchStats, Disposition};
use crate::config::CourierConfig;
use crate::domain::decision::{RetryPolicy, RetryReason};
use crate::domain::errors::{ErrorKind, EventError, Exception, UnknownFailure};
use crate::domain::event::EventKind;
use crate::domain::record::{ErrorRecord, EventMeta, OriginalError};
use crate::domain::status::{FunctionsErrorCode, HttpsError, StatusMapping};
use crate::ports::{Clock, Container, ErrorSink, IdGenerator, SystemClock, UlidGenerator};
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Value, json};
use std::sync::Arc;

/// 失敗したディスパッチの情報
#[derive(Debug, Clone)]
pub struct FailureScope {
    pub kind: EventKind,
    /// callable 名 / topic / event type / custom 名
    pub route: String,
    pub data: Value,
    pub event_time: Option<DateTime<Utc>>,
    pub event: Option<EventMeta>,
    pub throw_error: bool,
}

impl FailureScope {
    pub fn callable(route: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Callable,
            route: route.into(),
            data: Value::Null,
            event_time: None,
            event: None,
            throw_error: false,
        }
    }

    pub fn event(kind: EventKind, route: impl Into<String>, data: Value, event_time: DateTime<Utc>) -> Self {
        Self {
            kind,
            route: route.into(),
            data,
            event_time: Some(event_time),
            event: None,
            throw_error: false,
        }
    }

    pub fn with_event(mut self, event: EventMeta) -> Self {
        self.event = Some(event);
        self
    }

    pub fn throw_error(mut self, throw_error: bool) -> Self {
        self.throw_error = throw_error;
        self
    }

    fn label(&self) -> String {
        format!("{} - {}", self.kind, self.route)
    }
}

/// 決着の結果
#[derive(Debug)]
pub enum Verdict {
    /// RPC 呼び出し側に返す
    Respond(HttpsError),
    /// 再配信を要求する
    Redeliver(EventError),
    /// throw_error で再送出する
    Rethrow(EventError),
    /// 記録済み、ack する
    Acknowledge,
}

/// プラットフォームに返す失敗（ack しない）
#[derive(Debug, thiserror::Error)]
pub enum Nack {
    #[error("redelivery requested: {0}")]
    Redeliver(EventError),
    #[error("handler failed: {0}")]
    Rethrow(EventError),
}

impl Nack {
    pub fn into_error(self) -> EventError {
        match self {
            Self::Redeliver(error) | Self::Rethrow(error) => error,
        }
    }
}

impl Verdict {
    /// イベント系トランスポート向けの結果
    pub fn into_event_result(self) -> Result<(), Nack> {
        match self {
            Self::Acknowledge => Ok(()),
            Self::Redeliver(error) => Err(Nack::Redeliver(error)),
            Self::Rethrow(error) => Err(Nack::Rethrow(error)),
            // イベント系では起こらないが、変換は全域にしておく
            Self::Respond(error) => Err(Nack::Rethrow(UnknownFailure::new(error.to_string()).into())),
        }
    }

    /// RPC 向けの結果
    pub fn into_rpc_result(self) -> Result<Value, HttpsError> {
        match self {
            Self::Respond(error) => Err(error),
            Self::Acknowledge => Ok(Value::Null),
            Self::Redeliver(error) | Self::Rethrow(error) => Err(HttpsError {
                code: FunctionsErrorCode::Unknown,
                message: error.to_string(),
                details: error.to_json(),
            }),
        }
    }
}

/// ディスパッチャが共有する依存
pub struct Runtime {
    container: Arc<dyn Container>,
    sink: Arc<dyn ErrorSink>,
    clock: Arc<dyn Clock>,
    propagator: IdPropagator,
    retry: RetryPolicy,
    status: StatusMapping,
    error_ttl: TimeDelta,
    stats: DispatchStats,
}

impl Runtime {
    pub fn new(container: Arc<dyn Container>, sink: Arc<dyn ErrorSink>) -> Self {
        let config = CourierConfig::default();
        Self {
            container,
            sink,
            clock: Arc::new(SystemClock),
            propagator: IdPropagator::new(Arc::new(UlidGenerator::new(SystemClock))),
            retry: config.retry_policy(),
            status: config.status_mapping(),
            error_ttl: TimeDelta::days(i64::from(config.error_ttl_days)),
            stats: DispatchStats::new(),
        }
    }

    pub fn with_config(mut self, config: &CourierConfig) -> Self {
        self.retry = config.retry_policy();
        self.status = config.status_mapping();
        self.error_ttl = TimeDelta::days(i64::from(config.error_ttl_days));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.propagator = IdPropagator::new(ids);
        self
    }

    pub fn container(&self) -> &Arc<dyn Container> {
        &self.container
    }

    pub fn propagator(&self) -> &IdPropagator {
        &self.propagator
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn stats(&self) -> DispatchCounts {
        self.stats.snapshot()
    }

    pub(crate) fn record(&self, disposition: Disposition) {
        self.stats.record(disposition);
    }

    /// ID からコンテキストを作る
    pub fn context(&self, ids: ExecutionIds, scope: Option<String>) -> super::ExecutionContext {
        self.propagator.context(ids, scope, Arc::clone(&self.container))
    }

    /// 失敗をトランスポートエラーに変換する
    ///
    /// 型のない失敗は UnknownError で包み、元の JSON と文字列を詳細に残します。
    pub fn surface(&self, error: &EventError) -> HttpsError {
        let exception = match error.as_exception() {
            Some(exception) => exception.clone(),
            None => ErrorKind::UnknownError.exception(
                json!({
                    "error": error.to_json(),
                    "errorString": error.to_string(),
                })
                .to_string(),
            ),
        };
        HttpsError {
            code: self.status.map_status(exception.status),
            message: exception.message.clone(),
            details: exception.to_json(),
        }
    }

    /// 終端処理（種類ごとに分岐）
    pub async fn settle(&self, error: EventError, scope: FailureScope) -> Verdict {
        match scope.kind {
            EventKind::Callable => {
                tracing::debug!(callable = %scope.route, error = %error, "callable failed");
                self.stats.record(Disposition::Surfaced);
                Verdict::Respond(self.surface(&error))
            }
            EventKind::PubSub | EventKind::Bus | EventKind::Custom => self.acknowledge(error, scope).await,
        }
    }

    async fn acknowledge(&self, error: EventError, scope: FailureScope) -> Verdict {
        let now = self.clock.now();
        let context = scope.label();
        let event_time = scope.event_time.unwrap_or(now);

        if error.is_retry_signal() {
            tracing::info!(context = %context, "retry event received");
        }
        match self.retry.decide(&error, event_time, now).reason {
            RetryReason::WithinWindow { age_ms } => {
                tracing::info!(context = %context, age_ms, "allowing retry");
                self.stats.record(Disposition::Retried);
                return Verdict::Redeliver(error);
            }
            RetryReason::TooOld { age_ms, max_age_ms } => {
                tracing::info!(
                    context = %context,
                    age_ms,
                    max_age_ms,
                    "not allowing retry because the event is too old"
                );
            }
            RetryReason::NotRequested => {}
        }

        let error_json = error.to_json();
        tracing::error!(
            context = %context,
            error = %error_json,
            error_string = %error,
            "event handler failed"
        );

        if scope.throw_error {
            tracing::info!(context = %context, "throw_error option is set, rethrowing");
            self.stats.record(Disposition::Rethrown);
            return Verdict::Rethrow(error);
        }

        let record = self.record_for(&error, error_json, scope, now);
        if let Err(sink_error) = self.sink.record(&record).await {
            tracing::error!(
                context = %context,
                error = %sink_error,
                "error trying to register event error"
            );
            self.stats.record_sink_failure();
        }
        self.stats.record(Disposition::Persisted);
        Verdict::Acknowledge
    }

    fn record_for(&self, error: &EventError, error_json: Value, scope: FailureScope, now: DateTime<Utc>) -> ErrorRecord {
        let ids = match try_current() {
            Some(context) => ExecutionIds {
                correlation_id: context.correlation_id,
                trace_id: context.trace_id,
                execution_id: context.execution_id,
            },
            None => self.propagator.resolve(None, None, None),
        };
        let (stored, original_error) = match error.as_exception() {
            Some(exception) => (exception.to_json(), None),
            None => (
                unknown_internal_error().to_json(),
                Some(OriginalError {
                    json: error_json.to_string(),
                    string: error.to_string(),
                }),
            ),
        };
        ErrorRecord {
            trace_id: ids.trace_id,
            correlation_id: ids.correlation_id,
            execution_id: ids.execution_id,
            is_exception: original_error.is_none(),
            error: stored,
            original_error,
            date: now,
            ttl: now + self.error_ttl,
            kind: scope.kind,
            route: scope.route,
            data: scope.data,
            event_timestamp: scope.event_time.unwrap_or(now),
            event: scope.event,
        }
    }
}

fn unknown_internal_error() -> Exception {
    let kind = ErrorKind::UnknownError;
    Exception::new(kind.status(), kind.code(), kind.message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::context::run_in_context;
    use crate::domain::circular::{CIRCULAR_MARKER, Node};
    use crate::domain::errors::RetryEvent;
    use crate::impls::{InMemoryDocumentStore, MapContainer, StoreErrorSink};
    use crate::ports::FixedClock;
    use chrono::TimeZone;

    struct Harness {
        runtime: Runtime,
        store: Arc<InMemoryDocumentStore>,
        clock: Arc<FixedClock>,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryDocumentStore::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
        let runtime = Runtime::new(
            Arc::new(MapContainer::new()),
            Arc::new(StoreErrorSink::new(store.clone(), "event-errors")),
        )
        .with_clock(clock.clone());
        Harness { runtime, store, clock }
    }

    #[test]
    fn surface_maps_exception_status() {
        let h = harness();
        let error = h.runtime.surface(&ErrorKind::BadRequest.exception("name: required").into());
        assert_eq!(error.code, FunctionsErrorCode::InvalidArgument);
        assert_eq!(error.details["errorCode"], "EVENT-0002");
        assert_eq!(error.details["error"], "name: required");
    }

    #[test]
    fn surface_wraps_untyped_failures() {
        let h = harness();
        let error = h.runtime.surface(&UnknownFailure::new("kaboom").into());
        assert_eq!(error.code, FunctionsErrorCode::Internal);
        assert_eq!(error.details["errorCode"], "EVENT-0005");
        let inner: Value = serde_json::from_str(error.details["error"].as_str().unwrap()).unwrap();
        assert_eq!(inner["errorString"], "kaboom");
    }

    #[tokio::test]
    async fn fresh_retry_signal_is_redelivered_without_record() {
        let h = harness();
        let scope = FailureScope::event(EventKind::PubSub, "audit-log", Value::Null, h.clock.now());
        let verdict = h.runtime.settle(RetryEvent::new("busy").into(), scope).await;

        assert!(matches!(verdict, Verdict::Redeliver(_)));
        assert!(h.store.documents("event-errors").is_empty());
        assert_eq!(h.runtime.stats().retried, 1);
    }

    #[tokio::test]
    async fn terminal_failure_is_recorded_with_context_ids() {
        let h = harness();
        let ids = h.runtime.propagator().resolve(Some("c-1".into()), Some("t-1".into()), Some("e-1".into()));
        let context = h.runtime.context(ids, None);
        let scope = FailureScope::event(EventKind::Bus, "user.created", json!({ "x": 1 }), h.clock.now());

        let verdict = run_in_context(context, h.runtime.settle(UnknownFailure::new("boom").into(), scope)).await;
        assert!(matches!(verdict, Verdict::Acknowledge));

        let docs = h.store.documents("event-errors");
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc["traceId"], "t-1");
        assert_eq!(doc["correlationId"], "c-1");
        assert_eq!(doc["executionId"], "e-1");
        assert_eq!(doc["isException"], false);
        assert_eq!(doc["error"]["errorCode"], "EVENT-0005");
        assert_eq!(doc["originalError"]["string"], "boom");
        assert_eq!(doc["type"], "bus");
        assert_eq!(doc["route"], "user.created");
        assert_eq!(doc["ttl"], json!(h.clock.now() + TimeDelta::days(14)));
    }

    #[tokio::test]
    async fn cyclic_failure_detail_is_stored_with_marker() {
        let h = harness();
        let order = Node::map();
        order.insert("id", Node::value(json!("o-1")));
        let lines = Node::list();
        let line = Node::map();
        line.insert("order", order.back_ref());
        lines.push(line);
        order.insert("lines", lines);
        let failure = UnknownFailure::new("inventory mismatch").with_detail(order);
        let scope = FailureScope::event(EventKind::PubSub, "orders", json!({}), h.clock.now());

        h.runtime.settle(failure.into(), scope).await;

        let docs = h.store.documents("event-errors");
        let stored: Value = serde_json::from_str(docs[0]["originalError"]["json"].as_str().unwrap()).unwrap();
        assert_eq!(stored["detail"]["id"], "o-1");
        assert_eq!(stored["detail"]["lines"][0]["order"], CIRCULAR_MARKER);
        assert_eq!(docs[0]["originalError"]["string"], "inventory mismatch");
    }

    #[tokio::test]
    async fn throw_error_skips_the_sink() {
        let h = harness();
        let scope = FailureScope::event(EventKind::Custom, "nightly", Value::Null, h.clock.now()).throw_error(true);
        let verdict = h.runtime.settle(ErrorKind::BadRequest.exception("x").into(), scope).await;

        assert!(matches!(verdict.into_event_result(), Err(Nack::Rethrow(_))));
        assert!(h.store.documents("event-errors").is_empty());
    }

    #[tokio::test]
    async fn sink_failure_is_not_escalated() {
        let h = harness();
        h.store.fail_writes(true);
        let scope = FailureScope::event(EventKind::PubSub, "audit-log", Value::Null, h.clock.now());
        let verdict = h.runtime.settle(UnknownFailure::new("boom").into(), scope).await;

        assert!(verdict.into_event_result().is_ok());
        assert_eq!(h.runtime.stats().sink_failures, 1);
    }

    #[tokio::test]
    async fn callable_failures_are_never_swallowed() {
        let h = harness();
        let verdict = h.runtime.settle(RetryEvent::new("x").into(), FailureScope::callable("say_hello")).await;
        let result = verdict.into_rpc_result();
        assert_eq!(result.unwrap_err().code, FunctionsErrorCode::Internal);
    }
}
