//! Outbound publish - ハンドラから次のイベントを送る
//!
//! 実行コンテキストの ID を引き継ぐので、下流のディスパッチは同じ相関 ID / トレース ID で動きます。
//! 送信失敗は `PublishError` になります。ただしエミュレータ環境ではログだけ出して握りつぶします。

use super::context::try_current;
use super::propagator::{CORRELATION_ID_KEY, ORIGIN_EXECUTION_ID_KEY, TRACE_ID_KEY};
use crate::domain::envelope::Envelope;
use crate::domain::errors::{ErrorKind, Exception};
use crate::domain::event::EventKind;
use crate::ports::{BoxError, Outbound, Publisher};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

fn publish_failed(kind: EventKind, error: BoxError, emulator: bool) -> Result<(), Exception> {
    if emulator {
        tracing::info!(kind = %kind, error = %error, "error while publishing message");
        return Ok(());
    }
    Err(ErrorKind::PublishError.exception(json!({ "message": error.to_string() }).to_string()))
}

/// トピックへの publish
#[derive(Clone)]
pub struct MessagePublisher {
    publisher: Arc<dyn Publisher>,
    emulator: bool,
}

impl MessagePublisher {
    pub fn new(publisher: Arc<dyn Publisher>, emulator: bool) -> Self {
        Self { publisher, emulator }
    }

    /// 属性に無い相関 ID / トレース ID は現在のコンテキストから埋め、
    /// `originExecutionId` は常に現在の実行 ID で上書きします。
    pub async fn publish(
        &self,
        topic: &str,
        json: Value,
        mut attributes: BTreeMap<String, String>,
    ) -> Result<(), Exception> {
        if let Some(context) = try_current() {
            attributes
                .entry(CORRELATION_ID_KEY.to_string())
                .or_insert_with(|| context.correlation_id.to_string());
            attributes
                .entry(TRACE_ID_KEY.to_string())
                .or_insert_with(|| context.trace_id.to_string());
            match context.execution_id {
                Some(execution_id) => {
                    attributes.insert(ORIGIN_EXECUTION_ID_KEY.to_string(), execution_id.into_string());
                }
                None => {
                    attributes.remove(ORIGIN_EXECUTION_ID_KEY);
                }
            }
        }

        let message = Outbound {
            kind: EventKind::PubSub,
            destination: topic.to_string(),
            payload: json,
            attributes,
        };
        match self.publisher.publish(message).await {
            Ok(()) => Ok(()),
            Err(error) => publish_failed(EventKind::PubSub, error, self.emulator),
        }
    }
}

/// イベントバスに送る 1 件
#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    pub event_type: String,
    pub body: Value,
    pub attributes: Map<String, Value>,
}

impl BusEvent {
    pub fn new(event_type: impl Into<String>, body: Value) -> Self {
        Self {
            event_type: event_type.into(),
            body,
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// イベントバスへの publish
#[derive(Clone)]
pub struct EventPublisher {
    publisher: Arc<dyn Publisher>,
    source: String,
    emulator: bool,
}

impl EventPublisher {
    pub fn new(publisher: Arc<dyn Publisher>, source: impl Into<String>, emulator: bool) -> Self {
        Self {
            publisher,
            source: source.into(),
            emulator,
        }
    }

    /// 各イベントの body を現在の ID 付きのエンベロープに包んで送る
    ///
    /// 最初の失敗で止まります。
    pub async fn publish(&self, events: Vec<BusEvent>) -> Result<(), Exception> {
        let context = try_current();
        for event in events {
            let envelope = Envelope {
                body: event.body,
                correlation_id: context.as_ref().map(|c| c.correlation_id.clone()),
                trace_id: context.as_ref().map(|c| c.trace_id.clone()),
                origin_execution_id: context.as_ref().and_then(|c| c.execution_id.clone()),
                attributes: event.attributes,
            };
            let message = Outbound {
                kind: EventKind::Bus,
                destination: event.event_type,
                payload: envelope.encode(),
                attributes: BTreeMap::from([("source".to_string(), self.source.clone())]),
            };
            if let Err(error) = self.publisher.publish(message).await {
                return publish_failed(EventKind::Bus, error, self.emulator);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::context::{ExecutionContext, run_in_context};
    use crate::impls::{MapContainer, RecordingPublisher};

    fn context(execution_id: Option<&str>) -> ExecutionContext {
        ExecutionContext {
            trace_id: "t-1".into(),
            correlation_id: "c-1".into(),
            execution_id: execution_id.map(Into::into),
            scope: None,
            container: Arc::new(MapContainer::new()),
        }
    }

    #[tokio::test]
    async fn message_attributes_take_ids_from_context() {
        let recorder = Arc::new(RecordingPublisher::new());
        let publisher = MessagePublisher::new(recorder.clone(), false);
        let attributes = BTreeMap::from([
            (CORRELATION_ID_KEY.to_string(), "c-explicit".to_string()),
            (ORIGIN_EXECUTION_ID_KEY.to_string(), "stale".to_string()),
        ]);

        run_in_context(context(Some("evt-1")), publisher.publish("audit-log", json!({ "a": 1 }), attributes))
            .await
            .unwrap();

        let sent = recorder.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, "audit-log");
        assert_eq!(sent[0].attributes[CORRELATION_ID_KEY], "c-explicit");
        assert_eq!(sent[0].attributes[TRACE_ID_KEY], "t-1");
        assert_eq!(sent[0].attributes[ORIGIN_EXECUTION_ID_KEY], "evt-1");
    }

    #[tokio::test]
    async fn missing_execution_id_clears_origin() {
        let recorder = Arc::new(RecordingPublisher::new());
        let publisher = MessagePublisher::new(recorder.clone(), false);
        let attributes = BTreeMap::from([(ORIGIN_EXECUTION_ID_KEY.to_string(), "stale".to_string())]);

        run_in_context(context(None), publisher.publish("audit-log", json!(null), attributes))
            .await
            .unwrap();

        assert!(!recorder.sent()[0].attributes.contains_key(ORIGIN_EXECUTION_ID_KEY));
    }

    #[tokio::test]
    async fn failure_is_publish_error_outside_emulator() {
        let recorder = Arc::new(RecordingPublisher::new());
        recorder.fail(true);

        let strict = MessagePublisher::new(recorder.clone(), false);
        let err = strict.publish("audit-log", json!(1), BTreeMap::new()).await.unwrap_err();
        assert!(err.is(ErrorKind::PublishError));

        let emulated = MessagePublisher::new(recorder.clone(), true);
        assert!(emulated.publish("audit-log", json!(1), BTreeMap::new()).await.is_ok());
    }

    #[tokio::test]
    async fn bus_events_are_wrapped_in_envelope() {
        let recorder = Arc::new(RecordingPublisher::new());
        let publisher = EventPublisher::new(recorder.clone(), "users-api", false);

        let events = vec![
            BusEvent::new("user.created", json!({ "id": 1 })).with_attribute("tenant", json!("acme")),
            BusEvent::new("user.welcomed", json!({ "id": 1 })),
        ];
        run_in_context(context(Some("evt-9")), publisher.publish(events)).await.unwrap();

        let sent = recorder.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].destination, "user.created");
        assert_eq!(sent[0].attributes["source"], "users-api");
        let envelope = Envelope::decode(&sent[0].payload).unwrap();
        assert_eq!(envelope.body, json!({ "id": 1 }));
        assert_eq!(envelope.correlation_id.unwrap().as_str(), "c-1");
        assert_eq!(envelope.origin_execution_id.unwrap().as_str(), "evt-9");
        assert_eq!(envelope.attributes["tenant"], "acme");
    }
}
