//! PubSub Dispatcher - トピックに publish されたメッセージ
//!
//! 属性に相関 ID / トレース ID をマージ → ペイロード検証 → `{data, attributes}` で実行。
//! 失敗は Runtime の決着規則に従います（再配信 / 再送出 / 記録して ack）。

use super::context::run_in_context;
use super::middleware::{PubSubMiddleware, identity, run_middleware};
use super::runtime::{FailureScope, Nack, Runtime};
use super::status::Disposition;
use crate::domain::envelope::Envelope;
use crate::domain::errors::{ErrorKind, EventError};
use crate::domain::event::{CloudEvent, EventKind, MessagePublishedData};
use crate::domain::ids::{CorrelationId, ExecutionId, TraceId};
use crate::domain::record::EventMeta;
use crate::typed::{EventHandler, EventPayload, Route, SchemaRef};
use serde_json::{Map, Value, json};
use std::sync::Arc;

use super::propagator::{CORRELATION_ID_KEY, ORIGIN_EXECUTION_ID_KEY, TRACE_ID_KEY};

pub type EventRoute = Route<SchemaRef, dyn EventHandler>;

pub struct PubSubDispatcher {
    topic: String,
    route: EventRoute,
    throw_error: bool,
    middleware: PubSubMiddleware,
    runtime: Arc<Runtime>,
}

impl PubSubDispatcher {
    pub fn new(topic: impl Into<String>, route: EventRoute, throw_error: bool, runtime: Arc<Runtime>) -> Self {
        Self {
            topic: topic.into(),
            route,
            throw_error,
            middleware: identity(),
            runtime,
        }
    }

    pub fn with_middleware(mut self, middleware: PubSubMiddleware) -> Self {
        self.middleware = middleware;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn route(&self) -> &EventRoute {
        &self.route
    }

    pub async fn dispatch(&self, mut event: CloudEvent<MessagePublishedData>) -> Result<(), Nack> {
        let transport_trace = event.trace_id();
        let execution_id = event.execution_id().map(str::to_owned);
        let ids = self.runtime.propagator().merge_into_attributes(
            &mut event.data.message.attributes,
            transport_trace,
            execution_id.as_deref(),
        );
        let context = self.runtime.context(ids, None);

        run_in_context(context, async move {
            let event = run_middleware(self.middleware.as_ref(), &self.topic, event).await;
            match self.pipeline(&event).await {
                Ok(()) => {
                    self.runtime.record(Disposition::Succeeded);
                    Ok(())
                }
                Err(error) => {
                    let message = &event.data.message;
                    let data = json!({ "attributes": message.attributes, "json": message.json });
                    let scope = FailureScope::event(EventKind::PubSub, &self.topic, data, event.time)
                        .with_event(EventMeta::from_event(&event))
                        .throw_error(self.throw_error);
                    self.runtime.settle(error, scope).await.into_event_result()
                }
            }
        })
        .await
    }

    async fn pipeline(&self, event: &CloudEvent<MessagePublishedData>) -> Result<(), EventError> {
        let envelope = message_envelope(event);
        let schema = self.route.schema().await;
        let data = schema
            .validate(envelope.body)
            .await
            .map_err(|v| ErrorKind::BadRequest.exception(v.summary()))?;
        let handler = self.route.invoker(self.runtime.container().as_ref()).await?;
        handler
            .handle(EventPayload {
                data,
                attributes: envelope.attributes,
            })
            .await
    }
}

/// メッセージをエンベロープの形に揃える（属性の ID をエンベロープ側にも載せる）
fn message_envelope(event: &CloudEvent<MessagePublishedData>) -> Envelope {
    let message = &event.data.message;
    let attributes: Map<String, Value> = message
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Envelope {
        body: message.json.clone().unwrap_or(Value::Null),
        correlation_id: message.attributes.get(CORRELATION_ID_KEY).map(CorrelationId::new),
        trace_id: message.attributes.get(TRACE_ID_KEY).map(TraceId::new),
        origin_execution_id: message.attributes.get(ORIGIN_EXECUTION_ID_KEY).map(ExecutionId::new),
        attributes,
    }
}
