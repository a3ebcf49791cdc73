//! Bus Dispatcher - イベントバスの CloudEvent
//!
//! `data` がエンベロープです。形が壊れていれば BadFormat として記録して ack します
//! （再配信しても直らないため）。ハンドラに渡す属性には相関 ID / トレース ID を補います。

use super::context::run_in_context;
use super::middleware::{BusMiddleware, identity, run_middleware};
use super::propagator::{ExecutionIds, merge_into_map};
use super::pubsub::EventRoute;
use super::runtime::{FailureScope, Nack, Runtime};
use super::status::Disposition;
use crate::domain::envelope::Envelope;
use crate::domain::errors::{ErrorKind, EventError};
use crate::domain::event::{CloudEvent, EventKind};
use crate::domain::record::EventMeta;
use crate::typed::EventPayload;
use serde_json::Value;
use std::sync::Arc;

pub struct BusDispatcher {
    event_type: String,
    route: EventRoute,
    throw_error: bool,
    middleware: BusMiddleware,
    runtime: Arc<Runtime>,
}

impl BusDispatcher {
    pub fn new(event_type: impl Into<String>, route: EventRoute, throw_error: bool, runtime: Arc<Runtime>) -> Self {
        Self {
            event_type: event_type.into(),
            route,
            throw_error,
            middleware: identity(),
            runtime,
        }
    }

    pub fn with_middleware(mut self, middleware: BusMiddleware) -> Self {
        self.middleware = middleware;
        self
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn route(&self) -> &EventRoute {
        &self.route
    }

    pub async fn dispatch(&self, event: CloudEvent<Value>) -> Result<(), Nack> {
        let ids = self.runtime.propagator().derive(
            Envelope::decode(&event.data).ok().as_ref(),
            event.trace_id(),
            event.execution_id(),
        );
        let context = self.runtime.context(ids.clone(), None);

        run_in_context(context, async move {
            let event = run_middleware(self.middleware.as_ref(), &self.event_type, event).await;
            match self.pipeline(&event.data, &ids).await {
                Ok(()) => {
                    self.runtime.record(Disposition::Succeeded);
                    Ok(())
                }
                Err(error) => {
                    let scope = FailureScope::event(EventKind::Bus, &self.event_type, event.data.clone(), event.time)
                        .with_event(EventMeta::from_event(&event))
                        .throw_error(self.throw_error);
                    self.runtime.settle(error, scope).await.into_event_result()
                }
            }
        })
        .await
    }

    async fn pipeline(&self, data: &Value, ids: &ExecutionIds) -> Result<(), EventError> {
        let mut envelope = Envelope::decode(data).map_err(|e| ErrorKind::BadFormat.exception(e.diff()))?;
        merge_into_map(&mut envelope.attributes, ids);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::context::{current, inject};
    use crate::app::middleware::middleware_fn;
    use crate::app::propagator::{CORRELATION_ID_KEY, TRACE_ID_KEY};
    use crate::app::pubsub::PubSubDispatcher;
    use crate::domain::errors::UnknownFailure;
    use crate::domain::event::MessagePublishedData;
    use crate::impls::{InMemoryDocumentStore, MapContainer, StoreErrorSink};
    use crate::ports::{Clock, FixedClock};
    use crate::typed::{AnySchema, EventHandler, Invoker, Route, SchemaProvider, event_fn, schema};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Mailer {
        sent: Mutex<Vec<String>>,
    }

    struct WelcomeHandler;

    #[async_trait]
    impl EventHandler for WelcomeHandler {
        async fn handle(&self, event: EventPayload) -> Result<(), EventError> {
            let mailer = inject::<Mailer>().await.map_err(EventError::other)?;
            let email = event.data["email"].as_str().unwrap_or_default().to_string();
            mailer.sent.lock().unwrap().push(email);
            Ok(())
        }
    }

    struct Harness {
        runtime: Arc<Runtime>,
        store: Arc<InMemoryDocumentStore>,
        clock: Arc<FixedClock>,
        mailer: Arc<Mailer>,
    }

    fn harness() -> Harness {
        let mailer = Arc::new(Mailer::default());
        let container = MapContainer::new()
            .with_instance(mailer.clone())
            .with_singleton(WelcomeHandler);
        harness_with(container, mailer)
    }

    fn harness_with(container: MapContainer, mailer: Arc<Mailer>) -> Harness {
        let store = Arc::new(InMemoryDocumentStore::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
        let runtime = Arc::new(
            Runtime::new(
                Arc::new(container),
                Arc::new(StoreErrorSink::new(store.clone(), "event-errors")),
            )
            .with_clock(clock.clone()),
        );
        Harness {
            runtime,
            store,
            clock,
            mailer,
        }
    }

    fn welcome_route() -> EventRoute {
        Route::new(
            "eventarc0",
            SchemaProvider::value(schema(AnySchema)),
            Invoker::<dyn EventHandler>::resolve::<WelcomeHandler>(),
        )
    }

    /// 少し待ってから、見えている ID を記録するハンドラ
    fn recording(delay_ms: u64, seen: Arc<Mutex<Option<(String, String)>>>) -> Arc<dyn EventHandler> {
        event_fn(move |_| {
            let seen = seen.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                let ctx = current().map_err(EventError::other)?;
                *seen.lock().unwrap() = Some((ctx.correlation_id.to_string(), ctx.trace_id.to_string()));
                Ok(())
            }
        })
    }

    fn bus_event(data: Value, h: &Harness) -> CloudEvent<Value> {
        CloudEvent {
            id: Some("evt-42".into()),
            source: "users".into(),
            specversion: "1.0".into(),
            event_type: "user.created".into(),
            subject: None,
            time: h.clock.now(),
            traceparent: None,
            data,
        }
    }

    #[tokio::test]
    async fn container_resolved_handler_receives_body() {
        let h = harness();
        let d = BusDispatcher::new("user.created", welcome_route(), false, h.runtime.clone());

        d.dispatch(bus_event(json!({ "body": { "email": "a@b.c" }, "correlationId": "c-1" }), &h))
            .await
            .unwrap();

        assert_eq!(*h.mailer.sent.lock().unwrap(), vec!["a@b.c".to_string()]);
        assert!(d.route().is_resolved());
    }

    #[tokio::test]
    async fn malformed_envelope_is_persisted_as_bad_format() {
        let h = harness();
        let d = BusDispatcher::new(
            "user.created",
            Route::new(
                "eventarc0",
                SchemaProvider::value(schema(AnySchema)),
                Invoker::Direct(event_fn(|_| async { Ok(()) })),
            ),
            false,
            h.runtime.clone(),
        );

        let result = d.dispatch(bus_event(json!({ "body": {}, "correlationId": 7 }), &h)).await;

        assert!(result.is_ok());
        let docs = h.store.documents("event-errors");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["error"]["errorCode"], ErrorKind::BadFormat.code());
        assert_eq!(docs[0]["executionId"], "evt-42");
        assert_eq!(docs[0]["data"]["correlationId"], 7);
    }

    #[tokio::test]
    async fn throw_error_rethrows_without_record() {
        let h = harness();
        let d = BusDispatcher::new(
            "user.created",
            Route::new(
                "eventarc0",
                SchemaProvider::value(schema(AnySchema)),
                Invoker::Direct(event_fn(|_| async { Err(UnknownFailure::new("smtp down").into()) })),
            ),
            true,
            h.runtime.clone(),
        );

        let result = d.dispatch(bus_event(json!({ "body": {} }), &h)).await;

        assert!(matches!(result, Err(Nack::Rethrow(_))));
        assert!(h.store.documents("event-errors").is_empty());
        assert_eq!(h.runtime.stats().rethrown, 1);
    }

    #[tokio::test]
    async fn handler_attributes_carry_resolved_ids() {
        let h = harness();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let d = BusDispatcher::new(
            "user.created",
            Route::new(
                "eventarc0",
                SchemaProvider::value(schema(AnySchema)),
                Invoker::Direct(event_fn(move |event: EventPayload| {
                    let sink = sink.clone();
                    async move {
                        *sink.lock().unwrap() = Some(event.attributes);
                        Ok(())
                    }
                })),
            ),
            false,
            h.runtime.clone(),
        );

        let mut event = bus_event(
            json!({ "body": {}, "correlationId": "c-1", "attributes": { "tenant": "acme" } }),
            &h,
        );
        event.traceparent = Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".into());
        d.dispatch(event).await.unwrap();

        let attributes = seen.lock().unwrap().take().unwrap();
        assert_eq!(attributes[CORRELATION_ID_KEY], "c-1");
        assert_eq!(attributes[TRACE_ID_KEY], "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(attributes["tenant"], "acme");
    }

    #[tokio::test]
    async fn middleware_rewrites_event_before_decoding() {
        let h = harness();
        let d = BusDispatcher::new("user.created", welcome_route(), false, h.runtime.clone()).with_middleware(
            middleware_fn(|mut event: CloudEvent<Value>| async move {
                // 素の body を送ってくる古い送信元をエンベロープに包み直す
                event.data = json!({ "body": event.data });
                event
            }),
        );

        d.dispatch(bus_event(json!({ "email": "legacy@b.c" }), &h)).await.unwrap();

        assert_eq!(*h.mailer.sent.lock().unwrap(), vec!["legacy@b.c".to_string()]);
        assert!(h.store.documents("event-errors").is_empty());
    }

    #[tokio::test]
    async fn unresolvable_handler_is_retried_on_next_dispatch() {
        let ready = Arc::new(AtomicBool::new(false));
        let flag = ready.clone();
        let mailer = Arc::new(Mailer::default());
        let container = MapContainer::new()
            .with_instance(mailer.clone())
            .with_factory(move || {
                if flag.load(Ordering::SeqCst) {
                    Ok(WelcomeHandler)
                } else {
                    Err("mailer pool is not ready".to_string())
                }
            });
        let h = harness_with(container, mailer);
        let d = BusDispatcher::new("user.created", welcome_route(), false, h.runtime.clone());

        d.dispatch(bus_event(json!({ "body": { "email": "a@b.c" } }), &h))
            .await
            .unwrap();
        let docs = h.store.documents("event-errors");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["error"]["errorCode"], ErrorKind::InvalidHandler.code());
        assert!(!d.route().is_resolved());

        ready.store(true, Ordering::SeqCst);
        d.dispatch(bus_event(json!({ "body": { "email": "a@b.c" } }), &h))
            .await
            .unwrap();
        assert!(d.route().is_resolved());
        assert_eq!(*h.mailer.sent.lock().unwrap(), vec!["a@b.c".to_string()]);
        assert_eq!(h.store.documents("event-errors").len(), 1);
    }

    #[tokio::test]
    async fn concurrent_dispatches_on_different_routes_keep_their_ids() {
        let h = harness();
        let bus_seen = Arc::new(Mutex::new(None));
        let pubsub_seen = Arc::new(Mutex::new(None));
        let bus = BusDispatcher::new(
            "user.created",
            Route::new(
                "eventarc0",
                SchemaProvider::value(schema(AnySchema)),
                Invoker::Direct(recording(20, bus_seen.clone())),
            ),
            false,
            h.runtime.clone(),
        );
        let pubsub = PubSubDispatcher::new(
            "audit-log",
            Route::new(
                "pubsub0",
                SchemaProvider::value(schema(AnySchema)),
                Invoker::Direct(recording(5, pubsub_seen.clone())),
            ),
            false,
            h.runtime.clone(),
        );
        let message: CloudEvent<MessagePublishedData> = serde_json::from_value(json!({
            "id": "m-1",
            "type": "google.cloud.pubsub.topic.v1.messagePublished",
            "time": h.clock.now(),
            "data": { "message": {
                "messageId": "m-1",
                "json": {},
                "attributes": { "correlationId": "c-pubsub", "traceId": "t-pubsub" }
            } }
        }))
        .unwrap();

        let (a, b) = tokio::join!(
            bus.dispatch(bus_event(json!({ "body": {}, "correlationId": "c-bus", "traceId": "t-bus" }), &h)),
            pubsub.dispatch(message),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(
            bus_seen.lock().unwrap().take(),
            Some(("c-bus".to_string(), "t-bus".to_string()))
        );
        assert_eq!(
            pubsub_seen.lock().unwrap().take(),
            Some(("c-pubsub".to_string(), "t-pubsub".to_string()))
        );
        assert_eq!(h.runtime.stats().succeeded, 2);
    }
}
