//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - キーは登録時に決まるので、重複はその場でエラーにする

use super::bus::BusDispatcher;
use super::callable::CallableDispatcher;
use super::custom::CustomDispatcher;
use super::middleware::{BusMiddleware, CallableMiddleware, PubSubMiddleware, identity};
use super::naming::{DefaultNamingStrategy, NamingStrategy, key_from_name};
use super::publish::{EventPublisher, MessagePublisher};
use super::pubsub::PubSubDispatcher;
use super::routes::{CallableDef, CustomDef, EventDef};
use super::runtime::Runtime;
use super::status::DispatchCounts;
use crate::config::CourierConfig;
use crate::domain::event::EventKind;
use crate::impls::StoreErrorSink;
use crate::ports::{
    Clock, Container, DocumentStore, Endpoint, ErrorSink, IdGenerator, Publisher, Registration, RouteOptions,
    SystemClock, Transport, UlidGenerator,
};
use crate::typed::{RegistryError, Route, RouteTable};
use std::collections::HashSet;
use std::sync::Arc;

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(container)
///     .with_store(store)
///     .callable(CallableDef::new("Say Hello", schema, invoker))?
///     .pubsub(EventDef::new("audit-log", schema, invoker))?
///     .expect_routes(&["say_hello", "pubsub0"])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - 同じキーの 2 回目の登録は `RegistryError`
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
pub struct AppBuilder {
    config: CourierConfig,
    container: Arc<dyn Container>,
    sink: Option<Arc<dyn ErrorSink>>,
    store: Option<Arc<dyn DocumentStore>>,
    publisher: Option<Arc<dyn Publisher>>,
    source: String,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
    naming: Box<dyn NamingStrategy>,
    pubsub_middleware: PubSubMiddleware,
    bus_middleware: BusMiddleware,
    callable_middleware: CallableMiddleware,
    pending: Vec<(Registration, Pending)>,
    keys: HashSet<String>,
    expected_routes: Option<Vec<String>>,
}

enum Pending {
    Callable(CallableDef),
    PubSub(EventDef),
    Bus(EventDef),
    Custom(CustomDef),
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing routes: {0:?}. These routes were expected but not registered.")]
    MissingRoutes(Vec<String>),
    #[error("No error sink configured. Use with_store() or with_error_sink().")]
    MissingErrorSink,
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl AppBuilder {
    pub fn new(container: Arc<dyn Container>) -> Self {
        Self {
            config: CourierConfig::default(),
            container,
            sink: None,
            store: None,
            publisher: None,
            source: "courier".to_string(),
            clock: Arc::new(SystemClock),
            ids: None,
            naming: Box::new(DefaultNamingStrategy::new()),
            pubsub_middleware: identity(),
            bus_middleware: identity(),
            callable_middleware: identity(),
            pending: Vec::new(),
            keys: HashSet::new(),
            expected_routes: None,
        }
    }

    pub fn with_config(mut self, config: CourierConfig) -> Self {
        self.config = config;
        self
    }

    /// 失敗の記録先（コレクション名は設定から）
    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// `with_store` より優先される
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// アウトバウンド publish 先。`source` はバスイベントの送信元名
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>, source: impl Into<String>) -> Self {
        self.publisher = Some(publisher);
        self.source = source.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_naming(mut self, naming: impl NamingStrategy + 'static) -> Self {
        self.naming = Box::new(naming);
        self
    }

    /// 全 PubSub ルートに共通のミドルウェア
    pub fn with_pubsub_middleware(mut self, middleware: PubSubMiddleware) -> Self {
        self.pubsub_middleware = middleware;
        self
    }

    pub fn with_bus_middleware(mut self, middleware: BusMiddleware) -> Self {
        self.bus_middleware = middleware;
        self
    }

    pub fn with_callable_middleware(mut self, middleware: CallableMiddleware) -> Self {
        self.callable_middleware = middleware;
        self
    }

    pub fn callable(self, def: CallableDef) -> Result<Self, RegistryError> {
        let key = match &def.key {
            Some(key) => key_from_name(key),
            None => self.naming.callable(&def.name),
        };
        let trigger = def.name.clone();
        self.push(EventKind::Callable, key, trigger, def.options.clone(), Pending::Callable(def))
    }

    pub fn pubsub(self, def: EventDef) -> Result<Self, RegistryError> {
        let key = match &def.key {
            Some(key) => key_from_name(key),
            None => self.naming.pubsub(&def.trigger),
        };
        let trigger = def.trigger.clone();
        self.push(EventKind::PubSub, key, trigger, def.options.clone(), Pending::PubSub(def))
    }

    pub fn bus(self, def: EventDef) -> Result<Self, RegistryError> {
        let key = match &def.key {
            Some(key) => key_from_name(key),
            None => self.naming.bus(&def.trigger),
        };
        let trigger = def.trigger.clone();
        self.push(EventKind::Bus, key, trigger, def.options.clone(), Pending::Bus(def))
    }

    pub fn custom(self, def: CustomDef) -> Result<Self, RegistryError> {
        let key = match &def.key {
            Some(key) => key_from_name(key),
            None => self.naming.custom(&def.name),
        };
        let trigger = def.name.clone();
        self.push(EventKind::Custom, key, trigger, def.options.clone(), Pending::Custom(def))
    }

    fn push(
        mut self,
        kind: EventKind,
        key: String,
        trigger: String,
        options: RouteOptions,
        pending: Pending,
    ) -> Result<Self, RegistryError> {
        if !self.keys.insert(key.clone()) {
            return Err(RegistryError::AlreadyRegistered(key));
        }
        let registration = Registration {
            kind,
            key,
            trigger,
            options,
        };
        self.pending.push((registration, pending));
        Ok(self)
    }

    /// 期待されるルートキーのリストを設定
    pub fn expect_routes(mut self, keys: &[&str]) -> Self {
        self.expected_routes = Some(keys.iter().map(|k| k.to_string()).collect());
        self
    }

    /// AppBuilder を構築して App を生成
    ///
    /// # 検証
    /// - Error Sink が設定されているか
    /// - expect_routes() のキーが全て登録されているか
    pub fn build(self) -> Result<App, BuildError> {
        if let Some(expected) = &self.expected_routes {
            let missing: Vec<String> = expected
                .iter()
                .filter(|key| !self.keys.contains(*key))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingRoutes(missing));
            }
        }
        let collection = self.config.error_collection.clone();
        let sink: Arc<dyn ErrorSink> = match (self.sink, self.store) {
            (Some(sink), _) => sink,
            (None, Some(store)) => Arc::new(StoreErrorSink::new(store, collection)),
            (None, None) => return Err(BuildError::MissingErrorSink),
        };

        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&self.clock))));
        let runtime = Arc::new(
            Runtime::new(Arc::clone(&self.container), sink)
                .with_config(&self.config)
                .with_clock(Arc::clone(&self.clock))
                .with_id_generator(ids),
        );

        let mut routes = RouteTable::new();
        for (registration, pending) in self.pending {
            let key = registration.key.clone();
            let runtime = Arc::clone(&runtime);
            let endpoint = match pending {
                Pending::Callable(def) => Endpoint::Callable(Arc::new(
                    CallableDispatcher::new(def.name, Route::new(key, def.schema, def.invoker), runtime)
                        .with_scope(def.scope)
                        .with_middleware(Arc::clone(&self.callable_middleware)),
                )),
                Pending::PubSub(def) => Endpoint::PubSub(Arc::new(
                    PubSubDispatcher::new(def.trigger, Route::new(key, def.schema, def.invoker), def.throw_error, runtime)
                        .with_middleware(Arc::clone(&self.pubsub_middleware)),
                )),
                Pending::Bus(def) => Endpoint::Bus(Arc::new(
                    BusDispatcher::new(def.trigger, Route::new(key, def.schema, def.invoker), def.throw_error, runtime)
                        .with_middleware(Arc::clone(&self.bus_middleware)),
                )),
                Pending::Custom(def) => Endpoint::Custom(Arc::new(CustomDispatcher::new(
                    def.name,
                    key,
                    def.trigger,
                    def.throw_error,
                    runtime,
                ))),
            };
            routes.insert(registration, endpoint)?;
        }
        tracing::info!(routes = routes.len(), "application built");

        Ok(App {
            routes,
            runtime,
            defaults: self.config.defaults.clone(),
            publisher: self.publisher,
            source: self.source,
            emulator: self.config.emulator,
        })
    }
}

/// 構築済みのアプリケーション
pub struct App {
    routes: RouteTable,
    runtime: Arc<Runtime>,
    defaults: RouteOptions,
    publisher: Option<Arc<dyn Publisher>>,
    source: String,
    emulator: bool,
}

impl App {
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// 全ルートをトランスポートに登録する
    ///
    /// ルートのオプションはアプリケーションの既定値で補完されます。
    pub fn export<T: Transport>(&self, transport: &mut T) -> Vec<T::Exported> {
        self.routes
            .iter()
            .map(|(registration, endpoint)| {
                let registration = Registration {
                    options: registration.options.merged_with(&self.defaults),
                    ..registration.clone()
                };
                tracing::debug!(kind = %registration.kind, key = %registration.key, "exporting route");
                transport.register_handler(&registration, endpoint.clone())
            })
            .collect()
    }

    pub fn callable(&self, key: &str) -> Option<Arc<CallableDispatcher>> {
        match self.routes.get(key)? {
            Endpoint::Callable(dispatcher) => Some(Arc::clone(dispatcher)),
            _ => None,
        }
    }

    pub fn pubsub(&self, key: &str) -> Option<Arc<PubSubDispatcher>> {
        match self.routes.get(key)? {
            Endpoint::PubSub(dispatcher) => Some(Arc::clone(dispatcher)),
            _ => None,
        }
    }

    pub fn bus(&self, key: &str) -> Option<Arc<BusDispatcher>> {
        match self.routes.get(key)? {
            Endpoint::Bus(dispatcher) => Some(Arc::clone(dispatcher)),
            _ => None,
        }
    }

    pub fn custom(&self, key: &str) -> Option<Arc<CustomDispatcher>> {
        match self.routes.get(key)? {
            Endpoint::Custom(dispatcher) => Some(Arc::clone(dispatcher)),
            _ => None,
        }
    }

    pub fn stats(&self) -> DispatchCounts {
        self.runtime.stats()
    }

    pub fn message_publisher(&self) -> Option<MessagePublisher> {
        self.publisher
            .as_ref()
            .map(|publisher| MessagePublisher::new(Arc::clone(publisher), self.emulator))
    }

    pub fn event_publisher(&self) -> Option<EventPublisher> {
        self.publisher
            .as_ref()
            .map(|publisher| EventPublisher::new(Arc::clone(publisher), self.source.clone(), self.emulator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::callable::CallableSchema;
    use crate::app::middleware::middleware_fn;
    use crate::domain::event::{CloudEvent, MessagePublishedData};
    use crate::impls::{InMemoryDocumentStore, MapContainer};
    use crate::typed::{AnySchema, EventPayload, Invoker, SchemaProvider, callable_fn, event_fn, schema, trigger_fn};
    use serde_json::json;
    use std::sync::Mutex;

    fn builder() -> AppBuilder {
        AppBuilder::new(Arc::new(MapContainer::new())).with_store(Arc::new(InMemoryDocumentStore::new()))
    }

    fn hello() -> CallableDef {
        CallableDef::new(
            "Say Hello",
            SchemaProvider::value(CallableSchema {
                request: schema(AnySchema),
                response: schema(AnySchema),
            }),
            Invoker::Direct(callable_fn(|_| async { Ok(json!("hi")) })),
        )
    }

    fn audit(topic: &str) -> EventDef {
        EventDef::new(
            topic,
            SchemaProvider::value(schema(AnySchema)),
            Invoker::Direct(event_fn(|_| async { Ok(()) })),
        )
    }

    struct Recorder(Vec<Registration>);

    impl Transport for Recorder {
        type Exported = String;

        fn register_handler(&mut self, registration: &Registration, _endpoint: Endpoint) -> String {
            self.0.push(registration.clone());
            registration.key.clone()
        }
    }

    #[test]
    fn keys_come_from_names_and_counters() {
        let app = builder()
            .callable(hello())
            .unwrap()
            .pubsub(audit("audit-log"))
            .unwrap()
            .pubsub(audit("billing"))
            .unwrap()
            .bus(audit("user.created"))
            .unwrap()
            .custom(CustomDef::new("Nightly", trigger_fn(|_, _| async { Ok(()) })))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            app.routes().registered_keys(),
            vec!["say_hello", "pubsub0", "pubsub1", "eventarc0", "custom0"]
        );
        assert!(app.callable("say_hello").is_some());
        assert!(app.pubsub("pubsub1").is_some_and(|d| d.topic() == "billing"));
        assert!(app.bus("say_hello").is_none());
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let result = builder()
            .callable(hello())
            .unwrap()
            .callable(hello().with_key("say hello"));
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(key)) if key == "say_hello"));
    }

    #[test]
    fn missing_expected_routes_fail_the_build() {
        let result = builder()
            .callable(hello())
            .unwrap()
            .expect_routes(&["say_hello", "pubsub0"])
            .build();
        assert!(matches!(
            result,
            Err(BuildError::MissingRoutes(missing)) if missing == vec!["pubsub0".to_string()]
        ));
    }

    #[test]
    fn build_requires_an_error_sink() {
        let result = AppBuilder::new(Arc::new(MapContainer::new())).build();
        assert!(matches!(result, Err(BuildError::MissingErrorSink)));
    }

    #[test]
    fn export_merges_defaults_into_route_options() {
        let mut config = CourierConfig::default();
        config.defaults = RouteOptions {
            region: Some("southamerica-east1".into()),
            timeout_seconds: Some(60),
            ..RouteOptions::default()
        };
        let app = AppBuilder::new(Arc::new(MapContainer::new()))
            .with_config(config)
            .with_store(Arc::new(InMemoryDocumentStore::new()))
            .pubsub(audit("audit-log").with_options(RouteOptions {
                timeout_seconds: Some(540),
                ..RouteOptions::default()
            }))
            .unwrap()
            .build()
            .unwrap();

        let mut transport = Recorder(Vec::new());
        let exported = app.export(&mut transport);

        assert_eq!(exported, vec!["pubsub0"]);
        let options = &transport.0[0].options;
        assert_eq!(options.region.as_deref(), Some("southamerica-east1"));
        assert_eq!(options.timeout_seconds, Some(540));
    }

    #[test]
    fn publishers_exist_only_when_configured() {
        let app = builder().build().unwrap();
        assert!(app.message_publisher().is_none());
        assert!(app.event_publisher().is_none());
    }

    #[tokio::test]
    async fn pubsub_middleware_rewrites_event_before_handler() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let app = builder()
            .with_pubsub_middleware(middleware_fn(|mut event: CloudEvent<MessagePublishedData>| async move {
                event.data.message.attributes.insert("tenant".into(), "acme".into());
                event.data.message.json = Some(json!({ "rewritten": true }));
                event
            }))
            .pubsub(EventDef::new(
                "audit-log",
                SchemaProvider::value(schema(AnySchema)),
                Invoker::Direct(event_fn(move |event: EventPayload| {
                    let sink = sink.clone();
                    async move {
                        *sink.lock().unwrap() = Some(event);
                        Ok(())
                    }
                })),
            ))
            .unwrap()
            .build()
            .unwrap();

        let event: CloudEvent<MessagePublishedData> = serde_json::from_value(json!({
            "id": "m-1",
            "type": "google.cloud.pubsub.topic.v1.messagePublished",
            "time": chrono::Utc::now(),
            "data": { "message": { "messageId": "m-1", "json": { "original": true } } }
        }))
        .unwrap();
        app.pubsub("pubsub0").unwrap().dispatch(event).await.unwrap();

        let event = seen.lock().unwrap().take().unwrap();
        assert_eq!(event.data, json!({ "rewritten": true }));
        assert_eq!(event.attributes["tenant"], "acme");
    }
}
