use async_trait::async_trait;
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use courier_core::app::{
    AppBuilder, BusEvent, CallableDef, CallableSchema, CustomDef, EventDef, MessagePublisher, inject,
};
use courier_core::config::CourierConfig;
use courier_core::domain::{CallableInvocation, EventError, RetryEvent};
use courier_core::impls::{InMemoryDocumentStore, LocalTransport, MapContainer, RecordingPublisher};
use courier_core::typed::{
    AnySchema, Callable, Consumer, CustomEvent, EventHandler, EventPayload, Invoker,
    SchemaProvider, TypedCallable, TypedConsumer, TypedSchema, schema, trigger_fn,
};

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Replay JSON-lines events through an in-process courier application")]
struct Cli {
    /// `{"function": "<key>", "payload": {...}}` を 1 行ずつ（省略時は stdin）
    #[arg(long)]
    input: Option<PathBuf>,
    /// JSON の設定ファイル（省略時は環境変数）
    #[arg(long)]
    config: Option<PathBuf>,
    /// 登録された関数を表示して終了
    #[arg(long)]
    list: bool,
}

#[derive(Debug, Deserialize)]
struct Line {
    function: String,
    payload: Value,
}

// ========================================
// デモ用のハンドラ
// ========================================

#[derive(Debug, Serialize, Deserialize)]
struct HelloRequest {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct HelloResponse {
    greeting: String,
}

struct SayHello;

#[async_trait]
impl Callable for SayHello {
    type Request = HelloRequest;
    type Response = HelloResponse;

    async fn call(&self, request: HelloRequest) -> Result<HelloResponse, EventError> {
        tracing::info!(name = %request.name, "saying hello");
        Ok(HelloResponse {
            greeting: format!("Hello, {}!", request.name),
        })
    }
}

#[derive(Debug, Deserialize)]
struct AuditEntry {
    action: String,
    #[serde(default)]
    user: Option<String>,
}

struct AuditLog;

#[async_trait]
impl Consumer for AuditLog {
    type Data = AuditEntry;

    async fn consume(&self, entry: AuditEntry, attributes: Map<String, Value>) -> Result<(), EventError> {
        if entry.action == "flaky" {
            return Err(RetryEvent::new("audit backend is warming up").into());
        }
        tracing::info!(action = %entry.action, user = ?entry.user, attributes = %serde_json::Value::Object(attributes), "audit entry");
        Ok(())
    }
}

/// コンテナから解決されるハンドラ（`MessagePublisher` は inject で取る）
struct WelcomeUser;

#[async_trait]
impl EventHandler for WelcomeUser {
    async fn handle(&self, event: EventPayload) -> Result<(), EventError> {
        let email = event.data["email"].as_str().unwrap_or_default().to_string();
        if email.is_empty() {
            return Err(EventError::other(std::io::Error::other("user has no email")));
        }
        let publisher = inject::<MessagePublisher>().await.map_err(EventError::other)?;
        publisher
            .publish("audit-log", json!({ "action": "welcomed", "user": email }), BTreeMap::new())
            .await?;
        Ok(())
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<CourierConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(CourierConfig::from_json(&std::fs::read_to_string(path)?)?),
        None => Ok(CourierConfig::from_env()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    // (A) 外部の協力者（ストア・publisher・コンテナ）
    let store = Arc::new(InMemoryDocumentStore::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let container = MapContainer::new()
        .with_singleton(WelcomeUser)
        .with_singleton(MessagePublisher::new(publisher.clone(), config.emulator));

    // (B) ルート登録
    let app = AppBuilder::new(Arc::new(container))
        .with_config(config)
        .with_store(store.clone())
        .with_publisher(publisher.clone(), "courier-cli")
        .callable(
            CallableDef::new(
                "Say Hello",
                SchemaProvider::new(|| CallableSchema {
                    request: schema(TypedSchema::<HelloRequest>::new()),
                    response: schema(TypedSchema::<HelloResponse>::new()),
                }),
                Invoker::Direct(Arc::new(TypedCallable(SayHello))),
            )
            .with_scope(Arc::new(|invocation: &CallableInvocation| {
                invocation
                    .auth
                    .as_ref()
                    .and_then(|auth| auth["uid"].as_str())
                    .map(str::to_owned)
            })),
        )?
        .pubsub(EventDef::new(
            "audit-log",
            SchemaProvider::value(schema(AnySchema)),
            Invoker::Direct(Arc::new(TypedConsumer(AuditLog))),
        ))?
        .bus(EventDef::new(
            "user.created",
            SchemaProvider::value(schema(AnySchema)),
            Invoker::<dyn EventHandler>::resolve::<WelcomeUser>(),
        ))?
        .custom(CustomDef::new(
            "nightly-report",
            trigger_fn(|event: CustomEvent, _container| async move {
                tracing::info!(data = %event.data, "nightly report generated");
                Ok(())
            }),
        ))?
        .expect_routes(&["say_hello", "pubsub0", "eventarc0", "custom0"])
        .build()?;

    // (C) トランスポートに公開
    let mut transport = LocalTransport::new();
    app.export(&mut transport);

    if cli.list {
        for registration in transport.functions() {
            println!(
                "{}\t{}\t{}\t{}",
                registration.key,
                registration.kind,
                registration.trigger,
                serde_json::to_string(&registration.options)?
            );
        }
        return Ok(());
    }

    // (D) イベントを 1 行ずつ流す
    let reader: Box<dyn tokio::io::AsyncRead + Unpin> = match &cli.input {
        Some(path) => Box::new(tokio::fs::File::open(path).await?),
        None => Box::new(tokio::io::stdin()),
    };
    let mut lines = BufReader::new(reader).lines();
    while let Some(raw) = lines.next_line().await? {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }
        let line: Line = match serde_json::from_str(raw) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed line");
                continue;
            }
        };
        let output = match transport.invoke(&line.function, line.payload).await {
            Ok(result) => json!({ "function": line.function, "ok": true, "result": result }),
            Err(e) => json!({ "function": line.function, "ok": false, "error": e.to_string() }),
        };
        println!("{output}");
    }

    // (E) 結果のまとめ
    if let Some(events) = app.event_publisher() {
        events
            .publish(vec![BusEvent::new("replay.finished", json!(app.stats()))])
            .await?;
    }
    println!("stats: {}", serde_json::to_string(&app.stats())?);
    println!("event errors: {}", serde_json::to_string(&store.documents("event-errors"))?);
    for message in publisher.drain() {
        println!("published: {} -> {}", message.destination, message.payload);
    }
    Ok(())
}
