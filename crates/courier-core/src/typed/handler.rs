//! Handler traits - ユーザーのビジネスハンドラ
//!
//! # 二層構造
//! - **内部（Dyn）**: `CallableHandler` / `EventHandler` / `CustomTrigger` - object-safe, `serde_json::Value` を扱う
//! - **表層（Typed）**: `Callable` / `Consumer` - serde の型で入出力を受け取る
//!
//! `TypedCallable<H>` / `TypedConsumer<H>` が表層を内部に変換します（type erasure）。
//! クロージャは `callable_fn` / `event_fn` / `trigger_fn` でそのまま登録できます。

use crate::domain::errors::{ErrorKind, EventError};
use crate::domain::ids::{CorrelationId, ExecutionId, TraceId};
use crate::ports::Container;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

/// 検証済みの RPC リクエスト
#[derive(Debug, Clone, PartialEq)]
pub struct CallableRequest {
    pub body: Value,
    pub correlation_id: CorrelationId,
    pub trace_id: TraceId,
    pub origin_execution_id: Option<ExecutionId>,
    pub auth: Option<Value>,
}

#[async_trait]
pub trait CallableHandler: Send + Sync {
    async fn handle(&self, request: CallableRequest) -> Result<Value, EventError>;
}

/// 検証済みのイベント（PubSub / Bus）
#[derive(Debug, Clone, PartialEq)]
pub struct EventPayload {
    pub data: Value,
    pub attributes: Map<String, Value>,
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: EventPayload) -> Result<(), EventError>;
}

/// 呼び出し側が起動するカスタムイベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomEvent {
    /// リトライ判定に使うイベント時刻
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// 失敗時に記録されるデータ
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<ExecutionId>,
}

impl CustomEvent {
    pub fn new(timestamp: DateTime<Utc>, data: Value) -> Self {
        Self {
            timestamp,
            data,
            correlation_id: None,
            trace_id: None,
            execution_id: None,
        }
    }
}

/// 任意のコールバック（アプリケーションコンテナを受け取る）
#[async_trait]
pub trait CustomTrigger: Send + Sync {
    async fn run(&self, event: &CustomEvent, container: Arc<dyn Container>) -> Result<(), EventError>;
}

// ========================================
// クロージャ用のラッパー
// ========================================

pub struct FnCallable<F>(F);

#[async_trait]
impl<F, Fut> CallableHandler for FnCallable<F>
where
    F: Fn(CallableRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, EventError>> + Send + 'static,
{
    async fn handle(&self, request: CallableRequest) -> Result<Value, EventError> {
        (self.0)(request).await
    }
}

pub fn callable_fn<F, Fut>(f: F) -> Arc<dyn CallableHandler>
where
    F: Fn(CallableRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, EventError>> + Send + 'static,
{
    Arc::new(FnCallable(f))
}

pub struct FnEvent<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnEvent<F>
where
    F: Fn(EventPayload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), EventError>> + Send + 'static,
{
    async fn handle(&self, event: EventPayload) -> Result<(), EventError> {
        (self.0)(event).await
    }
}

pub fn event_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(EventPayload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), EventError>> + Send + 'static,
{
    Arc::new(FnEvent(f))
}

pub struct FnTrigger<F>(F);

#[async_trait]
impl<F, Fut> CustomTrigger for FnTrigger<F>
where
    F: Fn(CustomEvent, Arc<dyn Container>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), EventError>> + Send + 'static,
{
    async fn run(&self, event: &CustomEvent, container: Arc<dyn Container>) -> Result<(), EventError> {
        (self.0)(event.clone(), container).await
    }
}

pub fn trigger_fn<F, Fut>(f: F) -> Arc<dyn CustomTrigger>
where
    F: Fn(CustomEvent, Arc<dyn Container>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), EventError>> + Send + 'static,
{
    Arc::new(FnTrigger(f))
}

// ========================================
// 型付き API
// ========================================

/// 型付きの RPC ハンドラ
///
/// # 使用例
/// ```ignore
/// struct SayHello;
///
/// #[async_trait]
/// impl Callable for SayHello {
///     type Request = HelloRequest;
///     type Response = HelloResponse;
///
///     async fn call(&self, request: HelloRequest) -> Result<HelloResponse, EventError> {
///         Ok(HelloResponse { greeting: format!("Hello, {}!", request.name) })
///     }
/// }
/// ```
#[async_trait]
pub trait Callable: Send + Sync {
    type Request: DeserializeOwned + Send;
    type Response: Serialize + Send;

    async fn call(&self, request: Self::Request) -> Result<Self::Response, EventError>;
}

pub struct TypedCallable<H>(pub H);

#[async_trait]
impl<H: Callable + 'static> CallableHandler for TypedCallable<H> {
    async fn handle(&self, request: CallableRequest) -> Result<Value, EventError> {
        let typed: H::Request = serde_json::from_value(request.body)
            .map_err(|e| ErrorKind::BadRequest.exception(format!("json decode: {e}")))?;
        let response = self.0.call(typed).await?;
        serde_json::to_value(response)
            .map_err(|e| ErrorKind::BadResponse.exception(format!("json encode: {e}")).into())
    }
}

/// 型付きのイベントハンドラ
#[async_trait]
pub trait Consumer: Send + Sync {
    type Data: DeserializeOwned + Send;

    async fn consume(&self, data: Self::Data, attributes: Map<String, Value>) -> Result<(), EventError>;
}

pub struct TypedConsumer<H>(pub H);

#[async_trait]
impl<H: Consumer + 'static> EventHandler for TypedConsumer<H> {
    async fn handle(&self, event: EventPayload) -> Result<(), EventError> {
        let data: H::Data = serde_json::from_value(event.data)
            .map_err(|e| ErrorKind::BadRequest.exception(format!("json decode: {e}")))?;
        self.0.consume(data, event.attributes).await
    }
}
