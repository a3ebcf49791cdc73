//! Callable Dispatcher - 同期 RPC
//!
//! decode → リクエストスキーマ検証 → ハンドラ取得 → 実行 → レスポンススキーマ検証
//!
//! どの段階の失敗も境界で捕まえ、ステータスマップ済みの `HttpsError` として返します。

use super::context::run_in_context;
use super::middleware::{CallableMiddleware, identity, run_middleware};
use super::propagator::ExecutionIds;
use super::runtime::{FailureScope, Runtime};
use super::status::Disposition;
use crate::domain::envelope::Envelope;
use crate::domain::errors::{ErrorKind, EventError};
use crate::domain::event::CallableInvocation;
use crate::domain::status::HttpsError;
use crate::typed::{CallableHandler, CallableRequest, Route, SchemaRef};
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct CallableSchema {
    pub request: SchemaRef,
    pub response: SchemaRef,
}

/// 呼び出しからロガーのスコープ名を決める関数
pub type ScopeFn = Arc<dyn Fn(&CallableInvocation) -> Option<String> + Send + Sync>;

pub type CallableRoute = Route<CallableSchema, dyn CallableHandler>;

pub struct CallableDispatcher {
    name: String,
    route: CallableRoute,
    scope: Option<ScopeFn>,
    middleware: CallableMiddleware,
    runtime: Arc<Runtime>,
}

impl CallableDispatcher {
    pub fn new(name: impl Into<String>, route: CallableRoute, runtime: Arc<Runtime>) -> Self {
        Self {
            name: name.into(),
            route,
            scope: None,
            middleware: identity(),
            runtime,
        }
    }

    pub fn with_scope(mut self, scope: Option<ScopeFn>) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_middleware(mut self, middleware: CallableMiddleware) -> Self {
        self.middleware = middleware;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn route(&self) -> &CallableRoute {
        &self.route
    }

    pub async fn dispatch(&self, invocation: CallableInvocation) -> Result<Value, HttpsError> {
        let ids = self.runtime.propagator().derive(
            Envelope::decode(&invocation.data).ok().as_ref(),
            invocation.trace_id(),
            invocation.execution_id.as_deref(),
        );
        let scope = self.scope.as_ref().and_then(|f| f(&invocation));
        let context = self.runtime.context(ids.clone(), scope);

        run_in_context(context, async move {
            let invocation = run_middleware(self.middleware.as_ref(), &self.name, invocation).await;
            match self.pipeline(invocation, ids).await {
                Ok(response) => {
                    self.runtime.record(Disposition::Succeeded);
                    Ok(response)
                }
                Err(error) => self
                    .runtime
                    .settle(error, FailureScope::callable(&self.name))
                    .await
                    .into_rpc_result(),
            }
        })
        .await
    }

    async fn pipeline(&self, invocation: CallableInvocation, ids: ExecutionIds) -> Result<Value, EventError> {
        let envelope = Envelope::decode(&invocation.data).map_err(|e| ErrorKind::BadFormat.exception(e.diff()))?;
        let schema = self.route.schema().await;
        let body = schema
            .request
            .validate(envelope.body)
            .await
            .map_err(|v| ErrorKind::BadRequest.exception(v.summary()))?;
        let handler = self.route.invoker(self.runtime.container().as_ref()).await?;
        let response = handler
            .handle(CallableRequest {
                body,
                correlation_id: ids.correlation_id,
                trace_id: ids.trace_id,
                origin_execution_id: ids.execution_id,
                auth: invocation.auth,
            })
            .await?;
        let validated = schema
            .response
            .validate(response)
            .await
            .map_err(|v| ErrorKind::BadResponse.exception(v.summary()))?;
        Ok(validated)
    }
}
