//! Execution Context - 呼び出し単位のアンビエントな実行コンテキスト
//!
//! `tokio::task_local!` に保持するので、並行に走る別のディスパッチからは
//! 見えません。`run_in_context` の future が完了（成功・失敗どちらでも）すると破棄されます。
//!
//! 同じタスク内で `tokio::spawn` した子タスクには引き継がれません。
//! 子タスクにも必要なら `current()` で取り出して `run_in_context` し直します。

use crate::domain::ids::{CorrelationId, ExecutionId, TraceId};
use crate::ports::{Container, ResolveError, resolve};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

tokio::task_local! {
    static CURRENT: ExecutionContext;
}

#[derive(Clone)]
pub struct ExecutionContext {
    pub trace_id: TraceId,
    pub correlation_id: CorrelationId,
    pub execution_id: Option<ExecutionId>,
    /// ロガーのスコープ名
    pub scope: Option<String>,
    pub container: Arc<dyn Container>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("trace_id", &self.trace_id)
            .field("correlation_id", &self.correlation_id)
            .field("execution_id", &self.execution_id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("no execution context is active on this task")]
    NoContext,
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// `fut` をコンテキスト付きで実行する
///
/// ID はトレース用の span にも載ります。
pub async fn run_in_context<F: Future>(context: ExecutionContext, fut: F) -> F::Output {
    let span = tracing::info_span!(
        "dispatch",
        trace_id = %context.trace_id,
        correlation_id = %context.correlation_id,
        execution_id = context.execution_id.as_ref().map(ExecutionId::as_str),
        scope = context.scope.as_deref(),
    );
    CURRENT.scope(context, fut.instrument(span)).await
}

pub fn current() -> Result<ExecutionContext, ContextError> {
    CURRENT.try_with(Clone::clone).map_err(|_| ContextError::NoContext)
}

pub fn try_current() -> Option<ExecutionContext> {
    CURRENT.try_with(Clone::clone).ok()
}

/// 現在のコンテキストのコンテナから `T` を解決する
pub async fn inject<T: Any + Send + Sync>() -> Result<Arc<T>, ContextError> {
    let context = current()?;
    Ok(resolve::<T>(context.container.as_ref()).await?)
}
