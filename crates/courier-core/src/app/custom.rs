//! Custom Dispatcher - 任意のコールバック
//!
//! スキーマもハンドラのメモもありません。コールバックはアプリケーションコンテナを
//! 受け取り、実行コンテキストの中で動きます。失敗の扱いは他のイベントと同じです。

use super::context::run_in_context;
use super::runtime::{FailureScope, Nack, Runtime};
use super::status::Disposition;
use crate::domain::event::EventKind;
use crate::typed::{CustomEvent, CustomTrigger};
use std::sync::Arc;

pub struct CustomDispatcher {
    name: String,
    key: String,
    trigger: Arc<dyn CustomTrigger>,
    throw_error: bool,
    runtime: Arc<Runtime>,
}

impl CustomDispatcher {
    pub fn new(
        name: impl Into<String>,
        key: impl Into<String>,
        trigger: Arc<dyn CustomTrigger>,
        throw_error: bool,
        runtime: Arc<Runtime>,
    ) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            trigger,
            throw_error,
            runtime,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn dispatch(&self, event: CustomEvent) -> Result<(), Nack> {
        let ids = self.runtime.propagator().resolve(
            event.correlation_id.clone(),
            event.trace_id.clone(),
            event.execution_id.clone(),
        );
        let context = self.runtime.context(ids, None);
        let container = Arc::clone(self.runtime.container());

        run_in_context(context, async {
            tracing::debug!(custom = %self.name, "custom event received");
            match self.trigger.run(&event, container).await {
                Ok(()) => {
                    self.runtime.record(Disposition::Succeeded);
                    Ok(())
                }
                Err(error) => {
                    let scope = FailureScope::event(EventKind::Custom, &self.name, event.data.clone(), event.timestamp)
                        .throw_error(self.throw_error);
                    self.runtime.settle(error, scope).await.into_event_result()
                }
            }
        })
        .await
    }
}
