//! Middleware - ディスパッチ前にイベントを書き換えるフック
//!
//! PubSub / Bus / Callable に 1 つずつ。既定は恒等変換です。
//! 実行コンテキストの中、デコードより前に呼ばれるので `current()` も使えます。
//!
//! ```ignore
//! let app = AppBuilder::new(container)
//!     .with_pubsub_middleware(middleware_fn(|mut event: CloudEvent<MessagePublishedData>| async move {
//!         event.data.message.attributes.insert("tenant".into(), "acme".into());
//!         event
//!     }))
//!     .build()?;
//! ```

use crate::domain::event::{CallableInvocation, CloudEvent, MessagePublishedData};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

#[async_trait]
pub trait Middleware<E: Send + 'static>: Send + Sync {
    async fn apply(&self, event: E) -> E;
}

pub type PubSubMiddleware = Arc<dyn Middleware<CloudEvent<MessagePublishedData>>>;
pub type BusMiddleware = Arc<dyn Middleware<CloudEvent<Value>>>;
pub type CallableMiddleware = Arc<dyn Middleware<CallableInvocation>>;

pub struct Identity;

#[async_trait]
impl<E: Send + 'static> Middleware<E> for Identity {
    async fn apply(&self, event: E) -> E {
        event
    }
}

pub fn identity<E: Send + 'static>() -> Arc<dyn Middleware<E>> {
    Arc::new(Identity)
}

struct FnMiddleware<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<E, F, Fut> Middleware<E> for FnMiddleware<F, Fut>
where
    E: Send + 'static,
    F: Fn(E) -> Fut + Send + Sync,
    Fut: Future<Output = E> + Send + 'static,
{
    async fn apply(&self, event: E) -> E {
        (self.f)(event).await
    }
}

/// クロージャからミドルウェアを作る
pub fn middleware_fn<E, F, Fut>(f: F) -> Arc<dyn Middleware<E>>
where
    E: Send + 'static,
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = E> + Send + 'static,
{
    Arc::new(FnMiddleware { f, _fut: PhantomData })
}

/// 前後にイベントを debug ログしてミドルウェアを通す
pub(crate) async fn run_middleware<E>(middleware: &dyn Middleware<E>, route: &str, event: E) -> E
where
    E: Debug + Send + 'static,
{
    tracing::debug!(route, event = ?event, "event received (before middleware)");
    let event = middleware.apply(event).await;
    tracing::debug!(route, event = ?event, "event received (after middleware)");
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn identity_returns_event_untouched() {
        let m: Arc<dyn Middleware<Value>> = identity();
        assert_eq!(m.apply(json!({ "a": 1 })).await, json!({ "a": 1 }));
    }

    #[tokio::test]
    async fn closure_middleware_rewrites() {
        let m = middleware_fn(|invocation: CallableInvocation| async move {
            CallableInvocation {
                auth: Some(json!({ "uid": "system" })),
                ..invocation
            }
        });
        let out = run_middleware(m.as_ref(), "say_hello", CallableInvocation::new(json!({}))).await;
        assert_eq!(out.auth, Some(json!({ "uid": "system" })));
    }
}
