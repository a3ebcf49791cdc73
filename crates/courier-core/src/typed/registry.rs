//! Handler Registry - ルートごとのスキーマとハンドラのメモ化
//!
//! # 学習ポイント
//! - `tokio::sync::OnceCell` による single-flight な遅延初期化
//! - 関数ポインタによる型消去されたインスタンスのダウンキャスト
//! - 失敗はキャッシュしない（次のウォームな呼び出しで再解決する）

use super::handler::{CallableHandler, EventHandler};
use crate::domain::errors::{ErrorKind, EventError};
use crate::ports::{Container, Endpoint, Instance, Registration};
use std::any::type_name;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// スキーマを（同期または非同期で）作る関数
pub struct SchemaProvider<S>(Box<dyn Fn() -> BoxFuture<S> + Send + Sync>);

impl<S: Send + 'static> SchemaProvider<S> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self(Box::new(move || {
            let schema = f();
            Box::pin(async move { schema })
        }))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = S> + Send + 'static,
    {
        Self(Box::new(move || Box::pin(f())))
    }

    pub fn value(schema: S) -> Self
    where
        S: Clone + Sync,
    {
        Self::new(move || schema.clone())
    }
}

/// ハンドラの呼び出し方
pub enum Invoker<H: ?Sized> {
    /// 関数・インスタンスを直接保持
    Direct(Arc<H>),
    /// コンテナから型名で解決する
    Resolve {
        type_name: &'static str,
        downcast: fn(Instance) -> Option<Arc<H>>,
    },
}

impl<H: ?Sized> Clone for Invoker<H> {
    fn clone(&self) -> Self {
        match self {
            Self::Direct(handler) => Self::Direct(Arc::clone(handler)),
            Self::Resolve {
                type_name,
                downcast,
            } => Self::Resolve {
                type_name: *type_name,
                downcast: *downcast,
            },
        }
    }
}

fn downcast_callable<T: CallableHandler + 'static>(instance: Instance) -> Option<Arc<dyn CallableHandler>> {
    instance
        .downcast::<T>()
        .ok()
        .map(|handler| handler as Arc<dyn CallableHandler>)
}

fn downcast_event<T: EventHandler + 'static>(instance: Instance) -> Option<Arc<dyn EventHandler>> {
    instance
        .downcast::<T>()
        .ok()
        .map(|handler| handler as Arc<dyn EventHandler>)
}

impl Invoker<dyn CallableHandler> {
    pub fn resolve<T: CallableHandler + 'static>() -> Self {
        Self::Resolve {
            type_name: type_name::<T>(),
            downcast: downcast_callable::<T>,
        }
    }
}

impl Invoker<dyn EventHandler> {
    pub fn resolve<T: EventHandler + 'static>() -> Self {
        Self::Resolve {
            type_name: type_name::<T>(),
            downcast: downcast_event::<T>,
        }
    }
}

impl<H: ?Sized> From<Arc<H>> for Invoker<H> {
    fn from(handler: Arc<H>) -> Self {
        Self::Direct(handler)
    }
}

/// 1 ルート分の登録内容とメモ
///
/// - `schema()`: provider はプロセス生存期間中に高々 1 回呼ばれる
/// - `invoker()`: 成功した解決だけを保持し、失敗は保持しない
pub struct Route<S, H: ?Sized> {
    key: String,
    provider: SchemaProvider<S>,
    invoker: Invoker<H>,
    schema: OnceCell<S>,
    handler: OnceCell<Arc<H>>,
}

impl<S, H> Route<S, H>
where
    S: Send + Sync + 'static,
    H: ?Sized + Send + Sync,
{
    pub fn new(key: impl Into<String>, provider: SchemaProvider<S>, invoker: Invoker<H>) -> Self {
        Self {
            key: key.into(),
            provider,
            invoker,
            schema: OnceCell::new(),
            handler: OnceCell::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn schema(&self) -> &S {
        self.schema.get_or_init(|| (self.provider.0)()).await
    }

    /// ハンドラを取得（初回はコンテナから解決）
    ///
    /// # Errors
    /// 解決に失敗すると `InvalidHandler`。メモは空のまま残る。
    pub async fn invoker(&self, container: &dyn Container) -> Result<Arc<H>, EventError> {
        let handler = self
            .handler
            .get_or_try_init(|| async {
                match &self.invoker {
                    Invoker::Direct(handler) => Ok(Arc::clone(handler)),
                    &Invoker::Resolve {
                        type_name,
                        downcast,
                    } => {
                        let resolved = container
                            .resolve(type_name)
                            .await
                            .map_err(|e| e.to_string())
                            .and_then(|instance| {
                                downcast(instance)
                                    .ok_or_else(|| format!("instance of {type_name} has a different type"))
                            });
                        resolved.map_err(|reason| {
                            tracing::error!(
                                route = %self.key,
                                handler = type_name,
                                error = %reason,
                                "could not find instance of handler, make sure it is registered in the container"
                            );
                            EventError::from(ErrorKind::InvalidHandler.exception(reason))
                        })
                    }
                }
            })
            .await?;
        Ok(Arc::clone(handler))
    }

    pub fn is_resolved(&self) -> bool {
        self.handler.initialized()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("route '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// 登録済みルートの一覧（登録順を保持）
#[derive(Default)]
pub struct RouteTable {
    entries: Vec<(Registration, Endpoint)>,
    index: HashMap<String, usize>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, registration: Registration, endpoint: Endpoint) -> Result<(), RegistryError> {
        if self.index.contains_key(&registration.key) {
            return Err(RegistryError::AlreadyRegistered(registration.key));
        }
        self.index.insert(registration.key.clone(), self.entries.len());
        self.entries.push((registration, endpoint));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Endpoint> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn registration(&self, key: &str) -> Option<&Registration> {
        self.index.get(key).map(|&i| &self.entries[i].0)
    }

    pub fn registered_keys(&self) -> Vec<String> {
        self.entries.iter().map(|(r, _)| r.key.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Registration, Endpoint)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
