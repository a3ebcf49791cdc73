//! Container port - アプリケーションコンテナ（DI）への狭い窓口
//!
//! コアが必要とするのは `resolve(key) -> instance` だけです。
//! キーは型名（`std::any::type_name`）で、インスタンスは型消去された `Arc` です。

use async_trait::async_trait;
use std::any::{Any, type_name};
use std::sync::Arc;

/// 型消去されたインスタンス
pub type Instance = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no provider registered for '{0}'")]
    NotRegistered(String),
    #[error("provider for '{key}' failed: {reason}")]
    ProviderFailed { key: String, reason: String },
    #[error("instance registered for '{0}' has a different type")]
    TypeMismatch(String),
}

#[async_trait]
pub trait Container: Send + Sync {
    async fn resolve(&self, key: &str) -> Result<Instance, ResolveError>;
}

/// 型付きで解決するヘルパ
pub async fn resolve<T: Any + Send + Sync>(
    container: &dyn Container,
) -> Result<Arc<T>, ResolveError> {
    let key = type_name::<T>();
    let instance = container.resolve(key).await?;
    instance
        .downcast::<T>()
        .map_err(|_| ResolveError::TypeMismatch(key.to_string()))
}
