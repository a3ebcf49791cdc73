//! MapContainer - 型名をキーにした最小の DI コンテナ
//!
//! - `with_singleton` / `with_instance`: 常に同じインスタンスを返す
//! - `with_factory`: 解決のたびに作る（失敗も返せる）

use crate::ports::{Container, Instance, ResolveError};
use async_trait::async_trait;
use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::Arc;

type Factory = Box<dyn Fn() -> Result<Instance, String> + Send + Sync>;

enum Provider {
    Singleton(Instance),
    Factory(Factory),
}

/// # 使用例
/// ```ignore
/// let container = MapContainer::new()
///     .with_singleton(WelcomeHandler)
///     .with_factory(|| Ok(Mailer::connect()?));
/// let mailer = resolve::<Mailer>(&container).await?;
/// ```
#[derive(Default)]
pub struct MapContainer {
    providers: HashMap<&'static str, Provider>,
}

impl MapContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_singleton<T: Any + Send + Sync>(self, value: T) -> Self {
        self.with_instance(Arc::new(value))
    }

    pub fn with_instance<T: Any + Send + Sync>(mut self, value: Arc<T>) -> Self {
        self.providers.insert(type_name::<T>(), Provider::Singleton(value));
        self
    }

    pub fn with_factory<T, F>(mut self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> Result<T, String> + Send + Sync + 'static,
    {
        let factory: Factory = Box::new(move || factory().map(|value| Arc::new(value) as Instance));
        self.providers.insert(type_name::<T>(), Provider::Factory(factory));
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.providers.contains_key(key)
    }
}

#[async_trait]
impl Container for MapContainer {
    async fn resolve(&self, key: &str) -> Result<Instance, ResolveError> {
        match self.providers.get(key) {
            Some(Provider::Singleton(instance)) => Ok(Arc::clone(instance)),
            Some(Provider::Factory(factory)) => factory().map_err(|reason| ResolveError::ProviderFailed {
                key: key.to_string(),
                reason,
            }),
            None => Err(ResolveError::NotRegistered(key.to_string())),
        }
    }
}
