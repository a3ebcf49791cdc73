//! StoreErrorSink - ErrorRecord をドキュメントストアに追記する
//!
//! レコードは 1 失敗につき 1 ドキュメント。更新も削除もしません（`ttl` で外部が回収）。

use crate::domain::record::ErrorRecord;
use crate::ports::{DocumentStore, ErrorSink, SinkError};
use async_trait::async_trait;
use std::sync::Arc;

pub struct StoreErrorSink {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl StoreErrorSink {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl ErrorSink for StoreErrorSink {
    async fn record(&self, record: &ErrorRecord) -> Result<(), SinkError> {
        let document = serde_json::to_value(record)?;
        let id = self.store.create(&self.collection, document).await?;
        tracing::debug!(collection = %self.collection, id = %id, "event error registered");
        Ok(())
    }
}
