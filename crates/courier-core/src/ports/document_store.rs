//! DocumentStore port - 追記専用のドキュメントストア
//!
//! `collection(name).newDocument().create(record)` に相当する 1 操作だけを要求します。

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("document rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 新しいドキュメントを作成し、その id を返す
    async fn create(&self, collection: &str, document: Value) -> Result<String, StoreError>;
}
