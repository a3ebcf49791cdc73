//! InMemoryDocumentStore - 開発用・テスト用のドキュメントストア
//!
//! # 学習ポイント
//! - Mutex による排他制御（await をまたいでロックを持たない）
//! - 書き込み失敗の注入（記録失敗時の振る舞いをテストする）

use crate::ports::{DocumentStore, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use ulid::Ulid;

/// コレクションごとに `(id, document)` を登録順に保持します。
///
/// # 使用例
/// ```ignore
/// let store = InMemoryDocumentStore::new();
/// let id = store.create("event-errors", json!({ "x": 1 })).await?;
/// assert_eq!(store.documents("event-errors").len(), 1);
/// ```
#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: Mutex<HashMap<String, Vec<(String, Value)>>>,
    fail_writes: AtomicBool,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以降の書き込みを失敗させる
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn documents(&self, collection: &str) -> Vec<Value> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .map(|docs| docs.iter().map(|(_, doc)| doc.clone()).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Value> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)?
            .iter()
            .find(|(doc_id, _)| doc_id == id)
            .map(|(_, doc)| doc.clone())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create(&self, collection: &str, document: Value) -> Result<String, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("writes to '{collection}' are disabled")));
        }
        let id = Ulid::new().to_string();
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(collection.to_string())
            .or_default()
            .push((id.clone(), document));
        Ok(id)
    }
}
