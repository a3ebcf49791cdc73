//! Schema - ペイロード検証器の抽象化
//!
//! コアは検証言語を持ちません。スキーマは「値を受け取り、検証済みの値か
//! 違反の一覧を返す」不透明な非同期関数です。
//!
//! # 実装
//! - **AnySchema**: 何でも通す
//! - **TypedSchema<T>**: serde で `T` に変換できるかを検証（正規化された値を返す）
//! - **FnSchema**: クロージャで検証

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    pub path: String,
    pub message: String,
}

impl SchemaIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", self.summary())]
pub struct SchemaViolation {
    pub issues: Vec<SchemaIssue>,
}

impl SchemaViolation {
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![SchemaIssue::new(path, message)],
        }
    }

    pub fn summary(&self) -> String {
        self.issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[async_trait]
pub trait Schema: Send + Sync {
    async fn validate(&self, value: Value) -> Result<Value, SchemaViolation>;
}

pub type SchemaRef = Arc<dyn Schema>;

#[derive(Debug, Clone, Copy, Default)]
pub struct AnySchema;

#[async_trait]
impl Schema for AnySchema {
    async fn validate(&self, value: Value) -> Result<Value, SchemaViolation> {
        Ok(value)
    }
}

/// serde の型で検証するスキーマ
pub struct TypedSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Schema for TypedSchema<T>
where
    T: DeserializeOwned + Serialize + Send + 'static,
{
    async fn validate(&self, value: Value) -> Result<Value, SchemaViolation> {
        let typed: T =
            serde_json::from_value(value).map_err(|e| SchemaViolation::single("", e.to_string()))?;
        serde_json::to_value(&typed).map_err(|e| SchemaViolation::single("", e.to_string()))
    }
}

/// クロージャで検証するスキーマ
pub struct FnSchema<F> {
    check: F,
}

impl<F> FnSchema<F>
where
    F: Fn(&Value) -> Result<(), Vec<SchemaIssue>> + Send + Sync,
{
    pub fn new(check: F) -> Self {
        Self { check }
    }
}

#[async_trait]
impl<F> Schema for FnSchema<F>
where
    F: Fn(&Value) -> Result<(), Vec<SchemaIssue>> + Send + Sync,
{
    async fn validate(&self, value: Value) -> Result<Value, SchemaViolation> {
        match (self.check)(&value) {
            Ok(()) => Ok(value),
            Err(issues) => Err(SchemaViolation { issues }),
        }
    }
}

/// `Arc` に包んだスキーマを作る
pub fn schema<S: Schema + 'static>(schema: S) -> SchemaRef {
    Arc::new(schema)
}
