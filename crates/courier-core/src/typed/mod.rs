//! Typed - スキーマ・ハンドラ・ルート登録
//!
//! # 二層構造
//! - **表層（Typed）**: `Callable` / `Consumer` / `TypedSchema<T>` - serde の型で扱う
//! - **内部（Dyn）**: `CallableHandler` / `EventHandler` / `Schema` - object-safe, type erasure
//!
//! `Route` はルートごとにスキーマとハンドラをメモ化します。

pub mod handler;
pub mod registry;
pub mod schema;

pub use self::handler::{
    Callable, CallableHandler, CallableRequest, Consumer, CustomEvent, CustomTrigger, EventHandler,
    EventPayload, TypedCallable, TypedConsumer, callable_fn, event_fn, trigger_fn,
};
pub use self::registry::{Invoker, RegistryError, Route, RouteTable, SchemaProvider};
pub use self::schema::{AnySchema, FnSchema, Schema, SchemaIssue, SchemaRef, SchemaViolation, TypedSchema, schema};
