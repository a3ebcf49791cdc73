//! courier-core
//!
//! Event ingestion and dispatch engine: Callable RPC, PubSub, Bus and Custom events
//! share one decode → contextualize → invoke → classify pipeline.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, envelope, event, errors, decision, status, record, circular）
//! - **ports**: 抽象化レイヤー（Container, DocumentStore, ErrorSink, Publisher, Transport, Clock, IdGenerator）
//! - **typed**: スキーマ・ハンドラ・ルートのメモ化
//! - **app**: アプリケーションロジック（builder, runtime, dispatchers, context, publishers）
//! - **impls**: 実装（InMemoryDocumentStore, MapContainer, LocalTransport など開発用）
//! - **config**: 環境変数 / JSON からの設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod typed;
