//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryDocumentStore**: 追記専用のドキュメントストア
//! - **StoreErrorSink**: ErrorRecord を DocumentStore に書く ErrorSink
//! - **MapContainer**: 型名キーの DI コンテナ
//! - **RecordingPublisher**: 送信内容を記録する Publisher
//! - **LocalTransport**: プロセス内で関数を起動する Transport
//!
//! # 本番用実装
//! ベンダー SDK に依存する実装（Firestore, Pub/Sub, Eventarc など）は別クレートに置きます。

pub mod local_transport;
pub mod map_container;
pub mod memory_publisher;
pub mod memory_store;
pub mod store_sink;

pub use self::local_transport::{LocalTransport, LocalTransportError};
pub use self::map_container::MapContainer;
pub use self::memory_publisher::{PublishRejected, RecordingPublisher};
pub use self::memory_store::InMemoryDocumentStore;
pub use self::store_sink::StoreErrorSink;
