//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」です。コアが外部に求める能力だけを
//! 狭い trait として定義し、ベンダー SDK やフレームワークの詳細を隠蔽します。
//!
//! # 設計原則
//! - コンテナは `resolve(key) -> instance` のみ
//! - ストアは「ドキュメントを 1 件追加する」のみ
//! - 時刻と ID 生成は差し替え可能（テスト容易性）

pub mod clock;
pub mod container;
pub mod document_store;
pub mod error_sink;
pub mod id_generator;
pub mod publisher;
pub mod transport;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::container::{Container, Instance, ResolveError, resolve};
pub use self::document_store::{DocumentStore, StoreError};
pub use self::error_sink::{ErrorSink, SinkError};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::publisher::{BoxError, Outbound, Publisher};
pub use self::transport::{Endpoint, Registration, RouteOptions, Transport};
