//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: ルート登録とワイヤリング
//! - **Runtime**: ディスパッチャ共通の依存と失敗の決着
//! - **Dispatchers**: Callable / PubSub / Bus / Custom（プラットフォームに公開される唯一の部品）
//! - **Context / IdPropagator**: 呼び出し単位の実行コンテキスト
//! - **Middleware**: 種類ごとにイベントを書き換えるフック（既定は恒等）
//! - **Publishers**: ID を引き継ぐアウトバウンド publish

pub mod builder;
pub mod bus;
pub mod callable;
pub mod context;
pub mod custom;
pub mod middleware;
pub mod naming;
pub mod propagator;
pub mod publish;
pub mod pubsub;
pub mod routes;
pub mod runtime;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::bus::BusDispatcher;
pub use self::callable::{CallableDispatcher, CallableRoute, CallableSchema, ScopeFn};
pub use self::context::{ContextError, ExecutionContext, current, inject, run_in_context, try_current};
pub use self::custom::CustomDispatcher;
pub use self::middleware::{
    BusMiddleware, CallableMiddleware, Identity, Middleware, PubSubMiddleware, identity, middleware_fn,
};
pub use self::naming::{DefaultNamingStrategy, MAX_NAME_LEN, NamingStrategy};
pub use self::propagator::{
    CORRELATION_ID_KEY, ExecutionIds, IdPropagator, ORIGIN_EXECUTION_ID_KEY, TRACE_ID_KEY, merge_into_map,
};
pub use self::publish::{BusEvent, EventPublisher, MessagePublisher};
pub use self::pubsub::{EventRoute, PubSubDispatcher};
pub use self::routes::{CallableDef, CustomDef, EventDef};
pub use self::runtime::{FailureScope, Nack, Runtime, Verdict};
pub use self::status::{DispatchCounts, DispatchStats, Disposition};
