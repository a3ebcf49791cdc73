//! IdGenerator port - ID 生成の抽象化
//!
//! エンベロープに ID がないとき、ディスパッチの入口で生成します。
//!
//! # 実装
//! - **UlidGenerator**: 相関 ID は ULID、トレース ID は 32 桁の小文字 hex

use crate::domain::ids::{CorrelationId, TraceId};
use crate::ports::Clock;
use ulid::Ulid;

/// # Thread Safety
/// - `Send + Sync` を要求（並行ディスパッチから共有される）
pub trait IdGenerator: Send + Sync {
    fn generate_correlation_id(&self) -> CorrelationId;

    fn generate_trace_id(&self) -> TraceId;
}

/// Clock を使って時刻ベースの ULID を生成します。
/// テストでは FixedClock を渡すと timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_correlation_id(&self) -> CorrelationId {
        CorrelationId::new(self.next_ulid().to_string())
    }

    fn generate_trace_id(&self) -> TraceId {
        TraceId::new(format!("{:032x}", self.next_ulid().0))
    }
}
