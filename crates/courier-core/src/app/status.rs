//! Status - ディスパッチ結果の集計
//!
//! ```ignore
//! let counts = app.stats();
//! println!("{counts:?}");
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// 1 ディスパッチの最終的な扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Succeeded,
    /// 再配信を要求した
    Retried,
    /// Error Sink に記録して ack した
    Persisted,
    /// RPC 呼び出し側にエラーを返した
    Surfaced,
    /// throw_error オプションで再送出した
    Rethrown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchCounts {
    pub succeeded: usize,
    pub retried: usize,
    pub persisted: usize,
    pub surfaced: usize,
    pub rethrown: usize,
    pub sink_failures: usize,
}

#[derive(Debug, Default)]
pub struct DispatchStats {
    succeeded: AtomicUsize,
    retried: AtomicUsize,
    persisted: AtomicUsize,
    surfaced: AtomicUsize,
    rethrown: AtomicUsize,
    sink_failures: AtomicUsize,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, disposition: Disposition) {
        let counter = match disposition {
            Disposition::Succeeded => &self.succeeded,
            Disposition::Retried => &self.retried,
            Disposition::Persisted => &self.persisted,
            Disposition::Surfaced => &self.surfaced,
            Disposition::Rethrown => &self.rethrown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchCounts {
        DispatchCounts {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            surfaced: self.surfaced.load(Ordering::Relaxed),
            rethrown: self.rethrown.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
        }
    }
}
