//! ErrorSink port - 終端失敗の永続化先
//!
//! 失敗しても呼び出し側はログに残すだけで、エスカレーションしません。

use crate::domain::record::ErrorRecord;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("could not encode error record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] crate::ports::StoreError),
}

#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn record(&self, record: &ErrorRecord) -> Result<(), SinkError>;
}
