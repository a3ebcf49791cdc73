//! RecordingPublisher - 送信内容を記録するだけの Publisher
//!
//! CLI のデモとテストで使います。`fail(true)` で送信失敗を注入できます。

use crate::ports::{BoxError, Outbound, Publisher};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, thiserror::Error)]
#[error("publisher rejected message to '{0}'")]
pub struct PublishRejected(pub String);

#[derive(Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<Outbound>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// 記録を取り出して空にする
    pub fn drain(&self) -> Vec<Outbound> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, message: Outbound) -> Result<(), BoxError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Box::new(PublishRejected(message.destination)));
        }
        tracing::debug!(kind = %message.kind, destination = %message.destination, "message published");
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).push(message);
        Ok(())
    }
}
