//! Publisher port - アウトバウンド publish（トピック / イベントバス）

use crate::domain::event::EventKind;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 送出する 1 メッセージ
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub kind: EventKind,
    /// トピック名またはイベント type
    pub destination: String,
    pub payload: Value,
    pub attributes: BTreeMap<String, String>,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: Outbound) -> Result<(), BoxError>;
}
