//! Errors - エラー型と分類
//!
//! ディスパッチ中に起こりうる失敗は `EventError` の 3 種類に集約されます。
//! - **Exception**: ステータスとエラーコードを持つ型付きエラー（業務例外を含む）
//! - **RetryEvent**: プラットフォームに再配信を要求するシグナル
//! - **UnknownFailure**: 型のない失敗（詳細は循環安全にシリアライズされる）

use super::circular::{Node, remove_circular};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// エンジン自身が送出する例外のカタログ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// エンベロープの形が不正
    BadFormat,
    /// ペイロードがリクエストスキーマに違反
    BadRequest,
    /// ハンドラの戻り値がレスポンススキーマに違反
    BadResponse,
    /// ハンドラを解決できない
    InvalidHandler,
    /// 型のない失敗
    UnknownError,
    /// アウトバウンド publish の失敗
    PublishError,
}

impl ErrorKind {
    pub fn status(self) -> u16 {
        match self {
            Self::BadFormat | Self::BadRequest => 400,
            Self::BadResponse | Self::InvalidHandler | Self::UnknownError | Self::PublishError => {
                500
            }
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::BadFormat => "EVENT-0001",
            Self::BadRequest => "EVENT-0002",
            Self::BadResponse => "EVENT-0003",
            Self::InvalidHandler => "EVENT-0004",
            Self::UnknownError => "EVENT-0005",
            Self::PublishError => "EVENT-0006",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::BadFormat => "Bad format",
            Self::BadRequest => "Bad request",
            Self::BadResponse => "Bad response",
            Self::InvalidHandler => "Invalid handler",
            Self::UnknownError => "Unknown error",
            Self::PublishError => "Publish error",
        }
    }

    /// 詳細メッセージ付きの Exception を作る
    pub fn exception(self, detail: impl Into<String>) -> Exception {
        Exception::new(self.status(), self.code(), self.message()).with_error(detail)
    }
}

/// ステータス付きの型付きエラー
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("[{error_code}] {message}")]
pub struct Exception {
    pub status: u16,
    pub error_code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Exception {
    pub fn new(status: u16, error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error_code: error_code.into(),
            message: message.into(),
            error: None,
            description: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.error_code == kind.code()
    }

    pub fn to_json(&self) -> Value {
        let mut value = json!({
            "status": self.status,
            "errorCode": self.error_code,
            "message": self.message,
        });
        if let Some(map) = value.as_object_mut() {
            if let Some(error) = &self.error {
                map.insert("error".into(), json!(error));
            }
            if let Some(description) = &self.description {
                map.insert("description".into(), json!(description));
            }
        }
        value
    }
}

/// 再配信要求シグナル
///
/// ハンドラがこれを返すと、イベントが十分新しければプラットフォームに再配信を求めます。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("retry requested: {reason}")]
pub struct RetryEvent {
    pub reason: String,
}

impl RetryEvent {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// 型のない失敗
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct UnknownFailure {
    pub message: String,
    pub detail: Option<Node>,
}

impl UnknownFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    /// 任意のエラーから作る（source チェーンを詳細に積む）
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let detail = Node::map();
        detail.insert("message", Node::value(json!(err.to_string())));
        let chain = Node::list();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(Node::value(json!(cause.to_string())));
            source = cause.source();
        }
        detail.insert("causes", chain);
        Self {
            message: err.to_string(),
            detail: Some(detail),
        }
    }

    pub fn with_detail(mut self, detail: Node) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// ディスパッチの失敗
#[derive(Debug, Clone, thiserror::Error)]
pub enum EventError {
    #[error(transparent)]
    Exception(#[from] Exception),
    #[error(transparent)]
    Retry(#[from] RetryEvent),
    #[error(transparent)]
    Unknown(#[from] UnknownFailure),
}

impl EventError {
    /// 任意のエラーを型のない失敗として包む
    pub fn other<E: std::error::Error + 'static>(err: E) -> Self {
        Self::Unknown(UnknownFailure::from_error(&err))
    }

    pub fn is_retry_signal(&self) -> bool {
        matches!(self, Self::Retry(_))
    }

    pub fn as_exception(&self) -> Option<&Exception> {
        match self {
            Self::Exception(exception) => Some(exception),
            _ => None,
        }
    }

    /// 循環安全な JSON 表現
    pub fn to_json(&self) -> Value {
        match self {
            Self::Exception(exception) => exception.to_json(),
            Self::Retry(retry) => json!({ "name": "RetryEvent", "message": retry.reason }),
            Self::Unknown(failure) => match &failure.detail {
                Some(detail) => json!({
                    "message": failure.message,
                    "detail": remove_circular(detail),
                }),
                None => json!({ "message": failure.message }),
            },
        }
    }
}
