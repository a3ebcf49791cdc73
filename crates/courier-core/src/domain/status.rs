//! Status mapping - 内部ステータス（HTTP 風）→ RPC トランスポートコード
//!
//! テーブルは既存の呼び出し側との後方互換契約なので、値を変えないこと。
//! 429 だけは既定で `resource-exhausted` に修正しています。
//! 旧来どおり `permission-denied` が必要な場合は `StatusMapping::legacy()` を使います。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// RPC トランスポートのエラーコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FunctionsErrorCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl FunctionsErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
            Self::InvalidArgument => "invalid-argument",
            Self::DeadlineExceeded => "deadline-exceeded",
            Self::NotFound => "not-found",
            Self::AlreadyExists => "already-exists",
            Self::PermissionDenied => "permission-denied",
            Self::ResourceExhausted => "resource-exhausted",
            Self::FailedPrecondition => "failed-precondition",
            Self::Aborted => "aborted",
            Self::OutOfRange => "out-of-range",
            Self::Unimplemented => "unimplemented",
            Self::Internal => "internal",
            Self::Unavailable => "unavailable",
            Self::DataLoss => "data-loss",
            Self::Unauthenticated => "unauthenticated",
        }
    }

    /// gRPC 風の大文字名（例: `INVALID_ARGUMENT`）
    pub fn canonical_name(self) -> String {
        self.as_str().replace('-', "_").to_uppercase()
    }
}

impl fmt::Display for FunctionsErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusMapping {
    /// true なら 429 を `permission-denied` に写す（旧来の値）
    pub legacy_rate_limit: bool,
}

impl StatusMapping {
    pub fn legacy() -> Self {
        Self {
            legacy_rate_limit: true,
        }
    }

    /// 全域関数。表にないコードは `unknown`。
    pub fn map_status(&self, status: u16) -> FunctionsErrorCode {
        use FunctionsErrorCode::*;
        match status {
            100..=103 | 200..=205 => Ok,
            206 => DataLoss,
            301 | 303 | 304 | 307 | 308 => Ok,
            400 | 406 | 411 | 413 | 414 | 415 | 416 => InvalidArgument,
            401 => Unauthenticated,
            402 | 421 => OutOfRange,
            403 | 407 => PermissionDenied,
            404 => NotFound,
            405 | 410 | 418 => Unavailable,
            408 => DeadlineExceeded,
            409 | 412 | 417 | 422 | 424 | 428 => FailedPrecondition,
            429 if self.legacy_rate_limit => PermissionDenied,
            429 => ResourceExhausted,
            500 | 502 | 503 | 504 => Internal,
            501 => OutOfRange,
            505 => FailedPrecondition,
            _ => Unknown,
        }
    }
}

/// 呼び出し側に返すトランスポートエラー
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct HttpsError {
    pub code: FunctionsErrorCode,
    pub message: String,
    /// 内部エラーの完全なシリアライズ
    pub details: Value,
}
