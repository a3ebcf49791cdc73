//! Naming Strategy - ルートごとのトランスポート安全な一意キー
//!
//! # 規則
//! - `[A-Za-z0-9-]` 以外は区切りとみなし、小文字化して `_` で連結（連続・前後の `_` は除く）
//! - 30 文字を超える場合は警告を出して 30 文字に切り詰める
//! - 最後の文字が英数字でなければ `"1"` を付ける
//! - 名前がないルートは種類ごとのカウンタから合成する（`pubsub0`, `pubsub1`, ...）

use std::sync::atomic::{AtomicUsize, Ordering};

pub const MAX_NAME_LEN: usize = 30;

pub trait NamingStrategy: Send + Sync {
    fn callable(&self, name: &str) -> String;
    fn pubsub(&self, topic: &str) -> String;
    fn bus(&self, event_type: &str) -> String;
    fn custom(&self, name: &str) -> String;
}

/// 既定の命名規則
///
/// callable は名前から、それ以外は登録順のカウンタからキーを作ります。
/// 同じ順序で登録すれば、プロセスをまたいでも同じキーになります。
#[derive(Debug, Default)]
pub struct DefaultNamingStrategy {
    pubsub: AtomicUsize,
    bus: AtomicUsize,
    custom: AtomicUsize,
}

impl DefaultNamingStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NamingStrategy for DefaultNamingStrategy {
    fn callable(&self, name: &str) -> String {
        key_from_name(name)
    }

    fn pubsub(&self, _topic: &str) -> String {
        format!("pubsub{}", self.pubsub.fetch_add(1, Ordering::Relaxed))
    }

    fn bus(&self, _event_type: &str) -> String {
        format!("eventarc{}", self.bus.fetch_add(1, Ordering::Relaxed))
    }

    fn custom(&self, _name: &str) -> String {
        format!("custom{}", self.custom.fetch_add(1, Ordering::Relaxed))
    }
}

/// 任意の名前をキーにする（sanitize + fit）
pub fn key_from_name(name: &str) -> String {
    fit(&sanitize(name))
}

pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

pub fn fit(name: &str) -> String {
    let len = name.chars().count();
    let mut fitted: String = if len > MAX_NAME_LEN {
        tracing::warn!(
            name,
            len,
            max = MAX_NAME_LEN,
            "event name is too long, it will be cut"
        );
        name.chars().take(MAX_NAME_LEN).collect()
    } else {
        name.to_string()
    };
    if !fitted.chars().last().is_some_and(|c| c.is_ascii_alphanumeric()) {
        fitted.push('1');
    }
    fitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Say Hello", "say_hello")]
    #[case("  users.create!! ", "users_create")]
    #[case("already-kebab", "already-kebab")]
    #[case("a__b", "a_b")]
    #[case("ÜberEvent", "berevent")]
    fn sanitizes(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize(raw), expected);
    }

    #[test]
    fn long_names_are_cut_to_thirty() {
        let key = key_from_name("this is a very long callable function name");
        assert_eq!(key.len(), MAX_NAME_LEN);
        assert_eq!(key, "this_is_a_very_long_callable_f");
    }

    #[test]
    fn cut_ending_in_separator_gets_suffix() {
        // 30 文字目が '_' になる
        let key = key_from_name("abcdefghijklmnopqrstuvwxyz123 tail");
        assert_eq!(key, "abcdefghijklmnopqrstuvwxyz123_1");
        assert_eq!(key.len(), MAX_NAME_LEN + 1);
        let key = fit(&sanitize("abcdefghijklmnopqrstuvwxyz1234 tail"));
        assert_eq!(key, "abcdefghijklmnopqrstuvwxyz1234");
    }

    #[rstest]
    #[case("user-", "user-1")]
    #[case("", "1")]
    #[case("ok", "ok")]
    fn non_alphanumeric_ending_gets_one(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(fit(name), expected);
    }

    #[test]
    fn counters_are_per_kind() {
        let naming = DefaultNamingStrategy::new();
        assert_eq!(naming.pubsub("a"), "pubsub0");
        assert_eq!(naming.pubsub("b"), "pubsub1");
        assert_eq!(naming.bus("x"), "eventarc0");
        assert_eq!(naming.bus("y"), "eventarc1");
        assert_eq!(naming.custom("nightly"), "custom0");
    }
}
