//! Domain identifiers (strongly-typed IDs).
//!
//! バックエンドが払い出す ID（task_id, board_id, ...）はすべて文字列ですが、
//! Phantom type パターンで型を分けて混同を防ぎます。
//!
//! ## Phantom Type パターン
//! `Id<T>` というジェネリック型で共通実装を提供しつつ、
//! `T` は実行時には使わない（PhantomData）マーカー型として、
//! コンパイル時の型安全性を提供します。
//!
//! `RunId` だけはクライアント側で生成する ULID です。task_id が
//! まだ存在しない submit 前からイベントを相関させるために使います。

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うラベル（"task", "board", ...）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn label() -> &'static str;
}

/// ジェネリック ID 型
///
/// # 例
/// ```ignore
/// let board: BoardId = Id::new("b-1");
/// let task: TaskId = Id::new("t-1");
/// // board と task は異なる型なので、混同できない
/// ```
pub struct Id<T: IdMarker> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }
}

// derive だと T にも Clone/Eq を要求してしまうので手書きする
impl<T: IdMarker> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T: IdMarker> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: IdMarker> Eq for Id<T> {}

impl<T: IdMarker> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: IdMarker> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdMarker> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T: IdMarker> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", T::label(), self.value)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<String> for Id<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Serialized as the bare string, so wire payloads stay `{"task_id": "..."}`.
impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

// ========================================
// マーカー型の定義
// ========================================

macro_rules! id_marker {
    ($(#[$doc:meta])* $marker:ident => $alias:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $marker {}

        impl IdMarker for $marker {
            fn label() -> &'static str {
                $label
            }
        }

        $(#[$doc])*
        pub type $alias = Id<$marker>;
    };
}

id_marker!(
    /// Identifier assigned by the backend task queue.
    Task => TaskId, "task"
);
id_marker!(
    /// Identifier of a board (canvas of windows bound to a course file).
    Board => BoardId, "board"
);
id_marker!(Window => WindowId, "window");
id_marker!(Course => CourseId, "course");
id_marker!(File => FileId, "file");
id_marker!(Pdf => PdfId, "pdf");

/// Locally generated correlation id for one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(Ulid);

impl RunId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_strings() {
        let task = TaskId::new("abc-123");
        let s = serde_json::to_string(&task).unwrap();
        assert_eq!(s, "\"abc-123\"");

        let back: TaskId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn debug_shows_label() {
        let board = BoardId::new("b1");
        assert_eq!(format!("{board:?}"), "board(\"b1\")");
        assert_eq!(board.to_string(), "b1");
    }

    #[test]
    fn blank_ids_are_detected() {
        assert!(BoardId::new("").is_blank());
        assert!(BoardId::new("   ").is_blank());
        assert!(!BoardId::new("b").is_blank());
    }

    #[test]
    fn run_id_display_has_prefix() {
        let run = RunId::from_ulid(Ulid::new());
        assert!(run.to_string().starts_with("run-"));
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<TaskId>(), size_of::<String>());
    }
}
