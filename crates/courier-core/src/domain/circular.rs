//! Circular-safe serialization - 循環参照を含むエラー詳細の JSON 化
//!
//! 失敗の詳細はハンドラが自由に組み立てる共有グラフ（`Node`）で表現できます。
//! `Node` は `Arc` で共有されるため自己参照を作れますが、
//! `remove_circular` は現在の経路上の祖先を覚えておき、
//! 循環位置に `"[Circular]"` を置いて必ず停止します。
//!
//! # 設計原則
//! - 経路上の祖先のみを循環とみなす（菱形の共有参照はそのまま展開する）
//! - ロックは子の一覧を複製する間だけ保持する（自己参照でもデッドロックしない）
//! - 祖先への辺は `back_ref()`（`Weak`）で張る。`clone()` で張った循環は解放されない

use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// 循環位置に置かれるマーカー
pub const CIRCULAR_MARKER: &str = "[Circular]";

#[derive(Clone)]
enum Shape {
    Value(Value),
    List(Vec<Node>),
    Map(Vec<(String, Node)>),
    /// 祖先への弱い参照
    Back(Weak<Mutex<Shape>>),
}

/// 共有可能なオブジェクトグラフのノード
#[derive(Clone)]
pub struct Node(Arc<Mutex<Shape>>);

impl Node {
    /// 葉ノード
    pub fn value(value: Value) -> Self {
        Self::from_shape(Shape::Value(value))
    }

    /// 空のリストノード
    pub fn list() -> Self {
        Self::from_shape(Shape::List(Vec::new()))
    }

    /// 空のマップノード
    pub fn map() -> Self {
        Self::from_shape(Shape::Map(Vec::new()))
    }

    /// JSON を木構造のノードに変換（JSON 自体は循環しない）
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Array(items) => {
                Self::from_shape(Shape::List(items.into_iter().map(Self::from_json).collect()))
            }
            Value::Object(entries) => Self::from_shape(Shape::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            )),
            other => Self::value(other),
        }
    }

    /// このノードを指す弱い参照。祖先への辺に使う
    ///
    /// 参照先が解放されていれば `null` として書き出されます。
    pub fn back_ref(&self) -> Self {
        Self::from_shape(Shape::Back(Arc::downgrade(&self.0)))
    }

    /// リストに子を追加する。リスト以外なら false。
    ///
    /// 祖先の `clone()` を渡すと `Arc` の循環になり、グラフ全体が解放されなくなる。
    /// 祖先は `back_ref()` で渡すこと。
    pub fn push(&self, child: Node) -> bool {
        match &mut *self.lock() {
            Shape::List(items) => {
                items.push(child);
                true
            }
            _ => false,
        }
    }

    /// マップに子を追加する（同じキーは置き換え）。マップ以外なら false。
    ///
    /// `push` と同じく、祖先は `back_ref()` で渡すこと。
    pub fn insert(&self, key: impl Into<String>, child: Node) -> bool {
        let key = key.into();
        match &mut *self.lock() {
            Shape::Map(entries) => {
                match entries.iter_mut().find(|(k, _)| *k == key) {
                    Some(slot) => slot.1 = child,
                    None => entries.push((key, child)),
                }
                true
            }
            _ => false,
        }
    }

    fn from_shape(shape: Shape) -> Self {
        Self(Arc::new(Mutex::new(shape)))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shape> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Shape {
        self.lock().clone()
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

// 循環をたどらないよう、中身は表示しない
impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({:#x})", self.addr())
    }
}

/// ノードグラフを JSON に変換し、循環位置を `"[Circular]"` に置き換える
pub fn remove_circular(root: &Node) -> Value {
    let mut ancestors = Vec::new();
    walk(root, &mut ancestors)
}

fn walk(node: &Node, ancestors: &mut Vec<usize>) -> Value {
    let addr = node.addr();
    if ancestors.contains(&addr) {
        return Value::String(CIRCULAR_MARKER.to_string());
    }
    match node.snapshot() {
        Shape::Back(target) => match target.upgrade() {
            Some(target) => walk(&Node(target), ancestors),
            None => Value::Null,
        },
        Shape::Value(value) => value,
        Shape::List(items) => {
            ancestors.push(addr);
            let out = items.iter().map(|child| walk(child, ancestors)).collect();
            ancestors.pop();
            Value::Array(out)
        }
        Shape::Map(entries) => {
            ancestors.push(addr);
            let mut out = Map::new();
            for (key, child) in &entries {
                out.insert(key.clone(), walk(child, ancestors));
            }
            ancestors.pop();
            Value::Object(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn self_reference_is_replaced_with_marker() {
        let root = Node::map();
        root.insert("name", Node::value(json!("loop")));
        root.insert("self", root.back_ref());

        assert_eq!(
            remove_circular(&root),
            json!({ "name": "loop", "self": "[Circular]" })
        );
    }

    #[test]
    fn back_references_do_not_keep_the_graph_alive() {
        let root = Node::map();
        root.insert("self", root.back_ref());
        let weak = Arc::downgrade(&root.0);

        drop(root);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn dangling_back_reference_is_null() {
        let parent = Node::map();
        let child = Node::map();
        child.insert("parent", parent.back_ref());
        drop(parent);

        assert_eq!(remove_circular(&child), json!({ "parent": null }));
    }

    #[test]
    fn strong_cycle_still_terminates() {
        let root = Node::list();
        root.push(root.clone());
        assert_eq!(remove_circular(&root), json!(["[Circular]"]));
    }

    #[test]
    fn indirect_cycle_through_list() {
        let parent = Node::map();
        let children = Node::list();
        let child = Node::map();
        child.insert("parent", parent.back_ref());
        children.push(child);
        parent.insert("children", children);

        assert_eq!(
            remove_circular(&parent),
            json!({ "children": [{ "parent": "[Circular]" }] })
        );
    }

    #[test]
    fn shared_reference_without_cycle_is_expanded() {
        let shared = Node::from_json(json!({ "code": 7 }));
        let root = Node::list();
        root.push(shared.clone());
        root.push(shared);

        assert_eq!(remove_circular(&root), json!([{ "code": 7 }, { "code": 7 }]));
    }

    #[test]
    fn push_on_non_list_is_rejected() {
        let leaf = Node::value(json!(1));
        assert!(!leaf.push(Node::value(json!(2))));
        assert!(!leaf.insert("k", Node::value(json!(2))));
        assert_eq!(remove_circular(&leaf), json!(1));
    }
}
