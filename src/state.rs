//! # 响应状态
//!
//! 每个请求独享一个 `ResponseState`：字段名到响应值树的映射，由页面函数与分发器
//! 在请求处理过程中不断写入，最终交给模板或结构化编码器。
//!
//! 状态以节点池（arena）的形式保存，节点通过 [`NodeId`] 寻址。
//! 访问一个尚不存在的嵌套路径时会自动创建空映射（auto-vivification），
//! 这些自动创建的映射只有在之后被写入时才会出现在最终输出中。

use std::collections::BTreeMap;

use log::debug;

use crate::value::{Fields, Value};

/// 节点池中的下标。只在产生它的 `ResponseState` 内有效，
/// 因此按下标操作节点的方法不对外公开。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum Node {
    Map {
        children: BTreeMap<String, NodeId>,
        /// 由路径访问自动创建，而非显式写入
        vivified: bool,
    },
    Leaf(Value),
}

#[derive(Debug, Clone)]
pub struct ResponseState {
    nodes: Vec<Node>,
}

impl ResponseState {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::Map {
                children: BTreeMap::new(),
                vivified: false,
            }],
        }
    }

    pub(crate) fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// 取得 `parent` 下名为 `key` 的子映射，不存在时创建一个空映射。
    ///
    /// 若该键当前保存的是标量或序列，它会被一个新的空映射替换。
    pub(crate) fn child(&mut self, parent: NodeId, key: &str) -> NodeId {
        if let Some(id) = self.children_of(parent).and_then(|c| c.get(key).copied()) {
            if matches!(self.nodes[id.0], Node::Map { .. }) {
                return id;
            }
            debug!("键{}上的非映射值被替换为空映射", key);
        }
        let id = self.alloc(Node::Map {
            children: BTreeMap::new(),
            vivified: true,
        });
        self.link(parent, key, id);
        id
    }

    /// 沿点分路径（如 `messages.hello`）逐级取得或创建子映射。
    pub fn get_or_create(&mut self, path: &str) -> NodeId {
        let mut node = self.root();
        for segment in segments(path) {
            node = self.child(node, segment);
        }
        node
    }

    /// 在 `parent` 下写入一个值，覆盖同名键。
    pub(crate) fn put(&mut self, parent: NodeId, key: &str, value: impl Into<Value>) {
        let id = self.attach(value.into());
        self.link(parent, key, id);
    }

    /// 按点分路径写入，途经的中间映射会被自动创建。
    pub fn insert(&mut self, path: &str, value: impl Into<Value>) {
        let (parent_path, key) = match path.rsplit_once('.') {
            Some((parent, key)) => (Some(parent), key),
            None => (None, path),
        };
        let parent = match parent_path {
            Some(p) => self.get_or_create(p),
            None => self.root(),
        };
        self.put(parent, key, value);
    }

    /// 合并字段：逐个顶层键浅覆盖。
    pub fn update(&mut self, fields: Fields) {
        let root = self.root();
        for (key, value) in fields {
            self.put(root, &key, value);
        }
    }

    /// 读取点分路径上的值。路径不存在时返回 `Value::Null`，从不失败。
    ///
    /// 数字段可以用来索引序列，例如 `items.0.name`。
    pub fn get(&self, path: &str) -> Value {
        self.lookup(path).unwrap_or(Value::Null)
    }

    /// 路径上是否存在会被输出的值。
    pub fn contains(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = match &mut self.nodes[0] {
            Node::Map { children, .. } => children.remove(key),
            Node::Leaf(_) => None,
        };
        removed.and_then(|id| self.materialize(id))
    }

    /// 记录一条表单校验错误，写入 `errors.<key>`。
    pub fn form_error(&mut self, key: &str, message: impl Into<Value>) {
        let root = self.root();
        let errors = self.child(root, "errors");
        self.put(errors, key, message);
    }

    pub fn has_errors(&self) -> bool {
        self.contains("errors")
    }

    /// 把整个状态物化为一棵值树，作为净化器的输入。
    pub fn to_value(&self) -> Value {
        self.materialize(self.root())
            .unwrap_or_else(|| Value::Map(BTreeMap::new()))
    }

    fn lookup(&self, path: &str) -> Option<Value> {
        let mut node = self.root();
        let mut segs = segments(path);
        while let Some(segment) = segs.next() {
            match &self.nodes[node.0] {
                Node::Map { children, .. } => node = *children.get(segment)?,
                Node::Leaf(value) => {
                    let mut current = value.child(segment)?;
                    for rest in segs {
                        current = current.child(rest)?;
                    }
                    return Some(current.clone());
                }
            }
        }
        self.materialize(node)
    }

    /// 自动创建且始终为空的映射不会被物化。
    fn materialize(&self, id: NodeId) -> Option<Value> {
        match &self.nodes[id.0] {
            Node::Leaf(value) => Some(value.clone()),
            Node::Map { children, vivified } => {
                let map: BTreeMap<String, Value> = children
                    .iter()
                    .filter_map(|(k, child)| self.materialize(*child).map(|v| (k.clone(), v)))
                    .collect();
                if *vivified && map.is_empty() {
                    None
                } else {
                    Some(Value::Map(map))
                }
            }
        }
    }

    fn children_of(&self, id: NodeId) -> Option<&BTreeMap<String, NodeId>> {
        match &self.nodes[id.0] {
            Node::Map { children, .. } => Some(children),
            Node::Leaf(_) => None,
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// 显式写入的映射会展开成池中的节点，之后的路径访问可以继续深入。
    fn attach(&mut self, value: Value) -> NodeId {
        match value {
            Value::Map(map) => {
                let children = map
                    .into_iter()
                    .map(|(k, v)| (k, self.attach(v)))
                    .collect();
                self.alloc(Node::Map {
                    children,
                    vivified: false,
                })
            }
            other => self.alloc(Node::Leaf(other)),
        }
    }

    fn link(&mut self, parent: NodeId, key: &str, child: NodeId) {
        match &mut self.nodes[parent.0] {
            Node::Map { children, .. } => {
                children.insert(key.to_string(), child);
            }
            Node::Leaf(_) => debug!("尝试在非映射节点下写入键{}，已忽略", key),
        }
    }
}

impl Default for ResponseState {
    fn default() -> Self {
        Self::new()
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::fields;
    use serde_json::json;

    #[test]
    fn test_absent_field_reads_null() {
        let state = ResponseState::new();
        assert_eq!(state.get("missing"), Value::Null);
        assert_eq!(state.get("deeply.missing.path"), Value::Null);
        assert!(!state.contains("missing"));
    }

    #[test]
    fn test_insert_creates_intermediate_maps() {
        let mut state = ResponseState::new();
        state.insert("messages.hello", "hello world");
        assert_eq!(state.get("messages.hello"), Value::from("hello world"));
        assert_eq!(
            state.to_value(),
            Value::from(json!({"messages": {"hello": "hello world"}}))
        );
    }

    #[test]
    fn test_vivified_map_is_dropped_unless_written() {
        let mut state = ResponseState::new();
        state.get_or_create("unused.nested");
        assert!(!state.contains("unused"));
        assert_eq!(state.to_value(), Value::from(json!({})));

        let node = state.get_or_create("used");
        state.put(node, "x", 1);
        assert!(state.contains("used"));
        assert_eq!(state.get("used.x"), Value::Int(1));
    }

    #[test]
    fn test_paths_resolve_within_each_state() {
        // 一个状态较大、另一个只有根节点时，两边的节点编号互不相干
        let mut big = ResponseState::new();
        big.insert("a.b.c.d", 1);
        let mut small = ResponseState::new();

        let deep = big.get_or_create("a.b.c");
        let fresh = small.get_or_create("x");
        assert_ne!(deep, fresh);
        small.put(fresh, "y", 2);
        big.put(deep, "e", 3);

        assert_eq!(small.get("x.y"), Value::Int(2));
        assert_eq!(big.get("a.b.c.e"), Value::Int(3));
        assert!(!small.contains("a"));
    }

    #[test]
    fn test_explicit_empty_map_is_kept() {
        let mut state = ResponseState::new();
        state.insert("empty", Value::Map(BTreeMap::new()));
        assert!(state.contains("empty"));
        assert_eq!(state.to_value(), Value::from(json!({"empty": {}})));
    }

    #[test]
    fn test_update_is_shallow_overwrite() {
        let mut state = ResponseState::new();
        state.insert("a.b", 1);
        state.insert("c", "keep");
        state.update(fields([("a", 2)]));
        assert_eq!(state.get("a"), Value::Int(2));
        assert_eq!(state.get("c"), Value::from("keep"));
    }

    #[test]
    fn test_explicit_map_can_be_extended_by_path() {
        let mut state = ResponseState::new();
        state.insert("user", Value::from(json!({"name": "ann"})));
        state.insert("user.role", "admin");
        assert_eq!(
            state.get("user"),
            Value::from(json!({"name": "ann", "role": "admin"}))
        );
    }

    #[test]
    fn test_indexed_path_reads_into_sequences() {
        let mut state = ResponseState::new();
        state.insert("items", Value::from(json!([{"name": "a"}, {"name": "b"}])));
        assert_eq!(state.get("items.1.name"), Value::from("b"));
        assert_eq!(state.get("items.7.name"), Value::Null);
    }

    #[test]
    fn test_child_replaces_scalar() {
        let mut state = ResponseState::new();
        state.insert("x", "scalar");
        state.insert("x.y", "nested");
        assert_eq!(state.get("x"), Value::from(json!({"y": "nested"})));
    }

    #[test]
    fn test_form_errors() {
        let mut state = ResponseState::new();
        assert!(!state.has_errors());
        let _ = state.get_or_create("errors");
        assert!(!state.has_errors());
        state.form_error("message", "required");
        assert!(state.has_errors());
        assert_eq!(state.get("errors.message"), Value::from("required"));
    }

    #[test]
    fn test_remove() {
        let mut state = ResponseState::new();
        state.insert("status", 404);
        assert_eq!(state.remove("status"), Some(Value::Int(404)));
        assert!(!state.contains("status"));
        assert_eq!(state.remove("status"), None);
    }
}
