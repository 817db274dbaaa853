//! 把净化后的值树编码为带缩进的 XML 文档。
//!
//! 元素构建规则：
//! - 映射 → 名为 `key` 的元素，逐个子键递归；
//! - 序列 → 每一项直接以 `key` 为名挂到父元素下，成为重复的兄弟元素；
//!   若某一项本身也是序列，则包一层 `value` 元素再递归；
//! - 标量 → 名为 `key`、只含一个文本节点的元素。
//!
//! 顶层为序列时，在根元素下以 `value` 为键展开。

use serde_json::Value;

pub const DEFAULT_ROOT: &str = "data";
pub const DEFAULT_INDENT: &str = "  ";

const XML_DECLARATION: &str = r#"<?xml version="1.0" ?>"#;

enum Node {
    Element { name: String, children: Vec<Node> },
    Text(String),
}

pub fn to_xml(value: &Value, root: &str, indent: &str) -> String {
    let mut document = Vec::new();
    if value.is_array() {
        let mut children = Vec::new();
        add(&mut children, "value", value);
        document.push(Node::Element {
            name: root.to_string(),
            children,
        });
    } else {
        add(&mut document, root, value);
    }

    let mut out = String::new();
    out.push_str(XML_DECLARATION);
    out.push('\n');
    for node in &document {
        write_node(&mut out, node, "", indent);
    }
    out
}

fn add(parent: &mut Vec<Node>, key: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut children = Vec::new();
            for (child_key, child_value) in map {
                add(&mut children, child_key, child_value);
            }
            parent.push(Node::Element {
                name: key.to_string(),
                children,
            });
        }
        Value::Array(items) => {
            for item in items {
                if item.is_array() {
                    let mut children = Vec::new();
                    add(&mut children, "value", item);
                    parent.push(Node::Element {
                        name: "value".to_string(),
                        children,
                    });
                } else {
                    add(parent, key, item);
                }
            }
        }
        Value::Null => parent.push(Node::Element {
            name: key.to_string(),
            children: Vec::new(),
        }),
        scalar => parent.push(Node::Element {
            name: key.to_string(),
            children: vec![Node::Text(scalar_text(scalar))],
        }),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn write_node(out: &mut String, node: &Node, current: &str, indent: &str) {
    match node {
        Node::Text(text) => {
            out.push_str(current);
            out.push_str(&escape(text));
            out.push('\n');
        }
        Node::Element { name, children } => {
            out.push_str(current);
            out.push('<');
            out.push_str(name);
            if children.is_empty() {
                out.push_str("/>\n");
                return;
            }
            out.push_str(">\n");
            let deeper = format!("{}{}", current, indent);
            for child in children {
                write_node(out, child, &deeper, indent);
            }
            out.push_str(current);
            out.push_str("</");
            out.push_str(name);
            out.push_str(">\n");
        }
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
