//! 值净化：把任意响应值树转换为可以安全进行结构化序列化的纯数据。
//!
//! 净化结果只包含映射、序列、字符串与 null。可自行序列化的对象
//! 由其 `sanitize` 方法全权决定形态。

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value as Json};

use crate::value::{Urlize, Value};

/// 净化一棵值树。标量被转换为其文本形式，null 保持为 null。
pub fn sanitize(value: &Value, urlize: Urlize<'_>) -> Json {
    visit(value, urlize, &stringify)
}

/// 转换为模板作用域。与 [`sanitize`] 走同一套分派，但保留标量原本的类型，
/// 因此模板里的布尔判断与数值比较依旧有效。
pub fn to_scope(value: &Value, urlize: Urlize<'_>) -> Json {
    visit(value, urlize, &typed)
}

fn visit(value: &Value, urlize: Urlize<'_>, scalar: &dyn Fn(&Value) -> Json) -> Json {
    match value {
        Value::Map(map) => visit_map(map, urlize, scalar),
        Value::Seq(items) => visit_seq(items, urlize, scalar),
        Value::Object(object) => object.sanitize(urlize),
        other => scalar(other),
    }
}

fn visit_map(map: &BTreeMap<String, Value>, urlize: Urlize<'_>, scalar: &dyn Fn(&Value) -> Json) -> Json {
    let mut out = Map::new();
    for (key, value) in map {
        out.insert(key.clone(), visit(value, urlize, scalar));
    }
    Json::Object(out)
}

fn visit_seq(items: &[Value], urlize: Urlize<'_>, scalar: &dyn Fn(&Value) -> Json) -> Json {
    Json::Array(items.iter().map(|item| visit(item, urlize, scalar)).collect())
}

fn stringify(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        other => Json::String(other.to_string()),
    }
}

fn typed(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Number((*i).into()),
        Value::Float(x) => Number::from_f64(*x).map_or(Json::Null, Json::Number),
        other => Json::String(other.to_string()),
    }
}
