//! 内容协商：决定一次请求使用哪种响应表示。
//!
//! 依次检查：查询参数（`json`、`yaml`、`xml`、`atom`）、路径后缀、
//! `Accept` 标头，均未命中时使用 HTML。

use crate::param::Representation;
use crate::request::Request;
use crate::util::format_suffix;

const QUERY_SIGNALS: [(&str, Representation); 4] = [
    ("json", Representation::Json),
    ("yaml", Representation::Yaml),
    ("xml", Representation::Xml),
    ("atom", Representation::Atom),
];

/// `ext` 为路由捕获到的格式后缀；为空时从请求路径中查找。
pub fn negotiate(request: &Request, ext: Option<&str>) -> Representation {
    if let Some(r) = from_query(request) {
        return r;
    }
    let suffix = ext.filter(|e| !e.is_empty()).or_else(|| format_suffix(request.path()));
    if let Some(r) = suffix.and_then(Representation::from_extension) {
        return r;
    }
    request
        .accept()
        .and_then(|accept| from_accept(accept))
        .unwrap_or(Representation::Html)
}

fn from_query(request: &Request) -> Option<Representation> {
    QUERY_SIGNALS
        .iter()
        .find(|(name, _)| request.has_param(name))
        .map(|(_, r)| *r)
}

/// 取第一个能识别的媒体范围，忽略 q 值等参数。
pub fn from_accept(accept: &str) -> Option<Representation> {
    accept
        .split(',')
        .map(|range| range.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .find_map(|media| match media.as_str() {
            "text/html" | "application/xhtml+xml" => Some(Representation::Html),
            "application/json" | "text/javascript" => Some(Representation::Json),
            "application/yaml" | "application/x-yaml" | "text/yaml" | "text/x-yaml" => {
                Some(Representation::Yaml)
            }
            "application/xml" | "text/xml" => Some(Representation::Xml),
            "application/atom+xml" => Some(Representation::Atom),
            _ => None,
        })
}
