use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use url::{form_urlencoded, Url};

lazy_static! {
    static ref TRAILING_SLASHES: Regex = Regex::new(r"^(/.*[^/])/+$").unwrap();
    static ref CALLBACK: Regex = Regex::new(r"^[_a-zA-Z][_a-zA-Z0-9]*$").unwrap();
    static ref FORMAT_SUFFIX: Regex = Regex::new(r"\.(yaml|json|xml|atom)$").unwrap();
    static ref CHARSET: Regex = Regex::new(r"(?i)charset=(\S*)").unwrap();
}

/// 解析 `a=1&b=2&a=3` 形式的参数串，保留重复键与出现顺序。
pub fn parse_params(input: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(input.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// 百分号编码，用于拼接 `continue=` 之类的参数。
pub fn encode_component(input: &str) -> String {
    form_urlencoded::byte_serialize(input.as_bytes()).collect()
}

/// 去掉路径末尾的一个或多个斜杠。路径本身没有多余斜杠时返回 `None`。
///
/// 根路径 `/` 不受影响。
pub fn strip_trailing_slashes(path: &str) -> Option<&str> {
    TRAILING_SLASHES
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// JSONP 回调名只允许标识符字符。
pub fn is_valid_callback(callback: &str) -> bool {
    CALLBACK.is_match(callback)
}

/// 路径末尾的格式后缀（`json`、`yaml`、`xml`、`atom`）。
pub fn format_suffix(path: &str) -> Option<&str> {
    FORMAT_SUFFIX
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// 把站内路径转换为绝对 URL。
///
/// 路径相对站点根解析，`..` 与 `.` 会被消去。给出 `ext` 且最后一段没有后缀时附加之，
/// 使链接指向同一种表示。已经是绝对地址的输入原样返回。
pub fn absolute_url(host: &str, path: &str, ext: Option<&str>) -> String {
    if Url::parse(path).is_ok() {
        return path.to_string();
    }
    let mut url = match Url::parse(&format!("http://{}/", host)).and_then(|base| base.join(path)) {
        Ok(url) => url,
        Err(e) => {
            warn!("无法把{}解析为{}下的URL: {}", path, host, e);
            return path.to_string();
        }
    };
    if let Some(ext) = ext {
        let last = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or("");
        if !last.is_empty() && !last.contains('.') {
            let with_ext = format!("{}.{}", url.path(), ext);
            url.set_path(&with_ext);
        }
    }
    url.into()
}

/// 从 `Content-Type` 取出 `charset=` 的值，去掉引号与结尾的分号。
pub fn charset_of(content_type: &str) -> Option<&str> {
    CHARSET
        .captures(content_type)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_matches(|c| c == '"' || c == '\'' || c == ';'))
        .filter(|charset| !charset.is_empty())
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// 不跟随重定向的客户端看到的最小响应体。
pub fn moved_body(location: &str) -> String {
    let escaped = escape_html(location);
    format!("Moved to <a href=\"{}\">{}</a>", escaped, escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let params = parse_params("json&name=a+b&name=%E4%BD%A0&empty=");
        assert_eq!(
            params,
            vec![
                ("json".to_string(), "".to_string()),
                ("name".to_string(), "a b".to_string()),
                ("name".to_string(), "你".to_string()),
                ("empty".to_string(), "".to_string()),
            ]
        );
        assert!(parse_params("").is_empty());
    }

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("/a b?c=1"), "%2Fa+b%3Fc%3D1");
    }

    #[test]
    fn test_strip_trailing_slashes() {
        assert_eq!(strip_trailing_slashes("/foo/"), Some("/foo"));
        assert_eq!(strip_trailing_slashes("/foo/bar///"), Some("/foo/bar"));
        assert_eq!(strip_trailing_slashes("/foo"), None);
        assert_eq!(strip_trailing_slashes("/"), None);
        assert_eq!(strip_trailing_slashes("//"), None);
    }

    #[test]
    fn test_is_valid_callback() {
        assert!(is_valid_callback("cb"));
        assert!(is_valid_callback("_jsonp_123"));
        assert!(is_valid_callback("CamelCase"));
        assert!(!is_valid_callback("1abc"));
        assert!(!is_valid_callback("alert(1)"));
        assert!(!is_valid_callback("a.b"));
        assert!(!is_valid_callback(""));
    }

    #[test]
    fn test_format_suffix() {
        assert_eq!(format_suffix("/posts.json"), Some("json"));
        assert_eq!(format_suffix("/feed.atom"), Some("atom"));
        assert_eq!(format_suffix("/posts.html"), None);
        assert_eq!(format_suffix("/posts"), None);
    }

    #[test]
    fn test_absolute_url() {
        assert_eq!(absolute_url("example.com", "/posts/1", None), "http://example.com/posts/1");
        assert_eq!(
            absolute_url("example.com", "/posts/1", Some("json")),
            "http://example.com/posts/1.json"
        );
        assert_eq!(
            absolute_url("example.com", "/feed.atom", Some("json")),
            "http://example.com/feed.atom"
        );
        assert_eq!(absolute_url("example.com", "posts", None), "http://example.com/posts");
        assert_eq!(
            absolute_url("example.com", "https://other.org/x", Some("json")),
            "https://other.org/x"
        );
    }

    #[test]
    fn test_absolute_url_resolves_dot_segments() {
        assert_eq!(
            absolute_url("example.com", "/posts/../feed", Some("json")),
            "http://example.com/feed.json"
        );
        assert_eq!(absolute_url("example.com", "./a/./b", None), "http://example.com/a/b");
        assert_eq!(
            absolute_url("example.com:8080", "/search?q=x", Some("json")),
            "http://example.com:8080/search.json?q=x"
        );
        assert_eq!(absolute_url("example.com", "/", Some("json")), "http://example.com/");
    }

    #[test]
    fn test_absolute_url_bad_host_keeps_path() {
        assert_eq!(absolute_url("", "/posts/1", None), "/posts/1");
        assert_eq!(absolute_url("bad host", "/posts/1", None), "/posts/1");
    }

    #[test]
    fn test_charset_of() {
        assert_eq!(charset_of("text/html; charset=UTF-8"), Some("UTF-8"));
        assert_eq!(charset_of("text/plain; Charset=\"iso-8859-1\""), Some("iso-8859-1"));
        assert_eq!(charset_of("text/plain; CHARSET=utf-8;"), Some("utf-8"));
        assert_eq!(charset_of("application/json"), None);
        assert_eq!(charset_of("text/plain; charset="), None);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn test_moved_body() {
        assert_eq!(
            moved_body("/done?a=1&b=2"),
            "Moved to <a href=\"/done?a=1&amp;b=2\">/done?a=1&amp;b=2</a>"
        );
    }
}
