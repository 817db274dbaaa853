// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责将 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体：
//! 1. 请求行（Request-Line）的解析（方法、目标、版本）。
//! 2. 常用 HTTP 标头（Headers）的提取。
//! 3. 查询串与 `application/x-www-form-urlencoded` 请求体的参数解析。
//! 4. 内容协商（Content Negotiation）相关的编码解析。

use crate::{exception::Exception, param::*, util::parse_params};
use log::{debug, error};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// 表示一个完整的 HTTP 请求。
///
/// 查询参数与表单参数合并保存在 `params` 中（查询参数在前），
/// 同名参数可以出现多次。
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP 请求方法（GET, POST 等）
    method: HttpRequestMethod,
    /// 请求目标（包含查询字符串）
    uri: String,
    /// 不含查询字符串的路径
    path: String,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 客户端标识字符串
    user_agent: String,
    /// 客户端支持的压缩编码列表（按解析顺序排列）
    accept_encoding: Vec<HttpEncoding>,
    /// 客户端接受的内容类型（MIME）
    accept: Option<String>,
    /// Host 标头
    host: String,
    /// 请求体的内容类型
    content_type: Option<String>,
    /// 查询参数与表单参数
    params: Vec<(String, String)>,
}

impl Request {
    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// # 逻辑步骤
    /// 1. 验证编码：确保请求数据是合法的 UTF-8 字符串。
    /// 2. 解析请求行：提取方法、目标和协议版本。
    /// 3. 迭代解析标头：识别 `User-Agent`, `Accept`, `Host` 等字段。
    /// 4. 解析编码：专门处理 `Accept-Encoding` 以支持后续的压缩传输。
    /// 5. 解析参数：查询串，以及 POST 请求的表单体。
    ///
    /// # 错误处理
    /// 如果请求格式不符合 HTTP 规范或使用了不支持的方法/版本，将返回相应的 `Exception`。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let request_string = match String::from_utf8(buffer.to_vec()) {
            Ok(string) => string,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let (head, body) = match request_string.split_once("\r\n\r\n") {
            Some((head, body)) => (head, body),
            None => (request_string.as_str(), ""),
        };
        let request_lines: Vec<&str> = head.split(CRLF).collect();

        // 请求行 (e.g., "GET /index.html HTTP/1.1")
        let first_line_parts: Vec<&str> = request_lines[0].split(' ').collect();
        if first_line_parts.len() < 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_lines[0]);
            return Err(Exception::MalformedRequest);
        }

        let method_str = first_line_parts[0].to_uppercase();
        let method = match method_str.as_str() {
            "GET" => HttpRequestMethod::Get,
            "HEAD" => HttpRequestMethod::Head,
            "OPTIONS" => HttpRequestMethod::Options,
            "POST" => HttpRequestMethod::Post,
            _ => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, &method_str);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version_str = first_line_parts[first_line_parts.len() - 1].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        // 路径中可能包含空格（虽然不规范），通过 join 尝试恢复
        let uri = if first_line_parts.len() == 3 {
            first_line_parts[1].to_string()
        } else {
            first_line_parts[1..first_line_parts.len() - 1].join(" ")
        };

        let mut request = Self::blank(method, &uri);
        request.version = version;

        for line in &request_lines[1..] {
            let (name, value) = match line.split_once(':') {
                Some((name, value)) => (name.trim().to_lowercase(), value.trim()),
                None => continue,
            };
            match name.as_str() {
                "user-agent" => request.user_agent = value.to_string(),
                "accept" => request.accept = Some(value.to_string()),
                "host" => request.host = value.to_string(),
                "content-type" => request.content_type = Some(value.to_string()),
                "accept-encoding" => request.accept_encoding = parse_encodings(value),
                _ => {}
            }
        }

        if method == HttpRequestMethod::Post && !body.is_empty() {
            request.set_body(body);
        }
        debug!(
            "[ID{}]解析得到{}个参数：{:?}",
            id,
            request.params.len(),
            request.params
        );
        Ok(request)
    }

    /// 不经过网络解析，直接以方法与目标构造请求。查询串会被解析为参数。
    pub fn blank(method: HttpRequestMethod, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, query),
            None => (uri, ""),
        };
        Self {
            method,
            uri: uri.to_string(),
            path: path.to_string(),
            version: HttpVersion::V1_1,
            user_agent: String::new(),
            accept_encoding: vec![],
            accept: None,
            host: "localhost".to_string(),
            content_type: None,
            params: parse_params(query),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match name.to_lowercase().as_str() {
            "user-agent" => self.user_agent = value.to_string(),
            "accept" => self.accept = Some(value.to_string()),
            "host" => self.host = value.to_string(),
            "content-type" => self.content_type = Some(value.to_string()),
            "accept-encoding" => self.accept_encoding = parse_encodings(value),
            _ => debug!("忽略标头{}", name),
        }
        self
    }

    /// 附加表单请求体。
    pub fn with_body(mut self, body: &str) -> Self {
        self.set_body(body);
        self
    }

    fn set_body(&mut self, body: &str) {
        let is_form = match &self.content_type {
            Some(t) => t.to_lowercase().starts_with(FORM_URLENCODED),
            None => true,
        };
        if is_form {
            self.params.extend(parse_params(body));
        }
    }
}

/// 解析 Accept-Encoding。只要包含关键词即视为支持。
fn parse_encodings(value: &str) -> Vec<HttpEncoding> {
    let mut accept_encoding = vec![];
    if value.contains("gzip") {
        accept_encoding.push(HttpEncoding::Gzip);
    }
    if value.contains("deflate") {
        accept_encoding.push(HttpEncoding::Deflate);
    }
    if value.contains("br") {
        accept_encoding.push(HttpEncoding::Br);
    }
    accept_encoding
}

/// 报文头结束处（含空行）的偏移
fn head_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// 在报文头中按名称（不区分大小写）查找首部的取值
fn head_value(head: &[u8], name: &str) -> Option<String> {
    String::from_utf8_lossy(head).lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case(name) {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

impl Request {
    /// 报文头加上 `Content-Length` 声明的正文一共多少字节。
    ///
    /// 报文头还没有读全时返回 `None`；没有 `Content-Length` 时正文按 0 计。
    pub fn expected_length(buffer: &[u8]) -> Option<usize> {
        let end = head_end(buffer)?;
        let length = head_value(&buffer[..end], "content-length")
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(0);
        Some(end + length)
    }

    /// 客户端是否带了 `Expect: 100-continue`，在收到临时响应之前不会发送正文。
    pub fn expects_continue(buffer: &[u8]) -> bool {
        head_end(buffer)
            .and_then(|end| head_value(&buffer[..end], "expect"))
            .map_or(false, |value| value.eq_ignore_ascii_case("100-continue"))
    }
}

impl Request {
    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    /// 请求目标（含查询参数）
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// 请求路径（不含查询参数）
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn accept_encoding(&self) -> &Vec<HttpEncoding> {
        &self.accept_encoding
    }

    pub fn accept(&self) -> Option<&String> {
        self.accept.as_ref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn content_type(&self) -> Option<&String> {
        self.content_type.as_ref()
    }

    /// 同名参数的全部取值
    pub fn params(&self, name: &str) -> Vec<&str> {
        self.params
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// 参数的第一个取值
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// 参数是否出现过，即使取值为空
    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|(k, _)| k == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 验证常规 GET 请求的解析，包括 Path 和 Headers
    #[test]
    fn test_parse_get_request() {
        let request_str = "GET / HTTP/1.1\r\nHost: localhost:7878\r\nUser-Agent: Test-Browser\r\nAccept-Encoding: gzip, deflate, br\r\n\r\n";
        let buffer = request_str.as_bytes().to_vec();

        let request = Request::try_from(&buffer, 0).unwrap();

        assert_eq!(request.method(), HttpRequestMethod::Get);
        assert_eq!(request.path(), "/");
        assert_eq!(request.host(), "localhost:7878");
        assert_eq!(request.user_agent(), "Test-Browser");
        assert!(request.accept_encoding().contains(&HttpEncoding::Gzip));
        assert!(request.accept_encoding().contains(&HttpEncoding::Deflate));
        assert!(request.accept_encoding().contains(&HttpEncoding::Br));
    }

    #[test]
    fn test_parse_head_request() {
        let request_str =
            "HEAD /index.html HTTP/1.1\r\nHost: localhost:7878\r\nUser-Agent: Test-Agent\r\n\r\n";
        let buffer = request_str.as_bytes().to_vec();

        let request = Request::try_from(&buffer, 0).unwrap();

        assert_eq!(request.method(), HttpRequestMethod::Head);
        assert_eq!(request.path(), "/index.html");
    }

    #[test]
    fn test_parse_options_request() {
        let request_str = "OPTIONS * HTTP/1.1\r\nHost: localhost:7878\r\n\r\n";
        let buffer = request_str.as_bytes().to_vec();

        let request = Request::try_from(&buffer, 0).unwrap();

        assert_eq!(request.method(), HttpRequestMethod::Options);
        assert_eq!(request.path(), "*");
    }

    /// POST 表单体被解析为参数，排在查询参数之后
    #[test]
    fn test_parse_post_form_body() {
        let request_str = "POST /submit?lang=en HTTP/1.1\r\nHost: localhost:7878\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 22\r\n\r\nmessage=hi+there&lang=fr";
        let buffer = request_str.as_bytes().to_vec();

        let request = Request::try_from(&buffer, 0).unwrap();

        assert_eq!(request.method(), HttpRequestMethod::Post);
        assert_eq!(request.path(), "/submit");
        assert_eq!(request.param("message"), Some("hi there"));
        assert_eq!(request.params("lang"), vec!["en", "fr"]);
    }

    #[test]
    fn test_non_form_body_is_ignored() {
        let request_str = "POST /submit HTTP/1.1\r\nContent-Type: application/json\r\n\r\n{\"a\":1}";
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();
        assert!(!request.has_param("a"));
        assert_eq!(request.content_type().map(|s| s.as_str()), Some("application/json"));
    }

    #[test]
    fn test_unsupported_method() {
        let request_str = "DELETE /resource HTTP/1.1\r\nHost: localhost:7878\r\n\r\n";
        let buffer = request_str.as_bytes().to_vec();

        let result = Request::try_from(&buffer, 0);

        match result.unwrap_err() {
            Exception::UnSupportedRequestMethod => {}
            _ => panic!("Expected UnSupportedRequestMethod error"),
        }
    }

    #[test]
    fn test_unsupported_http_version() {
        let request_str = "GET / HTTP/2.0\r\nHost: localhost:7878\r\n\r\n";
        let buffer = request_str.as_bytes().to_vec();

        let result = Request::try_from(&buffer, 0);

        match result.unwrap_err() {
            Exception::UnsupportedHttpVersion => {}
            _ => panic!("Expected UnsupportedHttpVersion error"),
        }
    }

    #[test]
    fn test_malformed_request_line() {
        let result = Request::try_from(b"GET /\r\n\r\n", 0);
        assert_eq!(result.unwrap_err(), Exception::MalformedRequest);
    }

    #[test]
    fn test_invalid_utf8() {
        let buffer = vec![0xFF, 0xFE, 0xFD];

        let result = Request::try_from(&buffer, 0);

        match result.unwrap_err() {
            Exception::RequestIsNotUtf8 => {}
            _ => panic!("Expected RequestIsNotUtf8 error"),
        }
    }

    /// 验证 Header 字段名是否大小写不敏感
    #[test]
    fn test_case_insensitive_headers() {
        let request_str = "GET / HTTP/1.1\r\nhost: example.com\r\nuser-agent: Test\r\naccept-encoding: gzip\r\nACCEPT: application/json\r\n\r\n";
        let buffer = request_str.as_bytes().to_vec();

        let request = Request::try_from(&buffer, 0).unwrap();

        assert_eq!(request.user_agent(), "Test");
        assert_eq!(request.host(), "example.com");
        assert_eq!(request.accept().map(|s| s.as_str()), Some("application/json"));
        assert!(request.accept_encoding().contains(&HttpEncoding::Gzip));
    }

    #[test]
    fn test_no_encoding_header() {
        let request_str = "GET / HTTP/1.1\r\nHost: localhost:7878\r\n\r\n";
        let buffer = request_str.as_bytes().to_vec();

        let request = Request::try_from(&buffer, 0).unwrap();

        assert!(request.accept_encoding().is_empty());
    }

    #[test]
    fn test_partial_encoding() {
        let request_str = "GET / HTTP/1.1\r\nHost: localhost:7878\r\nAccept-Encoding: gzip\r\n\r\n";
        let buffer = request_str.as_bytes().to_vec();

        let request = Request::try_from(&buffer, 0).unwrap();

        assert!(request.accept_encoding().contains(&HttpEncoding::Gzip));
        assert!(!request.accept_encoding().contains(&HttpEncoding::Br));
        assert!(!request.accept_encoding().contains(&HttpEncoding::Deflate));
    }

    /// 查询串从路径中分离并解析为参数
    #[test]
    fn test_path_with_query_string() {
        let request_str = "GET /page?id=123&name=test&json HTTP/1.1\r\nHost: localhost:7878\r\n\r\n";
        let buffer = request_str.as_bytes().to_vec();

        let request = Request::try_from(&buffer, 0).unwrap();

        assert_eq!(request.uri(), "/page?id=123&name=test&json");
        assert_eq!(request.path(), "/page");
        assert_eq!(request.param("id"), Some("123"));
        assert!(request.has_param("json"));
        assert_eq!(request.param("json"), Some(""));
        assert!(!request.has_param("yaml"));
    }

    #[test]
    fn test_lowercase_method() {
        let request_str = "get / HTTP/1.1\r\nHost: localhost:7878\r\n\r\n";
        let buffer = request_str.as_bytes().to_vec();

        let request = Request::try_from(&buffer, 0).unwrap();

        assert_eq!(request.method(), HttpRequestMethod::Get);
    }

    #[test]
    fn test_expected_length_waits_for_head() {
        assert_eq!(Request::expected_length(b"POST /greetings HTTP/1.1\r\nHost: a"), None);
        assert_eq!(Request::expected_length(b""), None);
    }

    #[test]
    fn test_expected_length_counts_body() {
        let head = b"POST /greetings HTTP/1.1\r\nHost: a\r\ncontent-length: 2048\r\n\r\n";
        assert_eq!(Request::expected_length(head), Some(head.len() + 2048));

        let get = b"GET / HTTP/1.1\r\nHost: a\r\n\r\n";
        assert_eq!(Request::expected_length(get), Some(get.len()));

        let garbage = b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\nabc";
        assert_eq!(Request::expected_length(garbage), Some(garbage.len() - 3));
    }

    #[test]
    fn test_expects_continue() {
        let head = b"POST / HTTP/1.1\r\nContent-Length: 5\r\nExpect: 100-Continue\r\n\r\n";
        assert!(Request::expects_continue(head));
        assert!(!Request::expects_continue(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\n"));
        assert!(!Request::expects_continue(b"POST / HTTP/1.1\r\nExpect: 100-continue"));
    }

    #[test]
    fn test_body_from_later_segment() {
        let mut buffer = b"POST /greetings HTTP/1.1\r\nHost: a\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 13\r\n\r\n".to_vec();
        let total = Request::expected_length(&buffer).unwrap();
        assert!(buffer.len() < total);
        buffer.extend_from_slice(b"message=hello");
        assert_eq!(buffer.len(), total);

        let request = Request::try_from(&buffer, 0).unwrap();
        assert_eq!(request.param("message"), Some("hello"));
    }

    #[test]
    fn test_blank_builder() {
        let request = Request::blank(HttpRequestMethod::Post, "/greetings?no_cache")
            .with_header("Host", "example.com")
            .with_header("Accept", "application/xml")
            .with_body("message=hello");
        assert_eq!(request.path(), "/greetings");
        assert_eq!(request.host(), "example.com");
        assert!(request.has_param("no_cache"));
        assert_eq!(request.param("message"), Some("hello"));
    }
}
