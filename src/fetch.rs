//! # 出站抓取
//!
//! 页面代码偶尔需要取回别处的资源（例如聚合外部的 feed）。这里提供阻塞式的抓取，
//! 并按响应的 `charset` 把正文解码为文本；无法解码时保留原始字节。
//!
//! 调用发生在页面函数内部，页面函数本身在工作线程上同步执行。

use std::io::Read;
use std::time::Duration;

use log::{debug, warn};

use crate::exception::FetchError;
use crate::util::charset_of;

/// 响应没有声明字符集时使用
pub const DEFAULT_CHARSET: &str = "utf-8";
/// 正文读取上限
const MAX_BODY_SIZE: u64 = 10 * 1024 * 1024;
const TIMEOUT: Duration = Duration::from_secs(30);

/// 抓取得到的响应
#[derive(Debug, Clone)]
pub struct Fetched {
    status: u16,
    content_type: Option<String>,
    body: Vec<u8>,
}

impl Fetched {
    pub fn new(status: u16, content_type: Option<&str>, body: Vec<u8>) -> Self {
        Fetched {
            status,
            content_type: content_type.map(str::to_string),
            body,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// 解码后的正文
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Text(String),
    /// 字符集未知或字节不合法，原样返回
    Raw(Vec<u8>),
}

/// 地址里的空格替换为 `%20`，其余部分不动。
pub fn escape_url(url: &str) -> String {
    url.replace(' ', "%20")
}

/// 抓取 URL。4xx/5xx 同样作为响应返回，只有传输层错误才是 `Err`。
pub fn fetch(url: &str) -> Result<Fetched, FetchError> {
    let url = escape_url(url);
    debug!("抓取{}", url);
    let agent = ureq::AgentBuilder::new().timeout(TIMEOUT).build();
    let response = match agent.get(&url).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(code, response)) => {
            warn!("{}返回状态码{}", url, code);
            response
        }
        Err(e) => {
            warn!("抓取{}失败: {}", url, e);
            return Err(FetchError::Transport(e.to_string()));
        }
    };

    let status = response.status();
    let content_type = response.header("content-type").map(str::to_string);
    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_BODY_SIZE)
        .read_to_end(&mut body)
        .map_err(|e| FetchError::Body(e.to_string()))?;
    Ok(Fetched {
        status,
        content_type,
        body,
    })
}

/// 响应头里声明的字符集
pub fn response_charset(response: &Fetched) -> Option<&str> {
    response.content_type().and_then(charset_of)
}

/// 按响应的字符集（缺省为 `default_charset`）解码正文。
pub fn decode_response(response: &Fetched, default_charset: &str) -> Decoded {
    let charset = response_charset(response).unwrap_or(default_charset);
    match decode(response.body(), charset) {
        Some(text) => Decoded::Text(text),
        None => {
            debug!("无法按{}解码{}字节的正文，保留原始字节", charset, response.body().len());
            Decoded::Raw(response.body().to_vec())
        }
    }
}

/// 抓取并解码
pub fn fetch_decode(url: &str, default_charset: &str) -> Result<Decoded, FetchError> {
    fetch(url).map(|response| decode_response(&response, default_charset))
}

fn decode(bytes: &[u8], charset: &str) -> Option<String> {
    match charset.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => String::from_utf8(bytes.to_vec()).ok(),
        "us-ascii" | "ascii" if bytes.is_ascii() => Some(String::from_utf8_lossy(bytes).into_owned()),
        // Latin-1 的每个字节就是同值的码位
        "iso-8859-1" | "latin1" | "latin-1" => Some(bytes.iter().map(|&b| b as char).collect()),
        _ => None,
    }
}
