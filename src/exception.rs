// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了请求分发层在请求处理生命周期中可能出现的各类异常情况。
//!
//! ## 设计意图
//! - **协议与进程级错误**：`Exception`，涵盖请求解析、配置加载与路由注册。
//! - **页面处理错误**：`HandlerError`，由页面函数返回，分发器据此决定 404 / 503 / 500。
//! - **协作方错误**：`StoreError`（缓存存储）与 `TemplateError`（模板引擎）。
//! - **出站抓取错误**：`FetchError`，连接失败或响应体无法读取。
//!
//! 所有类型都实现了 `std::fmt::Display`，可以直接写入日志或响应体。

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;

/// 进程与协议层面的异常类型。
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Exception {
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 客户端使用了服务器不支持的 HTTP 方法。
    UnSupportedRequestMethod,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 请求行缺失或格式不正确。
    MalformedRequest,
    /// 请求报文超出服务器允许的长度。
    RequestTooLarge,
    /// 配置文件不存在或无法读取。
    ConfigNotFound,
    /// 配置文件存在，但内容无法解析。
    ConfigInvalid,
    /// 路由模式无法编译为正则表达式。
    InvalidRoutePattern,
}

use Exception::*;

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            MalformedRequest => write!(f, "Malformed request line"),
            RequestTooLarge => write!(f, "Request exceeds the size limit"),
            ConfigNotFound => write!(f, "Config file not found or unreadable"),
            ConfigInvalid => write!(f, "Config file can't be parsed"),
            InvalidRoutePattern => write!(f, "Route pattern is not a valid regex"),
        }
    }
}

/// 页面函数执行失败时返回的错误。
///
/// 分发器会在边界处把它分类为 HTTP 结果：
/// - `NotFound` → 404
/// - `NeedIndex` → 503（存储层缺少索引，属于暂时不可用）
/// - `Failure` → 500，并把诊断信息写入响应状态
///
/// 任意实现了 `std::error::Error` 的错误都可以通过 `?` 转换为 `Failure`。
/// 为了让这个通用转换成立，`HandlerError` 本身不实现 `std::error::Error`。
#[derive(Debug)]
pub enum HandlerError {
    NotFound,
    NeedIndex,
    Failure(Failure),
}

impl HandlerError {
    /// 以给定的类型名与消息构造一个未分类错误。
    pub fn failure(error_type: &str, message: impl Into<String>) -> Self {
        HandlerError::Failure(Failure::new(error_type, message))
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::NotFound => write!(f, "not found"),
            HandlerError::NeedIndex => write!(f, "missing datastore index"),
            HandlerError::Failure(failure) => write!(f, "{}", failure),
        }
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + 'static,
{
    fn from(error: E) -> Self {
        HandlerError::Failure(Failure::new(
            short_type_name(std::any::type_name::<E>()),
            error.to_string(),
        ))
    }
}

/// 一次未分类异常的诊断信息：类型名、消息与格式化后的调用栈。
#[derive(Debug, Clone)]
pub struct Failure {
    error_type: String,
    message: String,
    frames: Vec<String>,
}

impl Failure {
    pub fn new(error_type: &str, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.to_string(),
            message: message.into(),
            frames: capture_frames(),
        }
    }

    /// 由 `catch_unwind` 捕获的 panic 负载构造。
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::new("panic", message)
    }

    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn frames(&self) -> &[String] {
        &self.frames
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

fn capture_frames() -> Vec<String> {
    Backtrace::force_capture()
        .to_string()
        .lines()
        .map(|line| line.trim_end().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// `core::num::error::ParseIntError` → `ParseIntError`
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// 缓存存储不可用时的错误。缓存层会吞掉它并按未命中处理。
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(reason) => write!(f, "cache store unavailable: {}", reason),
        }
    }
}

/// 出站抓取失败。带有错误状态码的响应不算失败，照常返回给调用方。
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// 地址无效，或者连接、TLS 握手等传输层错误
    Transport(String),
    /// 响应体读取失败
    Body(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(reason) => write!(f, "fetch failed: {}", reason),
            FetchError::Body(reason) => write!(f, "response body unreadable: {}", reason),
        }
    }
}

/// 模板查找、语法或渲染错误。
#[derive(Debug, Clone)]
pub struct TemplateError {
    message: String,
    trace: Vec<String>,
}

impl TemplateError {
    pub fn new(message: impl Into<String>, trace: Vec<String>) -> Self {
        Self {
            message: message.into(),
            trace,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
