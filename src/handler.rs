//! # 请求分发
//!
//! 一次请求的完整生命周期：
//! 1. 内容协商，选定响应表示；
//! 2. 方法解析（GET 携带 `post` 参数时转入 POST；GET 路径末尾的斜杠触发重定向）；
//! 3. 调用页面函数，并把错误分类为 404 / 503 / 500；
//! 4. POST 出现表单错误时改走 GET 路径重新渲染表单；
//! 5. 按表示渲染：JSON(P)、YAML、XML 走净化器，HTML/Atom 走模板。
//!
//! 页面函数的任何错误（包括 panic）都在这里被截住，每条路径最终都会产生
//! 一个状态码与一个响应体。

use std::panic::{self, AssertUnwindSafe};

use log::{debug, error, info, warn};

use crate::app::App;
use crate::cache::{cache_key, PageCache};
use crate::exception::{Failure, HandlerError};
use crate::negotiate::negotiate;
use crate::page::{Page, PageFn, PageResult};
use crate::param::*;
use crate::request::Request;
use crate::router::RouteMatch;
use crate::sanitize::{sanitize, to_scope};
use crate::state::ResponseState;
use crate::to_xml::{to_xml, DEFAULT_INDENT};
use crate::util::{absolute_url, is_valid_callback, moved_body, strip_trailing_slashes};
use crate::value::{fields, Fields, Value};

/// 内置的未找到模板
pub const NOT_FOUND_HTML: &str = "not_found.html";
/// 内置的错误模板
pub const ERROR_HTML: &str = "error.html";
/// XML 表示的根元素
pub const XML_ROOT: &str = "response";

/// 分发的最终结果，交给 HTTP 层写回客户端。
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub content_type: String,
    pub location: Option<String>,
    pub body: String,
}

/// 页面函数看到的请求上下文。
pub struct Handler<'a> {
    app: &'a App,
    page: &'a Page,
    request: &'a Request,
    url_args: &'a [String],
    ext: Option<&'a str>,
    representation: Representation,
    status: u16,
    location: Option<String>,
    content_type: Option<&'static str>,
    body: String,
    id: u128,
}

/// 分发一次已匹配路由的请求。
pub fn dispatch(app: &App, route: &RouteMatch<'_>, request: &Request, id: u128) -> Reply {
    let mut handler = Handler::new(app, route.page, request, &route.args, route.ext.as_deref(), id);
    let mut state = ResponseState::new();
    debug!(
        "[ID{}]页面{:?}，表示{}",
        id,
        route.page.identity(),
        handler.representation
    );
    match request.method() {
        HttpRequestMethod::Get | HttpRequestMethod::Head => handler.respond_get(&mut state, true),
        HttpRequestMethod::Post => handler.respond_post(&mut state),
        HttpRequestMethod::Options => handler.status = 204,
    }
    let reply = handler.into_reply();
    info!("[ID{}]{} {} -> {}", id, request.method(), request.uri(), reply.status);
    reply
}

/// 没有路由匹配时的未找到响应，同样遵循内容协商。
pub fn not_found(app: &App, request: &Request, id: u128) -> Reply {
    let page = Page::unnamed();
    let mut handler = Handler::new(app, &page, request, &[], None, id);
    let mut state = ResponseState::new();
    handler.set_status(&mut state, 404);
    handler.render(&mut state, Some(NOT_FOUND_HTML.to_string()), "html");
    let reply = handler.into_reply();
    info!("[ID{}]{} {} -> {}（无匹配路由）", id, request.method(), request.uri(), reply.status);
    reply
}

impl<'a> Handler<'a> {
    fn new(
        app: &'a App,
        page: &'a Page,
        request: &'a Request,
        url_args: &'a [String],
        ext: Option<&'a str>,
        id: u128,
    ) -> Self {
        Self {
            app,
            page,
            request,
            url_args,
            ext,
            representation: negotiate(request, ext),
            status: 200,
            location: None,
            content_type: None,
            body: String::new(),
            id,
        }
    }

    fn respond_get(&mut self, state: &mut ResponseState, allow_post: bool) {
        if allow_post && self.has_param("post") {
            debug!("[ID{}]GET请求携带post参数，转入POST处理", self.id);
            return self.respond_post(state);
        }
        let request = self.request;
        if request.method() == HttpRequestMethod::Get {
            if let Some(stripped) = strip_trailing_slashes(request.path()) {
                let query = &request.uri()[request.path().len()..];
                let location = format!("{}{}", stripped, query);
                if self.redirect(&location) {
                    self.body = moved_body(&location);
                    self.content_type = Some(CONTENT_TYPE_HTML);
                    return;
                }
            }
        }
        let path = match self.page.get_fn() {
            Some(f) => self.handle(f, state),
            None => self.not_found_with(state, 405),
        };
        let base = if self.is_atom() { "atom" } else { "html" };
        self.render(state, path, base);
    }

    fn respond_post(&mut self, state: &mut ResponseState) {
        let path = match self.page.post_fn() {
            Some(f) => self.handle(f, state),
            None => self.not_found_with(state, 405),
        };
        if state.has_errors() {
            debug!("[ID{}]表单校验失败，改由GET路径重新渲染", self.id);
            self.respond_get(state, false);
        } else {
            self.render(state, path, "html");
        }
    }

    /// 调用页面函数，返回要渲染的模板路径。
    fn handle(&mut self, f: PageFn, state: &mut ResponseState) -> Option<String> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(self, state)));
        match outcome {
            Ok(Ok(path)) => path,
            Ok(Err(HandlerError::NotFound)) => self.not_found_with(state, 404),
            Ok(Err(HandlerError::NeedIndex)) => {
                warn!("[ID{}]存储层缺少索引，按503处理", self.id);
                self.not_found_with(state, 503)
            }
            Ok(Err(HandlerError::Failure(failure))) => self.handle_error(state, failure),
            Err(payload) => self.handle_error(state, Failure::from_panic(payload)),
        }
    }

    fn handle_error(&mut self, state: &mut ResponseState, failure: Failure) -> Option<String> {
        error!(
            "[ID{}]{}: {}",
            self.id,
            failure.error_type(),
            failure.message()
        );
        state.insert("error", failure.message());
        state.insert("error_type", failure.error_type());
        state.insert(
            "tb_formatted",
            failure.frames().iter().map(String::as_str).collect::<Value>(),
        );
        self.set_status(state, 500);
        Some(ERROR_HTML.to_string())
    }

    fn not_found_with(&mut self, state: &mut ResponseState, status: u16) -> Option<String> {
        self.set_status(state, status);
        Some(NOT_FOUND_HTML.to_string())
    }

    fn set_status(&mut self, state: &mut ResponseState, status: u16) {
        if !(300..=399).contains(&status) {
            self.location = None;
        }
        self.status = status;
        state.insert("status", status);
    }

    fn render(&mut self, state: &mut ResponseState, path: Option<String>, base: &str) {
        if let (300..=399, Some(location)) = (self.status, &self.location) {
            self.body = moved_body(location);
            self.content_type = Some(CONTENT_TYPE_HTML);
            return;
        }
        let host = self.request.host().to_string();
        let ext = self.ext.map(str::to_string);
        let urlize = move |path: &str| absolute_url(&host, path, ext.as_deref());
        match self.representation {
            Representation::Json => {
                let sanitized = sanitize(&state.to_value(), &urlize);
                let mut json = match serde_json::to_string(&sanitized) {
                    Ok(s) => s,
                    Err(e) => {
                        error!("[ID{}]JSON序列化失败：{}", self.id, e);
                        "{}".to_string()
                    }
                };
                if let Some(callback) = self.param("callback") {
                    if is_valid_callback(callback) {
                        json = format!("{}({})", callback, json);
                    } else {
                        warn!("[ID{}]忽略不合法的JSONP回调名：{}", self.id, callback);
                    }
                }
                self.content_type = Some(self.representation.content_type());
                self.body = json;
            }
            Representation::Yaml => {
                let sanitized = sanitize(&state.to_value(), &urlize);
                self.body = match serde_yaml::to_string(&sanitized) {
                    Ok(s) => s,
                    Err(e) => {
                        error!("[ID{}]YAML序列化失败：{}", self.id, e);
                        String::new()
                    }
                };
                self.content_type = Some(self.representation.content_type());
            }
            Representation::Xml => {
                let sanitized = sanitize(&state.to_value(), &urlize);
                self.body = to_xml(&sanitized, XML_ROOT, DEFAULT_INDENT);
                self.content_type = Some(self.representation.content_type());
            }
            Representation::Html | Representation::Atom => {
                self.render_template(state, path, base, &urlize);
            }
        }
    }

    fn render_template(
        &mut self,
        state: &mut ResponseState,
        path: Option<String>,
        base: &str,
        urlize: &dyn Fn(&str) -> String,
    ) {
        let path = match path.filter(|p| !p.is_empty()) {
            Some(p) => p,
            None => match self.page.default_template(base) {
                Some(p) => p,
                None => {
                    error!("[ID{}]CRITICAL 无法为{}构造默认模板", self.id, self.page.source());
                    return self.render_missing(state, base, urlize);
                }
            },
        };
        let app = self.app;
        let templates = app.templates();
        if templates.exists(&path) {
            state.insert("handler", self.handler_fields());
            state.insert("is_dev", app.config().is_dev());
            let scope = to_scope(&state.to_value(), urlize);
            match templates.render(&path, &scope) {
                Ok(rendered) => {
                    self.body = rendered;
                    self.content_type = if self.is_atom() && self.status == 200 {
                        Some(self.representation.content_type())
                    } else {
                        Some(CONTENT_TYPE_HTML)
                    };
                }
                Err(e) => {
                    let message = format!("Template syntax error: {}", e.message());
                    error!("[ID{}]CRITICAL {}", self.id, message);
                    let mut lines = vec![message];
                    lines.extend(e.trace().iter().cloned());
                    self.body = lines.join("\n");
                    self.content_type = Some(CONTENT_TYPE_TEXT);
                }
            }
        } else if path == ERROR_HTML {
            self.body = format!(
                "{} {}: {}",
                self.status,
                state.get("error_type"),
                state.get("error")
            );
            self.content_type = Some(CONTENT_TYPE_TEXT);
        } else if path == NOT_FOUND_HTML {
            self.body = format!("{} not found", self.status);
            self.content_type = Some(CONTENT_TYPE_TEXT);
        } else {
            error!("[ID{}]CRITICAL Template not found: {}", self.id, path);
            self.render_missing(state, base, urlize);
        }
    }

    fn render_missing(&mut self, state: &mut ResponseState, base: &str, urlize: &dyn Fn(&str) -> String) {
        self.set_status(state, 404);
        self.render_template(state, Some(NOT_FOUND_HTML.to_string()), base, urlize);
    }

    /// 模板里可用的 `handler` 字段。
    fn handler_fields(&self) -> Fields {
        fields([
            ("page_name", Value::from(self.page_name())),
            ("path", Value::from(self.request.path())),
            ("uri", Value::from(self.request.uri())),
            ("host", Value::from(self.host())),
            ("format", Value::from(self.format_ext())),
            ("url_args", Value::from(self.url_args.to_vec())),
            ("is_admin", Value::from(self.is_admin())),
            ("login_url", Value::from(self.login_url())),
            ("logout_url", Value::from(self.logout_url())),
        ])
    }

    fn into_reply(self) -> Reply {
        let location = match self.status {
            300..=399 => self.location,
            _ => None,
        };
        Reply {
            status: self.status,
            content_type: self.content_type.unwrap_or(CONTENT_TYPE_HTML).to_string(),
            location,
            body: self.body,
        }
    }
}

impl<'a> Handler<'a> {
    pub fn request(&self) -> &Request {
        self.request
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    pub fn url_args(&self) -> &[String] {
        self.url_args
    }

    /// 越界时为 `None`。
    pub fn url_arg(&self, index: usize) -> Option<&str> {
        self.url_args.get(index).map(String::as_str)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.param(name)
    }

    pub fn params(&self, name: &str) -> Vec<&str> {
        self.request.params(name)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.request.has_param(name)
    }

    pub fn is_json(&self) -> bool {
        self.representation == Representation::Json
    }

    pub fn is_yaml(&self) -> bool {
        self.representation == Representation::Yaml
    }

    pub fn is_xml(&self) -> bool {
        self.representation == Representation::Xml
    }

    pub fn is_atom(&self) -> bool {
        self.representation == Representation::Atom
    }

    /// 路由捕获到的格式后缀
    pub fn format_ext(&self) -> Option<&str> {
        self.ext
    }

    pub fn host(&self) -> &str {
        self.request.host()
    }

    pub fn is_admin(&self) -> bool {
        self.app.users().is_current_user_admin(self.request)
    }

    pub fn login_url(&self) -> String {
        self.app.users().create_login_url(self.request.uri())
    }

    pub fn logout_url(&self) -> String {
        self.app.users().create_logout_url(self.request.uri())
    }

    /// 请求重定向。结构化表示下不会发出重定向，返回 `false`，请求照常继续。
    pub fn redirect(&mut self, location: &str) -> bool {
        if self.representation.is_structured() {
            debug!("[ID{}]{}表示下忽略重定向到{}", self.id, self.representation, location);
            return false;
        }
        debug!("[ID{}]重定向到{}", self.id, location);
        self.status = 302;
        self.location = Some(location.to_string());
        true
    }

    /// 在页面函数中 `return handler.not_found();` 以得到 404。
    pub fn not_found(&self) -> PageResult {
        Err(HandlerError::NotFound)
    }

    pub fn page_name(&self) -> Option<&str> {
        self.page.identity()
    }

    pub fn default_template(&self, ext: &str) -> Option<String> {
        self.page.default_template(ext)
    }

    pub fn cache_key(&self, vary: Option<&str>) -> String {
        cache_key(self.page_name(), vary)
    }

    /// 查询当前页面的缓存，命中时把缓存的字段合并进响应状态。
    ///
    /// 请求带有 `no_cache` 参数时总是未命中。
    pub fn cached(&self, state: &mut ResponseState, vary: Option<&str>) -> bool {
        if self.has_param("no_cache") {
            debug!("[ID{}]请求要求跳过缓存", self.id);
            return false;
        }
        match PageCache::new(self.app.store(), self.page_name()).lookup(vary) {
            Some(cached) if !cached.is_empty() => {
                state.update(cached);
                true
            }
            _ => false,
        }
    }

    /// 缓存字段，同时立即合并进响应状态。`ttl` 为 0 表示不过期。
    pub fn cache(&self, state: &mut ResponseState, ttl: u64, vary: Option<&str>, fields: Fields) {
        PageCache::new(self.app.store(), self.page_name()).store(ttl, vary, &fields);
        state.update(fields);
    }

    /// 删除给定页面（缺省为当前页面）的缓存。
    ///
    /// 指定的页面没有标识时什么也不做，不会退回到当前页面。
    pub fn invalidate(&self, page: Option<&Page>, vary: Option<&str>) {
        let identity = match page {
            Some(other) => match other.identity() {
                Some(identity) => Some(identity),
                None => {
                    warn!("[ID{}]页面{}没有标识，跳过缓存失效", self.id, other.source());
                    return;
                }
            },
            None => None,
        };
        PageCache::new(self.app.store(), self.page_name()).invalidate(identity, vary);
    }

    /// 当前环境下的本地配置
    pub fn config(&self) -> Fields {
        self.app.local_config()
    }
}
