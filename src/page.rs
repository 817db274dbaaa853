//! 页面记录：一组可选的 GET/POST 入口加上由源文件路径推出的页面标识。

use std::fmt;

use log::warn;
use regex::Regex;

use crate::exception::HandlerError;
use crate::handler::Handler;
use crate::state::ResponseState;

/// 默认的页面源文件基目录
pub const HANDLERS_BASE: &str = "handlers";

/// 页面函数的返回值：`Ok(Some(path))` 指定模板，`Ok(None)` 使用默认模板。
pub type PageResult = Result<Option<String>, HandlerError>;

pub type PageFn = fn(&mut Handler<'_>, &mut ResponseState) -> PageResult;

#[derive(Clone)]
pub struct Page {
    source: String,
    identity: Option<String>,
    get: Option<PageFn>,
    post: Option<PageFn>,
}

impl Page {
    /// 以定义页面的源文件路径构造，通常传入 `file!()`。
    pub fn new(source: &str) -> Self {
        Self::with_base(source, HANDLERS_BASE)
    }

    pub fn with_base(source: &str, base: &str) -> Self {
        let source = source.replace('\\', "/");
        let identity = identity_of(&source, base);
        if identity.is_none() {
            warn!("无法从{}推出页面标识（基目录{}）", source, base);
        }
        Self {
            source,
            identity,
            get: None,
            post: None,
        }
    }

    /// 没有源文件的页面，用于未匹配路由的响应。
    pub(crate) fn unnamed() -> Self {
        Self {
            source: String::new(),
            identity: None,
            get: None,
            post: None,
        }
    }

    pub fn get(mut self, f: PageFn) -> Self {
        self.get = Some(f);
        self
    }

    pub fn post(mut self, f: PageFn) -> Self {
        self.post = Some(f);
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 去掉基目录前缀与扩展名后的路径，例如 `handlers/foo/bar.rs` → `foo/bar`。
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn default_template(&self, ext: &str) -> Option<String> {
        self.identity().map(|name| format!("{}.{}", name, ext))
    }

    pub(crate) fn get_fn(&self) -> Option<PageFn> {
        self.get
    }

    pub(crate) fn post_fn(&self) -> Option<PageFn> {
        self.post
    }
}

fn identity_of(source: &str, base: &str) -> Option<String> {
    let pattern = format!("{}/([^.]*)", regex::escape(base));
    let re = Regex::new(&pattern).ok()?;
    re.captures(source)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| !name.is_empty())
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("source", &self.source)
            .field("identity", &self.identity)
            .field("get", &self.get.is_some())
            .field("post", &self.post.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut Handler<'_>, _: &mut ResponseState) -> PageResult {
        Ok(None)
    }

    #[test]
    fn test_identity_strips_base_and_extension() {
        let page = Page::new("src/handlers/foo/bar.rs");
        assert_eq!(page.identity(), Some("foo/bar"));
        assert_eq!(page.default_template("html"), Some("foo/bar.html".to_string()));
        assert_eq!(page.default_template("atom"), Some("foo/bar.atom".to_string()));
    }

    #[test]
    fn test_windows_separators() {
        let page = Page::new("src\\handlers\\default.rs");
        assert_eq!(page.identity(), Some("default"));
    }

    #[test]
    fn test_custom_base() {
        let page = Page::with_base("app/pages/blog/post.rs", "pages");
        assert_eq!(page.identity(), Some("blog/post"));
    }

    #[test]
    fn test_no_identity_outside_base() {
        let page = Page::new("src/main.rs");
        assert_eq!(page.identity(), None);
        assert_eq!(page.default_template("html"), None);
    }

    #[test]
    fn test_same_stripped_path_collides() {
        let a = Page::new("src/handlers/foo/bar.rs");
        let b = Page::new("other/handlers/foo/bar.py");
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_builder_methods() {
        let page = Page::new("handlers/x.rs").get(noop);
        assert!(page.get_fn().is_some());
        assert!(page.post_fn().is_none());
        assert_eq!(
            format!("{:?}", page),
            "Page { source: \"handlers/x.rs\", identity: Some(\"x\"), get: true, post: false }"
        );
    }
}
