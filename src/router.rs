use log::{debug, error};
use regex::Regex;

use crate::exception::Exception;
use crate::page::Page;

/// 路由表：按注册顺序匹配，第一条命中的路由生效。
///
/// 模式是字面路径（可含正则捕获组），自动允许末尾的斜杠与
/// `.(yaml|json|xml|atom)` 格式后缀。
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<(Regex, Page)>,
}

/// 一次路由匹配的结果。
#[derive(Debug, Clone)]
pub struct RouteMatch<'r> {
    pub page: &'r Page,
    /// 位置捕获组，未参与匹配的组为空串
    pub args: Vec<String>,
    /// 识别到的格式后缀
    pub ext: Option<String>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn path_with_page(mut self, pattern: &str, page: Page) -> Result<Self, Exception> {
        let full = format!(r"^{}/*(?:\.(?P<ext>yaml|json|xml|atom))?$", pattern.trim_end_matches('/'));
        let re = match Regex::new(&full) {
            Ok(re) => re,
            Err(e) => {
                error!("无法编译路由模式{}：{}", pattern, e);
                return Err(Exception::InvalidRoutePattern);
            }
        };
        debug!("注册路由{} -> {:?}", full, page.identity());
        self.routes.push((re, page));
        Ok(self)
    }

    pub fn route(&self, path: &str) -> Option<RouteMatch<'_>> {
        for (re, page) in &self.routes {
            let caps = match re.captures(path) {
                Some(caps) => caps,
                None => continue,
            };
            let ext = caps.name("ext").map(|m| m.as_str().to_string());
            let args = re
                .capture_names()
                .enumerate()
                .skip(1)
                .filter(|(_, name)| *name != Some("ext"))
                .map(|(i, _)| caps.get(i).map_or(String::new(), |m| m.as_str().to_string()))
                .collect();
            return Some(RouteMatch { page, args, ext });
        }
        None
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
