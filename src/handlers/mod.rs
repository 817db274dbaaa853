//! 演示页面与路由表。

mod default;
mod greetings;

use megaera::{exception::Exception, template::FileTemplates, util::escape_html, Router};
use minijinja::Value;

/// `base` 为页面源文件的基目录，用来推出页面标识与默认模板。
pub fn router(base: &str) -> Result<Router, Exception> {
    Router::new()
        .path_with_page("/", default::page(base))?
        .path_with_page("/greetings", greetings::page(base))
}

/// 模板过滤器：`{{ name|bold }}`
pub fn install_filters(templates: &mut FileTemplates) {
    templates
        .environment_mut()
        .add_filter("bold", |s: String| Value::from_safe_string(format!("<b>{}</b>", escape_html(&s))));
}
