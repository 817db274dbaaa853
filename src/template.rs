//! 模板引擎接口与基于文件系统的实现。
//!
//! 分发器只依赖 [`TemplateEngine`]：给定模板路径与变量作用域，返回渲染文本。

use std::error::Error as _;
use std::path::{Path, PathBuf};

use log::debug;
use minijinja::{path_loader, AutoEscape, Environment};

use crate::exception::TemplateError;

pub trait TemplateEngine: Send + Sync {
    /// 模板文件是否存在。路径相对于模板根目录。
    fn exists(&self, path: &str) -> bool;

    fn render(&self, path: &str, scope: &serde_json::Value) -> Result<String, TemplateError>;
}

/// 从模板根目录加载 Jinja 风格模板。
///
/// `.html`、`.htm`、`.xml` 与 `.atom` 模板开启 HTML 自动转义。
pub struct FileTemplates {
    root: PathBuf,
    env: Environment<'static>,
}

impl FileTemplates {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let mut env = Environment::new();
        env.set_loader(path_loader(&root));
        env.set_auto_escape_callback(auto_escape);
        debug!("模板根目录：{}", root.display());
        Self { root, env }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 用于注册自定义过滤器、测试与全局变量。
    pub fn environment_mut(&mut self) -> &mut Environment<'static> {
        &mut self.env
    }
}

fn auto_escape(name: &str) -> AutoEscape {
    match name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("html") | Some("htm") | Some("xml") | Some("atom") => AutoEscape::Html,
        _ => AutoEscape::None,
    }
}

impl TemplateEngine for FileTemplates {
    fn exists(&self, path: &str) -> bool {
        !path.is_empty() && self.root.join(path).is_file()
    }

    fn render(&self, path: &str, scope: &serde_json::Value) -> Result<String, TemplateError> {
        let template = self.env.get_template(path).map_err(convert)?;
        template.render(scope).map_err(convert)
    }
}

/// 错误信息本身作为消息，调试输出（含模板名、行号与源码片段）逐行作为跟踪。
fn convert(error: minijinja::Error) -> TemplateError {
    let mut trace: Vec<String> = format!("{:?}", error)
        .lines()
        .map(|line| line.trim_end().to_string())
        .filter(|line| !line.is_empty())
        .collect();
    let mut source = error.source();
    while let Some(cause) = source {
        trace.push(format!("caused by: {}", cause));
        source = cause.source();
    }
    TemplateError::new(error.to_string(), trace)
}
