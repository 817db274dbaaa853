use crate::request::Request;
use crate::util::encode_component;

/// 宿主环境的用户与会话接口。
pub trait UserProvider: Send + Sync {
    fn is_current_user_admin(&self, request: &Request) -> bool;
    fn create_login_url(&self, uri: &str) -> String;
    fn create_logout_url(&self, uri: &str) -> String;
}

/// 开发环境使用的用户提供者：管理员身份由配置决定，登录地址指向本地页面。
#[derive(Debug, Clone, Default)]
pub struct DevUsers {
    admin: bool,
}

impl DevUsers {
    pub fn new(admin: bool) -> Self {
        Self { admin }
    }
}

impl UserProvider for DevUsers {
    fn is_current_user_admin(&self, _request: &Request) -> bool {
        self.admin
    }

    fn create_login_url(&self, uri: &str) -> String {
        format!("/_login?continue={}", encode_component(uri))
    }

    fn create_logout_url(&self, uri: &str) -> String {
        format!("/_logout?continue={}", encode_component(uri))
    }
}
