use std::sync::Arc;

use log::info;

use crate::cache::{CacheStore, MemoryStore};
use crate::config::{self, Config};
use crate::template::{FileTemplates, TemplateEngine};
use crate::users::{DevUsers, UserProvider};
use crate::value::{Fields, Value};

/// 进程级的渲染上下文：配置、模板引擎、缓存存储与用户提供者。
///
/// 在进程启动时构造一次，以引用的形式传给每一次分发。
pub struct App {
    config: Config,
    templates: Box<dyn TemplateEngine>,
    store: Arc<dyn CacheStore>,
    users: Box<dyn UserProvider>,
}

impl App {
    pub fn new(
        config: Config,
        templates: Box<dyn TemplateEngine>,
        store: Arc<dyn CacheStore>,
        users: Box<dyn UserProvider>,
    ) -> Self {
        Self {
            config,
            templates,
            store,
            users,
        }
    }

    /// 按配置装配默认组件：文件模板、进程内 LRU 存储、开发用户。
    pub fn from_config(config: Config) -> Self {
        info!(
            "模板根目录：{}，缓存容量：{}，环境：{}",
            config.templates_root(),
            config.cache_size(),
            config.environment().name()
        );
        let templates = FileTemplates::new(config.templates_root());
        let store = MemoryStore::from_capacity(config.cache_size());
        let users = DevUsers::new(config.admin());
        Self::new(config, Box::new(templates), Arc::new(store), Box::new(users))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn templates(&self) -> &dyn TemplateEngine {
        self.templates.as_ref()
    }

    pub fn store(&self) -> &dyn CacheStore {
        self.store.as_ref()
    }

    pub fn users(&self) -> &dyn UserProvider {
        self.users.as_ref()
    }

    /// 按当前环境分支后的本地配置。
    pub fn local_config(&self) -> Fields {
        config::local_config(
            self.store(),
            self.config.local_config(),
            self.config.environment(),
        )
    }

    pub fn config_get(&self, key: &str) -> Value {
        config::config_get(
            self.store(),
            self.config.local_config(),
            self.config.environment(),
            key,
        )
    }
}
