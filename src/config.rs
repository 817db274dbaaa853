use num_cpus;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{debug, error, warn};
use std::env;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;

use crate::cache::CacheStore;
use crate::exception::Exception;
use crate::value::{Fields, Value};

/// 覆盖配置文件中 `environment` 的环境变量
pub const ENVIRONMENT_VAR: &str = "MEGAERA_ENV";

/// 本地配置在缓存存储中的命名空间
pub const CONFIG_NAMESPACE: &str = "config";

/// 部署环境
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    pub fn is_dev(&self) -> bool {
        *self == Environment::Dev
    }

    pub fn name(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Some(Environment::Dev),
            "prod" | "production" => Some(Environment::Prod),
            _ => None,
        }
    }

    /// 按环境分支取值。
    ///
    /// 形如 `{dev: x, prod: y}` 的映射（键只包含环境名）在开发环境下取 `x`，
    /// 其余值原样返回。
    pub fn branch(&self, value: Value) -> Value {
        match value {
            Value::Map(mut map)
                if !map.is_empty()
                    && map.keys().all(|k| Environment::parse(k).is_some()) =>
            {
                let key = map
                    .keys()
                    .find(|k| Environment::parse(k) == Some(*self))
                    .cloned();
                key.and_then(|k| map.remove(&k)).unwrap_or(Value::Null)
            }
            other => other,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_templates_root")]
    templates_root: String,
    #[serde(default = "default_handlers_base")]
    handlers_base: String,
    port: u16,
    worker_threads: usize,
    cache_size: usize,
    local: bool,
    #[serde(default = "default_environment")]
    environment: Environment,
    #[serde(default = "default_local_config")]
    local_config: String,
    #[serde(default)]
    admin: bool,
}

fn default_templates_root() -> String {
    "templates".to_string()
}

fn default_handlers_base() -> String {
    "handlers".to_string()
}

fn default_environment() -> Environment {
    Environment::Dev
}

fn default_local_config() -> String {
    "local.yaml".to_string()
}

impl Config {
    pub fn new() -> Self {
        Self {
            templates_root: default_templates_root(),
            handlers_base: default_handlers_base(),
            port: 7878,
            worker_threads: 0,
            cache_size: 5,
            local: true,
            environment: default_environment(),
            local_config: default_local_config(),
            admin: false,
        }
    }

    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let mut file = match File::open(filename) {
            Ok(f) => f,
            Err(e) => {
                error!("无法打开配置文件{}：{}", filename, e);
                return Err(Exception::ConfigNotFound);
            }
        };
        let mut str_val = String::new();
        if let Err(e) = file.read_to_string(&mut str_val) {
            error!("读取配置文件{}失败：{}", filename, e);
            return Err(Exception::ConfigNotFound);
        }
        Self::from_toml_str(&str_val)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, Exception> {
        let mut raw_config: Config = match toml::from_str(source) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象：{}", e);
                return Err(Exception::ConfigInvalid);
            }
        };
        if raw_config.worker_threads == 0 {
            raw_config.worker_threads = num_cpus::get();
        }
        if raw_config.cache_size == 0 {
            warn!("cache_size被设置为0，但目前尚不支持禁用缓存，因此该值将被改为5。");
            raw_config.cache_size = 5;
        }
        if let Ok(name) = env::var(ENVIRONMENT_VAR) {
            match Environment::parse(&name) {
                Some(environment) => raw_config.environment = environment,
                None => warn!("无法识别的环境名{}={}，保留配置文件中的设置", ENVIRONMENT_VAR, name),
            }
        }
        Ok(raw_config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn templates_root(&self) -> &str {
        &self.templates_root
    }

    pub fn handlers_base(&self) -> &str {
        &self.handlers_base
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn is_dev(&self) -> bool {
        self.environment.is_dev()
    }

    pub fn local_config(&self) -> &str {
        &self.local_config
    }

    pub fn admin(&self) -> bool {
        self.admin
    }

    pub fn set_templates_root(&mut self, root: &str) -> &mut Self {
        self.templates_root = root.to_string();
        self
    }

    pub fn set_environment(&mut self, environment: Environment) -> &mut Self {
        self.environment = environment;
        self
    }

    pub fn set_local_config(&mut self, filename: &str) -> &mut Self {
        self.local_config = filename.to_string();
        self
    }

    pub fn set_admin(&mut self, admin: bool) -> &mut Self {
        self.admin = admin;
        self
    }
}

/// 读取应用的本地配置（YAML），并按当前环境对每个顶层值分支。
///
/// 结果在缓存存储中按文件名缓存；存储故障只记录日志。文件不存在时返回空映射。
pub fn local_config(store: &dyn CacheStore, filename: &str, environment: Environment) -> Fields {
    let cache_key = format!("config:{}", filename);
    match store.get(&cache_key, CONFIG_NAMESPACE) {
        Ok(Some(config)) if !config.is_empty() => return config,
        Ok(_) => {}
        Err(e) => warn!("读取缓存的本地配置失败：{}", e),
    }
    if !Path::new(filename).exists() {
        debug!("本地配置文件{}不存在", filename);
        return Fields::new();
    }
    let config = match load_yaml(filename) {
        Some(Value::Map(map)) => map
            .into_iter()
            .map(|(key, value)| (key, environment.branch(value)))
            .collect::<Fields>(),
        Some(_) => {
            warn!("本地配置文件{}的顶层不是映射，已忽略", filename);
            return Fields::new();
        }
        None => return Fields::new(),
    };
    if let Err(e) = store.set(&cache_key, config.clone(), 0, CONFIG_NAMESPACE) {
        warn!("缓存本地配置失败：{}", e);
    }
    config
}

/// 读取本地配置中的单个键，不存在时为 `Value::Null`。
pub fn config_get(store: &dyn CacheStore, filename: &str, environment: Environment, key: &str) -> Value {
    local_config(store, filename, environment)
        .remove(key)
        .unwrap_or(Value::Null)
}

fn load_yaml(filename: &str) -> Option<Value> {
    let source = match std::fs::read_to_string(filename) {
        Ok(s) => s,
        Err(e) => {
            error!("读取本地配置文件{}失败：{}", filename, e);
            return None;
        }
    };
    match serde_yaml::from_str::<serde_yaml::Value>(&source) {
        Ok(yaml) => Some(Value::from(yaml)),
        Err(e) => {
            error!("解析本地配置文件{}失败：{}", filename, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
port = 8080
worker_threads = 0
cache_size = 0
local = true
environment = "prod"
"#;

    #[test]
    fn test_from_toml_str_applies_defaults() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.port(), 8080);
        assert_eq!(config.templates_root(), "templates");
        assert_eq!(config.handlers_base(), "handlers");
        assert_eq!(config.local_config(), "local.yaml");
        assert_eq!(config.cache_size(), 5);
        assert!(config.worker_threads() > 0);
        assert!(!config.admin());
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml_str("port = \"not a number\"");
        assert_eq!(result.unwrap_err(), Exception::ConfigInvalid);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_toml("/nonexistent/megaera.toml");
        assert_eq!(result.unwrap_err(), Exception::ConfigNotFound);
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("dev"), Some(Environment::Dev));
        assert_eq!(Environment::parse("Production"), Some(Environment::Prod));
        assert_eq!(Environment::parse("staging"), None);
    }

    #[test]
    fn test_branch_selects_environment() {
        let value = Value::from(json!({"dev": "zombie", "prod": "monkey"}));
        assert_eq!(Environment::Dev.branch(value.clone()), Value::from("zombie"));
        assert_eq!(Environment::Prod.branch(value), Value::from("monkey"));
    }

    #[test]
    fn test_branch_leaves_other_values() {
        assert_eq!(Environment::Dev.branch(Value::from("ninja")), Value::from("ninja"));
        let mixed = Value::from(json!({"dev": 1, "other": 2}));
        assert_eq!(Environment::Dev.branch(mixed.clone()), mixed);
        let dev_only = Value::from(json!({"dev": 1}));
        assert_eq!(Environment::Prod.branch(dev_only), Value::Null);
    }

    #[test]
    fn test_local_config_branches_and_caches() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "pirate: ninja\nrobot:\n  dev: zombie\n  prod: monkey").unwrap();
        let filename = file.path().to_str().unwrap().to_string();
        let store = MemoryStore::from_capacity(4);

        let config = local_config(&store, &filename, Environment::Dev);
        assert_eq!(config.get("pirate"), Some(&Value::from("ninja")));
        assert_eq!(config.get("robot"), Some(&Value::from("zombie")));

        // 缓存命中后不再读取文件
        drop(file);
        let cached = local_config(&store, &filename, Environment::Dev);
        assert_eq!(cached.get("robot"), Some(&Value::from("zombie")));
        assert_eq!(
            config_get(&store, &filename, Environment::Dev, "pirate"),
            Value::from("ninja")
        );
    }

    #[test]
    fn test_local_config_missing_file() {
        let store = MemoryStore::from_capacity(4);
        assert!(local_config(&store, "/nonexistent/local.yaml", Environment::Dev).is_empty());
    }
}
