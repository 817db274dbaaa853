use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use log::{debug, warn};
use lru::LruCache;

use crate::exception::StoreError;
use crate::value::Fields;

/// 页面缓存所在的命名空间
pub const HANDLER_CACHE_NAMESPACE: &str = "handler-cache";

/// 缓存键各部分之间的分隔符
const KEY_SEPARATOR: &str = "-";

/// 键值缓存存储。多个请求会并发读写同一个存储。
///
/// `ttl` 以秒为单位，0 表示不过期。
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str, namespace: &str) -> Result<Option<Fields>, StoreError>;
    fn set(&self, key: &str, value: Fields, ttl: u64, namespace: &str) -> Result<(), StoreError>;
    fn delete(&self, key: &str, namespace: &str) -> Result<(), StoreError>;
}

#[derive(Clone)]
struct CacheEntry {
    fields: Fields,
    expires_at: Option<SystemTime>,
}

/// 进程内的 LRU 存储
pub struct MemoryStore {
    cache: Mutex<LruCache<String, CacheEntry>>,
}

impl MemoryStore {
    // 根据容量构造
    pub fn from_capacity(capacity: usize) -> Self {
        if capacity == 0 {
            panic!("调用from_capacity时指定的大小是0。如果需要自动设置大小，请在调用处进行处理，而不是传入0");
        }
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, CacheEntry>> {
        match self.cache.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("缓存锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }
}

fn namespaced(key: &str, namespace: &str) -> String {
    format!("{}:{}", namespace, key)
}

impl CacheStore for MemoryStore {
    // 查询有效缓存，过期条目顺便清除
    fn get(&self, key: &str, namespace: &str) -> Result<Option<Fields>, StoreError> {
        let full_key = namespaced(key, namespace);
        let mut cache = self.lock();
        let expired = match cache.get(&full_key) {
            Some(entry) => match entry.expires_at {
                Some(deadline) if SystemTime::now() >= deadline => true,
                _ => return Ok(Some(entry.fields.clone())),
            },
            None => return Ok(None),
        };
        if expired {
            debug!("缓存条目{}已过期", full_key);
            cache.pop(&full_key);
        }
        Ok(None)
    }

    // 放入
    fn set(&self, key: &str, value: Fields, ttl: u64, namespace: &str) -> Result<(), StoreError> {
        let expires_at = match ttl {
            0 => None,
            secs => Some(SystemTime::now() + Duration::from_secs(secs)),
        };
        let entry = CacheEntry {
            fields: value,
            expires_at,
        };
        self.lock().put(namespaced(key, namespace), entry);
        Ok(())
    }

    fn delete(&self, key: &str, namespace: &str) -> Result<(), StoreError> {
        self.lock().pop(&namespaced(key, namespace));
        Ok(())
    }
}

/// 用 `-` 连接页面标识与变体标签中非空的部分。两者都为空时返回空串。
pub fn cache_key(page_identity: Option<&str>, vary: Option<&str>) -> String {
    [page_identity, vary]
        .iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<&str>>()
        .join(KEY_SEPARATOR)
}

/// 以页面标识为键空间的读穿缓存。
///
/// 存储的任何失败都只会被记录，表现为一次未命中或空操作。
pub struct PageCache<'a> {
    store: &'a dyn CacheStore,
    identity: Option<&'a str>,
}

impl<'a> PageCache<'a> {
    pub fn new(store: &'a dyn CacheStore, identity: Option<&'a str>) -> Self {
        Self { store, identity }
    }

    pub fn lookup(&self, vary: Option<&str>) -> Option<Fields> {
        let key = cache_key(self.identity, vary);
        if key.is_empty() {
            warn!("页面标识与变体标签均为空，跳过缓存查询");
            return None;
        }
        match self.store.get(&key, HANDLER_CACHE_NAMESPACE) {
            Ok(found) => {
                debug!("缓存查询{}：{}", key, if found.is_some() { "命中" } else { "未命中" });
                found
            }
            Err(e) => {
                warn!("缓存查询{}失败，按未命中处理：{}", key, e);
                None
            }
        }
    }

    pub fn store(&self, ttl: u64, vary: Option<&str>, fields: &Fields) {
        let key = cache_key(self.identity, vary);
        if key.is_empty() {
            warn!("页面标识与变体标签均为空，跳过缓存写入");
            return;
        }
        if let Err(e) = self.store.set(&key, fields.clone(), ttl, HANDLER_CACHE_NAMESPACE) {
            warn!("缓存写入{}失败，已忽略：{}", key, e);
        }
    }

    /// 删除条目。`identity` 为空时使用当前页面。
    pub fn invalidate(&self, identity: Option<&str>, vary: Option<&str>) {
        let key = cache_key(identity.or(self.identity), vary);
        if key.is_empty() {
            return;
        }
        if let Err(e) = self.store.delete(&key, HANDLER_CACHE_NAMESPACE) {
            warn!("缓存失效{}失败，已忽略：{}", key, e);
        }
    }
}
