use std::num::NonZeroUsize;
use std::time::SystemTime;

use log::warn;
use lru::LruCache;

#[derive(Clone)]
struct CacheEntry {
    etag: String,
    modified_time: Option<SystemTime>,
    size: usize,
}

/// 静态文件 ETag 的 LRU 缓存，文件修改时间或大小变化时缓存失效。
pub struct EtagCache {
    cache: LruCache<String, CacheEntry>,
}

impl EtagCache {
    // 根据容量构造
    pub fn from_capacity(capacity: usize) -> Self {
        let capacity = match NonZeroUsize::new(capacity) {
            Some(c) => c,
            None => {
                warn!("ETag缓存的容量被设置为0，目前尚不支持禁用缓存，因此该值将被改为1。");
                NonZeroUsize::MIN
            }
        };
        Self {
            cache: LruCache::new(capacity),
        }
    }
    // 放入
    pub fn push(&mut self, path: &str, etag: String, modified_time: Option<SystemTime>, size: usize) {
        let entry = CacheEntry {
            etag,
            modified_time,
            size,
        };
        self.cache.put(path.to_string(), entry);
    }
    // 查询有效缓存
    pub fn find(&mut self, path: &str, modified_time: Option<SystemTime>, size: usize) -> Option<&str> {
        match self.cache.get(path) {
            Some(entry) if entry.modified_time == modified_time && entry.size == size => {
                Some(entry.etag.as_str())
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_cache_creation() {
        let cache = EtagCache::from_capacity(10);
        assert_eq!(cache.capacity(), 10);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_zero_capacity_is_coerced() {
        let cache = EtagCache::from_capacity(0);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn test_cache_push_and_find() {
        let mut cache = EtagCache::from_capacity(3);
        let time = Some(SystemTime::now());

        cache.push("/index.htm", "\"abc\"".to_string(), time, 10);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.find("/index.htm", time, 10), Some("\"abc\""));
    }

    #[test]
    fn test_cache_invalidated_by_time_or_size() {
        let mut cache = EtagCache::from_capacity(3);
        let time1 = SystemTime::now();
        let time2 = time1 + Duration::from_secs(10);

        cache.push("/a.css", "\"x\"".to_string(), Some(time1), 10);
        assert!(cache.find("/a.css", Some(time2), 10).is_none());
        assert!(cache.find("/a.css", Some(time1), 11).is_none());
        assert!(cache.find("/a.css", None, 10).is_none());
        assert!(cache.find("/a.css", Some(time1), 10).is_some());
    }

    #[test]
    fn test_cache_lru_eviction() {
        let mut cache = EtagCache::from_capacity(2);
        let time = Some(SystemTime::now());

        cache.push("/1", "\"1\"".to_string(), time, 1);
        cache.push("/2", "\"2\"".to_string(), time, 1);
        cache.find("/1", time, 1);
        cache.push("/3", "\"3\"".to_string(), time, 1);

        assert_eq!(cache.len(), 2);
        assert!(cache.find("/2", time, 1).is_none());
        assert!(cache.find("/1", time, 1).is_some());
        assert!(cache.find("/3", time, 1).is_some());
    }
}
