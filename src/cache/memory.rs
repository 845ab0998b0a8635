//! # 内存计数器后端
//!
//! 单进程内的计数器实现：Mutex 保证 set-nx / decr 的原子性，
//! 过期在读取路径惰性处理

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::CounterStore;
use crate::error::Result;

#[derive(Debug)]
struct Entry {
    value: i64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    fn ttl_seconds(&self) -> i64 {
        match self.expires_at {
            Some(at) => {
                let now = Instant::now();
                if at <= now {
                    0
                } else {
                    // 对齐 Redis TTL 的整秒向上语意
                    let remain = at - now;
                    i64::try_from(remain.as_secs()).unwrap_or(i64::MAX).max(1)
                }
            }
            None => 0,
        }
    }
}

#[derive(Default)]
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn set_nx_ex(&self, key: &str, value: i64, ttl_seconds: i64) -> Result<bool> {
        let mut entries = self.entries.lock().expect("counter store poisoned");
        if let Some(existing) = entries.get(key) {
            if !existing.expired() {
                return Ok(false);
            }
        }
        let expires_at = (ttl_seconds > 0)
            .then(|| Instant::now() + Duration::from_secs(ttl_seconds as u64));
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(true)
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        let mut entries = self.entries.lock().expect("counter store poisoned");
        match entries.get_mut(key) {
            Some(entry) if !entry.expired() => {
                entry.value -= 1;
                Ok(entry.value)
            }
            _ => {
                // Redis 对不存在的 key DECR 会初始化为 -1
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: -1,
                        expires_at: None,
                    },
                );
                Ok(-1)
            }
        }
    }

    async fn get_with_ttl(&self, key: &str) -> Result<(Option<i64>, i64)> {
        let mut entries = self.entries.lock().expect("counter store poisoned");
        match entries.get(key) {
            Some(entry) if !entry.expired() => Ok((Some(entry.value), entry.ttl_seconds())),
            Some(_) => {
                entries.remove(key);
                Ok((None, 0))
            }
            None => Ok((None, 0)),
        }
    }

    async fn set_ex(&self, key: &str, value: i64, ttl_seconds: i64) -> Result<()> {
        let mut entries = self.entries.lock().expect("counter store poisoned");
        let expires_at = (ttl_seconds > 0)
            .then(|| Instant::now() + Duration::from_secs(ttl_seconds as u64));
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().expect("counter store poisoned");
        Ok(entries.remove(key).is_some())
    }
}
