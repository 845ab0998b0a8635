//! # 滑动窗口限流器
//!
//! 每个 `(api_key_id, provider, period)` 一个 TTL 计数器，倒数语意。
//! 消耗协议：SET NX EX 惰性初始化为 `limit - 1`，已存在则原子 DECR；
//! 窗口相对首次消耗时刻固定，不对齐日历。

use std::sync::Arc;

use crate::cache::{keys, CounterStore};
use crate::error::{ProxyError, Result};
use crate::types::{LimitPeriod, ProviderName};

/// 一次限流查询/消耗的结果
#[derive(Debug, Clone, Copy)]
pub struct RateLimitOutcome {
    pub remaining: i64,
    pub ttl_seconds: i64,
    /// 计数器是否已存在（false 表示窗口尚未开启）
    pub initialized: bool,
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    server_name: String,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, server_name: impl Into<String>) -> Self {
        Self {
            store,
            server_name: server_name.into(),
        }
    }

    fn build_key(&self, api_key_id: &str, provider: ProviderName, period: LimitPeriod) -> String {
        keys::rate_limit_key(&self.server_name, api_key_id, provider, period)
    }

    /// 消耗一次配额。
    /// 超限回传 `RateLimitExceeded`；计数器存储异常回传 `RateLimiterUnavailable`。
    pub async fn consume(
        &self,
        api_key_id: &str,
        provider: ProviderName,
        period: LimitPeriod,
        window_seconds: i64,
        limit: i64,
    ) -> Result<RateLimitOutcome> {
        let key = self.build_key(api_key_id, provider, period);

        // 尝试初始化：本次即消耗一次，初值 = limit - 1
        let inserted = self.store.set_nx_ex(&key, limit - 1, window_seconds).await?;
        if inserted {
            let remaining = (limit - 1).max(0);
            if limit <= 0 {
                return Err(ProxyError::rate_limit_exceeded("rate limit exceeded"));
            }
            return Ok(RateLimitOutcome {
                remaining,
                ttl_seconds: window_seconds,
                initialized: true,
            });
        }

        // 已存在 → 原子扣减
        let new_value = self.store.decr(&key).await?;
        let (_, ttl_seconds) = self.store.get_with_ttl(&key).await?;

        if new_value < 0 {
            return Err(ProxyError::rate_limit_exceeded("rate limit exceeded"));
        }

        Ok(RateLimitOutcome {
            remaining: new_value,
            ttl_seconds,
            initialized: true,
        })
    }

    /// 查询目前剩余与 TTL，不产生副作用。
    /// 计数器不存在时回传 `(limit, 0)` 的预视图：下一次消耗才会开窗。
    pub async fn get_current(
        &self,
        api_key_id: &str,
        provider: ProviderName,
        period: LimitPeriod,
        limit: i64,
    ) -> Result<RateLimitOutcome> {
        let key = self.build_key(api_key_id, provider, period);
        let (value, ttl_seconds) = self.store.get_with_ttl(&key).await?;

        match value {
            None => Ok(RateLimitOutcome {
                remaining: limit,
                ttl_seconds: 0,
                initialized: false,
            }),
            Some(v) => Ok(RateLimitOutcome {
                remaining: v.max(0),
                ttl_seconds,
                initialized: true,
            }),
        }
    }

    /// 无条件重置剩余次数与 TTL（管理用）
    pub async fn reset(
        &self,
        api_key_id: &str,
        provider: ProviderName,
        period: LimitPeriod,
        window_seconds: i64,
        limit: Option<i64>,
    ) -> Result<()> {
        let key = self.build_key(api_key_id, provider, period);
        let value = limit.unwrap_or(0).max(0);
        self.store.set_ex(&key, value, window_seconds).await
    }

    /// 彻底移除计数器
    pub async fn delete(
        &self,
        api_key_id: &str,
        provider: ProviderName,
        period: LimitPeriod,
    ) -> Result<bool> {
        let key = self.build_key(api_key_id, provider, period);
        self.store.delete(&key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCounterStore;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryCounterStore::new()), "gw-test")
    }

    #[tokio::test]
    async fn serial_consume_counts_down_then_blocks() {
        let rl = limiter();
        for expect in (0..3).rev() {
            let out = rl
                .consume("k1", ProviderName::OpenAi, LimitPeriod::Daily, 86_400, 3)
                .await
                .unwrap();
            assert_eq!(out.remaining, expect);
            assert!(out.ttl_seconds <= 86_400);
        }
        let err = rl
            .consume("k1", ProviderName::OpenAi, LimitPeriod::Daily, 86_400, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn get_current_preinitialized_view() {
        let rl = limiter();
        let out = rl
            .get_current("k2", ProviderName::OpenAi, LimitPeriod::Daily, 5)
            .await
            .unwrap();
        assert_eq!(out.remaining, 5);
        assert_eq!(out.ttl_seconds, 0);
        assert!(!out.initialized);

        rl.consume("k2", ProviderName::OpenAi, LimitPeriod::Daily, 86_400, 5)
            .await
            .unwrap();
        let out = rl
            .get_current("k2", ProviderName::OpenAi, LimitPeriod::Daily, 5)
            .await
            .unwrap();
        assert_eq!(out.remaining, 4);
        assert!(out.initialized);
        assert!(out.ttl_seconds > 0);
    }

    #[tokio::test]
    async fn zero_limit_rejects_first_consume() {
        let rl = limiter();
        let err = rl
            .consume("k3", ProviderName::OpenAi, LimitPeriod::Daily, 86_400, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn reset_and_delete() {
        let rl = limiter();
        rl.reset("k4", ProviderName::OpenAi, LimitPeriod::Daily, 60, Some(9))
            .await
            .unwrap();
        let out = rl
            .get_current("k4", ProviderName::OpenAi, LimitPeriod::Daily, 9)
            .await
            .unwrap();
        assert_eq!(out.remaining, 9);
        assert!(rl
            .delete("k4", ProviderName::OpenAi, LimitPeriod::Daily)
            .await
            .unwrap());
    }
}
