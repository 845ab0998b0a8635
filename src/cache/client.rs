//! # Redis 计数器客户端
//!
//! 基于 `ConnectionManager` 的连接复用；命令失败一律映射为
//! `RateLimiterUnavailable`，由配额阶段决定是否降级放行

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use super::CounterStore;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo};

pub struct RedisCounterStore {
    connection_manager: ConnectionManager,
}

impl RedisCounterStore {
    /// 建立连接；启动时调用一次
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| ProxyError::rate_limiter_unavailable_with_source("创建 Redis 客户端失败", e))?;
        let connection_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| ProxyError::rate_limiter_unavailable_with_source("建立 Redis 连接失败", e))?;
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::CounterStore,
            "redis_connected",
            "Redis 连接建立成功"
        );
        Ok(Self { connection_manager })
    }

    /// 测试连接
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| ProxyError::rate_limiter_unavailable_with_source("Redis ping 失败", e))?;
        if response == "PONG" {
            Ok(())
        } else {
            Err(ProxyError::rate_limiter_unavailable("Redis ping 响应异常"))
        }
    }
}

impl Clone for RedisCounterStore {
    fn clone(&self) -> Self {
        Self {
            connection_manager: self.connection_manager.clone(),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn set_nx_ex(&self, key: &str, value: i64, ttl_seconds: i64) -> Result<bool> {
        let mut conn = self.connection_manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if ttl_seconds > 0 {
            cmd.arg("EX").arg(ttl_seconds);
        }
        // SET NX 未写入时回 nil
        let reply: Option<String> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| ProxyError::rate_limiter_unavailable_with_source("SET NX EX 失败", e))?;
        ldebug!(
            "system",
            LogStage::Cache,
            LogComponent::CounterStore,
            "set_nx_ex",
            &format!("key={key}, inserted={}", reply.is_some())
        );
        Ok(reply.is_some())
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection_manager.clone();
        let value: i64 = conn
            .decr(key, 1)
            .await
            .map_err(|e| ProxyError::rate_limiter_unavailable_with_source("DECR 失败", e))?;
        Ok(value)
    }

    async fn get_with_ttl(&self, key: &str) -> Result<(Option<i64>, i64)> {
        let mut conn = self.connection_manager.clone();
        // pipeline 合并 GET + TTL，减少一次往返
        let (value, ttl): (Option<i64>, i64) = redis::pipe()
            .get(key)
            .ttl(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| ProxyError::rate_limiter_unavailable_with_source("GET/TTL 失败", e))?;
        // TTL 为 -1（无过期）或 -2（不存在）时统一记 0
        Ok((value, ttl.max(0)))
    }

    async fn set_ex(&self, key: &str, value: i64, ttl_seconds: i64) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        if ttl_seconds > 0 {
            conn.set_ex::<_, _, ()>(key, value, ttl_seconds as u64)
                .await
                .map_err(|e| ProxyError::rate_limiter_unavailable_with_source("SET EX 失败", e))?;
        } else {
            conn.set::<_, _, ()>(key, value)
                .await
                .map_err(|e| ProxyError::rate_limiter_unavailable_with_source("SET 失败", e))?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection_manager.clone();
        let deleted: i64 = conn
            .del(key)
            .await
            .map_err(|e| ProxyError::rate_limiter_unavailable_with_source("DEL 失败", e))?;
        Ok(deleted > 0)
    }
}
