//! # 计数器存储
//!
//! 限流器使用的 TTL 整数计数器抽象：Redis 为生产后端，
//! 内存实现供测试与单机部署使用

mod client;
pub mod keys;
mod memory;

pub use client::RedisCounterStore;
pub use memory::MemoryCounterStore;

use async_trait::async_trait;

use crate::error::Result;

/// TTL 整数计数器的最小操作集。
/// 实现必须保证 `set_nx_ex` 与 `decr` 各自原子；
/// 两者组合即可支撑「不存在则初始化，否则扣减」的消耗协议。
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// SET key value NX EX ttl；回传是否真的写入。
    /// `ttl_seconds == 0` 时不设过期。
    async fn set_nx_ex(&self, key: &str, value: i64, ttl_seconds: i64) -> Result<bool>;

    /// 原子扣减并回传扣减后的值
    async fn decr(&self, key: &str) -> Result<i64>;

    /// 一次往返读取值与剩余 TTL。
    /// key 不存在回传 `(None, 0)`；无过期时间时 TTL 记为 0。
    async fn get_with_ttl(&self, key: &str) -> Result<(Option<i64>, i64)>;

    /// 无条件覆写值与 TTL（`ttl_seconds == 0` 时不设过期）
    async fn set_ex(&self, key: &str, value: i64, ttl_seconds: i64) -> Result<()>;

    /// 删除计数器；回传是否存在
    async fn delete(&self, key: &str) -> Result<bool>;
}
