//! # 持久层适配器
//!
//! 使用者与 API Key 文档的读写契约。核心管线只依赖这里的 trait；
//! 生产实现基于 Sea-ORM，测试使用内存实现（`crate::testing`）。

mod records;
mod sea_orm_store;

pub use records::{ApiKeyRecord, ProviderAccessRecord, UserRecord};
pub use sea_orm_store::SeaOrmStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{AccessStatus, ProviderName};

/// 使用者文档读写
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>>;

    async fn update_user_last_seen(&self, id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// API Key 文档读写；provider 维度的更新以 `(api_key_id, provider)` 定位
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn get_api_key(&self, id: &str) -> Result<Option<ApiKeyRecord>>;

    async fn update_access_status(
        &self,
        api_key_id: &str,
        provider: ProviderName,
        status: AccessStatus,
    ) -> Result<()>;

    async fn update_access_last_reset_at(
        &self,
        api_key_id: &str,
        provider: ProviderName,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// 覆写已用次数（窗口重置时归零）
    async fn update_access_used_count(
        &self,
        api_key_id: &str,
        provider: ProviderName,
        used_count: i64,
    ) -> Result<()>;

    /// 原子累加已用次数并刷新 last_seen；记账成功路径调用
    async fn increment_access_used_count(
        &self,
        api_key_id: &str,
        provider: ProviderName,
        delta: i64,
    ) -> Result<()>;
}

/// 遮蔽凭证：仅显示前 4 后 4
#[must_use]
pub fn mask_key(key: &str) -> String {
    if key.len() <= 8 {
        "****".to_string()
    } else {
        format!("{}****{}", &key[..4], &key[key.len() - 4..])
    }
}
