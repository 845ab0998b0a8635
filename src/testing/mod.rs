//! # 测试替身与夹具
//!
//! 集成测试用的内存存储：不碰外部服务，行为与生产实现的契约一致

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{ProxyError, Result};
use crate::store::{ApiKeyRecord, KeyStore, ProviderAccessRecord, UserRecord, UserStore};
use crate::types::{AccessStatus, LimitPeriod, ProviderName};

/// 内存版使用者 + API Key 存储
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, UserRecord>>,
    keys: Mutex<HashMap<String, ApiKeyRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: UserRecord) {
        self.users.lock().unwrap().insert(user.id.clone(), user);
    }

    pub fn insert_api_key(&self, record: ApiKeyRecord) {
        self.keys.lock().unwrap().insert(record.id.clone(), record);
    }

    /// 直接读取授权记录，供断言副作用（如过期标记、used_count）
    #[must_use]
    pub fn access_of(&self, api_key_id: &str, provider: ProviderName) -> Option<ProviderAccessRecord> {
        self.keys
            .lock()
            .unwrap()
            .get(api_key_id)
            .and_then(|record| {
                record
                    .provider_access
                    .iter()
                    .find(|access| access.provider == provider)
                    .cloned()
            })
    }

    fn with_access<F>(&self, api_key_id: &str, provider: ProviderName, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut ProviderAccessRecord),
    {
        let mut keys = self.keys.lock().unwrap();
        let record = keys
            .get_mut(api_key_id)
            .ok_or_else(|| ProxyError::database("api key not found"))?;
        let access = record
            .provider_access
            .iter_mut()
            .find(|access| access.provider == provider)
            .ok_or_else(|| ProxyError::database("provider access not found"))?;
        mutate(access);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.lock().unwrap().get(id).cloned())
    }

    async fn update_user_last_seen(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.users.lock().unwrap().get_mut(id) {
            user.last_seen = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn get_api_key(&self, id: &str) -> Result<Option<ApiKeyRecord>> {
        Ok(self.keys.lock().unwrap().get(id).cloned())
    }

    async fn update_access_status(
        &self,
        api_key_id: &str,
        provider: ProviderName,
        status: AccessStatus,
    ) -> Result<()> {
        self.with_access(api_key_id, provider, |access| access.status = status)
    }

    async fn update_access_last_reset_at(
        &self,
        api_key_id: &str,
        provider: ProviderName,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_access(api_key_id, provider, |access| {
            access.last_reset_at = Some(at);
        })
    }

    async fn update_access_used_count(
        &self,
        api_key_id: &str,
        provider: ProviderName,
        used_count: i64,
    ) -> Result<()> {
        self.with_access(api_key_id, provider, |access| {
            access.used_count = used_count;
        })
    }

    async fn increment_access_used_count(
        &self,
        api_key_id: &str,
        provider: ProviderName,
        delta: i64,
    ) -> Result<()> {
        self.with_access(api_key_id, provider, |access| {
            access.used_count += delta;
            access.last_seen = Some(Utc::now());
        })
    }
}

/// 构造一个 active 使用者
#[must_use]
pub fn make_user(id: &str, display_name: &str) -> UserRecord {
    UserRecord {
        id: id.to_string(),
        display_name: display_name.to_string(),
        status: AccessStatus::Active,
        last_seen: None,
    }
}

/// 构造一条 provider 授权
#[must_use]
pub fn make_access(
    provider: ProviderName,
    provider_key: &str,
    scopes: &[&str],
) -> ProviderAccessRecord {
    ProviderAccessRecord {
        provider,
        provider_key: provider_key.to_string(),
        status: AccessStatus::Active,
        limit_period: None,
        limit_count: None,
        used_count: 0,
        last_reset_at: None,
        api_scopes: scopes.iter().map(ToString::to_string).collect(),
        expire_time: None,
        last_seen: None,
    }
}

/// 构造一把带授权列表的 API Key
#[must_use]
pub fn make_api_key(
    id: &str,
    user_id: &str,
    key_value: &str,
    access: Vec<ProviderAccessRecord>,
) -> ApiKeyRecord {
    ApiKeyRecord {
        id: id.to_string(),
        user_id: user_id.to_string(),
        key_name: "test-project".to_string(),
        key_value: key_value.to_string(),
        provider_access: access,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// 给授权加上配额窗口
#[must_use]
pub fn with_quota(
    mut access: ProviderAccessRecord,
    period: LimitPeriod,
    limit: i64,
) -> ProviderAccessRecord {
    access.limit_period = Some(period);
    access.limit_count = Some(limit);
    access
}
