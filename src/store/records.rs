//! # 持久层领域记录
//!
//! 与存储实现解耦的内存表示；实体行与记录的互转在各实现内完成

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AccessStatus, LimitPeriod, ProviderName};

/// 使用者
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub display_name: String,
    pub status: AccessStatus,
    pub last_seen: Option<DateTime<Utc>>,
}

/// API Key 记录与其 provider 授权列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: String,
    pub user_id: String,
    pub key_name: String,
    pub key_value: String,
    pub provider_access: Vec<ProviderAccessRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 单个 provider 的访问授权
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAccessRecord {
    pub provider: ProviderName,
    /// 上游凭证（服务端注入，不外传）
    pub provider_key: String,
    pub status: AccessStatus,
    pub limit_period: Option<LimitPeriod>,
    pub limit_count: Option<i64>,
    pub used_count: i64,
    pub last_reset_at: Option<DateTime<Utc>>,
    pub api_scopes: Vec<String>,
    pub expire_time: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl ApiKeyRecord {
    /// 取第一条 provider 匹配且 active 的授权
    #[must_use]
    pub fn active_access(&self, provider: ProviderName) -> Option<&ProviderAccessRecord> {
        self.provider_access
            .iter()
            .find(|access| access.provider == provider && access.status == AccessStatus::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(provider: ProviderName, status: AccessStatus) -> ProviderAccessRecord {
        ProviderAccessRecord {
            provider,
            provider_key: "sk-upstream".to_string(),
            status,
            limit_period: None,
            limit_count: None,
            used_count: 0,
            last_reset_at: None,
            api_scopes: vec!["*".to_string()],
            expire_time: None,
            last_seen: None,
        }
    }

    #[test]
    fn first_active_match_wins() {
        let record = ApiKeyRecord {
            id: "k1".to_string(),
            user_id: "u1".to_string(),
            key_name: "demo".to_string(),
            key_value: "token".to_string(),
            provider_access: vec![
                access(ProviderName::OpenAi, AccessStatus::Revoked),
                access(ProviderName::OpenAi, AccessStatus::Active),
                access(ProviderName::Gemini, AccessStatus::Active),
            ],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let found = record.active_access(ProviderName::OpenAi).unwrap();
        assert_eq!(found.status, AccessStatus::Active);
        assert!(record.active_access(ProviderName::Grok).is_none());
    }
}
