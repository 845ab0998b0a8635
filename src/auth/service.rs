//! # API Key 认证服务
//!
//! 凭证验证、provider 授权解析与记账消耗。
//! 认证失败一律回 `UnauthorizedApiKey`，存储异常回 `DatabaseError`。

use std::sync::Arc;

use chrono::Utc;

use crate::auth::api_key;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::lwarn;
use crate::quota::RateLimiter;
use crate::store::{ApiKeyRecord, KeyStore, ProviderAccessRecord, UserStore};
use crate::types::{AccessStatus, ProviderName};

pub struct ApiKeyAuthService {
    user_store: Arc<dyn UserStore>,
    key_store: Arc<dyn KeyStore>,
    rate_limiter: Arc<RateLimiter>,
    secret_key: String,
}

impl ApiKeyAuthService {
    pub fn new(
        user_store: Arc<dyn UserStore>,
        key_store: Arc<dyn KeyStore>,
        rate_limiter: Arc<RateLimiter>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            user_store,
            key_store,
            rate_limiter,
            secret_key: secret_key.into(),
        }
    }

    /// 验证令牌并取回对应的 API Key 记录。
    /// 依序校验：签章、payload 字段、使用者存在、Key 存在、归属一致。
    pub async fn validate_key(&self, token: &str) -> Result<ApiKeyRecord> {
        let payload = api_key::verify(token, &self.secret_key).map_err(|e| {
            ProxyError::unauthorized_api_key_with_source(
                "invalid api key: signature verification failed",
                e,
            )
        })?;

        if payload.user_id.is_empty() {
            return Err(ProxyError::unauthorized_api_key(
                "invalid api key: missing user ID",
            ));
        }
        if payload.api_key_id.is_empty() {
            return Err(ProxyError::unauthorized_api_key(
                "invalid api key: missing API key ID",
            ));
        }

        let user = self.user_store.get_user(&payload.user_id).await?;
        if user.is_none() {
            return Err(ProxyError::unauthorized_api_key(
                "invalid api key: user not found",
            ));
        }

        let record = self
            .key_store
            .get_api_key(&payload.api_key_id)
            .await?
            .ok_or_else(|| ProxyError::unauthorized_api_key("invalid api key: key not found"))?;
        if record.key_value.is_empty() {
            return Err(ProxyError::unauthorized_api_key(
                "invalid api key: key not found",
            ));
        }
        // payload 的 user_id 必须与记录归属一致
        if record.user_id != payload.user_id {
            return Err(ProxyError::unauthorized_api_key(
                "invalid api key: owner mismatch",
            ));
        }

        Ok(record)
    }

    /// 解析指定 provider 的访问授权：取第一条 active 记录；
    /// 已过绝对期限的记录会被标记为 expired（持久化副作用）后拒绝。
    pub async fn validate_provider_access(
        &self,
        record: &ApiKeyRecord,
        provider: ProviderName,
    ) -> Result<ProviderAccessRecord> {
        let access = record
            .active_access(provider)
            .ok_or_else(|| ProxyError::unauthorized_api_key("no active provider key found"))?
            .clone();

        let now = Utc::now();
        if let Some(expire_time) = access.expire_time {
            if expire_time < now {
                self.key_store
                    .update_access_status(&record.id, provider, AccessStatus::Expired)
                    .await?;
                return Err(ProxyError::unauthorized_api_key(
                    "Provider access has expired",
                ));
            }
        }

        Ok(access)
    }

    /// 消耗一次配额：热计数器扣减在前，持久计数累加在后。
    /// 两者任一失败即让请求失败，即便上游已经成功。
    pub async fn consume(
        &self,
        api_key_id: &str,
        access: &ProviderAccessRecord,
    ) -> Result<i64> {
        let Some(period) = access.limit_period else {
            return Ok(0);
        };
        let Some(limit) = access.limit_count else {
            return Ok(0);
        };
        if limit <= 0 {
            return Ok(0);
        }

        let window = period.window_seconds();
        let outcome = self
            .rate_limiter
            .consume(api_key_id, access.provider, period, window, limit)
            .await
            .map_err(|e| {
                lwarn!(
                    "system",
                    LogStage::Accounting,
                    LogComponent::Quota,
                    "consume_failed",
                    &format!("rate limiter consume failed: {e}")
                );
                ProxyError::rate_limiter_unavailable_with_source(
                    "rate limiter consume failed",
                    e,
                )
            })?;

        self.key_store
            .increment_access_used_count(api_key_id, access.provider, 1)
            .await?;

        Ok(outcome.remaining)
    }

    #[must_use]
    pub fn user_store(&self) -> &Arc<dyn UserStore> {
        &self.user_store
    }

    #[must_use]
    pub fn key_store(&self) -> &Arc<dyn KeyStore> {
        &self.key_store
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }
}
