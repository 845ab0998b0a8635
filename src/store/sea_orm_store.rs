//! # Sea-ORM 存储实现
//!
//! `users` / `user_api_keys` / `provider_access` 三张表的适配。
//! provider 维度的计数更新使用单条 UPDATE 表达式，由存储端保证原子。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};

use entity::{provider_access, user_api_keys, users};

use super::{ApiKeyRecord, KeyStore, ProviderAccessRecord, UserRecord, UserStore};
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::lwarn;
use crate::types::{AccessStatus, ProviderName};

#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn user_from_row(row: users::Model) -> Result<UserRecord> {
    let status = row
        .status
        .parse::<AccessStatus>()
        .map_err(|()| ProxyError::database(format!("未知的使用者状态: {}", row.status)))?;
    Ok(UserRecord {
        id: row.id,
        display_name: row.display_name,
        status,
        last_seen: row.last_seen,
    })
}

fn access_from_row(row: provider_access::Model) -> Option<ProviderAccessRecord> {
    // provider 或 status 不识别的行直接跳过，不让单行脏数据拖垮整把 key
    let Ok(provider) = row.provider.parse::<ProviderName>() else {
        lwarn!(
            "system",
            LogStage::Db,
            LogComponent::Store,
            "skip_unknown_provider",
            &format!("provider_access #{} 含未知 provider: {}", row.id, row.provider)
        );
        return None;
    };
    let Ok(status) = row.status.parse::<AccessStatus>() else {
        lwarn!(
            "system",
            LogStage::Db,
            LogComponent::Store,
            "skip_unknown_status",
            &format!("provider_access #{} 含未知 status: {}", row.id, row.status)
        );
        return None;
    };
    let limit_period = row.limit_period.as_deref().and_then(|p| p.parse().ok());
    let api_scopes: Vec<String> = serde_json::from_value(row.api_scopes).unwrap_or_default();

    Some(ProviderAccessRecord {
        provider,
        provider_key: row.provider_key,
        status,
        limit_period,
        limit_count: row.limit_count,
        used_count: row.used_count,
        last_reset_at: row.last_reset_at,
        api_scopes,
        expire_time: row.expire_time,
        last_seen: row.last_seen,
    })
}

#[async_trait]
impl UserStore for SeaOrmStore {
    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>> {
        let row = users::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| ProxyError::database_with_source("查询使用者失败", e))?;
        row.map(user_from_row).transpose()
    }

    async fn update_user_last_seen(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::LastSeen, Expr::value(at))
            .filter(users::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(|e| ProxyError::database_with_source("更新使用者 last_seen 失败", e))?;
        Ok(())
    }
}

#[async_trait]
impl KeyStore for SeaOrmStore {
    async fn get_api_key(&self, id: &str) -> Result<Option<ApiKeyRecord>> {
        let Some(key_row) = user_api_keys::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| ProxyError::database_with_source("查询 API Key 失败", e))?
        else {
            return Ok(None);
        };

        // 按插入顺序读取，保证「第一条 active 匹配」的语意稳定
        let access_rows = provider_access::Entity::find()
            .filter(provider_access::Column::ApiKeyId.eq(id))
            .order_by_asc(provider_access::Column::Id)
            .all(&self.db)
            .await
            .map_err(|e| ProxyError::database_with_source("查询 provider 授权失败", e))?;

        Ok(Some(ApiKeyRecord {
            id: key_row.id,
            user_id: key_row.user_id,
            key_name: key_row.key_name.unwrap_or_default(),
            key_value: key_row.key_value,
            provider_access: access_rows.into_iter().filter_map(access_from_row).collect(),
            created_at: key_row.created_at,
            updated_at: key_row.updated_at,
        }))
    }

    async fn update_access_status(
        &self,
        api_key_id: &str,
        provider: ProviderName,
        status: AccessStatus,
    ) -> Result<()> {
        provider_access::Entity::update_many()
            .col_expr(provider_access::Column::Status, Expr::value(status.as_str()))
            .filter(provider_access::Column::ApiKeyId.eq(api_key_id))
            .filter(provider_access::Column::Provider.eq(provider.as_str()))
            .exec(&self.db)
            .await
            .map_err(|e| ProxyError::database_with_source("更新 provider 状态失败", e))?;
        Ok(())
    }

    async fn update_access_last_reset_at(
        &self,
        api_key_id: &str,
        provider: ProviderName,
        at: DateTime<Utc>,
    ) -> Result<()> {
        provider_access::Entity::update_many()
            .col_expr(provider_access::Column::LastResetAt, Expr::value(at))
            .filter(provider_access::Column::ApiKeyId.eq(api_key_id))
            .filter(provider_access::Column::Provider.eq(provider.as_str()))
            .exec(&self.db)
            .await
            .map_err(|e| ProxyError::database_with_source("更新 last_reset_at 失败", e))?;
        Ok(())
    }

    async fn update_access_used_count(
        &self,
        api_key_id: &str,
        provider: ProviderName,
        used_count: i64,
    ) -> Result<()> {
        provider_access::Entity::update_many()
            .col_expr(provider_access::Column::UsedCount, Expr::value(used_count))
            .filter(provider_access::Column::ApiKeyId.eq(api_key_id))
            .filter(provider_access::Column::Provider.eq(provider.as_str()))
            .exec(&self.db)
            .await
            .map_err(|e| ProxyError::database_with_source("覆写 used_count 失败", e))?;
        Ok(())
    }

    async fn increment_access_used_count(
        &self,
        api_key_id: &str,
        provider: ProviderName,
        delta: i64,
    ) -> Result<()> {
        provider_access::Entity::update_many()
            .col_expr(
                provider_access::Column::UsedCount,
                Expr::col(provider_access::Column::UsedCount).add(delta),
            )
            .col_expr(provider_access::Column::LastSeen, Expr::value(Utc::now()))
            .filter(provider_access::Column::ApiKeyId.eq(api_key_id))
            .filter(provider_access::Column::Provider.eq(provider.as_str()))
            .exec(&self.db)
            .await
            .map_err(|e| ProxyError::database_with_source("累加 used_count 失败", e))?;
        Ok(())
    }
}
