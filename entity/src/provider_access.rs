//! # Provider 访问授权实体定义
//!
//! 每条记录绑定一个 (api_key_id, provider)：上游凭证、状态、配额窗口与
//! 允许的 scope 列表。同一 (api_key_id, provider) 取第一条 active 记录。

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "provider_access")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub api_key_id: String,
    /// openai / gemini / grok / custom
    pub provider: String,
    /// 上游服务商的真实凭证（服务端注入，不回传明文）
    pub provider_key: String,
    /// active / blocked / suspended / expired / revoked / maintenance / pending / deleted
    pub status: String,
    /// none / daily / weekly / monthly / yearly
    pub limit_period: Option<String>,
    pub limit_count: Option<i64>,
    pub used_count: i64,
    pub last_reset_at: Option<DateTimeUtc>,
    /// 允许的 scope 列表，JSON 字符串数组
    pub api_scopes: Json,
    pub expire_time: Option<DateTimeUtc>,
    pub last_seen: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user_api_keys::Entity",
        from = "Column::ApiKeyId",
        to = "super::user_api_keys::Column::Id"
    )]
    UserApiKeys,
}

impl Related<super::user_api_keys::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserApiKeys.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
