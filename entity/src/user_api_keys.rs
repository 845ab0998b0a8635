//! # API Key 实体定义
//!
//! 平台签发的不透明令牌记录；provider 维度的授权在 `provider_access` 表

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "user_api_keys")]
pub struct Model {
    /// 十六进制主键（与令牌 payload 中的 api_key_id 对应）
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub key_name: Option<String>,
    /// 令牌字符串本体（两段式 base64url.payload + 截断 MAC）
    pub key_value: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Users,
    #[sea_orm(has_many = "super::provider_access::Entity")]
    ProviderAccess,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::provider_access::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProviderAccess.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
