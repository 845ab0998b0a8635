//! # 使用者实体定义
//!
//! API Key 拥有者；`status` 非 `active` 时请求在使用者校验阶段被拒绝

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 使用者实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// 十六进制主键（与 API Key payload 中的 user_id 对应）
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub display_name: String,
    /// active / blocked / suspended / ...
    pub status: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub last_seen: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_api_keys::Entity")]
    UserApiKeys,
}

impl Related<super::user_api_keys::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserApiKeys.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
