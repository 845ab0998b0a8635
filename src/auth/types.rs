//! # 请求主体（Principal）

use std::sync::Arc;

use crate::store::ProviderAccessRecord;
use crate::types::ProviderName;

/// 认证阶段产出的请求主体，以请求扩展传给后续阶段；不可变。
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub api_key_id: String,
    pub key_name: String,
    /// 使用者校验阶段补齐
    pub display_name: String,
    pub provider: ProviderName,
    pub provider_access: Arc<ProviderAccessRecord>,
}
