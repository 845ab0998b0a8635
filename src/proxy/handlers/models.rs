//! # 模型清单
//!
//! 只读查询，不消耗配额也不产生用量事件

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Extension;

use super::ensure_v1;
use crate::auth::AuthContext;
use crate::error::{ProxyError, Result};
use crate::response::ApiResponse;
use crate::server::AppContext;

pub async fn list_models(
    State(ctx): State<Arc<AppContext>>,
    Path((version, _provider)): Path<(String, String)>,
    Extension(auth): Extension<AuthContext>,
) -> Result<ApiResponse> {
    ensure_v1(&version)?;

    let service = ctx.registry.models(auth.provider).ok_or_else(|| {
        ProxyError::forbidden(format!("provider not supported: {}", auth.provider))
    })?;

    let result = service
        .list_v1(&auth.provider_access.provider_key)
        .await?;

    Ok(ApiResponse::success(&result))
}
