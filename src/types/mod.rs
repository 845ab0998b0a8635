//! # 网关核心领域类型
//!
//! Provider 名称、访问状态、配额周期与 scope 常量

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 上游服务商名称
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    OpenAi,
    Gemini,
    Grok,
    Custom,
}

impl ProviderName {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Grok => "grok",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for ProviderName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "grok" => Ok(Self::Grok),
            "custom" => Ok(Self::Custom),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 使用者与 Provider 授权共用的状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessStatus {
    Active,
    Blocked,
    Suspended,
    Expired,
    Revoked,
    Maintenance,
    Pending,
    Deleted,
}

impl AccessStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::Suspended => "suspended",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Maintenance => "maintenance",
            Self::Pending => "pending",
            Self::Deleted => "deleted",
        }
    }
}

impl FromStr for AccessStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "blocked" => Ok(Self::Blocked),
            "suspended" => Ok(Self::Suspended),
            "expired" => Ok(Self::Expired),
            "revoked" => Ok(Self::Revoked),
            "maintenance" => Ok(Self::Maintenance),
            "pending" => Ok(Self::Pending),
            "deleted" => Ok(Self::Deleted),
            _ => Err(()),
        }
    }
}

/// 配额统计周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitPeriod {
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl LimitPeriod {
    /// 周期对应的窗口秒数；窗口以首次消耗时刻为起点，不对齐日历
    #[must_use]
    pub const fn window_seconds(&self) -> i64 {
        match self {
            Self::Daily => 24 * 60 * 60,
            Self::Weekly => 7 * 24 * 60 * 60,
            Self::Monthly => 30 * 24 * 60 * 60,
            Self::Yearly => 365 * 24 * 60 * 60,
            Self::None => 0,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl FromStr for LimitPeriod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(()),
        }
    }
}

/// 透传子树对应的唯一 scope
pub const SCOPE_MCP_SERVER: &str = "/mcp-server/*";
/// 通配 scope
pub const SCOPE_ALL: &str = "*";

/// 上游 base URL（不含版本段）
pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com";
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";
