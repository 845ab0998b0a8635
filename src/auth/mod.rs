//! # 认证与授权
//!
//! API Key 凭证编解码、scope 规则、认证服务与管线阶段

pub mod api_key;
pub mod middleware;
pub mod scope;
pub mod service;
mod types;

pub use types::AuthContext;
