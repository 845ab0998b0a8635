//! # 错误处理模块
//!
//! 统一的错误类型定义与 HTTP 映射

mod types;

pub use types::*;

/// 应用结果类型
pub type Result<T> = std::result::Result<T, ProxyError>;
