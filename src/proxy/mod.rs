//! # 转发管线
//!
//! 上游转发、透传处理、SSE 解析与预览解码

pub mod decompress;
pub mod forward;
pub mod handlers;
pub mod passthrough;
pub mod sse;
