//! # 用量与请求/响应事件收集
//!
//! fire-and-forget 的结构化事件：事件先进内存通道，
//! 背景任务再转发到 Fluentd HTTP 入口；发送失败只记警告

mod model;
mod sink;

pub use model::{log_timestamp, AiUsageLog, RequestLog, ResponseLog};
pub use sink::LogSink;
