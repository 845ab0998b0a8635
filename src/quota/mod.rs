//! # 配额
//!
//! 滑动窗口限流器与配额预检阶段

mod limiter;
pub mod middleware;

pub use limiter::{RateLimitOutcome, RateLimiter};
