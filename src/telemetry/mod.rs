//! # 指标
//!
//! Prometheus 指标注册与 `/metrics` 抓取端点

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use prometheus::{
    gather, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::time::Duration;

use crate::error::{ProxyError, Result};

pub struct Metrics {
    enabled: bool,
    success_total: Option<IntCounterVec>,
    fail_total: Option<IntCounterVec>,
    request_duration: Option<HistogramVec>,
}

impl Metrics {
    /// 注册指标；`enabled == false` 时全部指标为空操作
    pub fn new(enabled: bool, buckets: &[f64]) -> Result<Self> {
        if !enabled {
            return Ok(Self {
                enabled: false,
                success_total: None,
                fail_total: None,
                request_duration: None,
            });
        }

        let success_total = register_int_counter_vec!(
            "gateway_proxy_success_total",
            "成功响应计数",
            &["endpoint", "status"]
        )
        .map_err(|e| ProxyError::internal_with_source("注册 success_total 失败", e))?;
        let fail_total = register_int_counter_vec!(
            "gateway_proxy_fail_total",
            "失败响应计数",
            &["reason"]
        )
        .map_err(|e| ProxyError::internal_with_source("注册 fail_total 失败", e))?;
        let request_duration = register_histogram_vec!(
            "gateway_http_request_duration_seconds",
            "请求处理耗时（秒）",
            &["endpoint"],
            buckets.to_vec()
        )
        .map_err(|e| ProxyError::internal_with_source("注册 request_duration 失败", e))?;

        Ok(Self {
            enabled: true,
            success_total: Some(success_total),
            fail_total: Some(fail_total),
            request_duration: Some(request_duration),
        })
    }

    pub fn observe(&self, endpoint: &str, status: u16, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        if let Some(counter) = &self.success_total {
            counter
                .with_label_values(&[endpoint, &status.to_string()])
                .inc();
        }
        if let Some(histogram) = &self.request_duration {
            histogram
                .with_label_values(&[endpoint])
                .observe(elapsed.as_secs_f64());
        }
    }

    pub fn observe_failure(&self, endpoint: &str, reason: &str, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        if let Some(counter) = &self.fail_total {
            counter.with_label_values(&[reason]).inc();
        }
        if let Some(histogram) = &self.request_duration {
            histogram
                .with_label_values(&[endpoint])
                .observe(elapsed.as_secs_f64());
        }
    }
}

/// `/metrics` 抓取端点
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = gather();
    match encoder.encode_to_string(&metric_families) {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            output,
        )
            .into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics".to_string(),
        )
            .into_response(),
    }
}
