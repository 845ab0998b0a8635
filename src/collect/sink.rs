//! # 日志汇
//!
//! 事件经无界通道交给背景任务，再 POST 到 Fluentd 的 HTTP 入口
//! （`POST http://<host>:<port>/<tag>`）。调用端永不阻塞、永不失败。
//! 内存模式把事件留在进程内，供测试断言。

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{AiUsageLog, RequestLog, ResponseLog};
use crate::config::FluentdConfig;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo, lwarn};

enum SinkEvent {
    Usage(AiUsageLog),
    Request(RequestLog),
    Response(ResponseLog),
}

impl SinkEvent {
    fn tag_suffix(&self) -> &'static str {
        match self {
            Self::Usage(_) => "ai.usage",
            Self::Request(_) => "router.request",
            Self::Response(_) => "router.response",
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Usage(log) => serde_json::to_value(log),
            Self::Request(log) => serde_json::to_value(log),
            Self::Response(log) => serde_json::to_value(log),
        }
        .unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Default)]
struct Captured {
    usage: Vec<AiUsageLog>,
    requests: Vec<RequestLog>,
    responses: Vec<ResponseLog>,
}

enum SinkMode {
    Disabled,
    /// 发送端装在 Option 里，shutdown 取走即关闭通道
    Forward(Mutex<Option<mpsc::UnboundedSender<SinkEvent>>>),
    Memory(Mutex<Captured>),
}

pub struct LogSink {
    mode: SinkMode,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LogSink {
    /// 停用模式：所有 emit 变为空操作
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            mode: SinkMode::Disabled,
            worker: Mutex::new(None),
        }
    }

    /// 内存模式：事件留在进程内，测试用
    #[must_use]
    pub fn memory() -> Self {
        Self {
            mode: SinkMode::Memory(Mutex::new(Captured::default())),
            worker: Mutex::new(None),
        }
    }

    /// 连接 Fluentd HTTP 入口；host 未配置时退化为停用模式
    #[must_use]
    pub fn fluentd(config: &FluentdConfig) -> Self {
        if !config.enabled() {
            return Self::disabled();
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<SinkEvent>();
        let base = format!("http://{}:{}", config.host, config.port);
        let tag_prefix = config.tag_prefix.clone();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout.max(1)))
            .build()
            .unwrap_or_default();

        let worker_base = base.clone();
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let tag = format!("{}.{}", tag_prefix, event.tag_suffix());
                let url = format!("{worker_base}/{tag}");
                match client.post(&url).json(&event.to_json()).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        ldebug!(
                            "system",
                            LogStage::Internal,
                            LogComponent::Collect,
                            "event_shipped",
                            &format!("tag={tag}")
                        );
                    }
                    Ok(resp) => {
                        lwarn!(
                            "system",
                            LogStage::Internal,
                            LogComponent::Collect,
                            "event_rejected",
                            &format!("tag={tag}, status={}", resp.status())
                        );
                    }
                    Err(err) => {
                        lwarn!(
                            "system",
                            LogStage::Internal,
                            LogComponent::Collect,
                            "event_send_failed",
                            &format!("tag={tag}: {err}")
                        );
                    }
                }
            }
        });

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Collect,
            "sink_connected",
            &format!("Fluentd 日志汇已启用: {base}")
        );

        Self {
            mode: SinkMode::Forward(Mutex::new(Some(tx))),
            worker: Mutex::new(Some(worker)),
        }
    }

    fn send(&self, event: SinkEvent) {
        match &self.mode {
            SinkMode::Disabled => {}
            // 接收端只在 shutdown 后消失，残余事件直接丢弃
            SinkMode::Forward(slot) => {
                if let Some(tx) = slot.lock().unwrap().as_ref() {
                    let _ = tx.send(event);
                }
            }
            SinkMode::Memory(captured) => {
                let mut captured = captured.lock().unwrap();
                match event {
                    SinkEvent::Usage(log) => captured.usage.push(log),
                    SinkEvent::Request(log) => captured.requests.push(log),
                    SinkEvent::Response(log) => captured.responses.push(log),
                }
            }
        }
    }

    pub fn emit_usage(&self, log: AiUsageLog) {
        self.send(SinkEvent::Usage(log));
    }

    pub fn emit_request(&self, log: RequestLog) {
        self.send(SinkEvent::Request(log));
    }

    pub fn emit_response(&self, log: ResponseLog) {
        self.send(SinkEvent::Response(log));
    }

    /// 内存模式下取回已捕获的用量事件
    #[must_use]
    pub fn captured_usage(&self) -> Vec<AiUsageLog> {
        match &self.mode {
            SinkMode::Memory(captured) => captured.lock().unwrap().usage.clone(),
            _ => Vec::new(),
        }
    }

    /// 内存模式下取回已捕获的响应事件
    #[must_use]
    pub fn captured_responses(&self) -> Vec<ResponseLog> {
        match &self.mode {
            SinkMode::Memory(captured) => captured.lock().unwrap().responses.clone(),
            _ => Vec::new(),
        }
    }

    /// 关闭通道并等背景任务送完剩余事件
    pub async fn shutdown(&self) {
        if let SinkMode::Forward(slot) = &self.mode {
            drop(slot.lock().unwrap().take());
        }
        let worker = self.worker.lock().unwrap().take();
        if let Some(handle) = worker {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
    }
}
