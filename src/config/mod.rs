//! # 应用配置
//!
//! 分区配置结构与加载逻辑：环境变量（嵌套键以 `__` 连接，如
//! `APP__SECRET_KEY`）叠加在可选的 YAML 文件之上。

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, Result};

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub app: AppConfig,
    pub log: LogConfig,
    pub redis: RedisConfig,
    pub database: DatabaseConfig,
    pub fluentd: FluentdConfig,
    pub telemetry: TelemetryConfig,
}

/// 基础应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 运行环境：development / test / production
    pub env: String,
    /// 监听端口
    pub port: u16,
    /// 服务名称（亦作为计数器 key 前缀）
    pub name: String,
    /// 服务版本
    pub version: String,
    /// API Key 签章密钥
    pub secret_key: String,
    pub swagger_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            port: 8080,
            name: "ai-gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            secret_key: String::new(),
            swagger_enabled: false,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// 生产环境建议开启 JSON 输出
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// 计数器存储（Redis）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u8,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db: 0,
        }
    }
}

impl RedisConfig {
    /// 构建 Redis 连接 URL
    #[must_use]
    pub fn build_url(&self) -> String {
        match &self.password {
            Some(password) if !password.is_empty() => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// 文档存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub uri: String,
    /// 追加的连接参数（可为空）
    pub options: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: "sqlite::memory:".to_string(),
            options: String::new(),
        }
    }
}

impl DatabaseConfig {
    /// 组合连接串；options 非空时以 `?` 连接
    #[must_use]
    pub fn connect_url(&self) -> String {
        if self.options.is_empty() {
            self.uri.clone()
        } else {
            format!("{}?{}", self.uri, self.options)
        }
    }
}

/// 日志汇（Fluentd HTTP 入口）配置；host 为空时停用
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FluentdConfig {
    pub host: String,
    pub port: u16,
    pub tag_prefix: String,
    /// 发送超时（毫秒）
    pub timeout: u64,
}

impl Default for FluentdConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 9880,
            tag_prefix: "gateway".to_string(),
            timeout: 3000,
        }
    }
}

impl FluentdConfig {
    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.host.is_empty()
    }
}

/// 遥测配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub metric: MetricConfig,
    pub trace: TraceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    pub enabled: bool,
    pub buckets: Vec<f64>,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buckets: vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub enabled: bool,
    pub endpoint_url: String,
}

impl Configuration {
    /// 加载配置：可选 YAML 文件在前，环境变量覆盖在后
    pub fn load(file: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::new(path, FileFormat::Yaml));
        }
        builder = builder.add_source(Environment::default().separator("__"));

        let raw = builder
            .build()
            .map_err(|e| ProxyError::internal_with_source("加载配置失败", e))?;
        raw.try_deserialize()
            .map_err(|e| ProxyError::internal_with_source("解析配置失败", e))
    }

    /// 配置健全性检查；serve 前调用
    pub fn validate(&self) -> Result<()> {
        if self.app.secret_key.is_empty() {
            return Err(ProxyError::internal("app.secret_key 未设置"));
        }
        if self.app.port == 0 {
            return Err(ProxyError::internal("app.port 未设置"));
        }
        Ok(())
    }
}
