//! # AI Provider 网关入口
//!
//! 子命令：`serve`（默认）、`check` 配置检查、`issue-key` 签发令牌

use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};

use ai_gateway::auth::api_key;
use ai_gateway::auth::service::ApiKeyAuthService;
use ai_gateway::cache::{CounterStore, RedisCounterStore};
use ai_gateway::collect::LogSink;
use ai_gateway::config::Configuration;
use ai_gateway::error::ProxyError;
use ai_gateway::health::HealthState;
use ai_gateway::logging::{self, LogComponent, LogStage};
use ai_gateway::providers::ProviderRegistry;
use ai_gateway::proxy::forward::ProxyService;
use ai_gateway::quota::RateLimiter;
use ai_gateway::server::{serve, AppContext};
use ai_gateway::store::{KeyStore, SeaOrmStore, UserStore};
use ai_gateway::telemetry::Metrics;
use ai_gateway::{linfo, lwarn};

#[derive(Parser)]
#[command(name = "ai-gateway", version, about = "多租户 AI Provider 网关")]
struct Cli {
    /// YAML 配置文件路径；环境变量（APP__PORT 等）优先于文件
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// 启动网关（默认）
    Serve,
    /// 校验配置后退出
    Check,
    /// 为既有的使用者与 API Key 记录签发令牌
    IssueKey {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        api_key_id: String,
    },
    /// 只解析令牌 payload，不验证签章（排障用，不可当认证）
    InspectKey { token: String },
}

#[tokio::main]
async fn main() -> ai_gateway::Result<()> {
    let cli = Cli::parse();
    let config = Configuration::load(cli.config.as_deref())?;
    logging::init(&config.log);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Check => {
            config.validate()?;
            println!("配置检查通过: {} v{}", config.app.name, config.app.version);
            Ok(())
        }
        Command::IssueKey {
            user_id,
            api_key_id,
        } => {
            config.validate()?;
            let token = api_key::issue(&user_id, &api_key_id, &config.app.secret_key)
                .map_err(|e| ProxyError::internal_with_source("生成 API Key 失败", e))?;
            println!("{token}");
            Ok(())
        }
        Command::InspectKey { token } => {
            let payload = api_key::decode_unverified(&token)
                .map_err(|e| ProxyError::bad_request_params_with_source("令牌格式无效", e))?;
            println!("token:      {}", ai_gateway::store::mask_key(&token));
            println!("user_id:    {}", payload.user_id);
            println!("api_key_id: {}", payload.api_key_id);
            println!("issued_at:  {}", payload.issued_at);
            Ok(())
        }
        Command::Serve => run(config).await,
    }
}

async fn run(config: Configuration) -> ai_gateway::Result<()> {
    config.validate()?;

    // 文档存储
    let db = sea_orm::Database::connect(config.database.connect_url())
        .await
        .map_err(|e| ProxyError::database_with_source("连接数据库失败", e))?;
    Migrator::up(&db, None)
        .await
        .map_err(|e| ProxyError::database_with_source("数据库迁移失败", e))?;
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Store,
        "db_ready",
        "数据库连接与迁移完成"
    );

    let store = Arc::new(SeaOrmStore::new(db));
    let user_store: Arc<dyn UserStore> = store.clone();
    let key_store: Arc<dyn KeyStore> = store;

    // 计数器存储
    let redis = RedisCounterStore::connect(&config.redis.build_url()).await?;
    redis.ping().await?;
    let counter_store: Arc<dyn CounterStore> = Arc::new(redis);
    let rate_limiter = Arc::new(RateLimiter::new(counter_store, config.app.name.clone()));

    // 上游 HTTP 客户端：取消跟随入站请求传播，不设每请求超时
    let http = reqwest::Client::new();

    let auth = ApiKeyAuthService::new(
        user_store,
        key_store,
        rate_limiter,
        config.app.secret_key.clone(),
    );
    let registry = ProviderRegistry::with_defaults(http.clone());
    let sink = LogSink::fluentd(&config.fluentd);
    let metrics = Metrics::new(
        config.telemetry.metric.enabled,
        &config.telemetry.metric.buckets,
    )?;

    if config.telemetry.trace.enabled {
        lwarn!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "trace_not_wired",
            "telemetry.trace.enabled 已设置，但本构建未内置 trace 导出器"
        );
    }

    let ctx = Arc::new(AppContext {
        config,
        auth,
        registry,
        proxy: ProxyService::new(http),
        sink,
        metrics,
        health: HealthState::new(),
        started_at: Instant::now(),
    });

    serve(ctx).await
}
