use std::sync::Arc;

use gatehouse::app::{self, Services};
use gatehouse::auth::{AuthService, JwtIssuer, LogEmailSender, MemoryUserStore};
use gatehouse::config::{Config, LogFormat};
use gatehouse::health::ProcessHealth;
use gatehouse::kv::{KeyValueStore, MemoryStore, RedisStore};
use gatehouse::middleware::{FanOut, InMemoryMetrics, MetricsSink, RecorderMetrics, TracingLogSink};
use gatehouse::Server;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real deployments set the environment directly.
    let _ = dotenvy::dotenv();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let kv: Arc<dyn KeyValueStore> = match &config.redis_url {
        Some(url) => {
            info!("connecting to redis");
            Arc::new(RedisStore::connect(url).await?)
        }
        None => {
            warn!("REDIS_URL not set, using in-memory key-value store");
            Arc::new(MemoryStore::default())
        }
    };

    let in_memory = Arc::new(InMemoryMetrics::default());
    let sinks: Vec<Arc<dyn MetricsSink>> = vec![in_memory.clone(), Arc::new(RecorderMetrics)];
    let metrics: Arc<dyn MetricsSink> = Arc::new(FanOut(sinks));

    let auth = AuthService::new(
        Arc::new(MemoryUserStore::default()),
        Arc::new(JwtIssuer::new(&config.jwt_secret, config.jwt_ttl)),
        Arc::new(LogEmailSender),
        config.app_url.clone(),
    );

    let router = app::router(Services {
        auth: Arc::new(auth),
        health: Arc::new(ProcessHealth::new(in_memory, Arc::clone(&kv))),
        kv,
        metrics,
        logs: Arc::new(TracingLogSink),
    });

    Server::bind(config.addr).body_limit(config.body_limit).serve(router).await?;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
