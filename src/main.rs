use std::{sync::Arc, time::Duration};

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use helpdesk::{
    activity::ActivityRecorder, auth::jwt::JwtService, config::AppConfig, db, routes,
    state::AppState, storage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        s3_bucket = %config.s3_bucket,
        "loaded helpdesk configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let s3_client = storage::build_client(&config).await?;
    let object_storage = Arc::new(storage::S3Storage::new(s3_client, config.s3_bucket.clone()));
    let jwt = JwtService::from_config(&config)?;
    let activity = Arc::new(ActivityRecorder::new(pool.clone()));

    let flush_interval = Duration::from_secs(config.activity_flush_interval_secs.max(1));
    let addr = format!("{}:{}", config.server_host, config.server_port);

    let state = AppState::new(pool, config, object_storage, jwt, activity.clone());
    let router = routes::create_router(state);

    // Buffered audit entries drain on a fixed cadence; request handlers only
    // append to the in-memory buffer.
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(flush_interval);
        loop {
            interval.tick().await;
            if let Err(err) = activity.flush() {
                tracing::error!(error = %err, "periodic activity flush failed");
            }
        }
    });

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "helpdesk API listening");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
