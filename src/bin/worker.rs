use std::{sync::Arc, time::Duration};

use tokio::signal;
use tracing_subscriber::EnvFilter;

use helpdesk::{
    activity::ActivityRecorder, auth::jwt::JwtService, config::AppConfig, db, default_handlers,
    state::AppState, storage, Worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        pool_size = 1,
        s3_bucket = %config.s3_bucket,
        "loaded helpdesk configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let s3_client = storage::build_client(&config).await?;
    let object_storage = Arc::new(storage::S3Storage::new(s3_client, config.s3_bucket.clone()));
    let jwt = JwtService::from_config(&config)?;
    let activity = Arc::new(ActivityRecorder::new(pool.clone()));

    let state = Arc::new(AppState::new(pool, config, object_storage, jwt, activity));
    let worker = Worker::new(state, default_handlers(), Duration::from_secs(2));

    tokio::select! {
        _ = worker.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("worker received shutdown signal");
        }
    }

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
