use fleetdb::db::schema;
use fleetdb::{Config, DbAdapter};
use mimalloc::MiMalloc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::from_env()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        backend = %cfg.backend(),
        database_path = %cfg.database_path.display(),
        pool_size = cfg.pool_size,
        loglevel = %cfg.loglevel
    );

    let db = DbAdapter::connect(&cfg).await?;

    schema::init_schema(&db).await?;
    let added = schema::apply_column_additions(&db).await?;
    if added > 0 {
        info!(added, "migrated existing tables");
    }

    match db.get_converted("SELECT COUNT(*) AS n FROM users", ()).await {
        Ok(row) => {
            let users = row.and_then(|r| r.get("n").and_then(|n| n.as_i64()));
            info!(users = users.unwrap_or(0), "database bootstrap complete");
        }
        Err(e) => warn!(error = %e, "database not readable after bootstrap"),
    }

    db.close().await;
    Ok(())
}
