use futures::StreamExt;
use mimalloc::MiMalloc;
use planetae_db::{BackupMode, Client, Config, LogSink};
use tracing::{error, info};
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
        backend = %cfg.backend,
        host = %cfg.host,
        port = cfg.port,
        backup_dir = %cfg.backup_dir.display(),
        loglevel = %cfg.loglevel
    );

    let mut client = Client::for_backend(cfg.backend, cfg.credentials())?
        .automatically_create_database(cfg.automatically_create_database)
        .log(LogSink::current())
        .build();

    let mut failures = 0usize;
    {
        let mut databases = Box::pin(client.databases());
        while let Some(next) = databases.next().await {
            let database = match next {
                Ok(database) => database,
                Err(e) => {
                    error!(error = %e, "cannot open database");
                    failures += 1;
                    continue;
                }
            };
            let path = cfg.backup_dir.join(format!("{}.sql", database.name()));
            match database.backup(&path, BackupMode::Full).await {
                Ok(()) => info!(database = database.name(), path = %path.display(), "backed up"),
                Err(e) => {
                    error!(database = database.name(), error = %e, "backup failed");
                    failures += 1;
                }
            }
            if let Err(e) = database.close().await {
                error!(database = database.name(), error = %e, "close failed");
            }
        }
    }

    client.close().await?;
    if failures > 0 {
        return Err(format!("{failures} database(s) failed to back up").into());
    }
    Ok(())
}
