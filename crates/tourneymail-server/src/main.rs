//! TourneyMail - Scheduled campaign delivery entry point

use anyhow::Result;
use std::sync::Arc;
use tourneymail_api::AppState;
use tourneymail_common::config::{Config, LoggingConfig};
use tourneymail_core::{
    AudienceStores, CampaignManager, CampaignScheduler, Clock, DeliveryPipeline,
    DeliverySettings, LogMailer, Mailer, OrganizationClock, SmtpMailer,
};
use tourneymail_storage::{
    DatabasePool, DbCampaignRecordRepository, DbContactRepository, DbRankingRepository,
    DbScheduledCampaignRepository, DbTournamentRepository, MemoryStore,
    ScheduledCampaignRepository,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting TourneyMail for {}...", config.organization.name);

    // Initialize storage
    let (stores, scheduled, db_pool) = init_storage(&config).await?;
    let records = stores.records.clone();

    // Outbound transport
    let mailer: Arc<dyn Mailer> = if config.smtp.enabled {
        info!(
            "Sending through {}:{} ({})",
            config.smtp.host, config.smtp.port, config.smtp.tls
        );
        Arc::new(SmtpMailer::new(&config.smtp)?)
    } else {
        info!("SMTP disabled, messages will only be logged");
        Arc::new(LogMailer)
    };

    let clock: Arc<dyn Clock> = Arc::new(OrganizationClock::new(config.organization.offset()?));

    let pipeline = Arc::new(DeliveryPipeline::new(
        stores,
        scheduled.clone(),
        mailer,
        clock.clone(),
        DeliverySettings::from_config(&config),
    ));

    let scheduler = Arc::new(
        CampaignScheduler::new(scheduled.clone(), pipeline.clone(), clock.clone())
            .with_poll_interval(config.scheduler.poll_interval_secs)
            .with_lease(config.scheduler.lease_secs),
    );

    let manager = Arc::new(CampaignManager::new(
        scheduled,
        records,
        pipeline,
        clock,
        scheduler.lease(),
    ));

    // Start scheduler loop if enabled
    let scheduler_handle = if config.scheduler.enabled {
        let scheduler = scheduler.clone();
        info!(
            "Starting scheduler (every {}s)",
            config.scheduler.poll_interval_secs
        );
        Some(tokio::spawn(async move {
            scheduler.run().await;
        }))
    } else {
        info!("Scheduler disabled, use the run endpoint to process due campaigns");
        None
    };

    // Start API server
    let api_handle = {
        let state = Arc::new(AppState {
            manager,
            scheduler,
            db_pool,
        });
        let app = tourneymail_api::create_router(state);
        let addr = format!("{}:{}", config.api.bind, config.api.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("Starting API server on {}", addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("API server error: {}", e);
            }
        })
    };

    info!("TourneyMail started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    api_handle.abort();
    if let Some(handle) = scheduler_handle {
        handle.abort();
    }

    info!("TourneyMail shutdown complete");

    Ok(())
}

async fn init_storage(
    config: &Config,
) -> Result<(
    AudienceStores,
    Arc<dyn ScheduledCampaignRepository>,
    Option<DatabasePool>,
)> {
    if config.database.backend == "memory" {
        info!("Using in-memory storage; nothing survives a restart");
        let store = MemoryStore::new();
        return Ok((
            AudienceStores::from_memory(&store),
            Arc::new(store),
            None,
        ));
    }

    let db_pool = DatabasePool::new(&config.database).await?;
    db_pool.migrate().await?;

    let stores = AudienceStores {
        contacts: Arc::new(DbContactRepository::new(db_pool.clone())),
        rankings: Arc::new(DbRankingRepository::new(db_pool.clone())),
        tournaments: Arc::new(DbTournamentRepository::new(db_pool.clone())),
        records: Arc::new(DbCampaignRecordRepository::new(db_pool.clone())),
    };

    Ok((
        stores,
        Arc::new(DbScheduledCampaignRepository::new(db_pool.clone())),
        Some(db_pool),
    ))
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tourneymail=debug", logging.level)));

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true))
            .with(filter)
            .init();
    }
}
