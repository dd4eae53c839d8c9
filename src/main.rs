//! Conflux CLI entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use clap::Parser;
use uuid::Uuid;

use conflux::cli::{commands::test_case, Cli, Commands};
use conflux::domain::models::Config;
use conflux::domain::ports::{
    ClusterLock, ErrorLogRepository, EventRecordRepository, EventStore, IngressLogRepository,
    RuleRepository, TaskQueue, TicketClient,
};
use conflux::infrastructure::config::ConfigLoader;
use conflux::infrastructure::database::{
    create_pool, Migrator, SqliteClusterLock, SqliteErrorLogRepository,
    SqliteEventRecordRepository, SqliteIngressLogRepository, SqliteRuleRepository,
    SqliteTaskQueue,
};
use conflux::infrastructure::elastic::ElasticStore;
use conflux::infrastructure::http::{self, AppState};
use conflux::infrastructure::itsm::ItsmClient;
use conflux::infrastructure::logging::init_tracing;
use conflux::infrastructure::snmp::{mib::MibCatalog, SnmpListener};
use conflux::services::{
    CorrelatorContext, CorrelatorSettings, Dispatcher, ErrorReporter, PipelineManager,
    PurgeService, RuleResolver, Scheduler, Worker,
};

struct App {
    config: Config,
    records: Arc<dyn EventRecordRepository>,
    ingress: Arc<dyn IngressLogRepository>,
    error_logs: Arc<dyn ErrorLogRepository>,
    rule_repo: Arc<dyn RuleRepository>,
    queue: Arc<dyn TaskQueue>,
    lock: Arc<dyn ClusterLock>,
    store: Arc<dyn EventStore>,
}

impl App {
    async fn build(config: Config) -> Result<Self> {
        let database_url = format!("sqlite:{}", config.database.path);
        let pool = create_pool(&database_url, config.database.max_connections)
            .await
            .context("Failed to connect to database")?;
        Migrator::new(pool.clone())
            .run_embedded_migrations()
            .await
            .context("Failed to run database migrations")?;

        let store = ElasticStore::new(&config.store).context("Failed to build store client")?;

        Ok(Self {
            records: Arc::new(SqliteEventRecordRepository::new(pool.clone())),
            ingress: Arc::new(SqliteIngressLogRepository::new(pool.clone())),
            error_logs: Arc::new(SqliteErrorLogRepository::new(pool.clone())),
            rule_repo: Arc::new(SqliteRuleRepository::new(pool.clone())),
            queue: Arc::new(SqliteTaskQueue::new(pool.clone())),
            lock: Arc::new(SqliteClusterLock::new(pool)),
            store: Arc::new(store),
            config,
        })
    }

    fn correlator_context(&self) -> Result<Arc<CorrelatorContext>> {
        let tickets: Arc<dyn TicketClient> =
            Arc::new(ItsmClient::new(&self.config.itsm).context("Failed to build ITSM client")?);
        Ok(Arc::new(CorrelatorContext {
            store: self.store.clone(),
            tickets,
            records: self.records.clone(),
            ingress: self.ingress.clone(),
            rule_repo: self.rule_repo.clone(),
            rules: RuleResolver::new(self.rule_repo.clone()),
            errors: ErrorReporter::new(self.error_logs.clone(), self.records.clone()),
            settings: CorrelatorSettings {
                environment: self.config.environment.clone(),
                main_pipeline: self.config.store.main_pipeline.clone(),
            },
        }))
    }

    fn pipeline_manager(&self) -> PipelineManager {
        PipelineManager::new(self.store.clone(), self.rule_repo.clone(), self.config.store.clone())
    }

    fn app_state(&self) -> AppState {
        AppState {
            ingress: self.ingress.clone(),
            queue: self.queue.clone(),
            store: self.store.clone(),
            rules: self.rule_repo.clone(),
            csv_fields: Arc::new(self.config.csv_fields.clone()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    init_tracing(&config.logging);

    let app = App::build(config).await?;

    match cli.command {
        Commands::Serve => {
            http::serve(app.app_state(), &app.config.http.bind).await?;
        }
        Commands::Worker => {
            let worker_id = format!("worker-{}", Uuid::new_v4());
            let ctx = app.correlator_context()?;
            let dispatcher = Arc::new(Dispatcher::new(
                ctx,
                app.queue.clone(),
                worker_id.clone(),
                Duration::seconds(i64::try_from(app.config.worker.lock_lease_secs)?),
            ));
            let worker = Worker::new(
                dispatcher,
                app.queue.clone(),
                worker_id.clone(),
                std::time::Duration::from_secs(app.config.worker.poll_interval_secs),
                app.config.worker.batch_size,
            );
            let purge = Arc::new(PurgeService::new(
                app.records.clone(),
                app.ingress.clone(),
                app.store.clone(),
                app.config.retention.clone(),
            ));
            let scheduler = Arc::new(Scheduler::new(app.lock.clone(), purge, worker_id));
            tokio::join!(worker.run(), scheduler.run());
        }
        Commands::StartSnmpListener => {
            let mut catalog = MibCatalog::with_defaults();
            if let Some(mib_file) = &app.config.snmp.mib_file {
                let loaded = catalog.load_file(mib_file)?;
                tracing::info!(file = %mib_file, loaded, "loaded extra MIB entries");
            }
            let listener = SnmpListener {
                ingress: app.ingress.clone(),
                queue: app.queue.clone(),
                rules: app.rule_repo.clone(),
                csv_fields: Arc::new(app.config.csv_fields.clone()),
                catalog,
                bind: app.config.snmp.bind.clone(),
            };
            listener.run().await?;
        }
        Commands::LoadAssetMapping { file, enrich } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let assets: serde_json::Value = serde_json::from_str(&raw)?;
            let count = app.pipeline_manager().load_asset_mapping(&assets, enrich).await?;
            tracing::info!(count, file = %file.display(), "loaded asset mapping");
        }
        Commands::UpdatePipelines => {
            app.pipeline_manager().update_pipelines().await?;
        }
        Commands::UpdateIndexTemplate => {
            app.pipeline_manager().update_index_template().await?;
        }
        Commands::TestCase { case, setup, data_dir } => {
            let pipelines = app.pipeline_manager();
            test_case::run(
                &app.config,
                app.rule_repo.clone(),
                &pipelines,
                &case,
                setup,
                &data_dir,
            )
            .await?;
        }
    }

    Ok(())
}
