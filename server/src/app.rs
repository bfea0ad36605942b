//! Core application

use std::sync::Arc;

use anyhow::Result;

use crate::api::{ApiServer, OtlpGrpcServer};
use crate::core::banner;
use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::core::storage::AppStorage;
use crate::data::{DuckdbService, ReadPool, WritePipeline};
use crate::domain::TracePipeline;
use crate::domain::traces::normalize::SemconvTable;

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub storage: AppStorage,
    pub duckdb: Arc<DuckdbService>,
    pub writer: Arc<WritePipeline>,
    pub pool: Arc<ReadPool>,
    pub pipeline: TracePipeline,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        match command {
            Some(Commands::Archive) => Self::archive_once(&cli_config).await,
            Some(Commands::Start) | None => {
                let app = Self::init(&cli_config).await?;
                Self::start_server(app).await
            }
        }
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let storage = AppStorage::init(&config).await?;

        let duckdb = Arc::new(DuckdbService::init(&storage).await?);
        let writer = Arc::new(WritePipeline::start(
            duckdb.connect()?,
            config.storage.write_queue_capacity,
        ));
        let pool = Arc::new(ReadPool::new(&duckdb, config.storage.read_pool_size)?);
        let pipeline = TracePipeline::new(Arc::clone(&writer), Arc::new(SemconvTable::new()));

        tracing::debug!(
            write_queue_capacity = config.storage.write_queue_capacity,
            read_pool_size = config.storage.read_pool_size,
            "Storage engine ready"
        );

        let shutdown =
            ShutdownService::new(Arc::clone(&writer), Arc::clone(&pool), Arc::clone(&duckdb));

        Ok(Self {
            shutdown,
            config,
            storage,
            duckdb,
            writer,
            pool,
            pipeline,
        })
    }

    /// `archive` subcommand: one pass against the local store, then exit
    async fn archive_once(cli: &CliConfig) -> Result<()> {
        let config = AppConfig::load(cli)?;
        let storage = AppStorage::init(&config).await?;
        let duckdb = Arc::new(DuckdbService::init(&storage).await?);

        let outcome = duckdb
            .archive(
                storage.archive_dir().to_path_buf(),
                config.archive.retention_days,
            )
            .await;
        duckdb.close().await?;
        let outcome = outcome?;

        match outcome.file {
            Some(file) => println!("Archived {} spans to {}", outcome.archived, file.display()),
            None => println!(
                "Nothing to archive: no spans older than {} days",
                config.archive.retention_days
            ),
        }
        Ok(())
    }

    fn init_logging() {
        let default_filter = format!("{}=info,tower_http=warn", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        app.start_background_tasks().await?;

        banner::print_banner(&app.config, app.storage.data_dir(), app.storage.archive_dir());

        let server = ApiServer::new(app);
        let app = server.start().await?;
        app.shutdown.shutdown().await;

        Ok(())
    }

    pub async fn start_background_tasks(&self) -> Result<()> {
        self.shutdown
            .register(
                self.duckdb
                    .start_checkpoint_task(self.shutdown.subscribe()),
            )
            .await;

        if let Some(h) = self.duckdb.start_archive_task(
            &self.config.archive,
            self.storage.archive_dir().to_path_buf(),
            self.shutdown.subscribe(),
        ) {
            self.shutdown.register(h).await;
        }

        if self.config.grpc.enabled {
            let grpc_server = OtlpGrpcServer::new(
                &self.config.server.host,
                self.config.grpc.port,
                self.pipeline.clone(),
            )?;
            let shutdown_rx = self.shutdown.subscribe();
            let shutdown = self.shutdown.clone();
            let handle = tokio::spawn(async move {
                if let Err(e) = grpc_server.start(shutdown_rx).await {
                    tracing::error!(error = %e, "OTLP gRPC server error");
                    // A dead ingestion listener takes the collector down with it
                    shutdown.trigger();
                }
            });

            self.shutdown.register(handle).await;
        }

        tracing::debug!("Background tasks started");
        Ok(())
    }
}
