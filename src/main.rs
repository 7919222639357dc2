//! sqlagent - natural-language questions over PostgreSQL
//!
//! Entry point: resolve settings, connect, build the schema cache and
//! serve the HTTP API until Ctrl-C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use sqlagent::agent::{AgentConfig, SqlAgent};
use sqlagent::api::{AppState, create_router};
use sqlagent::config::{ConnectionConfig, Settings, load_settings, load_settings_from};
use sqlagent::db::{Database, PostgresDatabase, SchemaCache};
use sqlagent::error::ConfigError;
use sqlagent::llm::GeminiClient;
use sqlagent::service::QueryService;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "sqlagent")]
#[command(about = "Ask a PostgreSQL database questions in plain language", long_about = None)]
struct Cli {
    /// Settings file (default: ~/.sqlagent/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini model name
    #[arg(long, env = "SQLAGENT_MODEL")]
    model: Option<String>,

    /// Address to listen on
    #[arg(long, env = "SQLAGENT_BIND")]
    bind: Option<String>,

    /// Directory holding index.html and other static assets
    #[arg(long, env = "SQLAGENT_STATIC_DIR")]
    static_dir: Option<PathBuf>,
}

impl Cli {
    fn resolve_settings(self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => load_settings_from(path)?,
            None => load_settings()?,
        };

        if let Some(url) = self.database_url {
            settings.database_url = Some(url);
        }
        if let Some(key) = self.api_key {
            settings.api_key = Some(key);
        }
        if let Some(model) = self.model {
            settings.model = model;
        }
        if let Some(bind) = self.bind {
            settings.bind = bind;
        }
        if let Some(dir) = self.static_dir {
            settings.static_dir = dir;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so clap's env fallbacks can see it
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    sqlagent::telemetry::init_tracing();

    let settings = cli.resolve_settings()?;
    let api_key = settings
        .api_key
        .clone()
        .ok_or(ConfigError::Missing("GEMINI_API_KEY"))?;

    let database = connect_database(&settings).await?;
    let schema = match &database {
        Some(db) => SchemaCache::load(db.as_ref()).await,
        None => SchemaCache::Unavailable("database not connected".to_string()),
    };

    let backend = GeminiClient::new(api_key, settings.model.clone(), settings.llm_timeout())
        .context("failed to create Gemini client")?;
    info!("using model {}", settings.model);
    let agent = SqlAgent::new(Arc::new(backend), AgentConfig::from(&settings));

    let service = QueryService::new(
        database.clone().map(|db| db as Arc<dyn Database>),
        Arc::new(schema),
        agent,
    );
    let state = AppState {
        service: Arc::new(service),
    };
    let app = create_router(state, &settings.static_dir);

    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind))?;
    info!("listening on {}", settings.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(db) = database {
        db.close();
        info!("database pool closed");
    }
    Ok(())
}

/// A missing URL or unreachable server leaves the service running in a
/// degraded state. A malformed URL is a configuration error.
async fn connect_database(settings: &Settings) -> Result<Option<Arc<PostgresDatabase>>> {
    let Some(url) = settings.database_url.as_deref() else {
        warn!("DATABASE_URL not set; queries will be refused");
        return Ok(None);
    };

    let config = ConnectionConfig::from_url(url)?;
    info!("connecting to {}", config.display_target());

    match PostgresDatabase::connect(&config, &settings.pool_options()).await {
        Ok(db) => {
            info!("connected to database");
            Ok(Some(Arc::new(db)))
        }
        Err(e) => {
            error!("startup connection failed: {}", e);
            Ok(None)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
