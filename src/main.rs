mod config;
mod probe;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConfigFile, ConnectionSpec, Overrides};

/// PostgreSQL startup gate
#[derive(Parser, Debug)]
#[command(name = "wait-for-psql")]
#[command(about = "Block startup until a PostgreSQL server accepts connections")]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = "/volumes/config/_generated.conf", env = "ODOO_RC")]
    config: PathBuf,

    /// Database host
    #[arg(long)]
    db_host: Option<String>,

    /// Database port
    #[arg(long)]
    db_port: Option<u16>,

    /// Database user
    #[arg(long)]
    db_user: Option<String>,

    /// Overall wait budget in seconds
    #[arg(long, default_value_t = 30, env = "PSQL_WAIT_TIMEOUT")]
    timeout: u64,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    /// Flags meant for other entrypoint tooling; accepted and ignored
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    _passthrough: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file = ConfigFile::load(&args.config);
    let spec = ConnectionSpec::resolve(
        Overrides {
            db_host: args.db_host,
            db_port: args.db_port,
            db_user: args.db_user,
            log_level: args.log_level,
        },
        file,
        Duration::from_secs(args.timeout),
    );

    // Unparseable levels fall back to info.
    let level: Level = spec.log_level.parse().unwrap_or(Level::INFO);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("wait_for_psql={level}").parse()?),
        )
        .init();

    info!("Waiting for database(s) to be ready ...");
    info!("Host: {}@{}:{}", spec.user, spec.host, spec.port);
    info!("Timeout: {} seconds", spec.timeout.as_secs());

    probe::wait_for_database(&spec, probe::PG_ISREADY).await?;

    info!("🚀 Database(s) are ready.");

    Ok(())
}
