use anyhow::{bail, Context};
use clap::Parser;
use std::{
    fs::OpenOptions,
    io::{self, Write},
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};
use wdims_storage::{MigrationOutcome, ProfileStore};

mod api;
mod hub;

use hub::{HubConfig, HubState};

const DEFAULT_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_CONFIG_DIR: &str = "config";
const LOG_FILE_NAME: &str = "wdims-hub.log";

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    config_dir: PathBuf,
    log_dir: String,
    debug: bool,
    write_timeout: Duration,
    migrate_legacy: bool,
}

#[derive(Parser, Debug)]
#[command(name = "wdims-hub", about = "Profile store and real-time sync hub")]
struct Args {
    #[arg(long, default_value = "")]
    addr: String,
    #[arg(long, default_value = "")]
    config_dir: String,
    #[arg(long)]
    log_dir: Option<String>,
    #[arg(long, default_value_t = false)]
    debug: bool,
    #[arg(long, default_value_t = 2)]
    write_timeout: u64,
    /// Rename pre-canonical settings files before serving.
    #[arg(long, default_value_t = false)]
    migrate_legacy: bool,
}

#[tokio::main]
async fn main() {
    let config = load_config();
    let _log_guard = init_logging(&config);
    if let Err(err) = run(config).await {
        error!(event = "hub_error", error = %format!("{err:#}"));
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .addr
        .parse()
        .with_context(|| format!("invalid listen address {}", config.addr))?;
    if !addr.ip().is_loopback() {
        bail!("refusing to listen on non-loopback address {addr}");
    }

    let store = ProfileStore::open(&config.config_dir);
    if config.migrate_legacy {
        let report = store
            .migrate_legacy_files()
            .context("legacy file migration failed")?;
        let migrated = report
            .iter()
            .filter(|entry| matches!(entry.outcome, MigrationOutcome::Migrated { .. }))
            .count();
        info!(event = "legacy_migration_done", migrated = migrated, checked = report.len());
    }
    if let Err(err) = store.ensure_default_profile() {
        warn!(event = "default_profile_unavailable", error = %err);
    }

    let hub = Arc::new(HubState::new(
        store,
        HubConfig {
            write_timeout: config.write_timeout,
            debug: config.debug,
        },
    ));
    let app = api::router(hub);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    info!(
        event = "hub_start",
        addr = %addr,
        config_dir = %config.config_dir.display()
    );

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!(event = "hub_shutdown");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("server stopped")?;
    Ok(())
}

fn load_config() -> Config {
    let args = Args::parse();
    let config_dir = resolve_config_dir(&args.config_dir);
    Config {
        addr: resolve_addr(&args.addr),
        log_dir: resolve_log_dir(args.log_dir.as_deref(), &config_dir),
        config_dir,
        debug: args.debug || env_true("WDIMS_DEBUG"),
        write_timeout: Duration::from_secs(args.write_timeout),
        migrate_legacy: args.migrate_legacy || env_true("WDIMS_MIGRATE_LEGACY"),
    }
}

fn init_logging(config: &Config) -> Option<LogGuard> {
    let level = if config.debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("WDIMS_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let writer = match open_log_file(&config.log_dir) {
        Ok(log_guard) => log_guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = writer.file.clone();
    let make_writer = BoxMakeWriter::new(move || MultiWriter::new(file.clone()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(writer)
}

struct LogGuard {
    file: Option<Arc<Mutex<std::fs::File>>>,
}

/// Tees formatted log lines to stdout and the optional log file.
struct MultiWriter {
    stdout: io::Stdout,
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl MultiWriter {
    fn new(file: Option<Arc<Mutex<std::fs::File>>>) -> Self {
        Self {
            stdout: io::stdout(),
            file,
        }
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = self.stdout.write_all(buf);
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.stdout.flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

fn open_log_file(log_dir: &str) -> io::Result<LogGuard> {
    if log_dir.trim().is_empty() {
        return Ok(LogGuard { file: None });
    }
    let dir = PathBuf::from(log_dir);
    if std::fs::create_dir_all(&dir).is_err() {
        return Ok(LogGuard { file: None });
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE_NAME))?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
    })
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn resolve_addr(addr_flag: &str) -> String {
    if !addr_flag.trim().is_empty() {
        return addr_flag.to_string();
    }
    env_value("WDIMS_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string())
}

fn resolve_config_dir(config_dir_flag: &str) -> PathBuf {
    if !config_dir_flag.trim().is_empty() {
        return PathBuf::from(config_dir_flag);
    }
    PathBuf::from(env_value("WDIMS_CONFIG_DIR").unwrap_or_else(|| DEFAULT_CONFIG_DIR.to_string()))
}

/// An explicitly empty `--log-dir ""` disables the log file.
fn resolve_log_dir(log_dir_flag: Option<&str>, config_dir: &std::path::Path) -> String {
    if let Some(flag) = log_dir_flag {
        return flag.to_string();
    }
    if let Ok(value) = std::env::var("WDIMS_LOG_DIR") {
        return value;
    }
    config_dir.join("logs").display().to_string()
}
