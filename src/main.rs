mod cli;
mod link;

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use scriptdap_config::{load_config, Config};
use scriptdap_dap::{DapServer, DebugAdapter, FsProjectPaths, ServerOptions, TracingEditor};
use scriptdap_platform::logging::{prepare_log_file, LogRotation};
use scriptdap_platform::paths::{DefaultPaths, PlatformPaths};

use crate::cli::{Cli, USAGE};
use crate::link::{read_feed, write_commands, RuntimeLink};

/// Feed messages buffered between two polls.
const FEED_CAPACITY: usize = 256;

fn init_logging(paths: &DefaultPaths, config: &Config) -> Result<PathBuf> {
    let log_path = prepare_log_file(paths, config.log.file.as_deref(), LogRotation::default())
        .context("failed to prepare log file")?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    // stdout carries runtime commands; logs go to the file only.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.as_str()));
    tracing_subscriber::fmt()
        .with_writer(std::sync::Mutex::new(log_file))
        .with_env_filter(filter)
        .with_ansi(false)
        .init();
    Ok(log_path)
}

async fn run(cli: Cli) -> Result<()> {
    let paths = DefaultPaths::new().context("failed to detect platform paths")?;
    let cwd = env::current_dir().context("failed to read working directory")?;
    let config_dir = cli.config_dir.clone().unwrap_or_else(|| paths.config_dir());
    let mut config = load_config(&config_dir, Some(&cwd))
        .with_context(|| format!("failed to load config from {}", config_dir.display()))?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let log_path = init_logging(&paths, &config)?;
    info!(log = %log_path.display(), "scriptdap starting");

    let bind_ip = config
        .server
        .bind_ip()
        .with_context(|| format!("invalid bind address {}", config.server.bind_address))?;
    let project_root = config.project.root.clone().unwrap_or(cwd);

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (feed_tx, mut feed_rx) = mpsc::channel(FEED_CAPACITY);
    let link = RuntimeLink::new(command_tx);

    tokio::spawn(async move {
        let input = tokio::io::BufReader::new(tokio::io::stdin());
        if let Err(e) = read_feed(input, feed_tx).await {
            error!("runtime feed failed: {e}");
        }
    });
    tokio::spawn(async move {
        if let Err(e) = write_commands(command_rx, tokio::io::stdout()).await {
            error!("runtime command writer failed: {e}");
        }
    });

    let adapter = DebugAdapter::new(
        Box::new(link.debugger()),
        Box::new(TracingEditor::default()),
        Box::new(FsProjectPaths::new(&project_root)),
    );
    let options = ServerOptions {
        max_clients: config.server.max_clients,
        max_buffer_size: config.server.max_buffer_size,
    };
    let mut server = DapServer::new(adapter, options);
    server
        .start(config.server.port, bind_ip)
        .context("failed to start DAP server")?;
    info!(
        project = %project_root.display(),
        address = ?server.local_addr(),
        "serving"
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(config.server.poll_interval_ms));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut feed_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("cannot listen for ctrl-c: {e}");
                }
                break;
            }
        }

        while feed_open {
            match feed_rx.try_recv() {
                Ok(message) => link.apply(message),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => feed_open = false,
            }
        }
        server.poll();
    }

    server.stop();
    info!("scriptdap exited cleanly");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = match Cli::parse(env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("scriptdap: {:#}", e);
            std::process::exit(2);
        }
    };
    if cli.help {
        println!("{USAGE}");
        return;
    }

    if let Err(e) = run(cli).await {
        eprintln!("scriptdap: {:#}", e);
        std::process::exit(1);
    }
}
