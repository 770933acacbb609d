//! kmitl-autologin - keeps a KMITL captive portal session alive
//!
//! Logs in, sends heartbeats and re-authenticates whenever connectivity is
//! lost. When the login budget runs out the controller is rebuilt from
//! scratch.

mod config;
mod controller;
mod http;
mod models;
mod parser;
mod portal;

use anyhow::{Context, Result};
use clap::Parser;
use config::{AgentConfig, FileConfig};
use controller::Controller;
use portal::{CaptivePortal, Endpoints, KmitlPortal};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kmitl-autologin")]
#[command(about = "KMITL Captive Portal Auto Login Client", long_about = None)]
struct Args {
    /// Log in once, check connectivity and exit
    #[arg(short, long)]
    once: bool,

    /// Config file path (default: config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let file = match FileConfig::load(args.config.as_deref()) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Configuration error: {:#}", anyhow::Error::from(e));
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&file.logging.level)),
        )
        .init();

    match &file.source {
        Some(path) => tracing::info!("Loaded config from: {}", path.display()),
        None => tracing::debug!("No config file found, using defaults"),
    }

    let agent = match AgentConfig::from_env(&file) {
        Ok(agent) => agent,
        Err(e) => {
            tracing::error!(
                "Configuration error: {}. Set KMITL_USERNAME and KMITL_PASSWORD in the environment.",
                e
            );
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("kmitl-autologin v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Logging in with username '{}'...", agent.username);

    let result = if args.once {
        run_once(agent, &file).await
    } else {
        run_daemon(agent, &file).await
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Single login + heartbeat, then report whether the network is open
async fn run_once(agent: AgentConfig, file: &FileConfig) -> Result<ExitCode> {
    let portal = KmitlPortal::new(agent, &file.http, Endpoints::default())
        .context("Failed to set up portal client")?;

    if portal.login().await.is_some() {
        portal.heartbeat().await;
    }

    if portal.check_connection().await {
        tracing::info!("Connection established!");
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!("Still disconnected after login");
        Ok(ExitCode::FAILURE)
    }
}

/// Supervise the controller forever, rebuilding it whenever it gives up.
///
/// Only returns when the portal client cannot be built.
async fn run_daemon(agent: AgentConfig, file: &FileConfig) -> Result<ExitCode> {
    tracing::info!("Starting daemon mode...");
    tracing::info!("Check interval: {}s", agent.check_interval.as_secs());
    match agent.max_login_attempts {
        Some(max) => tracing::info!("Max login attempts: {}", max),
        None => tracing::info!("Max login attempts: unlimited"),
    }
    tracing::info!("---");

    let mut agent = agent;
    loop {
        let portal = KmitlPortal::new(agent.clone(), &file.http, Endpoints::default())
            .context("Failed to set up portal client")?;
        let mut controller = Controller::new(agent.clone(), portal);

        controller.run().await;

        tracing::info!("Restarting with fresh state...");
        agent = agent.renewed();
    }
}
