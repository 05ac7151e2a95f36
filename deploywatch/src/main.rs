//! deploywatch - Entry Point
//!
//! Follows the build output of one triggered deployment and reports how it
//! ended.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use tracing::{info, warn};

use deploywatch::app::options::{credentials_from_args, WatchOptions};
use deploywatch::app::run::watch;
use deploywatch::app::settings::Settings;
use deploywatch::context::ObserverContext;
use deploywatch::logs::{init_logging, LogOptions};
use deploywatch::models::status::DeploymentStatus;
use deploywatch::observe::view::ViewState;
use deploywatch::utils::{parse_cli_args, version_info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli_args = parse_cli_args(env::args().skip(1));

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{}", version),
            Err(e) => eprintln!("Failed to print version: {}", e),
        }
        return ExitCode::SUCCESS;
    }

    match run(&cli_args).await {
        Ok(state) if state.status == DeploymentStatus::Success => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli_args: &HashMap<String, String>) -> anyhow::Result<ViewState> {
    // Retrieve the settings file
    let settings = match cli_args.get("config") {
        Some(path) => Settings::load(path)
            .await
            .with_context(|| format!("Unable to read settings file {}", path))?,
        None => Settings::default(),
    };

    // Initialize logging; the guard flushes the log file on exit
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.as_ref().map(PathBuf::from),
        json_format: cli_args.contains_key("json-logs"),
        ..Default::default()
    };
    let _log_guard = init_logging(log_options).context("Failed to initialize logging")?;

    let options = WatchOptions::from_args(cli_args, &settings).context("Invalid arguments")?;
    let ctx = ObserverContext {
        credentials: Arc::new(credentials_from_args(cli_args)),
        markers: settings.sentinels.clone(),
        artifact_template: settings.artifact_url_template.clone(),
    };

    info!(
        "Running deploywatch {} with options: {:?}",
        version_info().version,
        options
    );
    let state = watch(options, ctx, await_shutdown_signal()).await?;
    Ok(state)
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("SIGTERM received, shutting down...");
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Ctrl+C received, shutting down...");
                    }
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await;
    }
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, shutting down..."),
        Err(e) => {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
