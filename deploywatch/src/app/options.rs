//! Watch configuration options

use std::collections::HashMap;
use std::time::Duration;

use crate::app::settings::Settings;
use crate::authn::credentials::StaticCredentials;
use crate::channel::ChannelTransport;
use crate::errors::ObserverError;
use crate::http::logs::PollEndpoint;
use crate::models::task::TaskHandle;
use crate::observe::session::ObservationMode;
use crate::workers::poller::PollOptions;

/// Environment variable holding the bearer token
pub const TOKEN_ENV_VAR: &str = "DEPLOYWATCH_TOKEN";

/// Push channel options
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub base_url: String,
    pub path_template: String,
    pub transport: ChannelTransport,
}

/// Options of one watch run
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Deployment to observe
    pub task: TaskHandle,

    /// Acquisition mode
    pub mode: ObservationMode,

    /// Push channel options
    pub stream: StreamOptions,

    /// Base URL of the snapshot endpoint
    pub poll_base_url: String,

    /// Snapshot endpoint shape
    pub poll_endpoint: PollEndpoint,

    /// Poll controller options
    pub poll: PollOptions,

    /// Deadline of one request/response call
    pub request_timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::from_settings(TaskHandle::new(""), &Settings::default())
    }
}

impl WatchOptions {
    /// Options for `task` as configured by `settings`
    pub fn from_settings(task: TaskHandle, settings: &Settings) -> Self {
        let poll_endpoint = if settings.poll.use_report_endpoint {
            PollEndpoint::Report {
                path_template: settings.poll.report_path_template.clone(),
            }
        } else {
            PollEndpoint::Lines {
                path_template: settings.poll.path_template.clone(),
            }
        };
        // the report endpoint is served by the log service, not the build server
        let poll_base_url = if settings.poll.use_report_endpoint {
            settings.stream.base_url.clone()
        } else {
            settings.poll.base_url.clone()
        };

        Self {
            task,
            mode: ObservationMode::Stream,
            stream: StreamOptions {
                base_url: settings.stream.base_url.clone(),
                path_template: settings.stream.path_template.clone(),
                transport: settings.stream.transport,
            },
            poll_base_url,
            poll_endpoint,
            poll: PollOptions {
                interval: Duration::from_secs(settings.poll.interval_secs.max(1)),
                auto_refresh: settings.poll.auto_refresh,
                stop_on_terminal: settings.poll.stop_on_terminal,
            },
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
        }
    }

    /// Apply `--key=value` command line overrides on top of `settings`
    pub fn from_args(
        cli_args: &HashMap<String, String>,
        settings: &Settings,
    ) -> Result<Self, ObserverError> {
        let task_id = cli_args.get("task").cloned().unwrap_or_default();
        let task = match cli_args.get("project").filter(|p| !p.is_empty()) {
            Some(project) => TaskHandle::with_project(task_id, project.as_str()),
            None => TaskHandle::new(task_id),
        };

        let mut options = Self::from_settings(task, settings);

        if let Some(mode) = cli_args.get("mode") {
            options.mode = parse_mode(mode)?;
        }

        if let Some(interval) = cli_args.get("interval") {
            let secs: u64 = interval.parse().map_err(|_| {
                ObserverError::ConfigError(format!("Invalid interval: {}", interval))
            })?;
            if secs == 0 {
                return Err(ObserverError::ConfigError(
                    "Interval must be at least one second".to_string(),
                ));
            }
            options.poll.interval = Duration::from_secs(secs);
        }

        if is_flag_set(cli_args, "auto-refresh") {
            options.poll.auto_refresh = true;
        }

        Ok(options)
    }
}

fn parse_mode(value: &str) -> Result<ObservationMode, ObserverError> {
    match value.to_lowercase().as_str() {
        "stream" => Ok(ObservationMode::Stream),
        "poll" => Ok(ObservationMode::Poll),
        _ => Err(ObserverError::ConfigError(format!(
            "Invalid mode: {} (expected stream or poll)",
            value
        ))),
    }
}

fn is_flag_set(cli_args: &HashMap<String, String>, key: &str) -> bool {
    cli_args
        .get(key)
        .is_some_and(|v| !matches!(v.as_str(), "false" | "0" | "no"))
}

/// Credentials from `--token=`/`--owner=`, falling back to the environment
/// for the token
pub fn credentials_from_args(cli_args: &HashMap<String, String>) -> StaticCredentials {
    let token = cli_args
        .get("token")
        .cloned()
        .or_else(|| std::env::var(TOKEN_ENV_VAR).ok())
        .unwrap_or_default();
    let owner_id = cli_args.get("owner").filter(|o| !o.is_empty()).cloned();
    StaticCredentials::new(token, owner_id)
}
