//! Watch run loop

use std::future::Future;
use std::sync::Arc;

use colored::Colorize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app::options::WatchOptions;
use crate::app::render::{format_summary, LinePrinter};
use crate::channel::sse::SseConnector;
use crate::channel::websocket::WebSocketConnector;
use crate::channel::{ChannelConnector, ChannelTransport};
use crate::context::ObserverContext;
use crate::errors::{ErrorKind, ObserverError};
use crate::http::client::HttpClient;
use crate::http::logs::HttpLogFetcher;
use crate::observe::session::{ConnectionState, Notice, ObservationMode, SessionUpdate};
use crate::observe::view::{DeploymentView, ViewState};
use crate::workers::poller::{LogFetcher, PollController};
use crate::workers::stream::StreamController;

/// Observe one deployment until it finishes, fails to be observable, or
/// `shutdown_signal` resolves. Lines are printed as they arrive; the final
/// view state is returned.
pub async fn watch(
    options: WatchOptions,
    ctx: ObserverContext,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<ViewState, ObserverError> {
    info!("Watching task {:?} in {:?} mode", options.task.task_id(), options.mode);
    println!(
        "{} {}",
        "Deployment logs for".bold(),
        options.task.task_id().cyan()
    );

    let view = DeploymentView::new(
        options.task.clone(),
        ctx.owner_id(),
        ctx.artifact_template.clone(),
    );

    let state = match options.mode {
        ObservationMode::Stream => {
            let client = HttpClient::new(&options.stream.base_url, options.request_timeout)?;
            let path = options.stream.path_template.clone();
            match options.stream.transport {
                ChannelTransport::Sse => {
                    let connector = SseConnector::new(client, path, ctx.credentials.clone());
                    watch_stream(connector, &options, &ctx, view, shutdown_signal).await
                }
                ChannelTransport::Websocket => {
                    let connector = WebSocketConnector::new(client, path, ctx.credentials.clone());
                    watch_stream(connector, &options, &ctx, view, shutdown_signal).await
                }
            }
        }
        ObservationMode::Poll => {
            let client = HttpClient::new(&options.poll_base_url, options.request_timeout)?;
            let fetcher = HttpLogFetcher::new(
                client,
                options.poll_endpoint.clone(),
                ctx.credentials.clone(),
            );
            watch_poll(fetcher, &options, &ctx, view, shutdown_signal).await
        }
    };

    println!("{}", format_summary(&state));
    Ok(state)
}

async fn watch_stream<C: ChannelConnector>(
    connector: C,
    options: &WatchOptions,
    ctx: &ObserverContext,
    mut view: DeploymentView,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> ViewState {
    let controller = StreamController::new(Arc::new(connector), ctx.inference());
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    controller.on_update(move |update| {
        let _ = updates_tx.send(update.clone());
    });

    let session_id = controller.start(&options.task).await;
    view.bind(session_id, ObservationMode::Stream);

    let state = drive(view, updates_rx, shutdown_signal, |state| {
        matches!(
            state.connection,
            ConnectionState::Closed | ConnectionState::Errored
        )
    })
    .await;

    controller.stop().await;
    state
}

async fn watch_poll<F: LogFetcher>(
    fetcher: F,
    options: &WatchOptions,
    ctx: &ObserverContext,
    mut view: DeploymentView,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> ViewState {
    let controller = PollController::new(Arc::new(fetcher), ctx.inference(), options.poll.clone());
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    controller.on_update(move |update| {
        let _ = updates_tx.send(update.clone());
    });

    let session_id = controller.start(&options.task, options.poll.interval).await;
    view.bind(session_id, ObservationMode::Poll);

    let auto_refresh = options.poll.auto_refresh;
    let state = drive(view, updates_rx, shutdown_signal, move |state| {
        state.connection == ConnectionState::Closed
            || state.error == Some(ErrorKind::MissingIdentifier)
            // a single fetch is done once it answered either way
            || (!auto_refresh && state.connection != ConnectionState::Connecting)
    })
    .await;

    controller.stop().await;
    state
}

async fn drive<D>(
    mut view: DeploymentView,
    mut updates: mpsc::UnboundedReceiver<SessionUpdate>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
    is_done: D,
) -> ViewState
where
    D: Fn(&ViewState) -> bool,
{
    let mut printer = LinePrinter::new();
    tokio::pin!(shutdown_signal);

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Shutdown signal received, stopping watch...");
                break;
            }
            update = updates.recv() => {
                let Some(update) = update else {
                    break;
                };
                if !view.apply(&update) {
                    continue;
                }
                for line in printer.render_new(view.state()) {
                    println!("{}", line);
                }
                match update.notice {
                    Some(Notice::ConnectionLost) => warn!("Lost connection to the log source"),
                    Some(Notice::TaskNotFound) => warn!("Backend has no task {}", view.state().task_id),
                    Some(Notice::TerminalReached(status)) => info!("Deployment finished: {}", status),
                    None => {}
                }
                if is_done(view.state()) {
                    break;
                }
            }
        }
    }

    view.state().clone()
}
