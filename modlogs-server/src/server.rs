//! modlogs-server/src/server.rs
//!
//! Startup order, background tasks and graceful shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use modlogs_core::Error;
use modlogs_core::server::{router, serve};
use modlogs_core::services::discord::slashcommands::{
    clear_global_slash_commands, register_global_slash_commands,
};
use modlogs_core::services::discord::{SlashContext, handle_interaction_create};
use modlogs_core::tasks::run_reconciliation;

use crate::context::ServerContext;
use crate::settings::Settings;

/// How long queued events get to drain once the HTTP server stopped.
const DRAIN_GRACE: Duration = Duration::from_secs(10);

pub async fn run_server(settings: Settings) -> Result<(), Error> {
    let mut ctx = ServerContext::new(settings).await?;
    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    // 1) Dispatch workers. They stop once every sender is gone.
    let workers_stop = CancellationToken::new();
    let queue_rx = ctx
        .queue_rx
        .take()
        .ok_or_else(|| Error::Config("dispatch queue already taken".into()))?;
    let workers = ctx
        .dispatcher
        .spawn_workers(queue_rx, ctx.settings.workers, workers_stop.clone());
    info!(workers = workers.len(), "Dispatch workers started");

    // 2) Discord gateway and slash commands
    ctx.discord.connect().await?;
    let application_id = ctx.discord.application_id().await?;
    if ctx.settings.rebuild_commands {
        register_global_slash_commands(&ctx.discord.http(), application_id, ctx.settings.max_hooks_per_guild)
            .await?;
        info!("Registered global slash commands");
    }
    let slash = Arc::new(SlashContext {
        http: ctx.discord.http(),
        cache: ctx.discord.cache(),
        application_id,
        commands: ctx.commands.clone(),
        admins: ctx.settings.admins.clone(),
    });
    let interactions = {
        let discord = ctx.discord.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = discord.next_interaction() => event,
                };
                let Some(event) = event else { break };
                tokio::spawn(handle_interaction_create(slash.clone(), event));
            }
        })
    };

    // 3) HTTP server. It must be up before reconciliation, since recreated
    //    subscriptions are verified through the webhook route.
    let state = ctx
        .take_app_state()
        .ok_or_else(|| Error::Config("app state already taken".into()))?;
    let addr = ctx.settings.bind_addr;
    let http = tokio::spawn(serve(addr, router(state), shutdown.clone()));

    // 4) Startup reconciliation
    match run_reconciliation(ctx.hooks.as_ref(), ctx.cache.as_ref(), ctx.twitch.as_ref(), &ctx.registry).await {
        Ok(report) => info!(
            deleted = report.deleted,
            repaired = report.repaired.len(),
            dropped = report.dropped.len(),
            counters_rewritten = report.counters_rewritten,
            "Subscriptions reconciled"
        ),
        Err(e) => {
            error!(error = %e, "Startup reconciliation failed");
            shutdown.cancel();
            let _ = http.await;
            workers_stop.cancel();
            ctx.discord.disconnect().await;
            return Err(e);
        }
    }

    info!("Application started.");

    // 5) Run until a signal arrives or the server dies
    let served = match http.await {
        Ok(result) => result,
        Err(e) => Err(Error::Platform(format!("HTTP server task failed: {e}"))),
    };
    shutdown.cancel();
    let started = Instant::now();
    info!("Gracefully shutting down...");

    if tokio::time::timeout(DRAIN_GRACE, join_all(workers)).await.is_err() {
        warn!("Dispatch queue did not drain in time");
        workers_stop.cancel();
    }

    if ctx.settings.rebuild_commands {
        if let Err(e) = clear_global_slash_commands(&ctx.discord.http(), application_id).await {
            error!(error = %e, "Failed to remove slash commands");
        }
    }
    let _ = interactions.await;
    ctx.discord.disconnect().await;
    ctx.db.pool().close().await;

    info!("Shutdown took {:.2}ms", started.elapsed().as_secs_f64() * 1000.0);
    served
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Signal received; shutting down");
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to listen for SIGTERM: {:?}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {:?}", e);
            }
            return;
        }
    };
    tokio::select! {
        _ = term.recv() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl-C: {:?}", e);
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {:?}", e);
    }
}
