//! Guardian daemon: one shared CONNECT proxy (C9) plus its approval UI (C7)
//! serving every cloister token registered on this host.

mod cli;
mod logging;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use guardian_core::{
    audit::AuditBuffer, cache::AllowlistCache, config::GuardianConfig, decision::DecisionPersister, events::EventHub,
    session::SessionLists, token::TokenRegistry, NoopReloadNotifier,
};
use guardian_proxy::{CommandApprover, ControllerNotifier, DomainApprover, GuardianProxy, ProxyConfig, ReloadController};
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    if let Some(path) = &cli.env_file {
        dotenvy::from_path(path).ok();
    } else {
        dotenvy::dotenv().ok();
    }

    logging::init();

    let mut config = GuardianConfig::load(cli.config.as_deref()).context("loading guardian config")?;
    if let Some(bind) = cli.proxy_bind {
        config.proxy_bind = bind;
    }
    if let Some(port) = cli.proxy_port {
        config.proxy_port = port;
    }
    if let Some(bind) = cli.ui_bind {
        config.ui_bind = bind;
    }
    if let Some(port) = cli.ui_port {
        config.ui_port = port;
    }
    let config = Arc::new(config);

    let sessions = Arc::new(SessionLists::new());
    let token_registry = Arc::new(TokenRegistry::new(&config.token_dir, Arc::clone(&sessions)));
    token_registry.load_from_disk().context("loading token registry")?;

    let cache = Arc::new(AllowlistCache::new());

    // The reload controller needs a persister to read decision files from,
    // but the persister we hand out to the rest of the process needs to
    // notify that same controller on every write. Bootstrap with a no-op
    // notifier, build the controller against it, then build the real,
    // notifying persister that everyone else uses.
    let bootstrap_persister = Arc::new(DecisionPersister::new(&config.decisions_dir, Arc::new(NoopReloadNotifier)));
    let controller = Arc::new(ReloadController::new(Arc::clone(&config), bootstrap_persister, Arc::clone(&cache)));
    let notifier = Arc::new(ControllerNotifier::new(Arc::clone(&controller)));
    notifier.set_known_projects(token_registry.known_projects());
    let persister = Arc::new(DecisionPersister::new(&config.decisions_dir, notifier.clone()));

    controller.reload(&token_registry.known_projects());

    let events = Arc::new(EventHub::default());

    let audit = Arc::new(AuditBuffer::new(1024));
    let audit_log_path = config.config_dir.join("audit.jsonl");
    if let Err(e) = audit.enable_persistence(audit_log_path).await {
        warn!(error = %e, "audit log: persistence disabled, continuing with in-memory ring buffer only");
    }
    let (audit_tx, mut audit_rx) = tokio::sync::mpsc::channel(256);
    tokio::spawn({
        let audit = Arc::clone(&audit);
        async move {
            while let Some(entry) = audit_rx.recv().await {
                audit.push(entry).await;
            }
        }
    });

    let domain_approver = Arc::new(DomainApprover::new(
        config.domain_approval_timeout,
        Arc::clone(&sessions),
        Arc::clone(&cache),
        Arc::clone(&persister),
        Arc::clone(&events),
    ));
    let command_approver = Arc::new(CommandApprover::new(config.command_approval_timeout, Arc::clone(&events)));

    let proxy_bind_addr = format!("{}:{}", config.proxy_bind, config.proxy_port)
        .parse::<std::net::SocketAddr>()
        .with_context(|| format!("invalid proxy bind address {}:{}", config.proxy_bind, config.proxy_port))?;
    let proxy = Arc::new(GuardianProxy::new(
        ProxyConfig {
            bind_addr: proxy_bind_addr,
            upstream_dial_timeout: config.upstream_dial_timeout,
            idle_splice_timeout: config.idle_splice_timeout,
        },
        Arc::clone(&token_registry),
        Arc::clone(&sessions),
        Arc::clone(&cache),
        Arc::clone(&domain_approver),
        Some(audit_tx),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let proxy_task = tokio::spawn({
        let proxy = Arc::clone(&proxy);
        let shutdown_rx = shutdown_rx.clone();
        async move {
            if let Err(e) = proxy.run(shutdown_rx).await {
                warn!(error = %e, "guardian proxy exited with an error");
            }
        }
    });

    let ui_state = guardian_ui::AppState::new(Arc::clone(&domain_approver), Arc::clone(&command_approver), Arc::clone(&events));
    let ui_router = guardian_ui::router(ui_state);
    let ui_bind_addr = format!("{}:{}", config.ui_bind, config.ui_port)
        .parse::<std::net::SocketAddr>()
        .with_context(|| format!("invalid UI bind address {}:{}", config.ui_bind, config.ui_port))?;
    let ui_listener = tokio::net::TcpListener::bind(ui_bind_addr).await.context("binding approval UI listener")?;
    info!(addr = %ui_bind_addr, "approval UI listening");
    let ui_task = tokio::spawn(guardian_ui::serve(ui_listener, ui_router, shutdown_rx.clone()));

    run_until_signal(&token_registry, &controller, &notifier, shutdown_tx).await?;

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = proxy_task.await;
        let _ = ui_task.await;
    })
    .await;

    Ok(())
}

/// Block until a termination signal arrives, reloading (C10) on every
/// `SIGHUP` in the meantime, then broadcast shutdown to the proxy and UI.
#[cfg(unix)]
async fn run_until_signal(
    token_registry: &Arc<TokenRegistry>,
    controller: &Arc<ReloadController>,
    notifier: &Arc<ControllerNotifier>,
    shutdown_tx: watch::Sender<bool>,
) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sighup = signal(SignalKind::hangup()).context("registering SIGHUP handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;

    loop {
        tokio::select! {
            _ = sighup.recv() => {
                if let Err(e) = token_registry.load_from_disk() {
                    warn!(error = %e, "reload: failed to refresh token registry");
                }
                let projects = token_registry.known_projects();
                notifier.set_known_projects(projects.clone());
                controller.reload(&projects);
            },
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            },
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            },
        }
    }

    let _ = shutdown_tx.send(true);
    Ok(())
}

#[cfg(not(unix))]
async fn run_until_signal(
    _token_registry: &Arc<TokenRegistry>,
    _controller: &Arc<ReloadController>,
    _notifier: &Arc<ControllerNotifier>,
    shutdown_tx: watch::Sender<bool>,
) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("received ctrl-c, shutting down");
    let _ = shutdown_tx.send(true);
    Ok(())
}
