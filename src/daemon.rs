//! Daemon supervisor
//!
//! Owns every component and the wiring between them: registry changes
//! fan out to the LAN broadcaster, overlay peer changes fan out to the
//! probe engine, and the TCP proxy's port feeds the broadcaster's packet
//! rewriting. One tokio task per component; ctrl-c fans a shutdown
//! signal out to all of them.

use std::sync::{Arc, OnceLock};

use crate::config::Config;
use crate::discovery::{ProbeEngine, Responder};
use crate::game::{Game, Registry};
use crate::lan::Broadcaster;
use crate::overlay::LocalApi;
use crate::proxy::TcpProxy;
use crate::Result;

/// Build all components and run until interrupted.
pub async fn run(config: Config) -> Result<()> {
    // The registry's change callback needs the broadcaster, but the
    // broadcaster needs the proxy port, which needs the registry. The
    // slot breaks the cycle: empty during construction, filled before
    // any component starts running.
    let broadcaster_slot: Arc<OnceLock<Arc<Broadcaster>>> = Arc::new(OnceLock::new());

    let slot = Arc::clone(&broadcaster_slot);
    let registry = Arc::new(Registry::new(Some(Box::new(move |games: &[Game]| {
        tracing::trace!("game list changed ({} games)", games.len());
        if let Some(broadcaster) = slot.get() {
            broadcaster.on_games_changed(games);
        }
    }))));

    // The proxy binds synchronously; its port must be known before the
    // first broadcast goes out.
    let proxy = Arc::new(TcpProxy::new(Arc::clone(&registry)).await?);

    let broadcaster = Arc::new(Broadcaster::new(
        proxy.port(),
        config.broadcast_interval(),
    )?);
    let _ = broadcaster_slot.set(Arc::clone(&broadcaster));

    let probe = Arc::new(
        ProbeEngine::new(
            Arc::clone(&registry),
            config.probe_interval(),
            config.game_timeout(),
        )
        .await?,
    );
    probe.set_version(config.game_version()?);

    let probe_sink = Arc::clone(&probe);
    let overlay = Arc::new(LocalApi::new(
        &config.overlay.local_api_url,
        config.overlay_poll_interval(),
        Some(Box::new(move |peers: &[crate::overlay::Peer]| {
            tracing::debug!("peer list changed ({} peers)", peers.len());
            probe_sink.on_peers_changed(peers);
        })),
    ));

    // The responder needs our overlay address; without it the daemon is
    // still useful for joining remote games, so failure only warns.
    let responder = match overlay.fetch_self_ip().await {
        Ok(Some(ip)) => match Responder::new(Arc::clone(&registry), ip).await {
            Ok(responder) => {
                tracing::info!("responder listening for remote queries on {}", ip);
                Some(Arc::new(responder))
            }
            Err(e) => {
                tracing::warn!("could not create responder, remote discovery disabled: {}", e);
                None
            }
        },
        Ok(None) => {
            tracing::warn!("overlay reports no IPv4 address, remote discovery disabled");
            None
        }
        Err(e) => {
            tracing::warn!("could not reach overlay daemon, remote discovery disabled: {}", e);
            None
        }
    };

    let mut tasks = Vec::new();

    {
        let overlay = Arc::clone(&overlay);
        tasks.push(tokio::spawn(async move {
            if let Err(e) = overlay.run().await {
                tracing::error!("overlay watcher error: {}", e);
            }
        }));
    }

    {
        let probe = Arc::clone(&probe);
        tasks.push(tokio::spawn(async move {
            if let Err(e) = probe.run().await {
                tracing::error!("probe engine error: {}", e);
            }
        }));
    }

    {
        let broadcaster = Arc::clone(&broadcaster);
        tasks.push(tokio::spawn(async move {
            if let Err(e) = broadcaster.run().await {
                tracing::error!("broadcaster error: {}", e);
            }
        }));
    }

    {
        let proxy = Arc::clone(&proxy);
        tasks.push(tokio::spawn(async move {
            if let Err(e) = proxy.run().await {
                tracing::error!("TCP proxy error: {}", e);
            }
        }));
    }

    if let Some(responder) = &responder {
        let responder = Arc::clone(responder);
        tasks.push(tokio::spawn(async move {
            if let Err(e) = responder.run().await {
                tracing::error!("responder error: {}", e);
            }
        }));
    }

    tracing::info!("warlink started (proxy port {})", proxy.port());

    tokio::signal::ctrl_c().await?;
    tracing::info!("received shutdown signal");

    overlay.stop();
    probe.stop();
    broadcaster.stop();
    proxy.stop();
    if let Some(responder) = &responder {
        responder.stop();
    }

    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("warlink shutdown complete");

    Ok(())
}
