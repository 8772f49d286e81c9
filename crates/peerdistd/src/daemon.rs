//! Long-running mode: distribute on a timer until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use peerdist_core::PeerdistConfig;
use peerdist_orchestrator::{Distributor, FileRosterSource};

use crate::admin::open_store;

pub async fn run(config: PeerdistConfig) -> anyhow::Result<()> {
    info!("peerdist daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let state = open_store(&config)?;

    let roster = FileRosterSource::new(&config.roster.dir);
    info!(dir = ?roster.dir(), "roster source initialized");

    let distributor = Arc::new(Distributor::new(
        Arc::new(roster),
        Arc::new(state),
        config.distribution.reviews_per_student,
    ));
    info!(
        reviews_per_student = config.distribution.reviews_per_student,
        "distributor initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let interval = Duration::from_secs(config.distribution.interval_secs);
    let distributor_handle = tokio::spawn(distributor.run(interval, shutdown_rx));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C, shutting down");
    } else {
        info!("shutdown signal received");
    }
    let _ = shutdown_tx.send(true);

    // A cycle in flight finishes its current prompt first.
    let _ = distributor_handle.await;

    info!("peerdist daemon stopped");
    Ok(())
}
