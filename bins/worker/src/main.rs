//! Wagerly maintenance worker.
//!
//! Runs the periodic sweeps against the shared database:
//!   - approval expiry
//!   - daily totals reset
//!   - ledger reconciliation
//!   - expired idempotency key purge
//!
//! Every sweep is safe to run alongside live traffic and other workers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wagerly_core::engine::{MaintenanceService, SweepReport};
use wagerly_core::idempotency::IdempotencyTracker;
use wagerly_core::lock::KeyedLeaseLocks;
use wagerly_db::{PgIdempotencyStore, PgWalletStore, connect_with};
use wagerly_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wagerly_core=info,wagerly_db=info,wagerly_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;

    let db = connect_with(&config.database).await?;
    info!("Connected to database");

    let maintenance = MaintenanceService::new(
        Arc::new(PgWalletStore::new(db.clone())),
        IdempotencyTracker::new(
            Arc::new(PgIdempotencyStore::new(db)),
            config.wallet.idempotency.ttl(),
        ),
        Arc::new(KeyedLeaseLocks::new()),
        config.wallet.lock,
        config.worker.batch_size,
    );
    let worker = &config.worker;

    let m = maintenance.clone();
    let expiry = every("approval_expiry", worker.expiry_interval_secs, move || {
        let m = m.clone();
        async move {
            match m.expire_stale(Utc::now()).await {
                Ok(report) => log_sweep("approval_expiry", report),
                Err(err) => error!(error = %err, "Approval expiry sweep failed"),
            }
        }
    });

    let m = maintenance.clone();
    let reset = every("daily_reset", worker.daily_reset_interval_secs, move || {
        let m = m.clone();
        async move {
            match m.reset_daily_totals(Utc::now()).await {
                Ok(report) => log_sweep("daily_reset", report),
                Err(err) => error!(error = %err, "Daily reset sweep failed"),
            }
        }
    });

    let m = maintenance.clone();
    let reconcile = every(
        "reconciliation",
        worker.reconciliation_interval_secs,
        move || {
            let m = m.clone();
            async move {
                match m.reconcile_all(Utc::now()).await {
                    Ok(report) if report.drifted.is_empty() => info!(
                        checked = report.checked,
                        failed = report.failed,
                        "Reconciliation finished"
                    ),
                    Ok(report) => error!(
                        checked = report.checked,
                        failed = report.failed,
                        drifted = ?report.drifted,
                        "Reconciliation found drifted accounts"
                    ),
                    Err(err) => error!(error = %err, "Reconciliation sweep failed"),
                }
            }
        },
    );

    let m = maintenance;
    let purge = every(
        "idempotency_purge",
        worker.idempotency_purge_interval_secs,
        move || {
            let m = m.clone();
            async move {
                match m.purge_idempotency(Utc::now()).await {
                    Ok(purged) => info!(purged, "Expired idempotency keys purged"),
                    Err(err) => error!(error = %err, "Idempotency purge failed"),
                }
            }
        },
    );

    info!("Worker started");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping sweeps");

    for handle in [expiry, reset, reconcile, purge] {
        handle.abort();
    }
    Ok(())
}

/// Runs `sweep` every `period_secs`, starting immediately.
fn every<F, Fut>(name: &'static str, period_secs: u64, mut sweep: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let period = Duration::from_secs(period_secs.max(1));
    info!(sweep = name, period_secs = period.as_secs(), "Scheduling sweep");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep().await;
        }
    })
}

fn log_sweep(name: &'static str, report: SweepReport) {
    if report.failed > 0 {
        warn!(
            sweep = name,
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            "Sweep finished with failures"
        );
    } else {
        info!(
            sweep = name,
            processed = report.processed,
            skipped = report.skipped,
            "Sweep finished"
        );
    }
}
