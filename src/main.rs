// ===============================
// src/main.rs
// ===============================
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use exch_backtest::{config, domain::Event, metrics, recorder, replay};

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- Config ----
    let args = match config::load() {
        Ok(a) => a,
        Err(e) => {
            error!(%e, "invalid config");
            std::process::exit(2);
        }
    };
    info!(
        asset = %args.asset,
        capital = %args.capital,
        start = %args.start_date,
        ticks = args.tick_count,
        seed = args.seed,
        "startup config"
    );

    // ---- Metrics ----
    metrics::init();
    if let Some(port) = args.metrics_port {
        if let Err(e) = metrics::serve_metrics(port) {
            error!(?e, port, "metrics server not started");
        }
    }

    // ---- Recorder (optional) ----
    let mut rec = None;
    let rec_tx = args.record_file.clone().map(|path| {
        let (tx, rx) = mpsc::channel::<Event>(8192);
        rec = Some(tokio::spawn(recorder::run(rx, path)));
        tx
    });

    // ---- Replay ----
    let report = match replay::run(&args, rec_tx).await {
        Ok(r) => r,
        Err(e) => {
            error!(%e, "backtest failed");
            std::process::exit(1);
        }
    };

    if let Some(task) = rec {
        let _ = task.await;
    }

    info!("all balance snaps:");
    for snap in &report.snapshots {
        info!("\t{snap}");
    }
    for asset in report.balance.assets() {
        info!(name = %asset.name, free = asset.free, locked = asset.locked, "final balance");
    }
}
