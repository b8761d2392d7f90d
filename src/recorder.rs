// ===============================
// src/recorder.rs
// ===============================
//
// JSONL recorder untuk event backtest (tick, fill, balance, snapshot):
// - append one JSON object per line
// - BufWriter, flushed every second and every 1000 events
// - parent directory is created when missing
//
use std::path::Path;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use crate::domain::Event;

const FLUSH_EVERY_N_EVENTS: u32 = 1000;

async fn open_writer(path: &str) -> std::io::Result<BufWriter<fs::File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

pub async fn run(mut rx: mpsc::Receiver<Event>, path: String) {
    let mut writer = match open_writer(&path).await {
        Ok(w) => w,
        Err(e) => {
            error!(?e, %path, "recorder: open failed, recording disabled");
            // drain supaya pengirim tidak tertahan
            while rx.recv().await.is_some() {}
            return;
        }
    };
    info!(%path, "recorder: started");

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut since_last_flush: u32 = 0;

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                let Some(ev) = maybe_ev else {
                    let _ = writer.flush().await;
                    info!("recorder: channel closed, stopped");
                    break;
                };
                let mut line = match serde_json::to_vec(&ev) {
                    Ok(bs) => bs,
                    Err(e) => {
                        error!(?e, "recorder: serialize error, skip event");
                        continue;
                    }
                };
                line.push(b'\n');
                if let Err(e) = writer.write_all(&line).await {
                    error!(?e, "recorder: write failed, drop event");
                    continue;
                }
                since_last_flush += 1;
                if since_last_flush >= FLUSH_EVERY_N_EVENTS {
                    let _ = writer.flush().await;
                    since_last_flush = 0;
                }
            }
            _ = tick.tick() => {
                let _ = writer.flush().await;
                since_last_flush = 0;
            }
        }
    }
}
