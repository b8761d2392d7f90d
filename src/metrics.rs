// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{error, info};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Matching --------
pub static TICKS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("ticks_matched_total", "ticks driven through an order list").unwrap());

pub static FILLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("fills_total", "fills by order side & type"),
        &["side", "type"],
    )
    .unwrap()
});

pub static ORDERS_FILLED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("orders_filled_total", "orders fully filled and popped").unwrap());

// -------- Balance service --------
pub static SNAPSHOTS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("balance_snapshots_total", "daily balance snapshots").unwrap());

pub static NET_WORTH: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("balance_net_worth", "mark-to-market value of the last snapshot").unwrap());

// -------- Recorder --------
pub static EVENTS_DROPPED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("recorder_events_dropped_total", "events dropped on a full recorder channel").unwrap());

pub fn init() {
    for res in [
        REGISTRY.register(Box::new(TICKS.clone())),
        REGISTRY.register(Box::new(FILLS.clone())),
        REGISTRY.register(Box::new(ORDERS_FILLED.clone())),
        REGISTRY.register(Box::new(SNAPSHOTS.clone())),
        REGISTRY.register(Box::new(NET_WORTH.clone())),
        REGISTRY.register(Box::new(EVENTS_DROPPED.clone())),
    ] {
        if let Err(e) = res {
            error!(?e, "metrics: register failed");
        }
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// One request, one response, connection closed
fn handle_client(mut stream: TcpStream) {
    let mut req = [0u8; 1024];
    let _ = stream.read(&mut req);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

/// Serves `/metrics` from a dedicated OS thread so the runtime stays free
/// for the backtest tasks.
pub fn serve_metrics(port: u16) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)?;
    info!(%addr, "metrics listening");
    thread::spawn(move || {
        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => error!(?e, "metrics accept error"),
            }
        }
    });
    Ok(())
}
