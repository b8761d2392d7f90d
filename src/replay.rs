// ===============================
// src/replay.rs (backtest harness)
// ===============================
//
// Wiring:
//   MockFeed -> (publish tick) -> bids/asks run_tick -> Balance
//            -> (publish balance on change) -> BalanceService -> snapshots
//
// Order flow: one entry MARKET BUY; once it is fully filled, one LIMIT
// SELL of the bought asset at +take_profit.
//
use thiserror::Error;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tracing::{info, warn};

use crate::asset::{Asset, AssetError, Balance, Prices};
use crate::balance_service::{
    BalanceService, BalanceServiceCfg, ServiceError, BALANCE_TOPIC, TICK_TOPIC,
};
use crate::config::Args;
use crate::domain::{BalanceSnap, CodecError, Event};
use crate::feed::MockFeed;
use crate::matching::{run_tick, Fill, MatchError};
use crate::metrics::EVENTS_DROPPED;
use crate::order::{Order, OrderError, Side};
use crate::order_list::OrderList;
use crate::pubsub::{MemoryPubsub, PubsubError};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Pubsub(#[from] PubsubError),
}

#[derive(Debug)]
pub struct ReplayReport {
    pub ticks: u64,
    pub fills: Vec<Fill>,
    pub balance: Balance,
    pub snapshots: Vec<BalanceSnap>,
}

struct Book {
    bids: OrderList,
    asks: OrderList,
    balance: Balance,
}

impl Book {
    /// Locks the order's funds, then rests it on its side.
    fn place(&mut self, order: Order) -> Result<(), ReplayError> {
        self.balance.change(&[order.reserve()])?;
        info!(id = order.id, side = ?order.side, kind = ?order.kind, qty = order.remaining(), px = order.asset_price, "order placed");
        match order.side {
            Side::Buy => self.bids.push(order)?,
            Side::Sell => self.asks.push(order)?,
        }
        Ok(())
    }
}

fn record(rec_tx: &Option<mpsc::Sender<Event>>, ev: Event) {
    let Some(tx) = rec_tx else { return };
    // recorder lambat tidak boleh menahan replay
    match tx.try_send(ev) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(_)) => {
            EVENTS_DROPPED.inc();
            warn!(dropped = EVENTS_DROPPED.get(), "recorder: channel full, event dropped");
        }
    }
}

pub async fn run(args: &Args, rec_tx: Option<mpsc::Sender<Event>>) -> Result<ReplayReport, ReplayError> {
    let ps = MemoryPubsub::new();
    let prices: Prices = [
        (args.asset.clone(), args.start_price),
        (args.capital.clone(), 1.0),
    ]
    .into_iter()
    .collect();
    let (_cancel_tx, cancel_rx) = oneshot::channel();
    let service = BalanceService::spawn(
        &ps,
        BalanceServiceCfg { asset: args.asset.clone(), prices },
        cancel_rx,
    )?;

    let mut book = Book {
        bids: OrderList::new(),
        asks: OrderList::new(),
        balance: Balance::with_assets([
            Asset::new(args.asset.clone(), 0.0, 0.0),
            Asset::new(args.capital.clone(), args.initial_capital, 0.0),
        ]),
    };
    ps.publish(BALANCE_TOPIC, book.balance.encode()?)?;

    let entry = Order::market(
        &args.asset,
        &args.capital,
        Side::Buy,
        args.initial_capital * args.buy_fraction,
    );
    let entry_id = entry.id;
    book.place(entry)?;
    let mut exit_placed = false;

    let mut fills: Vec<Fill> = Vec::new();
    let mut ticks = 0u64;
    for tick in MockFeed::new(args.feed()) {
        ticks += 1;
        ps.publish(TICK_TOPIC, tick.encode()?)?;
        record(&rec_tx, Event::Tick(tick.clone()));

        let mut t = tick;
        let mut got = run_tick(&mut book.bids, &mut t, &mut book.balance)?;
        got.extend(run_tick(&mut book.asks, &mut t, &mut book.balance)?);
        if got.is_empty() {
            continue;
        }

        if !exit_placed && book.bids.iter().all(|o| o.id != entry_id) {
            let bought: f64 = fills
                .iter()
                .chain(got.iter())
                .filter(|f| f.order_id == entry_id)
                .map(|f| f.quantity)
                .sum();
            let spent: f64 = fills
                .iter()
                .chain(got.iter())
                .filter(|f| f.order_id == entry_id)
                .map(|f| f.notional)
                .sum();
            if bought > 0.0 {
                let avg = spent / bought;
                let exit = Order::limit(&args.asset, &args.capital, Side::Sell, bought, avg * (1.0 + args.take_profit));
                book.place(exit)?;
            } else {
                warn!("entry order closed without buying anything");
            }
            exit_placed = true;
        }

        for f in &got {
            record(&rec_tx, Event::Fill(f.clone()));
        }
        fills.extend(got);
        ps.publish(BALANCE_TOPIC, book.balance.encode()?)?;
        record(&rec_tx, Event::Balance(book.balance.clone()));
    }

    ps.close(TICK_TOPIC);
    ps.close(BALANCE_TOPIC);
    let snapshots = service.await.map_err(ServiceError::from)??;
    for s in &snapshots {
        record(&rec_tx, Event::Snap(s.clone()));
    }
    info!(ticks, fills = fills.len(), snapshots = snapshots.len(), "replay done");

    Ok(ReplayReport { ticks, fills, balance: book.balance, snapshots })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[tokio::test]
    async fn replay_buys_then_snapshots_every_day() {
        // 72 hourly ticks from midnight -> boundaries on day 1, 2 and 3
        let args = Args::parse_from([
            "backtest",
            "--tick-count",
            "72",
            "--start-price",
            "100",
            "--tick-volume",
            "1000",
            "--initial-capital",
            "1000",
        ]);
        let (tx, mut rx) = mpsc::channel(4096);
        let report = run(&args, Some(tx)).await.unwrap();
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }

        assert_eq!(report.ticks, 72);
        assert_eq!(report.snapshots.len(), 3);
        assert!(report.snapshots.windows(2).all(|w| w[0].date < w[1].date));

        // entry buy (500 USDT) fills on the first tick at 100
        let first = &report.fills[0];
        assert_eq!(first.side, Side::Buy);
        assert_eq!(first.price, 100.0);
        assert_eq!(first.quantity, 5.0);

        // day 1: 5 BTC locked by the exit sell + 500 USDT left
        assert_eq!(report.snapshots[0].price, 100.0);
        assert_eq!(report.snapshots[0].amount, 1000.0);

        // each day is valued with the balance published right after its tick
        let mut latest = Balance::with_assets([
            Asset::new("BTC", 0.0, 0.0),
            Asset::new("USDT", 1000.0, 0.0),
        ]);
        let mut closing = Vec::new();
        for ev in &events {
            match ev {
                Event::Tick(t) => closing.push((t.date, t.price, latest.clone())),
                Event::Balance(b) => {
                    latest = b.clone();
                    if let Some(last) = closing.last_mut() {
                        last.2 = b.clone();
                    }
                }
                _ => {}
            }
        }
        for snap in &report.snapshots {
            let (_, price, bal) = closing.iter().find(|(date, _, _)| *date == snap.date).unwrap();
            assert_eq!(snap.price, *price);
            let prices: Prices = [("BTC".to_string(), *price), ("USDT".to_string(), 1.0)]
                .into_iter()
                .collect();
            assert_eq!(snap.amount, bal.total(&prices).unwrap());
        }

        let btc = report.balance.get("BTC").unwrap();
        let usdt = report.balance.get("USDT").unwrap();
        assert_eq!(btc.total(), 5.0 - report.fills.iter().filter(|f| f.side == Side::Sell).map(|f| f.quantity).sum::<f64>());
        assert_eq!(usdt.locked, 0.0);
    }

    #[tokio::test]
    async fn full_recorder_channel_counts_drops() {
        let args = Args::parse_from(["backtest", "--tick-count", "30"]);
        let before = EVENTS_DROPPED.get();
        let (tx, _rx) = mpsc::channel(1);
        run(&args, Some(tx)).await.unwrap();
        assert!(EVENTS_DROPPED.get() >= before + 29);
    }

    #[tokio::test]
    async fn recorder_channel_gets_ticks_and_snapshots() {
        let args = Args::parse_from(["backtest", "--tick-count", "30"]);
        let (tx, mut rx) = mpsc::channel(1024);
        run(&args, Some(tx)).await.unwrap();

        let mut ticks = 0;
        let mut snaps = 0;
        while let Some(ev) = rx.recv().await {
            match ev {
                Event::Tick(_) => ticks += 1,
                Event::Snap(_) => snaps += 1,
                _ => {}
            }
        }
        assert_eq!(ticks, 30);
        assert_eq!(snaps, 2);
    }
}
