// ===============================
// src/balance_service.rs
// ===============================
//
// Records the mark-to-market value of the latest balance once per
// simulated day (00:00:00 UTC).
//
// Tasks:
// - clock loop : owns the Simulator + tick stream. Forwards every tick
//                (un-acked) over one ordered channel. Alarms fired by a
//                tick are held back until the next tick arrives (or the
//                stream ends), then forwarded ahead of it, stamped with
//                that next tick's publish seq as cutoff.
// - record loop: owns prices, latest balance and the snapshots. Acks a
//                message only after applying it.
//
// A snapshot for day D is valued at the price of the tick that crossed D,
// with the last balance published before the following tick. Balance
// updates are applied in publish order relative to ticks, never ahead of
// an alarm whose cutoff they miss.
//
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info};

use crate::asset::{Balance, BalanceError, Prices};
use crate::clock::{ClockError, Simulator};
use crate::domain::{BalanceSnap, CodecError, Tick};
use crate::metrics::{NET_WORTH, SNAPSHOTS};
use crate::pubsub::{Message, Pubsub, PubsubError};

pub const TICK_TOPIC: &str = "tick";
pub const BALANCE_TOPIC: &str = "balance";

// tick + balance
const SOURCES: usize = 2;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("subscribe: {0}")]
    Subscribe(#[from] PubsubError),
    #[error("decode: {0}")]
    Decode(#[from] CodecError),
    #[error("clock: {0}")]
    Clock(#[from] ClockError),
    #[error("snapshot: {0}")]
    Balance(#[from] BalanceError),
    #[error("cancelled before the input streams closed")]
    Cancelled,
    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct BalanceServiceCfg {
    /// Asset whose price is tracked from the tick stream.
    pub asset: String,
    /// Initial prices. The capital asset must be present at 1.
    pub prices: Prices,
}

enum ClockEvent {
    Tick(Tick, Message),
    /// `cutoff`: seq of the tick after the one that fired the alarm. `None`
    /// once the tick stream has ended.
    Alarm { date: DateTime<Utc>, cutoff: Option<u64> },
    Failed(ServiceError),
}

pub struct BalanceService;

impl BalanceService {
    /// Subscribes to `tick` and `balance` and starts the service. Firing
    /// `cancel` before both streams close ends it with
    /// `ServiceError::Cancelled`; dropping the sender never cancels.
    pub fn spawn<P: Pubsub>(
        ps: &P,
        cfg: BalanceServiceCfg,
        cancel: oneshot::Receiver<()>,
    ) -> Result<JoinHandle<Result<Vec<BalanceSnap>, ServiceError>>, ServiceError> {
        let ticks = ps.subscribe(TICK_TOPIC)?;
        let balances = ps.subscribe(BALANCE_TOPIC)?;
        info!(asset = %cfg.asset, "balance service: subscribed");
        Ok(tokio::spawn(run(ticks, balances, cfg, cancel)))
    }
}

async fn run(
    mut ticks: mpsc::UnboundedReceiver<Message>,
    balances: mpsc::UnboundedReceiver<Message>,
    cfg: BalanceServiceCfg,
    cancel: oneshot::Receiver<()>,
) -> Result<Vec<BalanceSnap>, ServiceError> {
    let BalanceServiceCfg { asset, mut prices } = cfg;

    // Bootstrap: first tick seeds the price and the clock
    let Some(msg) = ticks.recv().await else {
        info!("balance service: tick stream closed before the first tick");
        return Ok(Vec::new());
    };
    let first = Tick::decode(&msg.payload)?;
    prices.insert(asset.clone(), first.price);
    msg.ack();

    let mut clock = Simulator::new(first.date);
    let alarms = clock.every_day(0, 0, 0)?;
    info!(start = %first.date, price = first.price, "balance service: clock started");

    let (ev_tx, ev_rx) = mpsc::unbounded_channel();
    tokio::spawn(clock_loop(clock, ticks, alarms, ev_tx));

    let ledger = Ledger { asset, prices, latest: None, held: None, snaps: Vec::with_capacity(2048) };
    ledger.run(balances, ev_rx, cancel).await
}

async fn clock_loop(
    mut clock: Simulator,
    mut ticks: mpsc::UnboundedReceiver<Message>,
    mut alarms: mpsc::UnboundedReceiver<DateTime<Utc>>,
    ev_tx: mpsc::UnboundedSender<ClockEvent>,
) {
    debug!("balance service: clock loop started");
    // alarms fired by the previous tick, waiting for their cutoff
    let mut fired: Vec<DateTime<Utc>> = Vec::new();
    collect_alarms(&mut alarms, &mut fired);

    while let Some(msg) = ticks.recv().await {
        let tick = match Tick::decode(&msg.payload) {
            Ok(t) => t,
            Err(e) => {
                error!(%e, seq = msg.seq, "balance service: bad tick payload");
                let _ = ev_tx.send(ClockEvent::Failed(e.into()));
                return;
            }
        };
        if !flush_alarms(&mut fired, Some(msg.seq), &ev_tx) {
            return;
        }
        if let Err(e) = clock.set(tick.date) {
            error!(%e, "balance service: clock fault");
            let _ = ev_tx.send(ClockEvent::Failed(e.into()));
            return;
        }
        if ev_tx.send(ClockEvent::Tick(tick, msg)).is_err() {
            return;
        }
        collect_alarms(&mut alarms, &mut fired);
    }
    flush_alarms(&mut fired, None, &ev_tx);
    info!("balance service: ticks ended, clock stops");
}

fn collect_alarms(alarms: &mut mpsc::UnboundedReceiver<DateTime<Utc>>, fired: &mut Vec<DateTime<Utc>>) {
    while let Ok(date) = alarms.try_recv() {
        fired.push(date);
    }
}

/// False once the record loop is gone.
fn flush_alarms(
    fired: &mut Vec<DateTime<Utc>>,
    cutoff: Option<u64>,
    ev_tx: &mpsc::UnboundedSender<ClockEvent>,
) -> bool {
    fired
        .drain(..)
        .all(|date| ev_tx.send(ClockEvent::Alarm { date, cutoff }).is_ok())
}

struct Ledger {
    asset: String,
    prices: Prices,
    latest: Option<Balance>,
    /// First queued balance published at or after the last cutoff seen.
    held: Option<Message>,
    snaps: Vec<BalanceSnap>,
}

impl Ledger {
    async fn run(
        mut self,
        mut balances: mpsc::UnboundedReceiver<Message>,
        mut events: mpsc::UnboundedReceiver<ClockEvent>,
        mut cancel: oneshot::Receiver<()>,
    ) -> Result<Vec<BalanceSnap>, ServiceError> {
        debug!("balance service: record loop started");
        let mut cancel_armed = true;
        let mut balances_open = true;
        let mut events_open = true;
        let mut closed = 0;
        // alarms fired by the last tick: valued once every balance is in
        let mut last_day: Vec<DateTime<Utc>> = Vec::new();

        while closed < SOURCES {
            tokio::select! {
                biased;

                res = &mut cancel, if cancel_armed => match res {
                    Ok(()) => {
                        error!("balance service: cancelled with live inputs");
                        return Err(ServiceError::Cancelled);
                    }
                    // sender hilang: tidak akan pernah cancel
                    Err(_) => cancel_armed = false,
                },

                ev = events.recv(), if events_open => match ev {
                    Some(ClockEvent::Tick(tick, msg)) => {
                        self.catch_up(&mut balances, msg.seq)?;
                        self.prices.insert(self.asset.clone(), tick.price);
                        msg.ack();
                    }
                    Some(ClockEvent::Alarm { date, cutoff: Some(cutoff) }) => {
                        self.catch_up(&mut balances, cutoff)?;
                        self.snapshot(date)?;
                    }
                    Some(ClockEvent::Alarm { date, cutoff: None }) => last_day.push(date),
                    Some(ClockEvent::Failed(e)) => return Err(e),
                    None => {
                        events_open = false;
                        closed += 1;
                        if let Some(msg) = self.held.take() {
                            self.apply(msg)?;
                        }
                    }
                },

                // free-running only after the last tick; before that,
                // balances are pulled in seq order by catch_up
                msg = balances.recv(), if balances_open && !events_open => match msg {
                    Some(msg) => self.apply(msg)?,
                    None => {
                        balances_open = false;
                        closed += 1;
                    }
                },
            }
        }

        for date in last_day {
            self.snapshot(date)?;
        }
        info!(count = self.snaps.len(), "balance service: inputs closed");
        Ok(self.snaps)
    }

    /// Applies every queued balance published before `cutoff`. The first
    /// later one is parked in `held`.
    fn catch_up(
        &mut self,
        balances: &mut mpsc::UnboundedReceiver<Message>,
        cutoff: u64,
    ) -> Result<(), ServiceError> {
        loop {
            let msg = match self.held.take() {
                Some(msg) => msg,
                None => match balances.try_recv() {
                    Ok(msg) => msg,
                    Err(_) => return Ok(()),
                },
            };
            if msg.seq >= cutoff {
                self.held = Some(msg);
                return Ok(());
            }
            self.apply(msg)?;
        }
    }

    fn apply(&mut self, msg: Message) -> Result<(), ServiceError> {
        self.latest = Some(Balance::decode(&msg.payload)?);
        msg.ack();
        Ok(())
    }

    fn snapshot(&mut self, date: DateTime<Utc>) -> Result<(), ServiceError> {
        let empty = Balance::new();
        let bal = self.latest.as_ref().unwrap_or(&empty);
        let snap = BalanceSnap {
            date,
            amount: bal.total(&self.prices)?,
            price: self.prices.get(&self.asset).copied().unwrap_or_default(),
        };
        debug!(%snap, "balance snap");
        SNAPSHOTS.inc();
        NET_WORTH.set(snap.amount);
        self.snaps.push(snap);
        Ok(())
    }
}
