// ===============================
// src/feed.rs
// ===============================
//
// Mock market data for the backtest:
// - seeded random walk, so a replay is reproducible
// - dates advance by a fixed simulated step (no wall clock, no sleep)
//
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::domain::Tick;

#[derive(Debug, Clone)]
pub struct FeedCfg {
    pub start_date: DateTime<Utc>,
    pub start_price: f64,
    pub step: Duration,
    /// Max relative move per tick (0.01 = 1%).
    pub volatility: f64,
    /// Mean liquidity available per tick.
    pub volume: f64,
    pub count: u64,
    pub seed: u64,
}

pub struct MockFeed {
    cfg: FeedCfg,
    rng: StdRng,
    price: f64,
    emitted: u64,
}

impl MockFeed {
    pub fn new(cfg: FeedCfg) -> Self {
        Self {
            rng: StdRng::seed_from_u64(cfg.seed),
            price: cfg.start_price,
            emitted: 0,
            cfg,
        }
    }
}

impl Iterator for MockFeed {
    type Item = Tick;

    fn next(&mut self) -> Option<Tick> {
        if self.emitted >= self.cfg.count {
            return None;
        }
        let id = self.emitted;
        // tick pertama selalu di harga awal
        if id > 0 {
            let v = self.cfg.volatility;
            let step = self.rng.gen_range(-v..=v);
            self.price = (self.price * (1.0 + step)).max(f64::EPSILON);
        }
        let volume = self.cfg.volume * self.rng.gen_range(0.5..=1.5);
        let date = self.cfg.start_date + self.cfg.step * id as i32;
        self.emitted += 1;
        Some(Tick::new(id + 1, date, self.price, volume))
    }
}
