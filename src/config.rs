// ===============================
// src/config.rs
// ===============================
//
// Every flag can also come from the environment (or .env):
//   ASSET=BTC CAPITAL=USDT START_PRICE=30000 TICK_COUNT=2000 ...
//
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use dotenvy::dotenv;
use thiserror::Error;

use crate::feed::FeedCfg;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error("{0} must be within {1}")]
    OutOfRange(&'static str, &'static str),
    #[error("asset and capital must differ")]
    SameAsset,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "backtest", about = "Replay simulated ticks against a resting order book")]
pub struct Args {
    /// Traded asset
    #[arg(long, env = "ASSET", default_value = "BTC")]
    pub asset: String,
    /// Quote / capital asset (always priced at 1)
    #[arg(long, env = "CAPITAL", default_value = "USDT")]
    pub capital: String,

    // ---- feed ----
    #[arg(long, env = "START_PRICE", default_value_t = 30000.0)]
    pub start_price: f64,
    /// RFC 3339 date of the first tick
    #[arg(long, env = "START_DATE", default_value = "2024-01-01T00:00:00Z")]
    pub start_date: DateTime<Utc>,
    #[arg(long, env = "TICK_COUNT", default_value_t = 2000)]
    pub tick_count: u64,
    /// Simulated minutes between ticks
    #[arg(long, env = "TICK_MINUTES", default_value_t = 60)]
    pub tick_minutes: i64,
    #[arg(long, env = "VOLATILITY", default_value_t = 0.01)]
    pub volatility: f64,
    #[arg(long, env = "TICK_VOLUME", default_value_t = 5.0)]
    pub tick_volume: f64,
    #[arg(long, env = "SEED", default_value_t = 42)]
    pub seed: u64,

    // ---- account / orders ----
    #[arg(long, env = "INITIAL_CAPITAL", default_value_t = 10000.0)]
    pub initial_capital: f64,
    /// Share of the capital spent by the entry market buy
    #[arg(long, env = "BUY_FRACTION", default_value_t = 0.5)]
    pub buy_fraction: f64,
    /// Take-profit distance of the exit limit sell (0.05 = +5%)
    #[arg(long, env = "TAKE_PROFIT", default_value_t = 0.05)]
    pub take_profit: f64,

    // ---- output ----
    #[arg(long, env = "RECORD_FILE")]
    pub record_file: Option<String>,
    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

impl Args {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.asset == self.capital {
            return Err(ConfigError::SameAsset);
        }
        if self.start_price <= 0.0 {
            return Err(ConfigError::NotPositive("start_price"));
        }
        if self.initial_capital <= 0.0 {
            return Err(ConfigError::NotPositive("initial_capital"));
        }
        if self.tick_count == 0 {
            return Err(ConfigError::NotPositive("tick_count"));
        }
        if self.tick_minutes <= 0 {
            return Err(ConfigError::NotPositive("tick_minutes"));
        }
        if self.tick_volume <= 0.0 {
            return Err(ConfigError::NotPositive("tick_volume"));
        }
        if !(0.0..1.0).contains(&self.volatility) {
            return Err(ConfigError::OutOfRange("volatility", "[0, 1)"));
        }
        if !(self.buy_fraction > 0.0 && self.buy_fraction <= 1.0) {
            return Err(ConfigError::OutOfRange("buy_fraction", "(0, 1]"));
        }
        if self.take_profit <= 0.0 {
            return Err(ConfigError::NotPositive("take_profit"));
        }
        Ok(())
    }

    pub fn feed(&self) -> FeedCfg {
        FeedCfg {
            start_date: self.start_date,
            start_price: self.start_price,
            step: Duration::minutes(self.tick_minutes),
            volatility: self.volatility,
            volume: self.tick_volume,
            count: self.tick_count,
            seed: self.seed,
        }
    }
}

pub fn load() -> Result<Args, ConfigError> {
    // Pastikan .env dibaca sebelum clap membaca env
    let _ = dotenv();
    let args = Args::parse();
    args.validate()?;
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let args = Args::parse_from(["backtest"]);
        assert_eq!(args.validate(), Ok(()));
        assert_eq!(args.feed().step, Duration::minutes(60));
    }

    #[test]
    fn bad_values_are_rejected() {
        let args = Args::parse_from(["backtest", "--capital", "BTC"]);
        assert_eq!(args.validate(), Err(ConfigError::SameAsset));
        let args = Args::parse_from(["backtest", "--buy-fraction", "1.5"]);
        assert!(matches!(args.validate(), Err(ConfigError::OutOfRange("buy_fraction", _))));
        let args = Args::parse_from(["backtest", "--tick-count", "0"]);
        assert_eq!(args.validate(), Err(ConfigError::NotPositive("tick_count")));
    }
}
